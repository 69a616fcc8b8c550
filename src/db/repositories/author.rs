//! Author repository

use crate::db::DbPool;
use crate::models::Author;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Author repository trait
#[async_trait]
pub trait AuthorRepository: Send + Sync {
    async fn create(&self, author: &Author) -> Result<Author>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Author>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Author>>;

    /// Active authors ordered by name
    async fn list_active(&self) -> Result<Vec<Author>>;
}

/// SQLx-based author repository implementation
pub struct SqlxAuthorRepository {
    pool: DbPool,
}

impl SqlxAuthorRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn AuthorRepository> {
        Arc::new(Self::new(pool))
    }
}

const AUTHOR_COLUMNS: &str =
    "id, name, slug, bio, avatar_url, social_links, expertise, is_active, created_at, updated_at";

#[async_trait]
impl AuthorRepository for SqlxAuthorRepository {
    async fn create(&self, author: &Author) -> Result<Author> {
        let now = Utc::now();
        let social_links = serde_json::to_string(&author.social_links)?;
        let expertise = serde_json::to_string(&author.expertise)?;

        let result = sqlx::query(
            r#"
            INSERT INTO authors (name, slug, bio, avatar_url, social_links, expertise, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&author.name)
        .bind(&author.slug)
        .bind(&author.bio)
        .bind(&author.avatar_url)
        .bind(social_links)
        .bind(expertise)
        .bind(author.is_active)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create author")?;

        Ok(Author {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..author.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Author>> {
        let row = sqlx::query(&format!("SELECT {} FROM authors WHERE id = ?", AUTHOR_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get author by ID")?;

        row.as_ref().map(row_to_author).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Author>> {
        let row = sqlx::query(&format!("SELECT {} FROM authors WHERE slug = ?", AUTHOR_COLUMNS))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get author by slug")?;

        row.as_ref().map(row_to_author).transpose()
    }

    async fn list_active(&self) -> Result<Vec<Author>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM authors WHERE is_active = 1 ORDER BY name",
            AUTHOR_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list authors")?;

        rows.iter().map(row_to_author).collect()
    }
}

pub(crate) fn row_to_author(row: &SqliteRow) -> Result<Author> {
    let social_links: String = row.get("social_links");
    let expertise: String = row.get("expertise");

    Ok(Author {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        bio: row.get("bio"),
        avatar_url: row.get("avatar_url"),
        social_links: serde_json::from_str::<BTreeMap<String, String>>(&social_links)
            .unwrap_or_default(),
        expertise: serde_json::from_str(&expertise).unwrap_or_default(),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxAuthorRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxAuthorRepository::new(pool)
    }

    fn test_author(slug: &str) -> Author {
        let now = Utc::now();
        Author {
            id: 0,
            name: "Marc".to_string(),
            slug: slug.to_string(),
            bio: Some("Builds software".to_string()),
            avatar_url: None,
            social_links: BTreeMap::from([(
                "linkedin".to_string(),
                "https://linkedin.com/in/marc".to_string(),
            )]),
            expertise: vec!["Rust".to_string(), "Automation".to_string()],
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_author() {
        let repo = setup_test_repo().await;

        let created = repo.create(&test_author("marc")).await.unwrap();
        assert!(created.id > 0);

        let fetched = repo.get_by_slug("marc").await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.expertise, vec!["Rust", "Automation"]);
        assert_eq!(
            fetched.social_links.get("linkedin").map(String::as_str),
            Some("https://linkedin.com/in/marc")
        );

        assert!(repo.get_by_id(created.id).await.unwrap().is_some());
        assert!(repo.get_by_id(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_skips_inactive() {
        let repo = setup_test_repo().await;

        repo.create(&test_author("active")).await.unwrap();
        let mut inactive = test_author("inactive");
        inactive.is_active = false;
        repo.create(&inactive).await.unwrap();

        let authors = repo.list_active().await.unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].slug, "active");
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let repo = setup_test_repo().await;
        repo.create(&test_author("dup")).await.unwrap();
        assert!(repo.create(&test_author("dup")).await.is_err());
    }
}
