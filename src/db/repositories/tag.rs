//! Tag repository
//!
//! Database operations for tags and their association with posts.

use crate::db::DbPool;
use crate::models::{Tag, TagWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Create a new tag
    async fn create(&self, tag: &Tag) -> Result<Tag>;

    /// Get tag by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    /// Get tag by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    /// Get tag by name (case-insensitive)
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// List all tags by name
    async fn list(&self) -> Result<Vec<Tag>>;

    /// Tags with published post counts, most used first
    async fn cloud(&self, limit: usize) -> Result<Vec<TagWithCount>>;

    /// Delete a tag
    async fn delete(&self, id: i64) -> Result<()>;

    /// Tags attached to a post
    async fn get_by_post_id(&self, post_id: i64) -> Result<Vec<Tag>>;
}

/// SQLx-based tag repository implementation
pub struct SqlxTagRepository {
    pool: DbPool,
}

impl SqlxTagRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, tag: &Tag) -> Result<Tag> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO tags (name, slug, description, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&tag.name)
        .bind(&tag.slug)
        .bind(&tag.description)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create tag")?;

        Ok(Tag {
            id: result.last_insert_rowid(),
            created_at: now,
            ..tag.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, slug, description, created_at FROM tags WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get tag by ID")?;

        Ok(row.as_ref().map(row_to_tag))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, slug, description, created_at FROM tags WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get tag by slug")?;

        Ok(row.as_ref().map(row_to_tag))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let row = sqlx::query(
            "SELECT id, name, slug, description, created_at FROM tags WHERE name = ? COLLATE NOCASE",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get tag by name")?;

        Ok(row.as_ref().map(row_to_tag))
    }

    async fn list(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT id, name, slug, description, created_at FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list tags")?;

        Ok(rows.iter().map(row_to_tag).collect())
    }

    async fn cloud(&self, limit: usize) -> Result<Vec<TagWithCount>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.name, t.slug, t.description, t.created_at, COUNT(p.id) as post_count
            FROM tags t
            LEFT JOIN post_tags pt ON t.id = pt.tag_id
            LEFT JOIN posts p ON p.id = pt.post_id AND p.status = 'published'
            GROUP BY t.id, t.name, t.slug, t.description, t.created_at
            ORDER BY post_count DESC, t.name ASC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get tags with counts")?;

        Ok(rows
            .iter()
            .map(|row| TagWithCount::new(row_to_tag(row), row.get("post_count")))
            .collect())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        // post_tags rows go with it via ON DELETE CASCADE
        sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete tag")?;
        Ok(())
    }

    async fn get_by_post_id(&self, post_id: i64) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.name, t.slug, t.description, t.created_at
            FROM tags t
            INNER JOIN post_tags pt ON t.id = pt.tag_id
            WHERE pt.post_id = ?
            ORDER BY t.name
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get tags for post")?;

        Ok(rows.iter().map(row_to_tag).collect())
    }
}

fn row_to_tag(row: &SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DbPool, SqlxTagRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxTagRepository::new(pool.clone());
        (pool, repo)
    }

    /// Inserts an author and a post with the given status, returning the post id
    async fn create_test_post(pool: &DbPool, slug: &str, status: &str) -> i64 {
        sqlx::query("INSERT OR IGNORE INTO authors (id, name, slug) VALUES (1, 'Marc', 'marc')")
            .execute(pool)
            .await
            .unwrap();
        let result = sqlx::query(
            "INSERT INTO posts (title, slug, content, author_id, category_id, status) VALUES (?, ?, 'c', 1, 1, ?)",
        )
        .bind(format!("Title for {}", slug))
        .bind(slug)
        .bind(status)
        .execute(pool)
        .await
        .expect("Failed to create test post");
        result.last_insert_rowid()
    }

    async fn attach(pool: &DbPool, post_id: i64, tag_id: i64) {
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_tag() {
        let (_pool, repo) = setup_test_repo().await;

        let created = repo
            .create(&Tag::new("Rust".to_string(), "rust".to_string()))
            .await
            .unwrap();

        assert!(created.id > 0);
        assert_eq!(created.slug, "rust");
        assert!(repo.get_by_slug("rust").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_by_name_is_case_insensitive() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&Tag::new("SEO".to_string(), "seo".to_string()))
            .await
            .unwrap();

        let found = repo.get_by_name("seo").await.unwrap();
        assert_eq!(found.map(|t| t.name), Some("SEO".to_string()));
    }

    #[tokio::test]
    async fn test_cloud_counts_only_published_posts() {
        let (pool, repo) = setup_test_repo().await;

        let rust = repo.create(&Tag::new("Rust".into(), "rust".into())).await.unwrap();
        let web = repo.create(&Tag::new("Web".into(), "web".into())).await.unwrap();

        let p1 = create_test_post(&pool, "one", "published").await;
        let p2 = create_test_post(&pool, "two", "published").await;
        let p3 = create_test_post(&pool, "three", "draft").await;

        attach(&pool, p1, rust.id).await;
        attach(&pool, p2, rust.id).await;
        attach(&pool, p3, web.id).await;

        let cloud = repo.cloud(10).await.unwrap();
        assert_eq!(cloud[0].tag.slug, "rust");
        assert_eq!(cloud[0].post_count, 2);
        assert_eq!(cloud[1].tag.slug, "web");
        assert_eq!(cloud[1].post_count, 0);
    }

    #[tokio::test]
    async fn test_delete_tag_detaches_posts() {
        let (pool, repo) = setup_test_repo().await;

        let tag = repo.create(&Tag::new("Old".into(), "old".into())).await.unwrap();
        let post = create_test_post(&pool, "p", "published").await;
        attach(&pool, post, tag.id).await;
        assert_eq!(repo.get_by_post_id(post).await.unwrap().len(), 1);

        repo.delete(tag.id).await.unwrap();
        assert!(repo.get_by_post_id(post).await.unwrap().is_empty());
    }
}
