//! Category repository
//!
//! Database operations for categories.

use crate::db::DbPool;
use crate::models::{Category, CategoryFilter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category
    async fn create(&self, category: &Category) -> Result<Category>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Get category by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// List categories ordered by display_order, then name
    async fn list(&self, filter: CategoryFilter) -> Result<Vec<Category>>;

    /// Update an existing category
    async fn update(&self, category: &Category) -> Result<Category>;

    /// Delete a category
    async fn delete(&self, id: i64) -> Result<()>;

    /// Check if a category with the given slug exists
    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;

    /// Number of posts (any status) filed under the category
    async fn count_posts(&self, id: i64) -> Result<i64>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    pool: DbPool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

const CATEGORY_COLUMNS: &str = r#"
    id, name, slug, description, subtitle, meta_title, meta_description, color, icon,
    display_order, show_in_nav, show_on_homepage, parent_id, created_at, updated_at
"#;

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        create_category(&self.pool, category).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let row = sqlx::query(&format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get category by ID")?;

        row.as_ref().map(row_to_category).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let row = sqlx::query(&format!("SELECT {} FROM categories WHERE slug = ?", CATEGORY_COLUMNS))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get category by slug")?;

        row.as_ref().map(row_to_category).transpose()
    }

    async fn list(&self, filter: CategoryFilter) -> Result<Vec<Category>> {
        list_categories(&self.pool, filter).await
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        update_category(&self.pool, category).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete category")?;
        Ok(())
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM categories WHERE slug = ?")
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check category slug")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    async fn count_posts(&self, id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM posts WHERE category_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count category posts")?;
        Ok(row.get("count"))
    }
}

async fn create_category(pool: &DbPool, category: &Category) -> Result<Category> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO categories (
            name, slug, description, subtitle, meta_title, meta_description, color, icon,
            display_order, show_in_nav, show_on_homepage, parent_id, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.name)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(&category.subtitle)
    .bind(&category.meta_title)
    .bind(&category.meta_description)
    .bind(&category.color)
    .bind(&category.icon)
    .bind(category.display_order)
    .bind(category.show_in_nav)
    .bind(category.show_on_homepage)
    .bind(category.parent_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..category.clone()
    })
}

async fn list_categories(pool: &DbPool, filter: CategoryFilter) -> Result<Vec<Category>> {
    let mut sql = format!("SELECT {} FROM categories WHERE 1 = 1", CATEGORY_COLUMNS);
    if filter.show_in_nav.is_some() {
        sql.push_str(" AND show_in_nav = ?");
    }
    if filter.show_on_homepage.is_some() {
        sql.push_str(" AND show_on_homepage = ?");
    }
    sql.push_str(" ORDER BY display_order ASC, name ASC");

    let mut query = sqlx::query(&sql);
    if let Some(show_in_nav) = filter.show_in_nav {
        query = query.bind(show_in_nav);
    }
    if let Some(show_on_homepage) = filter.show_on_homepage {
        query = query.bind(show_on_homepage);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list categories")?;

    rows.iter().map(row_to_category).collect()
}

async fn update_category(pool: &DbPool, category: &Category) -> Result<Category> {
    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE categories
        SET name = ?, slug = ?, description = ?, subtitle = ?, meta_title = ?,
            meta_description = ?, color = ?, icon = ?, display_order = ?, show_in_nav = ?,
            show_on_homepage = ?, parent_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&category.name)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(&category.subtitle)
    .bind(&category.meta_title)
    .bind(&category.meta_description)
    .bind(&category.color)
    .bind(&category.icon)
    .bind(category.display_order)
    .bind(category.show_in_nav)
    .bind(category.show_on_homepage)
    .bind(category.parent_id)
    .bind(now)
    .bind(category.id)
    .execute(pool)
    .await
    .context("Failed to update category")?;

    Ok(Category {
        updated_at: now,
        ..category.clone()
    })
}

pub(crate) fn row_to_category(row: &SqliteRow) -> Result<Category> {
    Ok(Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        subtitle: row.get("subtitle"),
        meta_title: row.get("meta_title"),
        meta_description: row.get("meta_description"),
        color: row.get("color"),
        icon: row.get("icon"),
        display_order: row.get("display_order"),
        show_in_nav: row.get("show_in_nav"),
        show_on_homepage: row.get("show_on_homepage"),
        parent_id: row.get("parent_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxCategoryRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxCategoryRepository::new(pool)
    }

    fn test_category(slug: &str, display_order: i32, show_on_homepage: bool) -> Category {
        let now = Utc::now();
        Category {
            id: 0,
            name: slug.to_uppercase(),
            slug: slug.to_string(),
            description: None,
            subtitle: None,
            meta_title: None,
            meta_description: None,
            color: Some("#0ea5e9".to_string()),
            icon: None,
            display_order,
            show_in_nav: true,
            show_on_homepage,
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_category() {
        let repo = setup_test_repo().await;

        let created = repo.create(&test_category("automation", 1, true)).await.unwrap();
        assert!(created.id > 0);

        let by_slug = repo.get_by_slug("automation").await.unwrap().unwrap();
        assert_eq!(by_slug.id, created.id);
        assert_eq!(by_slug.color.as_deref(), Some("#0ea5e9"));
        assert!(repo.exists_by_slug("automation").await.unwrap());
        assert!(!repo.exists_by_slug("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_ordered_and_filtered() {
        let repo = setup_test_repo().await;

        repo.create(&test_category("second", 2, false)).await.unwrap();
        repo.create(&test_category("first", 1, true)).await.unwrap();

        let all = repo.list(CategoryFilter::default()).await.unwrap();
        let slugs: Vec<&str> = all.iter().map(|c| c.slug.as_str()).collect();
        // Seeded "general" has display_order 0
        assert_eq!(slugs, vec!["general", "first", "second"]);

        let homepage = repo
            .list(CategoryFilter {
                show_on_homepage: Some(true),
                ..CategoryFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(homepage.len(), 1);
        assert_eq!(homepage[0].slug, "first");
    }

    #[tokio::test]
    async fn test_update_and_delete_category() {
        let repo = setup_test_repo().await;

        let mut category = repo.create(&test_category("old", 5, false)).await.unwrap();
        category.name = "Renamed".to_string();
        category.show_on_homepage = true;
        repo.update(&category).await.unwrap();

        let fetched = repo.get_by_id(category.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Renamed");
        assert!(fetched.show_on_homepage);
        assert_eq!(repo.count_posts(category.id).await.unwrap(), 0);

        repo.delete(category.id).await.unwrap();
        assert!(repo.get_by_id(category.id).await.unwrap().is_none());
    }
}
