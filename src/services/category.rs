//! Category service
//!
//! Category listing for navigation and the homepage, plus admin CRUD with
//! slug uniqueness and protection of categories that still hold posts.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CategoryFilter, CategoryInput};
use crate::services::post::generate_slug;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

const CATEGORY_CACHE_TTL_SECS: u64 = 3600;

const CACHE_KEY_CATEGORY_LIST: &str = "categories:list:";
const CACHE_PATTERN_ALL_CATEGORIES: &str = "categories:*";

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Duplicate slug, or deleting a category that still has posts
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<Cache>) -> Self {
        Self {
            repo,
            cache,
            cache_ttl: Duration::from_secs(CATEGORY_CACHE_TTL_SECS),
        }
    }

    /// Categories ordered by display_order, optionally filtered by placement
    pub async fn list(&self, filter: CategoryFilter) -> Result<Vec<Category>, CategoryServiceError> {
        let cache_key = format!(
            "{}{:?}:{:?}",
            CACHE_KEY_CATEGORY_LIST, filter.show_in_nav, filter.show_on_homepage
        );
        if let Ok(Some(cached)) = self.cache.get::<Vec<Category>>(&cache_key).await {
            return Ok(cached);
        }

        let categories = self.repo.list(filter).await.context("Failed to list categories")?;
        let _ = self.cache.set(&cache_key, &categories, self.cache_ttl).await;
        Ok(categories)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category by slug")?
            .ok_or_else(|| CategoryServiceError::NotFound(slug.to_string()))
    }

    pub async fn create(&self, input: CategoryInput) -> Result<Category, CategoryServiceError> {
        let (name, slug) = self.validate(&input, None).await?;

        let now = Utc::now();
        let category = Category {
            id: 0,
            name,
            slug,
            description: input.description,
            subtitle: input.subtitle,
            meta_title: input.meta_title,
            meta_description: input.meta_description,
            color: input.color,
            icon: input.icon,
            display_order: input.display_order,
            show_in_nav: input.show_in_nav,
            show_on_homepage: input.show_on_homepage,
            parent_id: input.parent_id,
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&category).await.context("Failed to create category")?;
        self.invalidate_cache().await;
        Ok(created)
    }

    pub async fn update(&self, id: i64, input: CategoryInput) -> Result<Category, CategoryServiceError> {
        let existing = self.find(id).await?;
        let (name, slug) = self.validate(&input, Some(&existing)).await?;

        let category = Category {
            name,
            slug,
            description: input.description,
            subtitle: input.subtitle,
            meta_title: input.meta_title,
            meta_description: input.meta_description,
            color: input.color,
            icon: input.icon,
            display_order: input.display_order,
            show_in_nav: input.show_in_nav,
            show_on_homepage: input.show_on_homepage,
            parent_id: input.parent_id,
            ..existing
        };

        let updated = self.repo.update(&category).await.context("Failed to update category")?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    /// Delete a category. Categories that still hold posts are kept.
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        let category = self.find(id).await?;

        let post_count = self.repo.count_posts(id).await.context("Failed to count category posts")?;
        if post_count > 0 {
            return Err(CategoryServiceError::Conflict(format!(
                "Category '{}' still has {} post(s)",
                category.name, post_count
            )));
        }

        self.repo.delete(id).await.context("Failed to delete category")?;
        self.invalidate_cache().await;
        Ok(())
    }

    async fn find(&self, id: i64) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))
    }

    async fn validate(
        &self,
        input: &CategoryInput,
        existing: Option<&Category>,
    ) -> Result<(String, String), CategoryServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(CategoryServiceError::ValidationError("Name is required".to_string()));
        }

        let slug = match input.slug.as_deref().map(str::trim) {
            Some(given) if !given.is_empty() => generate_slug(given),
            _ => generate_slug(&name),
        };
        if slug.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Slug must contain at least one letter or digit".to_string(),
            ));
        }

        let slug_changed = existing.map_or(true, |c| c.slug != slug);
        if slug_changed && self.repo.exists_by_slug(&slug).await.context("Failed to check slug")? {
            return Err(CategoryServiceError::Conflict(format!("Slug already exists: {}", slug)));
        }

        if let Some(parent_id) = input.parent_id {
            if existing.is_some_and(|c| c.id == parent_id) {
                return Err(CategoryServiceError::ValidationError(
                    "A category cannot be its own parent".to_string(),
                ));
            }
            if self.repo.get_by_id(parent_id).await.context("Failed to get parent")?.is_none() {
                return Err(CategoryServiceError::ValidationError(format!(
                    "Parent category {} does not exist",
                    parent_id
                )));
            }
        }

        Ok((name, slug))
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_ALL_CATEGORIES).await {
            tracing::warn!("Failed to invalidate category cache: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::SqlxCategoryRepository;
    use crate::db::{create_test_pool, migrations, DbPool};

    async fn setup_test_service() -> (DbPool, CategoryService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let service = CategoryService::new(
            SqlxCategoryRepository::boxed(pool.clone()),
            Arc::new(MemoryCache::new()),
        );
        (pool, service)
    }

    #[tokio::test]
    async fn test_create_generates_slug() {
        let (_pool, service) = setup_test_service().await;

        let category = service.create(CategoryInput::new("Process Automation")).await.unwrap();
        assert_eq!(category.slug, "process-automation");
        assert!(category.show_in_nav);
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let (_pool, service) = setup_test_service().await;

        let result = service.create(CategoryInput::new("General")).await;
        assert!(matches!(result, Err(CategoryServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_keeps_own_slug() {
        let (_pool, service) = setup_test_service().await;

        let category = service.create(CategoryInput::new("Guides")).await.unwrap();
        let mut input = CategoryInput::new("Guides");
        input.show_on_homepage = true;
        input.display_order = 3;

        let updated = service.update(category.id, input).await.unwrap();
        assert!(updated.show_on_homepage);
        assert_eq!(updated.display_order, 3);
    }

    #[tokio::test]
    async fn test_list_filter_and_cache_invalidation() {
        let (_pool, service) = setup_test_service().await;

        let homepage = CategoryFilter { show_on_homepage: Some(true), ..Default::default() };
        assert!(service.list(homepage).await.unwrap().is_empty());

        let mut input = CategoryInput::new("Featured");
        input.show_on_homepage = true;
        service.create(input).await.unwrap();

        let listed = service.list(homepage).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].slug, "featured");
    }

    #[tokio::test]
    async fn test_delete_refuses_non_empty_category() {
        let (pool, service) = setup_test_service().await;
        sqlx::query("INSERT INTO authors (name, slug) VALUES ('Marc', 'marc')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO posts (title, slug, content, author_id, category_id) VALUES ('T', 't', 'c', 1, 1)")
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(service.delete(1).await, Err(CategoryServiceError::Conflict(_))));

        let empty = service.create(CategoryInput::new("Empty")).await.unwrap();
        service.delete(empty.id).await.unwrap();
        assert!(matches!(
            service.get_by_slug("empty").await,
            Err(CategoryServiceError::NotFound(_))
        ));
    }
}
