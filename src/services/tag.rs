//! Tag service
//!
//! Tags are created on demand by name: creating a tag whose name already
//! exists (case-insensitively) returns the existing tag.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::TagRepository;
use crate::models::{CreateTagInput, Tag, TagWithCount};
use crate::services::post::generate_slug;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

const TAG_CLOUD_CACHE_TTL_SECS: u64 = 600;
const CACHE_KEY_TAG_CLOUD: &str = "tags:cloud:";
const CACHE_PATTERN_ALL_TAGS: &str = "tags:*";

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Slug used by a tag with a different name
    #[error("Tag slug already exists: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
    cache: Arc<Cache>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    pub async fn list(&self) -> Result<Vec<Tag>, TagServiceError> {
        Ok(self.repo.list().await.context("Failed to list tags")?)
    }

    /// Tags with their published post counts, most used first
    pub async fn cloud(&self, limit: usize) -> Result<Vec<TagWithCount>, TagServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_TAG_CLOUD, limit);
        if let Ok(Some(cached)) = self.cache.get::<Vec<TagWithCount>>(&cache_key).await {
            return Ok(cached);
        }

        let cloud = self.repo.cloud(limit).await.context("Failed to build tag cloud")?;
        let _ = self
            .cache
            .set(&cache_key, &cloud, Duration::from_secs(TAG_CLOUD_CACHE_TTL_SECS))
            .await;
        Ok(cloud)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Tag, TagServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get tag")?
            .ok_or_else(|| TagServiceError::NotFound(slug.to_string()))
    }

    /// Create a tag, or return the existing tag with the same name
    pub async fn create_or_get(&self, input: CreateTagInput) -> Result<Tag, TagServiceError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(TagServiceError::ValidationError("Tag name is required".to_string()));
        }

        if let Some(existing) = self.repo.get_by_name(name).await.context("Failed to look up tag")? {
            return Ok(existing);
        }

        let slug = match input.slug.as_deref().map(str::trim) {
            Some(given) if !given.is_empty() => generate_slug(given),
            _ => generate_slug(name),
        };
        if slug.is_empty() {
            return Err(TagServiceError::ValidationError(
                "Slug must contain at least one letter or digit".to_string(),
            ));
        }
        if self.repo.get_by_slug(&slug).await.context("Failed to check slug")?.is_some() {
            return Err(TagServiceError::Conflict(slug));
        }

        let mut tag = Tag::new(name.to_string(), slug);
        tag.description = input.description;

        let created = self.repo.create(&tag).await.context("Failed to create tag")?;
        self.invalidate_cache().await;
        Ok(created)
    }

    pub async fn delete(&self, id: i64) -> Result<(), TagServiceError> {
        if self.repo.get_by_id(id).await.context("Failed to get tag")?.is_none() {
            return Err(TagServiceError::NotFound(id.to_string()));
        }
        self.repo.delete(id).await.context("Failed to delete tag")?;
        self.invalidate_cache().await;
        Ok(())
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_ALL_TAGS).await {
            tracing::warn!("Failed to invalidate tag cache: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::SqlxTagRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_service() -> TagService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        TagService::new(SqlxTagRepository::boxed(pool), Arc::new(MemoryCache::new()))
    }

    fn named(name: &str) -> CreateTagInput {
        CreateTagInput {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_or_get_creates_new_tag() {
        let service = setup_test_service().await;

        let tag = service.create_or_get(named("Rust Programming")).await.unwrap();
        assert!(tag.id > 0);
        assert_eq!(tag.slug, "rust-programming");
    }

    #[tokio::test]
    async fn test_create_or_get_reuses_same_name() {
        let service = setup_test_service().await;

        let first = service.create_or_get(named("Automation")).await.unwrap();
        let second = service.create_or_get(named("automation")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let service = setup_test_service().await;
        assert!(matches!(
            service.create_or_get(named("   ")).await,
            Err(TagServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let service = setup_test_service().await;

        let tag = service.create_or_get(named("Temporary")).await.unwrap();
        service.delete(tag.id).await.unwrap();
        assert!(matches!(service.delete(tag.id).await, Err(TagServiceError::NotFound(_))));
        assert!(service.cloud(10).await.unwrap().is_empty());
    }
}
