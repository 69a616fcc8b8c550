//! Author service

use crate::db::repositories::AuthorRepository;
use crate::models::{Author, CreateAuthorInput};
use crate::services::post::generate_slug;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AuthorServiceError {
    #[error("Author not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Author slug already exists: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct AuthorService {
    repo: Arc<dyn AuthorRepository>,
}

impl AuthorService {
    pub fn new(repo: Arc<dyn AuthorRepository>) -> Self {
        Self { repo }
    }

    pub async fn list_active(&self) -> Result<Vec<Author>, AuthorServiceError> {
        Ok(self.repo.list_active().await.context("Failed to list authors")?)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Author, AuthorServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get author")?
            .filter(|a| a.is_active)
            .ok_or_else(|| AuthorServiceError::NotFound(slug.to_string()))
    }

    pub async fn create(&self, input: CreateAuthorInput) -> Result<Author, AuthorServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AuthorServiceError::ValidationError("Name is required".to_string()));
        }

        let slug = match input.slug.as_deref().map(str::trim) {
            Some(given) if !given.is_empty() => generate_slug(given),
            _ => generate_slug(&name),
        };
        if slug.is_empty() {
            return Err(AuthorServiceError::ValidationError(
                "Slug must contain at least one letter or digit".to_string(),
            ));
        }
        if self.repo.get_by_slug(&slug).await.context("Failed to check slug")?.is_some() {
            return Err(AuthorServiceError::Conflict(slug));
        }

        let now = Utc::now();
        let author = Author {
            id: 0,
            name,
            slug,
            bio: input.bio,
            avatar_url: input.avatar_url,
            social_links: input.social_links,
            expertise: input.expertise,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        Ok(self.repo.create(&author).await.context("Failed to create author")?)
    }
}
