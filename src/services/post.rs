//! Post service
//!
//! Implements the blog's content rules:
//! - Public reads only ever see published posts
//! - Slug generation and uniqueness
//! - Word count and read time recomputed on every save
//! - Publication timestamps, including scheduled publishing
//! - Cached read paths invalidated on every write

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{AuthorRepository, CategoryRepository, PostRepository, TagRepository};
use crate::models::{
    Category, ListParams, PagedResult, Post, PostInput, PostStatus, PostWithRelations, PostWrite,
    Tag,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Words read per minute when estimating read time
pub const WORDS_PER_MINUTE: usize = 200;

const POST_CACHE_TTL_SECS: u64 = 3600;
const POST_LIST_CACHE_TTL_SECS: u64 = 300;

const CACHE_KEY_POST_BY_SLUG: &str = "posts:slug:";
const CACHE_KEY_POST_LIST: &str = "posts:list:";
const CACHE_KEY_POST_FEATURED: &str = "posts:featured:";
const CACHE_PATTERN_ALL_POSTS: &str = "posts:*";

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Slug already used by another post
    #[error("Slug already exists: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Post service for public reads and admin writes
pub struct PostService {
    posts: Arc<dyn PostRepository>,
    authors: Arc<dyn AuthorRepository>,
    categories: Arc<dyn CategoryRepository>,
    tags: Arc<dyn TagRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        authors: Arc<dyn AuthorRepository>,
        categories: Arc<dyn CategoryRepository>,
        tags: Arc<dyn TagRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            posts,
            authors,
            categories,
            tags,
            cache,
            cache_ttl: Duration::from_secs(POST_CACHE_TTL_SECS),
        }
    }

    // ------------------------------------------------------------------
    // Public reads
    // ------------------------------------------------------------------

    /// Published posts, newest first
    pub async fn list_published(&self, params: &ListParams) -> Result<PagedResult<Post>, PostServiceError> {
        let cache_key = format!("{}{}:{}", CACHE_KEY_POST_LIST, params.page, params.per_page);
        if let Ok(Some(cached)) = self.cache.get::<PagedResult<Post>>(&cache_key).await {
            return Ok(cached);
        }

        let (items, total) = self
            .posts
            .list_published(params)
            .await
            .context("Failed to list published posts")?;
        let result = PagedResult::new(items, total, params);

        let _ = self
            .cache
            .set(&cache_key, &result, Duration::from_secs(POST_LIST_CACHE_TTL_SECS))
            .await;

        Ok(result)
    }

    /// Featured published posts ordered by featured_order
    pub async fn featured(&self, limit: i64) -> Result<Vec<Post>, PostServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_POST_FEATURED, limit);
        if let Ok(Some(cached)) = self.cache.get::<Vec<Post>>(&cache_key).await {
            return Ok(cached);
        }

        let posts = self.posts.featured(limit).await.context("Failed to list featured posts")?;
        let _ = self
            .cache
            .set(&cache_key, &posts, Duration::from_secs(POST_LIST_CACHE_TTL_SECS))
            .await;

        Ok(posts)
    }

    /// Published post with its author, category, tags and FAQs.
    ///
    /// Every successful read counts as a view.
    pub async fn get_published(&self, slug: &str) -> Result<PostWithRelations, PostServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_POST_BY_SLUG, slug);
        let cached = self.cache.get::<PostWithRelations>(&cache_key).await.ok().flatten();

        let post = match cached {
            Some(post) => post,
            None => {
                let post = self
                    .posts
                    .get_by_slug(slug)
                    .await
                    .context("Failed to get post by slug")?
                    .filter(|p| p.status == PostStatus::Published)
                    .ok_or_else(|| PostServiceError::NotFound(format!("Post '{}'", slug)))?;
                let post = self.with_relations(post).await?;
                let _ = self.cache.set(&cache_key, &post, self.cache_ttl).await;
                post
            }
        };

        self.posts
            .increment_view_count(post.post.id)
            .await
            .context("Failed to increment view count")?;

        Ok(post)
    }

    /// Published posts in a category, looked up by the category's slug
    pub async fn list_by_category(
        &self,
        category_slug: &str,
        params: &ListParams,
    ) -> Result<(Category, PagedResult<Post>), PostServiceError> {
        let category = self
            .categories
            .get_by_slug(category_slug)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| PostServiceError::NotFound(format!("Category '{}'", category_slug)))?;

        let (items, total) = self
            .posts
            .list_published_by_category(category.id, params)
            .await
            .context("Failed to list posts by category")?;

        Ok((category, PagedResult::new(items, total, params)))
    }

    /// Published posts carrying a tag, looked up by the tag's slug
    pub async fn list_by_tag(
        &self,
        tag_slug: &str,
        params: &ListParams,
    ) -> Result<(Tag, PagedResult<Post>), PostServiceError> {
        let tag = self
            .tags
            .get_by_slug(tag_slug)
            .await
            .context("Failed to get tag")?
            .ok_or_else(|| PostServiceError::NotFound(format!("Tag '{}'", tag_slug)))?;

        let (items, total) = self
            .posts
            .list_published_by_tag(tag.id, params)
            .await
            .context("Failed to list posts by tag")?;

        Ok((tag, PagedResult::new(items, total, params)))
    }

    /// Manually linked posts by relevance, topped up from the same category
    pub async fn related(&self, slug: &str, limit: usize) -> Result<Vec<Post>, PostServiceError> {
        let post = self
            .posts
            .get_by_slug(slug)
            .await
            .context("Failed to get post by slug")?
            .filter(|p| p.status == PostStatus::Published)
            .ok_or_else(|| PostServiceError::NotFound(format!("Post '{}'", slug)))?;

        let limit_i64 = limit as i64;
        let mut related = self
            .posts
            .related_manual(post.id, limit_i64)
            .await
            .context("Failed to load related posts")?;

        if related.len() < limit {
            let same_category = self
                .posts
                .same_category(post.category_id, post.id, limit_i64)
                .await
                .context("Failed to load same-category posts")?;

            let mut seen: HashSet<i64> = related.iter().map(|p| p.id).collect();
            seen.insert(post.id);
            for candidate in same_category {
                if related.len() >= limit {
                    break;
                }
                if seen.insert(candidate.id) {
                    related.push(candidate);
                }
            }
        }

        related.truncate(limit);
        Ok(related)
    }

    // ------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------

    /// Any post regardless of status, with relations
    pub async fn get_by_id(&self, id: i64) -> Result<PostWithRelations, PostServiceError> {
        let post = self.find(id).await?;
        self.with_relations(post).await
    }

    /// Admin listing across all statuses, optionally filtered
    pub async fn list_all(
        &self,
        params: &ListParams,
        status: Option<PostStatus>,
    ) -> Result<PagedResult<Post>, PostServiceError> {
        let (items, total) = self
            .posts
            .list(params, status)
            .await
            .context("Failed to list posts")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn create(&self, input: PostInput) -> Result<Post, PostServiceError> {
        let write = self.prepare_write(input, None).await?;
        let post = self.posts.create(&write).await.context("Failed to create post")?;

        tracing::info!(post_id = post.id, slug = %post.slug, status = %post.status, "Post created");
        self.invalidate_cache().await;
        Ok(post)
    }

    pub async fn update(&self, id: i64, input: PostInput) -> Result<Post, PostServiceError> {
        let existing = self.find(id).await?;
        let write = self.prepare_write(input, Some(&existing)).await?;
        let post = self.posts.update(id, &write).await.context("Failed to update post")?;

        tracing::info!(post_id = post.id, slug = %post.slug, status = %post.status, "Post updated");
        self.invalidate_cache().await;
        Ok(post)
    }

    pub async fn delete(&self, id: i64) -> Result<(), PostServiceError> {
        self.find(id).await?;
        self.posts.delete(id).await.context("Failed to delete post")?;

        tracing::info!(post_id = id, "Post deleted");
        self.invalidate_cache().await;
        Ok(())
    }

    /// Publish every scheduled post whose time has come
    pub async fn publish_due(&self, now: DateTime<Utc>) -> Result<u64, PostServiceError> {
        let published = self
            .posts
            .publish_due(now)
            .await
            .context("Failed to publish scheduled posts")?;

        if published > 0 {
            tracing::info!(count = published, "Published scheduled posts");
            self.invalidate_cache().await;
        }
        Ok(published)
    }

    async fn find(&self, id: i64) -> Result<Post, PostServiceError> {
        self.posts
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or_else(|| PostServiceError::NotFound(format!("Post {}", id)))
    }

    async fn with_relations(&self, post: Post) -> Result<PostWithRelations, PostServiceError> {
        let author = self
            .authors
            .get_by_id(post.author_id)
            .await
            .context("Failed to load post author")?;
        let category = self
            .categories
            .get_by_id(post.category_id)
            .await
            .context("Failed to load post category")?;
        let tags = self
            .tags
            .get_by_post_id(post.id)
            .await
            .context("Failed to load post tags")?;
        let faqs = self.posts.get_faqs(post.id).await.context("Failed to load post FAQs")?;

        Ok(PostWithRelations {
            post,
            author,
            category,
            tags,
            faqs,
        })
    }

    /// Validate admin input and derive the stored fields
    async fn prepare_write(
        &self,
        mut input: PostInput,
        existing: Option<&Post>,
    ) -> Result<PostWrite, PostServiceError> {
        input.title = input.title.trim().to_string();
        if input.title.is_empty() {
            return Err(PostServiceError::ValidationError("Title is required".to_string()));
        }
        if input.content.trim().is_empty() {
            return Err(PostServiceError::ValidationError("Content is required".to_string()));
        }
        if input.status == PostStatus::Scheduled && input.scheduled_for.is_none() {
            return Err(PostServiceError::ValidationError(
                "Scheduled posts require scheduled_for".to_string(),
            ));
        }

        let slug = match input.slug.as_deref().map(str::trim) {
            Some(given) if !given.is_empty() => generate_slug(given),
            _ => generate_slug(&input.title),
        };
        if slug.is_empty() {
            return Err(PostServiceError::ValidationError(
                "Slug must contain at least one letter or digit".to_string(),
            ));
        }
        if self
            .posts
            .slug_taken(&slug, existing.map(|p| p.id))
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(PostServiceError::Conflict(slug));
        }

        if self
            .authors
            .get_by_id(input.author_id)
            .await
            .context("Failed to check author")?
            .is_none()
        {
            return Err(PostServiceError::ValidationError(format!(
                "Author {} does not exist",
                input.author_id
            )));
        }
        if self
            .categories
            .get_by_id(input.category_id)
            .await
            .context("Failed to check category")?
            .is_none()
        {
            return Err(PostServiceError::ValidationError(format!(
                "Category {} does not exist",
                input.category_id
            )));
        }

        let mut unique_tags = HashSet::new();
        input.tag_ids.retain(|id| unique_tags.insert(*id));
        for tag_id in &input.tag_ids {
            if self.tags.get_by_id(*tag_id).await.context("Failed to check tag")?.is_none() {
                return Err(PostServiceError::ValidationError(format!("Tag {} does not exist", tag_id)));
            }
        }
        for related in &input.related {
            if self.posts.get_by_id(related.post_id).await.context("Failed to check related post")?.is_none() {
                return Err(PostServiceError::ValidationError(format!(
                    "Related post {} does not exist",
                    related.post_id
                )));
            }
        }

        input.faqs.retain(|faq| faq.is_complete());

        let published_at = match input.status {
            PostStatus::Published => existing
                .and_then(|p| p.published_at)
                .or_else(|| Some(Utc::now())),
            _ => existing.and_then(|p| p.published_at),
        };

        let (word_count, read_time_minutes) = content_stats(&input.content);

        Ok(PostWrite {
            input,
            slug,
            published_at,
            word_count: word_count as i32,
            read_time_minutes: read_time_minutes as i32,
        })
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_ALL_POSTS).await {
            tracing::warn!("Failed to invalidate post cache: {}", e);
        }
    }
}

/// Generate a URL slug from a title.
///
/// Lowercases the input and turns every run of characters outside `[a-z0-9]`
/// into a single hyphen, with no leading or trailing hyphen.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Word count and estimated read time in minutes (at least one)
pub fn content_stats(content: &str) -> (usize, usize) {
    let words = content.split_whitespace().count();
    let minutes = words.div_ceil(WORDS_PER_MINUTE).max(1);
    (words, minutes)
}
