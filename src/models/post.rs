//! Post model
//!
//! This module provides:
//! - `Post` entity with its SEO and AI-optimisation fields
//! - `PostStatus` publication states
//! - `PostInput` used by the admin create and update operations
//! - Pagination types for list queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Author, Category, Tag};

/// Blog post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub subtitle: Option<String>,
    pub excerpt: Option<String>,
    /// Markdown body
    pub content: String,
    pub featured_image: Option<String>,
    pub featured_image_alt: Option<String>,
    pub og_image: Option<String>,
    pub author_id: i64,
    pub category_id: i64,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
    /// When a scheduled post goes live
    pub scheduled_for: Option<DateTime<Utc>>,
    pub is_featured: bool,
    /// Position among featured posts (ascending)
    pub featured_order: Option<i32>,

    // SEO
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_url: Option<String>,
    pub primary_keyword: Option<String>,
    pub secondary_keywords: Vec<String>,

    // AI optimisation
    pub ai_summary: Option<String>,
    pub key_takeaways: Vec<String>,
    pub definitive_statements: Vec<String>,
    pub questions_answered: Vec<String>,
    pub entities: Vec<Entity>,
    pub sources: Vec<Source>,

    pub read_time_minutes: i32,
    pub word_count: i32,
    pub view_count: i64,

    // Booking call-to-action
    pub calendly_enabled: bool,
    pub calendly_event_type_uri: Option<String>,
    pub calendly_scheduling_url: Option<String>,
    pub calendly_cta_title: Option<String>,
    pub calendly_cta_description: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Named entity mentioned in a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Cited source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
}

/// Post publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// Not visible to the public
    #[default]
    Draft,
    /// Published automatically at `scheduled_for`
    Scheduled,
    Published,
    /// Hidden but kept
    Archived,
}

impl PostStatus {
    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }

    /// Parse status from database string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(PostStatus::Draft),
            "scheduled" => Some(PostStatus::Scheduled),
            "published" => Some(PostStatus::Published),
            "archived" => Some(PostStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Frequently asked question attached to a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faq {
    pub id: i64,
    pub post_id: i64,
    pub question: String,
    pub answer: String,
    pub display_order: i32,
}

/// FAQ as submitted by the admin form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaqInput {
    pub question: String,
    pub answer: String,
}

impl FaqInput {
    /// Both parts carry text
    pub fn is_complete(&self) -> bool {
        !self.question.trim().is_empty() && !self.answer.trim().is_empty()
    }
}

/// Manually curated related post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedPostInput {
    pub post_id: i64,
    #[serde(default)]
    pub relevance_score: f64,
}

/// Post with the records it references, as served on the article page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithRelations {
    #[serde(flatten)]
    pub post: Post,
    pub author: Option<Author>,
    pub category: Option<Category>,
    pub tags: Vec<Tag>,
    pub faqs: Vec<Faq>,
}

/// Input for creating or replacing a post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostInput {
    pub title: String,
    /// Generated from the title when empty
    pub slug: Option<String>,
    pub subtitle: Option<String>,
    pub excerpt: Option<String>,
    pub content: String,
    pub featured_image: Option<String>,
    pub featured_image_alt: Option<String>,
    pub og_image: Option<String>,
    pub author_id: i64,
    pub category_id: i64,
    pub status: PostStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub is_featured: bool,
    pub featured_order: Option<i32>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_url: Option<String>,
    pub primary_keyword: Option<String>,
    pub secondary_keywords: Vec<String>,
    pub ai_summary: Option<String>,
    pub key_takeaways: Vec<String>,
    pub definitive_statements: Vec<String>,
    pub questions_answered: Vec<String>,
    pub entities: Vec<Entity>,
    pub sources: Vec<Source>,
    pub calendly_enabled: bool,
    pub calendly_event_type_uri: Option<String>,
    pub calendly_scheduling_url: Option<String>,
    pub calendly_cta_title: Option<String>,
    pub calendly_cta_description: Option<String>,
    /// Replaces the post's tag set
    pub tag_ids: Vec<i64>,
    /// Replaces the post's FAQs
    pub faqs: Vec<FaqInput>,
    /// Replaces the post's manual related posts
    pub related: Vec<RelatedPostInput>,
}

impl PostInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>, author_id: i64, category_id: i64) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            author_id,
            category_id,
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }
}

/// Values computed by the service before a post is written
#[derive(Debug, Clone)]
pub struct PostWrite {
    pub input: PostInput,
    pub slug: String,
    pub published_at: Option<DateTime<Utc>>,
    pub word_count: i32,
    pub read_time_minutes: i32,
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl ListParams {
    /// Create pagination parameters, clamping out-of-range values
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    /// Limit for database queries
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    /// Total number of pages
    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        let per_page = self.per_page as i64;
        ((self.total + per_page - 1) / per_page) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}
