//! Tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag attached to posts for cross-category discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    /// Unique identifier
    pub id: i64,
    /// Tag name
    pub name: String,
    /// URL-friendly slug
    pub slug: String,
    /// Optional description shown on the tag page
    pub description: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Create a new Tag. The ID is assigned by the database.
    pub fn new(name: String, slug: String) -> Self {
        Self {
            id: 0,
            name,
            slug,
            description: None,
            created_at: Utc::now(),
        }
    }
}

/// Tag with the number of published posts carrying it (tag cloud)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: Tag,
    pub post_count: i64,
}

impl TagWithCount {
    pub fn new(tag: Tag, post_count: i64) -> Self {
        Self { tag, post_count }
    }
}

/// Input for creating a tag
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTagInput {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_new() {
        let tag = Tag::new("Rust Programming".to_string(), "rust-programming".to_string());

        assert_eq!(tag.id, 0);
        assert_eq!(tag.slug, "rust-programming");
        assert!(tag.description.is_none());
    }

    #[test]
    fn test_tag_with_count_serializes_flat() {
        let tag = Tag::new("Rust".to_string(), "rust".to_string());
        let json = serde_json::to_value(TagWithCount::new(tag, 3)).unwrap();

        assert_eq!(json["slug"], "rust");
        assert_eq!(json["post_count"], 3);
    }
}
