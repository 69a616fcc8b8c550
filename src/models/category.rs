//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Blog category. Categories drive navigation and homepage sections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    /// Unique identifier
    pub id: i64,
    /// Category name
    pub name: String,
    /// URL-friendly slug
    pub slug: String,
    pub description: Option<String>,
    pub subtitle: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    /// Accent colour used by the frontend
    pub color: Option<String>,
    pub icon: Option<String>,
    /// Position in listings (ascending)
    pub display_order: i32,
    pub show_in_nav: bool,
    pub show_on_homepage: bool,
    /// Parent category ID
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or updating a category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    /// Generated from the name when empty
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default = "default_true")]
    pub show_in_nav: bool,
    #[serde(default)]
    pub show_on_homepage: bool,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

fn default_true() -> bool {
    true
}

impl CategoryInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            show_in_nav: true,
            ..Self::default()
        }
    }
}

/// Listing filter for categories
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CategoryFilter {
    pub show_in_nav: Option<bool>,
    pub show_on_homepage: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_input_defaults_from_json() {
        let input: CategoryInput = serde_json::from_str(r#"{"name":"Automation"}"#).unwrap();

        assert_eq!(input.name, "Automation");
        assert!(input.show_in_nav);
        assert!(!input.show_on_homepage);
        assert_eq!(input.display_order, 0);
        assert!(input.slug.is_none());
    }
}
