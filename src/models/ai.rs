//! Content assistant model
//!
//! Drafts produced by the generative API for the post editor. Every field
//! defaults to empty so partial model output still parses.

use serde::{Deserialize, Deserializer, Serialize};

use super::{Entity, FaqInput};

/// Tag the model may suggest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableTag {
    pub id: i64,
    pub name: String,
}

/// Request to draft SEO and summary fields for a post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub title: String,
    pub content: String,
    #[serde(default, alias = "availableTags")]
    pub available_tags: Vec<AvailableTag>,
    #[serde(default, alias = "generateImage")]
    pub generate_image: bool,
}

/// Request for a standalone social image
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateImageRequest {
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeoDraft {
    pub meta_title: String,
    pub meta_description: String,
    pub primary_keyword: String,
    pub secondary_keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentDraft {
    pub subtitle: String,
    pub excerpt: String,
    pub suggested_titles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiOptimizationDraft {
    pub ai_summary: String,
    pub key_takeaways: Vec<String>,
    pub questions_answered: Vec<String>,
    pub definitive_statements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorizationDraft {
    #[serde(deserialize_with = "lenient_ids")]
    pub suggested_tag_ids: Vec<i64>,
}

/// Generated social image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
    pub prompt: String,
}

/// Full draft returned to the editor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedContent {
    pub seo: SeoDraft,
    pub content: ContentDraft,
    pub ai_optimization: AiOptimizationDraft,
    pub categorization: CategorizationDraft,
    pub faqs: Vec<FaqInput>,
    #[serde(deserialize_with = "lenient_entities")]
    pub entities: Vec<Entity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_image: Option<GeneratedImage>,
}

/// Accepts tag ids as numbers or numeric strings, dropping anything else.
fn lenient_ids<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .collect())
}

/// Keeps entities that carry a name, defaulting a missing type.
fn lenient_entities<'de, D>(deserializer: D) -> Result<Vec<Entity>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .filter_map(|v| {
            let name = v.get("name")?.as_str()?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let entity_type = v
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("Thing")
                .to_string();
            let url = v.get("url").and_then(|u| u.as_str()).map(str::to_string);
            Some(Entity {
                name,
                entity_type,
                url,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_output_parses() {
        let content: GeneratedContent =
            serde_json::from_str(r#"{"seo":{"meta_title":"Hello"}}"#).unwrap();
        assert_eq!(content.seo.meta_title, "Hello");
        assert!(content.faqs.is_empty());
        assert!(content.og_image.is_none());
    }

    #[test]
    fn test_tag_ids_accept_strings_and_numbers() {
        let content: GeneratedContent = serde_json::from_str(
            r#"{"categorization":{"suggested_tag_ids":["3", 5, "x", null]}}"#,
        )
        .unwrap();
        assert_eq!(content.categorization.suggested_tag_ids, vec![3, 5]);
    }

    #[test]
    fn test_entities_without_name_dropped() {
        let content: GeneratedContent = serde_json::from_str(
            r#"{"entities":[{"name":"Rust","type":"Language"},{"type":"Orphan"},{"name":"Axum"}]}"#,
        )
        .unwrap();
        assert_eq!(content.entities.len(), 2);
        assert_eq!(content.entities[1].entity_type, "Thing");
    }

    #[test]
    fn test_request_accepts_camel_case_aliases() {
        let request: GenerateContentRequest = serde_json::from_str(
            r#"{"title":"T","content":"C","availableTags":[{"id":1,"name":"Rust"}],"generateImage":true}"#,
        )
        .unwrap();
        assert_eq!(request.available_tags.len(), 1);
        assert!(request.generate_image);
    }
}
