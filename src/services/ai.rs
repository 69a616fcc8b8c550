//! AI content assist
//!
//! Drafts SEO fields, summaries, FAQs and entities for a post through an
//! OpenAI-compatible API. Model output is parsed leniently and then cleaned
//! up so the editor only ever receives values it can save as-is.

use crate::config::AiConfig;
use crate::models::{AvailableTag, GenerateContentRequest, GenerateImageRequest, GeneratedContent, GeneratedImage};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub const META_TITLE_MAX: usize = 60;
pub const META_DESCRIPTION_MAX: usize = 160;

/// Characters of post content sent to the model
const CONTENT_EXCERPT_CHARS: usize = 12_000;

const SYSTEM_PROMPT: &str = "You are an SEO and content strategist for a software consultancy blog. \
Respond with a single JSON object with the keys: \
seo {meta_title, meta_description, primary_keyword, secondary_keywords[]}, \
content {subtitle, excerpt, suggested_titles[]}, \
ai_optimization {ai_summary, key_takeaways[], questions_answered[], definitive_statements[]}, \
categorization {suggested_tag_ids[]}, faqs [{question, answer}], entities [{name, type}]. \
meta_title must be at most 60 characters and meta_description at most 160. \
Only suggest tag ids from the list you are given.";

#[derive(Debug, thiserror::Error)]
pub enum AiAssistError {
    /// No API key configured
    #[error("AI assistant is not configured")]
    Unavailable,

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The generative API failed or returned something unusable
    #[error("AI provider error: {0}")]
    Upstream(String),
}

/// Generative API behind the assistant
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Chat completion in JSON mode; returns the raw message content
    async fn complete_json(&self, system: &str, user: &str) -> Result<String, AiAssistError>;

    /// Generate an image and return its URL
    async fn generate_image(&self, prompt: &str) -> Result<String, AiAssistError>;
}

/// OpenAI-compatible HTTP client
pub struct OpenAiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    image_model: String,
}

impl OpenAiClient {
    pub fn new(config: &AiConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            image_model: config.image_model.clone(),
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, AiAssistError> {
        let response = self
            .client
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiAssistError::Upstream(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AiAssistError::Upstream(format!("{} - {}", status, text)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AiAssistError::Upstream(format!("Invalid response body: {}", e)))
    }
}

#[async_trait]
impl GenerativeClient for OpenAiClient {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String, AiAssistError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.7,
        });

        let response = self.post("/chat/completions", body).await?;
        response["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AiAssistError::Upstream("Completion had no content".to_string()))
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, AiAssistError> {
        let body = json!({
            "model": self.image_model,
            "prompt": prompt,
            "n": 1,
            "size": "1792x1024",
        });

        let response = self.post("/images/generations", body).await?;
        response["data"][0]["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AiAssistError::Upstream("Image response had no url".to_string()))
    }
}

pub struct AiAssistService {
    client: Option<Arc<dyn GenerativeClient>>,
}

impl AiAssistService {
    pub fn new(client: Option<Arc<dyn GenerativeClient>>) -> Self {
        Self { client }
    }

    /// OpenAI client when a key is configured, otherwise an unavailable assistant
    pub fn from_config(config: &AiConfig) -> anyhow::Result<Self> {
        let client: Option<Arc<dyn GenerativeClient>> = match &config.api_key {
            Some(key) if !key.is_empty() => Some(Arc::new(OpenAiClient::new(config, key.clone())?)),
            _ => None,
        };
        Ok(Self::new(client))
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    pub async fn generate(&self, request: GenerateContentRequest) -> Result<GeneratedContent, AiAssistError> {
        if request.title.trim().is_empty() || request.content.trim().is_empty() {
            return Err(AiAssistError::ValidationError("Title and content are required".to_string()));
        }
        let client = self.client.as_ref().ok_or(AiAssistError::Unavailable)?;

        let raw = client
            .complete_json(SYSTEM_PROMPT, &build_user_prompt(&request))
            .await?;
        let mut generated = parse_generated(&raw)?;
        sanitize(&mut generated, &request.available_tags);

        if request.generate_image {
            let prompt = image_prompt(&request.title, &generated.content.excerpt);
            match client.generate_image(&prompt).await {
                Ok(url) => generated.og_image = Some(GeneratedImage { url, prompt }),
                Err(e) => tracing::warn!("Image generation failed, continuing without og_image: {}", e),
            }
        }

        tracing::info!(
            faqs = generated.faqs.len(),
            tags = generated.categorization.suggested_tag_ids.len(),
            with_image = generated.og_image.is_some(),
            "Generated post content"
        );
        Ok(generated)
    }

    pub async fn generate_image(&self, request: GenerateImageRequest) -> Result<GeneratedImage, AiAssistError> {
        if request.title.trim().is_empty() {
            return Err(AiAssistError::ValidationError("Title is required".to_string()));
        }
        let client = self.client.as_ref().ok_or(AiAssistError::Unavailable)?;

        let prompt = image_prompt(&request.title, &request.excerpt);
        let url = client.generate_image(&prompt).await?;
        Ok(GeneratedImage { url, prompt })
    }
}

fn build_user_prompt(request: &GenerateContentRequest) -> String {
    let tags = if request.available_tags.is_empty() {
        "(none)".to_string()
    } else {
        request
            .available_tags
            .iter()
            .map(|t| format!("{}: {}", t.id, t.name))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let content: String = request.content.chars().take(CONTENT_EXCERPT_CHARS).collect();

    format!(
        "Title: {}\n\nAvailable tags (id: name):\n{}\n\nContent:\n{}",
        request.title.trim(),
        tags,
        content
    )
}

fn image_prompt(title: &str, excerpt: &str) -> String {
    let mut prompt = format!(
        "A clean, modern editorial illustration for a blog post titled \"{}\".",
        title.trim()
    );
    if !excerpt.trim().is_empty() {
        prompt.push_str(&format!(" The post is about: {}.", excerpt.trim()));
    }
    prompt.push_str(" No text, no logos, professional colour palette.");
    prompt
}

/// Outermost JSON object in model output, with any code fences removed
pub fn extract_json(raw: &str) -> Option<&str> {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
        text = text.trim_end().trim_end_matches("```");
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

pub fn parse_generated(raw: &str) -> Result<GeneratedContent, AiAssistError> {
    let json = extract_json(raw)
        .ok_or_else(|| AiAssistError::Upstream("Model output contained no JSON object".to_string()))?;
    serde_json::from_str(json)
        .map_err(|e| AiAssistError::Upstream(format!("Model output was not valid JSON: {}", e)))
}

/// Bring model output within the editor's limits
pub fn sanitize(generated: &mut GeneratedContent, available_tags: &[AvailableTag]) {
    let allowed: HashSet<i64> = available_tags.iter().map(|t| t.id).collect();
    let mut seen_tags = HashSet::new();
    generated
        .categorization
        .suggested_tag_ids
        .retain(|id| allowed.contains(id) && seen_tags.insert(*id));

    generated.seo.meta_title = truncate_chars(generated.seo.meta_title.trim(), META_TITLE_MAX);
    generated.seo.meta_description =
        truncate_chars(generated.seo.meta_description.trim(), META_DESCRIPTION_MAX);
    generated.seo.primary_keyword = generated.seo.primary_keyword.trim().to_string();

    dedupe_case_insensitive(&mut generated.seo.secondary_keywords);
    dedupe_case_insensitive(&mut generated.content.suggested_titles);
    dedupe_case_insensitive(&mut generated.ai_optimization.key_takeaways);
    dedupe_case_insensitive(&mut generated.ai_optimization.questions_answered);
    dedupe_case_insensitive(&mut generated.ai_optimization.definitive_statements);

    generated.faqs.retain(|faq| faq.is_complete());
    for faq in &mut generated.faqs {
        faq.question = faq.question.trim().to_string();
        faq.answer = faq.answer.trim().to_string();
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    value.chars().take(max).collect::<String>().trim_end().to_string()
}

/// Trim entries and drop blanks and case-insensitive repeats, keeping order
fn dedupe_case_insensitive(values: &mut Vec<String>) {
    let mut seen = HashSet::new();
    let cleaned: Vec<String> = values
        .drain(..)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && seen.insert(v.to_lowercase()))
        .collect();
    *values = cleaned;
}
