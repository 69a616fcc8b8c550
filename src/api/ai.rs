//! AI content assist endpoints (admin)
//!
//! - POST /api/v1/admin/ai/generate - Draft SEO, summary, FAQs and entities
//! - POST /api/v1/admin/ai/image - Social image for a post

use axum::{extract::State, routing::post, Json, Router};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{GenerateContentRequest, GenerateImageRequest, GeneratedContent, GeneratedImage};

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate_content))
        .route("/image", post(generate_image))
}

/// POST /api/v1/admin/ai/generate
async fn generate_content(
    State(state): State<AppState>,
    Json(request): Json<GenerateContentRequest>,
) -> Result<Json<GeneratedContent>, ApiError> {
    Ok(Json(state.ai_service.generate(request).await?))
}

/// POST /api/v1/admin/ai/image
async fn generate_image(
    State(state): State<AppState>,
    Json(request): Json<GenerateImageRequest>,
) -> Result<Json<GeneratedImage>, ApiError> {
    Ok(Json(state.ai_service.generate_image(request).await?))
}
