//! Author API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{Author, CreateAuthorInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_authors))
        .route("/{slug}", get(get_author))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/", post(create_author))
}

/// GET /api/v1/authors
async fn list_authors(State(state): State<AppState>) -> Result<Json<Vec<Author>>, ApiError> {
    Ok(Json(state.author_service.list_active().await?))
}

/// GET /api/v1/authors/{slug}
async fn get_author(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Author>, ApiError> {
    Ok(Json(state.author_service.get_by_slug(&slug).await?))
}

/// POST /api/v1/admin/authors
async fn create_author(
    State(state): State<AppState>,
    Json(input): Json<CreateAuthorInput>,
) -> Result<(StatusCode, Json<Author>), ApiError> {
    let author = state.author_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(author)))
}
