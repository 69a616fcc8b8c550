//! Tag API endpoints
//!
//! - GET /api/v1/tags - All tags
//! - GET /api/v1/tags/cloud - Tags with published post counts
//! - GET /api/v1/tags/{slug}/posts - Published posts with tag
//! - POST /api/v1/admin/tags, DELETE /api/v1/admin/tags/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::common::{LimitQuery, PageResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{CreateTagInput, Post, Tag, TagWithCount};

#[derive(Debug, Serialize)]
pub struct TagPostsResponse {
    pub tag: Tag,
    pub posts: PageResponse<Post>,
}

/// Build the public tags router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags))
        .route("/cloud", get(tag_cloud))
        .route("/{slug}/posts", get(get_tag_posts))
}

/// Build the admin tags router
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_tag))
        .route("/{id}", delete(delete_tag))
}

/// GET /api/v1/tags
async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>, ApiError> {
    Ok(Json(state.tag_service.list().await?))
}

/// GET /api/v1/tags/cloud?limit=
async fn tag_cloud(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<TagWithCount>>, ApiError> {
    let tags = state
        .tag_service
        .cloud(query.clamped(50, 200) as usize)
        .await?;
    Ok(Json(tags))
}

/// GET /api/v1/tags/{slug}/posts
async fn get_tag_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<TagPostsResponse>, ApiError> {
    let (tag, posts) = state.post_service.list_by_tag(&slug, &query.params()).await?;
    Ok(Json(TagPostsResponse {
        tag,
        posts: posts.into(),
    }))
}

/// POST /api/v1/admin/tags
///
/// Returns the existing tag when one with the same name exists.
async fn create_tag(
    State(state): State<AppState>,
    Json(input): Json<CreateTagInput>,
) -> Result<Json<Tag>, ApiError> {
    Ok(Json(state.tag_service.create_or_get(input).await?))
}

/// DELETE /api/v1/admin/tags/{id}
async fn delete_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.tag_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
