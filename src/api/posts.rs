//! Post API endpoints
//!
//! Public (published posts only):
//! - GET /api/v1/posts - Paginated published posts
//! - GET /api/v1/posts/featured - Featured posts
//! - GET /api/v1/posts/{slug} - Post with author, category, tags and FAQs
//! - GET /api/v1/posts/{slug}/related - Related posts
//!
//! Admin:
//! - GET /api/v1/admin/posts - All posts, optionally filtered by status
//! - POST /api/v1/admin/posts - Create post
//! - GET/PUT/DELETE /api/v1/admin/posts/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_admin_per_page, default_page, LimitQuery, PageResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{ListParams, Post, PostInput, PostStatus, PostWithRelations};

/// Build the public posts router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts))
        .route("/featured", get(featured_posts))
        .route("/{slug}", get(get_post))
        .route("/{slug}/related", get(related_posts))
}

/// Build the admin posts router
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(admin_list_posts).post(create_post))
        .route("/{id}", get(admin_get_post).put(update_post).delete(delete_post))
}

/// GET /api/v1/posts
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<Post>>, ApiError> {
    let result = state.post_service.list_published(&query.params()).await?;
    Ok(Json(result.into()))
}

/// GET /api/v1/posts/featured
async fn featured_posts(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let posts = state
        .post_service
        .featured(query.clamped(3, 20) as i64)
        .await?;
    Ok(Json(posts))
}

/// GET /api/v1/posts/{slug}
async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PostWithRelations>, ApiError> {
    Ok(Json(state.post_service.get_published(&slug).await?))
}

/// GET /api/v1/posts/{slug}/related
async fn related_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let posts = state
        .post_service
        .related(&slug, query.clamped(3, 12) as usize)
        .await?;
    Ok(Json(posts))
}

/// Admin listing query
#[derive(Debug, Deserialize)]
pub struct AdminPostsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_admin_per_page", alias = "perPage")]
    pub per_page: u32,
    #[serde(default)]
    pub status: Option<String>,
}

/// GET /api/v1/admin/posts
async fn admin_list_posts(
    State(state): State<AppState>,
    Query(query): Query<AdminPostsQuery>,
) -> Result<Json<PageResponse<Post>>, ApiError> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty() && *s != "all") {
        Some(s) => Some(
            PostStatus::from_str(s)
                .ok_or_else(|| ApiError::validation_error(format!("Unknown status: {}", s)))?,
        ),
        None => None,
    };

    let params = ListParams::new(query.page, query.per_page);
    let result = state.post_service.list_all(&params, status).await?;
    Ok(Json(result.into()))
}

/// POST /api/v1/admin/posts
async fn create_post(
    State(state): State<AppState>,
    Json(input): Json<PostInput>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let post = state.post_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /api/v1/admin/posts/{id}
async fn admin_get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostWithRelations>, ApiError> {
    Ok(Json(state.post_service.get_by_id(id).await?))
}

/// PUT /api/v1/admin/posts/{id}
async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<PostInput>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.post_service.update(id, input).await?))
}

/// DELETE /api/v1/admin/posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.post_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
