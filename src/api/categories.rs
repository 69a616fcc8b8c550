//! Category API endpoints
//!
//! - GET /api/v1/categories - Categories by display order
//! - GET /api/v1/categories/{slug} - Single category
//! - GET /api/v1/categories/{slug}/posts - Published posts in category
//! - POST /api/v1/admin/categories, PUT/DELETE /api/v1/admin/categories/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Serialize;

use crate::api::common::{PageResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{Category, CategoryFilter, CategoryInput, Post};

/// Category page: the category and a page of its posts
#[derive(Debug, Serialize)]
pub struct CategoryPostsResponse {
    pub category: Category,
    pub posts: PageResponse<Post>,
}

/// Build the public categories router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories))
        .route("/{slug}", get(get_category))
        .route("/{slug}/posts", get(get_category_posts))
}

/// Build the admin categories router
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_category))
        .route("/{id}", put(update_category).delete(delete_category))
}

/// GET /api/v1/categories?show_in_nav=&show_on_homepage=
async fn list_categories(
    State(state): State<AppState>,
    Query(filter): Query<CategoryFilter>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.category_service.list(filter).await?))
}

/// GET /api/v1/categories/{slug}
async fn get_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.get_by_slug(&slug).await?))
}

/// GET /api/v1/categories/{slug}/posts
async fn get_category_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<CategoryPostsResponse>, ApiError> {
    let (category, posts) = state
        .post_service
        .list_by_category(&slug, &query.params())
        .await?;

    Ok(Json(CategoryPostsResponse {
        category,
        posts: posts.into(),
    }))
}

/// POST /api/v1/admin/categories
async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/v1/admin/categories/{id}
async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<CategoryInput>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.update(id, input).await?))
}

/// DELETE /api/v1/admin/categories/{id}
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
