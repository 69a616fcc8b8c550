//! Enquiry endpoints
//!
//! Public:
//! - POST /api/v1/enquiries - Submit a survey or contact form
//!
//! Admin:
//! - GET /api/v1/admin/enquiries?surveyId=&postId=&status=&dateFrom=&dateTo=
//! - GET /api/v1/admin/enquiries/surveys
//! - GET /api/v1/admin/enquiries/export - Same filters, as CSV
//! - PUT /api/v1/admin/enquiries/{id}/status

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::{CreateEnquiryInput, Enquiry, EnquiryStatus, Survey};
use crate::services::EnquiryQuery;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(submit_enquiry))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_enquiries))
        .route("/surveys", get(list_surveys))
        .route("/export", get(export_enquiries))
        .route("/{id}/status", put(update_status))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: EnquiryStatus,
}

/// POST /api/v1/enquiries
async fn submit_enquiry(
    State(state): State<AppState>,
    Json(input): Json<CreateEnquiryInput>,
) -> Result<(StatusCode, Json<Enquiry>), ApiError> {
    let enquiry = state.enquiry_service.submit(input).await?;
    Ok((StatusCode::CREATED, Json(enquiry)))
}

/// GET /api/v1/admin/enquiries
async fn list_enquiries(
    State(state): State<AppState>,
    Query(query): Query<EnquiryQuery>,
) -> Result<Json<Vec<Enquiry>>, ApiError> {
    Ok(Json(state.enquiry_service.list(&query).await?))
}

/// GET /api/v1/admin/enquiries/surveys
async fn list_surveys(State(state): State<AppState>) -> Result<Json<Vec<Survey>>, ApiError> {
    Ok(Json(state.enquiry_service.list_surveys().await?))
}

/// PUT /api/v1/admin/enquiries/{id}/status
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Enquiry>, ApiError> {
    Ok(Json(state.enquiry_service.update_status(id, request.status).await?))
}

/// GET /api/v1/admin/enquiries/export
async fn export_enquiries(
    State(state): State<AppState>,
    Query(query): Query<EnquiryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (filename, body) = state
        .enquiry_service
        .export_csv(&query, Utc::now().date_naive())
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    ))
}
