//! Booking proxy endpoints
//!
//! - GET /api/v1/booking/available-times?event_type_uri=&start_time=&end_time=
//! - POST /api/v1/booking/book

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use crate::api::middleware::{ApiError, AppState};
use crate::models::{BookingRequest, BookingResponse};
use crate::services::{AvailableTimesQuery, AvailableTimesResponse};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/available-times", get(available_times))
        .route("/book", post(book))
}

/// GET /api/v1/booking/available-times
async fn available_times(
    State(state): State<AppState>,
    Query(query): Query<AvailableTimesQuery>,
) -> Result<Json<AvailableTimesResponse>, ApiError> {
    let times = state
        .booking_service
        .available_times(&query, Utc::now())
        .await?;
    Ok(Json(times))
}

/// POST /api/v1/booking/book
async fn book(
    State(state): State<AppState>,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), ApiError> {
    let response = state.booking_service.book(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
