//! API middleware
//!
//! Contains:
//! - Shared application state and the JSON error type
//! - Admin bearer token check
//! - Request statistics
//! - 410 Gone handling for retired URLs

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::db::DbPool;
use crate::realtime::{ChatAlert, TypingTracker};
use crate::services::{
    AiAssistError, AiAssistService, AuthorService, AuthorServiceError, BookingError,
    BookingService, CategoryService, CategoryServiceError, ChatService, ChatServiceError,
    EnquiryService, EnquiryServiceError, GoneMatcher, PostService, PostServiceError, RateLimiter,
    TagService, TagServiceError, GONE_HTML,
};

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    /// Total number of requests processed
    total_requests: AtomicU64,
    /// Total response time in microseconds (for calculating average)
    total_response_time_us: AtomicU64,
    /// Application start time
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a request with its response time
    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Average response time in microseconds
    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub post_service: Arc<PostService>,
    pub category_service: Arc<CategoryService>,
    pub tag_service: Arc<TagService>,
    pub author_service: Arc<AuthorService>,
    pub chat_service: Arc<ChatService>,
    pub chat_alert: Arc<ChatAlert>,
    pub typing: Arc<TypingTracker>,
    pub visitor_limiter: Arc<RateLimiter>,
    pub ai_service: Arc<AiAssistService>,
    pub booking_service: Arc<BookingService>,
    pub enquiry_service: Arc<EnquiryService>,
    pub gone: Arc<GoneMatcher>,
    /// SHA-256 of the admin token. Admin routes are closed when unset.
    pub admin_token_digest: Option<[u8; 32]>,
    /// Whether `X-Forwarded-For` names the client
    pub trust_proxy: bool,
    pub request_stats: Arc<RequestStats>,
}

/// SHA-256 digest of an admin token
pub fn token_digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new("RATE_LIMIT", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("SERVICE_UNAVAILABLE", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new("BAD_GATEWAY", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and hide it from the client
    fn internal(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", error);
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            "SERVICE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            "BAD_GATEWAY" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<PostServiceError> for ApiError {
    fn from(e: PostServiceError) -> Self {
        match e {
            PostServiceError::NotFound(what) => Self::not_found(format!("Not found: {}", what)),
            PostServiceError::ValidationError(msg) => Self::validation_error(msg),
            PostServiceError::Conflict(msg) => Self::conflict(msg),
            PostServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::NotFound(slug) => {
                Self::not_found(format!("Category not found: {}", slug))
            }
            CategoryServiceError::ValidationError(msg) => Self::validation_error(msg),
            CategoryServiceError::Conflict(msg) => Self::conflict(msg),
            CategoryServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(e: TagServiceError) -> Self {
        match e {
            TagServiceError::NotFound(slug) => Self::not_found(format!("Tag not found: {}", slug)),
            TagServiceError::ValidationError(msg) => Self::validation_error(msg),
            TagServiceError::Conflict(msg) => Self::conflict(msg),
            TagServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<AuthorServiceError> for ApiError {
    fn from(e: AuthorServiceError) -> Self {
        match e {
            AuthorServiceError::NotFound(slug) => {
                Self::not_found(format!("Author not found: {}", slug))
            }
            AuthorServiceError::ValidationError(msg) => Self::validation_error(msg),
            AuthorServiceError::Conflict(msg) => Self::conflict(msg),
            AuthorServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<ChatServiceError> for ApiError {
    fn from(e: ChatServiceError) -> Self {
        match e {
            ChatServiceError::NotFound(id) => {
                Self::not_found(format!("Conversation not found: {}", id))
            }
            ChatServiceError::ValidationError(msg) => Self::validation_error(msg),
            ChatServiceError::Conflict(msg) => Self::conflict(msg),
            ChatServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<AiAssistError> for ApiError {
    fn from(e: AiAssistError) -> Self {
        match e {
            AiAssistError::Unavailable => Self::service_unavailable(e.to_string()),
            AiAssistError::ValidationError(msg) => Self::validation_error(msg),
            AiAssistError::Upstream(msg) => {
                tracing::warn!("Generative API failed: {}", msg);
                Self::bad_gateway("The AI provider request failed")
            }
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        match e {
            BookingError::ValidationError(msg) => Self::validation_error(msg),
            BookingError::Unavailable => Self::service_unavailable(e.to_string()),
            BookingError::Upstream(msg) => {
                tracing::warn!("Scheduling API failed: {}", msg);
                Self::bad_gateway("The scheduling provider request failed")
            }
            BookingError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<EnquiryServiceError> for ApiError {
    fn from(e: EnquiryServiceError) -> Self {
        match e {
            EnquiryServiceError::NotFound(id) => {
                Self::not_found(format!("Enquiry not found: {}", id))
            }
            EnquiryServiceError::ValidationError(msg) => Self::validation_error(msg),
            EnquiryServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// Client address: the socket peer, or the first `X-Forwarded-For` hop
/// when the server sits behind a trusted proxy
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());

        Ok(Self(resolve_client_ip(&parts.headers, peer, state.trust_proxy)))
    }
}

fn resolve_client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> Option<IpAddr> {
    if !trust_proxy {
        return peer;
    }

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .or(peer)
}

// ============================================================================
// Middleware
// ============================================================================

fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Admin authorization middleware
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state
        .admin_token_digest
        .ok_or_else(|| ApiError::unauthorized("Admin access is not configured"))?;

    let token = extract_bearer_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;

    if token_digest(token) != expected {
        return Err(ApiError::unauthorized("Invalid admin token"));
    }

    Ok(next.run(request).await)
}

/// Request statistics middleware
///
/// Records request count and response time. Uses atomics only.
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;

    let duration_us = start.elapsed().as_micros() as u64;
    state.request_stats.record(duration_us);

    response
}

/// Answer 410 for retired paths
pub async fn gone_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if state.gone.is_gone(request.uri().path()) {
        tracing::debug!(path = %request.uri().path(), "Retired path requested");
        return (StatusCode::GONE, Html(GONE_HTML)).into_response();
    }
    next.run(request).await
}

/// JSON 404 for unknown routes
pub async fn not_found_fallback(request: Request) -> ApiError {
    ApiError::not_found(format!("No route for {} {}", request.method(), request.uri().path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_client_ip_ignores_forwarded_header_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        let peer: Option<IpAddr> = Some("192.0.2.10".parse().unwrap());

        assert_eq!(resolve_client_ip(&headers, peer, false), peer);
        assert_eq!(
            resolve_client_ip(&headers, peer, true),
            Some("203.0.113.7".parse().unwrap())
        );
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let peer: Option<IpAddr> = Some("192.0.2.10".parse().unwrap());
        let mut headers = HeaderMap::new();
        assert_eq!(resolve_client_ip(&headers, peer, true), peer);

        headers.insert("x-forwarded-for", "not-an-ip".parse().unwrap());
        assert_eq!(resolve_client_ip(&headers, peer, true), peer);
        assert_eq!(resolve_client_ip(&headers, None, false), None);
    }

    #[test]
    fn test_extract_bearer_token() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer secret-token")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&request), Some("secret-token"));
    }

    #[test]
    fn test_extract_bearer_token_rejects_other_schemes() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        assert!(extract_bearer_token(&request).is_none());

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        assert!(extract_bearer_token(&request).is_none());
    }

    #[test]
    fn test_token_digest_is_stable() {
        assert_eq!(token_digest("abc"), token_digest("abc"));
        assert_ne!(token_digest("abc"), token_digest("abd"));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::rate_limited("x").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::service_unavailable("x").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::bad_gateway("x").status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError::internal_error("x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_service_errors_map_to_codes() {
        let error: ApiError = ChatServiceError::Conflict("closed".to_string()).into();
        assert_eq!(error.error.code, "CONFLICT");

        let error: ApiError = AiAssistError::Unavailable.into();
        assert_eq!(error.error.code, "SERVICE_UNAVAILABLE");

        let error: ApiError = BookingError::Upstream("500".to_string()).into();
        assert_eq!(error.error.code, "BAD_GATEWAY");

        let error: ApiError = PostServiceError::InternalError(anyhow::anyhow!("disk")).into();
        assert_eq!(error.error.message, "Internal server error");
    }

    #[test]
    fn test_api_error_with_details() {
        let details = serde_json::json!({"field": "email"});
        let error = ApiError::with_details("VALIDATION_ERROR", "Invalid", details.clone());
        assert_eq!(error.error.details, Some(details));
    }

    #[test]
    fn test_request_stats() {
        let stats = RequestStats::new();
        assert_eq!(stats.avg_response_time_us(), 0.0);
        stats.record(100);
        stats.record(300);
        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.avg_response_time_us(), 200.0);
    }
}
