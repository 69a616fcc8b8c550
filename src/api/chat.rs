//! Live chat API endpoints
//!
//! Visitor (rate limited per visitor id and per client IP):
//! - POST /api/v1/chat/conversations - Start or resume a conversation
//! - GET /api/v1/chat/conversations/{id}?visitor_id= - Conversation with messages
//! - POST /api/v1/chat/conversations/{id}/messages
//! - POST /api/v1/chat/conversations/{id}/typing
//! - POST /api/v1/chat/conversations/{id}/read
//! - POST /api/v1/chat/conversations/{id}/reopen
//! - GET /api/v1/chat/conversations/{id}/events?visitor_id= - SSE stream
//!
//! Admin:
//! - GET /api/v1/admin/chat/conversations?status=
//! - GET /api/v1/admin/chat/conversations/{id}
//! - POST /api/v1/admin/chat/conversations/{id}/{messages,typing,read,close,archive}
//! - GET /api/v1/admin/chat/events - SSE stream of every conversation
//! - GET /api/v1/admin/chat/alert - Favicon to show right now
//! - POST /api/v1/admin/chat/alert/dismiss

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::api::middleware::{ApiError, AppState, ClientIp};
use crate::models::{
    ChatEvent, ChatMessage, Conversation, ConversationStatus, ConversationSummary,
    ConversationWithMessages, SenderType,
};
use crate::realtime::{FaviconState, PendingAlert};
use crate::services::StartConversation;

/// Build the visitor chat router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations", post(start_conversation))
        .route("/conversations/{id}", get(get_conversation))
        .route("/conversations/{id}/messages", post(visitor_send_message))
        .route("/conversations/{id}/typing", post(visitor_typing))
        .route("/conversations/{id}/read", post(visitor_mark_read))
        .route("/conversations/{id}/reopen", post(reopen_conversation))
        .route("/conversations/{id}/events", get(visitor_events))
}

/// Build the admin chat router
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route("/conversations/{id}", get(admin_get_conversation))
        .route("/conversations/{id}/messages", post(admin_send_message))
        .route("/conversations/{id}/typing", post(admin_typing))
        .route("/conversations/{id}/read", post(admin_mark_read))
        .route("/conversations/{id}/close", post(close_conversation))
        .route("/conversations/{id}/archive", post(archive_conversation))
        .route("/events", get(admin_events))
        .route("/alert", get(alert_state))
        .route("/alert/dismiss", post(dismiss_alert))
}

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartConversationResponse {
    pub conversation: Conversation,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
pub struct VisitorQuery {
    pub visitor_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VisitorRequest {
    pub visitor_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VisitorMessageRequest {
    pub visitor_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct VisitorTypingRequest {
    pub visitor_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct TypingRequest {
    pub is_typing: bool,
}

#[derive(Debug, Serialize)]
pub struct TypingResponse {
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub updated: u64,
}

#[derive(Debug, Deserialize)]
pub struct ConversationListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DismissResponse {
    pub dismissed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<PendingAlert>,
}

// ============================================================================
// Helpers
// ============================================================================

async fn check_rate_limit(state: &AppState, visitor_id: &str, ip: ClientIp) -> Result<(), ApiError> {
    if state.visitor_limiter.try_acquire_visitor(visitor_id, ip.0).await {
        return Ok(());
    }
    tracing::warn!(visitor_id, ip = ?ip.0, "Chat rate limit exceeded");
    Err(ApiError::rate_limited("Too many requests, please slow down"))
}

/// Events from a broadcast receiver. A lagging receiver skips what it missed.
fn chat_events(rx: broadcast::Receiver<ChatEvent>) -> impl Stream<Item = ChatEvent> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((event, rx)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Chat event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

fn sse_response(
    rx: broadcast::Receiver<ChatEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = chat_events(rx).map(|event| {
        let sse = Event::default().event(event.kind());
        Ok(sse.clone().json_data(&event).unwrap_or(sse))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

// ============================================================================
// Visitor handlers
// ============================================================================

/// POST /api/v1/chat/conversations
async fn start_conversation(
    State(state): State<AppState>,
    ip: ClientIp,
    Json(request): Json<StartConversation>,
) -> Result<(StatusCode, Json<StartConversationResponse>), ApiError> {
    check_rate_limit(&state, &request.visitor_id, ip).await?;

    let (conversation, created) = state.chat_service.start_conversation(request).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };

    Ok((status, Json(StartConversationResponse { conversation, created })))
}

/// GET /api/v1/chat/conversations/{id}
async fn get_conversation(
    State(state): State<AppState>,
    ip: ClientIp,
    Path(id): Path<String>,
    Query(query): Query<VisitorQuery>,
) -> Result<Json<ConversationWithMessages>, ApiError> {
    check_rate_limit(&state, &query.visitor_id, ip).await?;
    Ok(Json(state.chat_service.get_conversation(&id, &query.visitor_id).await?))
}

/// POST /api/v1/chat/conversations/{id}/messages
async fn visitor_send_message(
    State(state): State<AppState>,
    ip: ClientIp,
    Path(id): Path<String>,
    Json(request): Json<VisitorMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    check_rate_limit(&state, &request.visitor_id, ip).await?;
    state.chat_service.authorize_visitor(&id, &request.visitor_id).await?;

    let message = state
        .chat_service
        .send_message(&id, SenderType::Visitor, &request.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/v1/chat/conversations/{id}/typing
async fn visitor_typing(
    State(state): State<AppState>,
    ip: ClientIp,
    Path(id): Path<String>,
    Json(request): Json<VisitorTypingRequest>,
) -> Result<Json<TypingResponse>, ApiError> {
    check_rate_limit(&state, &request.visitor_id, ip).await?;
    state.chat_service.authorize_visitor(&id, &request.visitor_id).await?;

    let changed = state
        .chat_service
        .set_typing(&id, SenderType::Visitor, request.is_typing)
        .await?;
    Ok(Json(TypingResponse { changed }))
}

/// POST /api/v1/chat/conversations/{id}/read
async fn visitor_mark_read(
    State(state): State<AppState>,
    ip: ClientIp,
    Path(id): Path<String>,
    Json(request): Json<VisitorRequest>,
) -> Result<Json<ReadResponse>, ApiError> {
    check_rate_limit(&state, &request.visitor_id, ip).await?;
    state.chat_service.authorize_visitor(&id, &request.visitor_id).await?;

    let updated = state.chat_service.mark_read(&id, SenderType::Visitor).await?;
    Ok(Json(ReadResponse { updated }))
}

/// POST /api/v1/chat/conversations/{id}/reopen
async fn reopen_conversation(
    State(state): State<AppState>,
    ip: ClientIp,
    Path(id): Path<String>,
    Json(request): Json<VisitorRequest>,
) -> Result<Json<Conversation>, ApiError> {
    check_rate_limit(&state, &request.visitor_id, ip).await?;
    Ok(Json(state.chat_service.reopen(&id, &request.visitor_id).await?))
}

/// GET /api/v1/chat/conversations/{id}/events
async fn visitor_events(
    State(state): State<AppState>,
    ip: ClientIp,
    Path(id): Path<String>,
    Query(query): Query<VisitorQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    check_rate_limit(&state, &query.visitor_id, ip).await?;
    state.chat_service.authorize_visitor(&id, &query.visitor_id).await?;

    let rx = state.chat_service.hub().subscribe_conversation(&id).await;
    tracing::debug!(conversation_id = %id, "Visitor subscribed to chat events");
    Ok(sse_response(rx))
}

// ============================================================================
// Admin handlers
// ============================================================================

/// GET /api/v1/admin/chat/conversations
async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationListQuery>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty() && *s != "all") {
        Some(s) => Some(
            ConversationStatus::from_str(s)
                .ok_or_else(|| ApiError::validation_error(format!("Unknown status: {}", s)))?,
        ),
        None => None,
    };
    Ok(Json(state.chat_service.list_conversations(status).await?))
}

/// GET /api/v1/admin/chat/conversations/{id}
async fn admin_get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationWithMessages>, ApiError> {
    Ok(Json(state.chat_service.get_conversation_admin(&id).await?))
}

/// POST /api/v1/admin/chat/conversations/{id}/messages
async fn admin_send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    let message = state
        .chat_service
        .send_message(&id, SenderType::Admin, &request.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/v1/admin/chat/conversations/{id}/typing
async fn admin_typing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TypingRequest>,
) -> Result<Json<TypingResponse>, ApiError> {
    let changed = state
        .chat_service
        .set_typing(&id, SenderType::Admin, request.is_typing)
        .await?;
    Ok(Json(TypingResponse { changed }))
}

/// POST /api/v1/admin/chat/conversations/{id}/read
async fn admin_mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReadResponse>, ApiError> {
    let updated = state.chat_service.mark_read(&id, SenderType::Admin).await?;
    Ok(Json(ReadResponse { updated }))
}

/// POST /api/v1/admin/chat/conversations/{id}/close
async fn close_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    Ok(Json(state.chat_service.close(&id).await?))
}

/// POST /api/v1/admin/chat/conversations/{id}/archive
async fn archive_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    Ok(Json(state.chat_service.archive(&id).await?))
}

/// GET /api/v1/admin/chat/events
async fn admin_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    sse_response(state.chat_service.hub().subscribe_admin())
}

/// GET /api/v1/admin/chat/alert
async fn alert_state(State(state): State<AppState>) -> Json<FaviconState> {
    Json(state.chat_alert.current_favicon(Utc::now()).await)
}

/// POST /api/v1/admin/chat/alert/dismiss
async fn dismiss_alert(State(state): State<AppState>) -> Json<DismissResponse> {
    let alert = state.chat_alert.dismiss().await;
    Json(DismissResponse {
        dismissed: alert.is_some(),
        alert,
    })
}
