//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1`:
//! - Health
//! - Posts, categories, tags and authors (public reads, admin writes)
//! - Live chat for visitors and admins, with SSE event streams
//! - AI content assist (admin)
//! - Booking proxy
//! - Enquiries and CSV export

pub mod ai;
pub mod authors;
pub mod booking;
pub mod categories;
pub mod chat;
pub mod common;
pub mod enquiries;
pub mod middleware;
pub mod posts;
pub mod site;
pub mod tags;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAuthorRepository, SqlxBookingRepository, SqlxCategoryRepository,
    SqlxConversationRepository, SqlxEnquiryRepository, SqlxPostRepository, SqlxTagRepository,
};
use crate::db::DbPool;
use crate::realtime::{ChatAlert, ChatHub, TypingTracker};
use crate::services::{
    AiAssistService, AuthorService, BookingService, CategoryService, ChatNotifier, ChatService,
    EnquiryService, GoneMatcher, PostService, RateLimiter, TagService,
};

pub use middleware::{token_digest, ApiError, AppState, RequestStats};

/// Wire repositories, services and realtime components from configuration
pub fn build_state(config: &Config, pool: DbPool) -> anyhow::Result<AppState> {
    let cache = create_cache(&config.cache);

    let post_repo = SqlxPostRepository::boxed(pool.clone());
    let author_repo = SqlxAuthorRepository::boxed(pool.clone());
    let category_repo = SqlxCategoryRepository::boxed(pool.clone());
    let tag_repo = SqlxTagRepository::boxed(pool.clone());

    let post_service = Arc::new(PostService::new(
        post_repo.clone(),
        author_repo.clone(),
        category_repo.clone(),
        tag_repo.clone(),
        cache.clone(),
    ));
    let category_service = Arc::new(CategoryService::new(category_repo, cache.clone()));
    let tag_service = Arc::new(TagService::new(tag_repo, cache));
    let author_service = Arc::new(AuthorService::new(author_repo));

    let hub = Arc::new(ChatHub::new());
    let typing = Arc::new(TypingTracker::from_millis(config.chat.typing_ttl_ms));
    let notifier = Arc::new(ChatNotifier::from_config(&config.notification, &config.site)?);
    tracing::info!(sender = notifier.sender_name(), "Chat notifications configured");

    let chat_service = Arc::new(ChatService::new(
        SqlxConversationRepository::boxed(pool.clone()),
        post_repo.clone(),
        hub,
        typing.clone(),
        notifier,
        &config.chat,
    ));

    let ai_service = Arc::new(AiAssistService::from_config(&config.ai)?);
    let booking_service = Arc::new(BookingService::from_config(
        &config.booking,
        SqlxBookingRepository::boxed(pool.clone()),
        post_repo.clone(),
    )?);
    let enquiry_service = Arc::new(EnquiryService::new(
        SqlxEnquiryRepository::boxed(pool.clone()),
        post_repo,
    ));

    let admin_token_digest = config
        .admin
        .api_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(token_digest);

    Ok(AppState {
        pool,
        post_service,
        category_service,
        tag_service,
        author_service,
        chat_service,
        chat_alert: Arc::new(ChatAlert::new(config.chat.favicon_interval_ms)),
        typing,
        visitor_limiter: Arc::new(RateLimiter::per_minute(
            config.chat.visitor_rate_limit_per_minute,
        )),
        ai_service,
        booking_service,
        enquiry_service,
        gone: Arc::new(GoneMatcher::new(&config.site.gone_patterns)),
        admin_token_digest,
        trust_proxy: config.server.trust_proxy,
        request_stats: Arc::new(RequestStats::new()),
    })
}

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let admin_routes = Router::new()
        .nest("/admin/posts", posts::admin_router())
        .nest("/admin/categories", categories::admin_router())
        .nest("/admin/tags", tags::admin_router())
        .nest("/admin/authors", authors::admin_router())
        .nest("/admin/chat", chat::admin_router())
        .nest("/admin/ai", ai::admin_router())
        .nest("/admin/enquiries", enquiries::admin_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_admin,
        ));

    Router::new()
        .nest("/health", site::router())
        .nest("/posts", posts::router())
        .nest("/categories", categories::router())
        .nest("/tags", tags::router())
        .nest("/authors", authors::router())
        .nest("/chat", chat::router())
        .nest("/booking", booking::router())
        .nest("/enquiries", enquiries::router())
        .merge(admin_routes)
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if cors_origin == "*" {
        return cors.allow_origin(Any);
    }
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin = cors_origin, "Invalid CORS origin, cross-origin requests disabled");
            cors
        }
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .fallback(middleware::not_found_fallback)
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::gone_middleware,
        ))
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::realtime::spawn_alert_listener;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};

    const ADMIN_TOKEN: &str = "test-admin-token";
    const VISITOR: &str = "visitor-1234";

    async fn setup_with(configure: impl FnOnce(&mut Config)) -> (TestServer, AppState) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let mut config = Config::default();
        config.admin.api_token = Some(ADMIN_TOKEN.to_string());
        configure(&mut config);

        let state = build_state(&config, pool).unwrap();
        let server = TestServer::new(build_router(state.clone(), &config.server.cors_origin)).unwrap();
        (server, state)
    }

    async fn setup() -> (TestServer, AppState) {
        setup_with(|_| {}).await
    }

    #[tokio::test]
    async fn test_health() {
        let (server, _state) = setup().await;

        let response = server.get("/api/v1/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let (server, _state) = setup().await;

        let response = server.get("/api/v1/nope").await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_retired_path_is_gone() {
        let (server, _state) = setup().await;

        let response = server.get("/legal-tech/contracts").await;
        response.assert_status(StatusCode::GONE);
        assert!(response.text().contains("permanently removed"));
    }

    #[tokio::test]
    async fn test_admin_requires_token() {
        let (server, _state) = setup().await;

        server
            .get("/api/v1/admin/chat/conversations")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/api/v1/admin/chat/conversations")
            .authorization_bearer("wrong")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/api/v1/admin/chat/conversations")
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_admin_closed_without_configured_token() {
        let (server, _state) = setup_with(|config| config.admin.api_token = None).await;

        server
            .get("/api/v1/admin/enquiries")
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_post_publish_and_read() {
        let (server, _state) = setup().await;

        server
            .post("/api/v1/admin/authors")
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"name": "Marc"}))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server
            .post("/api/v1/admin/posts")
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({
                "title": "Automating Invoices",
                "content": "Three words here",
                "author_id": 1,
                "category_id": 1,
                "status": "published"
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: Value = response.json();
        assert_eq!(created["slug"], "automating-invoices");

        let response = server.get("/api/v1/posts/automating-invoices").await;
        response.assert_status_ok();
        let post: Value = response.json();
        assert_eq!(post["title"], "Automating Invoices");
        assert_eq!(post["author"]["slug"], "marc");

        let list: Value = server.get("/api/v1/posts").await.json();
        assert_eq!(list["total"], 1);

        server
            .get("/api/v1/posts/does-not-exist")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_chat_flow_and_alert() {
        let (server, state) = setup().await;
        let _listener = spawn_alert_listener(state.chat_service.hub(), state.chat_alert.clone());

        let start = json!({"visitor_id": VISITOR, "consent_given": true});
        let response = server.post("/api/v1/chat/conversations").json(&start).await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["created"], true);
        let id = body["conversation"]["id"].as_str().unwrap().to_string();

        let again = server.post("/api/v1/chat/conversations").json(&start).await;
        again.assert_status_ok();
        assert_eq!(again.json::<Value>()["created"], false);

        server
            .post(&format!("/api/v1/chat/conversations/{}/messages", id))
            .json(&json!({"visitor_id": VISITOR, "content": "Hello there"}))
            .await
            .assert_status(StatusCode::CREATED);

        server
            .get(&format!("/api/v1/chat/conversations/{}", id))
            .add_query_param("visitor_id", "someone-else-99")
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let admin_view: Value = server
            .get(&format!("/api/v1/admin/chat/conversations/{}", id))
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .json();
        assert_eq!(admin_view["messages"].as_array().unwrap().len(), 1);

        let mut alert = Value::Null;
        for _ in 0..50 {
            alert = server
                .get("/api/v1/admin/chat/alert")
                .authorization_bearer(ADMIN_TOKEN)
                .await
                .json();
            if alert["alert_active"] == true {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(alert["alert_active"], true);

        let first: Value = server
            .post("/api/v1/admin/chat/alert/dismiss")
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .json();
        assert_eq!(first["dismissed"], true);
        let second: Value = server
            .post("/api/v1/admin/chat/alert/dismiss")
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .json();
        assert_eq!(second["dismissed"], false);

        server
            .post(&format!("/api/v1/admin/chat/conversations/{}/close", id))
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .assert_status_ok();
        server
            .post(&format!("/api/v1/chat/conversations/{}/messages", id))
            .json(&json!({"visitor_id": VISITOR, "content": "Still there?"}))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_chat_events_require_owning_visitor() {
        let (server, _state) = setup().await;

        let start = json!({"visitor_id": VISITOR, "consent_given": true});
        let body: Value = server.post("/api/v1/chat/conversations").json(&start).await.json();
        let id = body["conversation"]["id"].as_str().unwrap().to_string();

        let response = server
            .get(&format!("/api/v1/chat/conversations/{}/events", id))
            .add_query_param("visitor_id", "someone-else-99")
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["error"]["code"], "NOT_FOUND");

        server
            .get("/api/v1/chat/conversations/missing-conversation/events")
            .add_query_param("visitor_id", VISITOR)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_chat_requires_consent() {
        let (server, _state) = setup().await;

        let response = server
            .post("/api/v1/chat/conversations")
            .json(&json!({"visitor_id": VISITOR, "consent_given": false}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_visitor_rate_limit() {
        let (server, _state) =
            setup_with(|config| config.chat.visitor_rate_limit_per_minute = 2).await;
        let start = json!({"visitor_id": VISITOR, "consent_given": true});

        server.post("/api/v1/chat/conversations").json(&start).await.assert_status(StatusCode::CREATED);
        server.post("/api/v1/chat/conversations").json(&start).await.assert_status_ok();

        let response = server.post("/api/v1/chat/conversations").json(&start).await;
        response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.json::<Value>()["error"]["code"], "RATE_LIMIT");
    }

    #[tokio::test]
    async fn test_ai_unavailable_without_key() {
        let (server, _state) = setup().await;

        server
            .post("/api/v1/admin/ai/generate")
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"title": "T", "content": "C"}))
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_enquiry_submit_and_export() {
        let (server, _state) = setup().await;

        server
            .post("/api/v1/enquiries")
            .json(&json!({
                "survey_id": 1,
                "respondent_email": "ann@example.com",
                "response_data": {"budget": "10k"}
            }))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server
            .get("/api/v1/admin/enquiries/export")
            .authorization_bearer(ADMIN_TOKEN)
            .await;
        response.assert_status_ok();
        let disposition = response.header("content-disposition");
        let disposition = disposition.to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"enquiries-export-"));
        assert!(response.text().starts_with(crate::services::enquiry::CSV_HEADER));
    }
}
