//! Meeting booking proxy
//!
//! Looks up bookable slots from the scheduling API and turns a visitor's
//! booking form into a prefilled scheduling link. Every booking request is
//! recorded so enquiries can be followed up even if the visitor never
//! completes the booking.

use crate::config::BookingConfig;
use crate::db::repositories::{BookingRepository, PostRepository};
use crate::models::{AvailableTime, BookingRecord, BookingRequest, BookingResponse};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Longest range the scheduling API accepts in one request
pub const MAX_RANGE_DAYS: i64 = 7;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// No scheduling API token configured
    #[error("Scheduling is not configured")]
    Unavailable,

    #[error("Scheduling provider error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Query for available slots
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailableTimesQuery {
    #[serde(default, alias = "eventTypeUri", alias = "event_type")]
    pub event_type_uri: Option<String>,
    #[serde(default, alias = "startTime")]
    pub start_time: Option<String>,
    #[serde(default, alias = "endTime")]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableTimesResponse {
    #[serde(rename = "availableTimes")]
    pub available_times: Vec<AvailableTime>,
}

/// Scheduling provider
#[async_trait]
pub trait SchedulingClient: Send + Sync {
    async fn available_times(
        &self,
        event_type_uri: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AvailableTime>, BookingError>;
}

/// Calendly v2 API
pub struct CalendlyClient {
    client: reqwest::Client,
    api_url: String,
    api_token: String,
}

#[derive(Deserialize)]
struct CalendlyCollection {
    #[serde(default)]
    collection: Vec<AvailableTime>,
}

impl CalendlyClient {
    pub fn new(config: &BookingConfig, api_token: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }
}

#[async_trait]
impl SchedulingClient for CalendlyClient {
    async fn available_times(
        &self,
        event_type_uri: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AvailableTime>, BookingError> {
        let response = self
            .client
            .get(format!("{}/event_type_available_times", self.api_url))
            .bearer_auth(&self.api_token)
            .query(&[
                ("event_type", event_type_uri.to_string()),
                ("start_time", start.to_rfc3339()),
                ("end_time", end.to_rfc3339()),
            ])
            .send()
            .await
            .map_err(|e| BookingError::Upstream(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BookingError::Upstream(format!("{} - {}", status, text)));
        }

        let body: CalendlyCollection = response
            .json()
            .await
            .map_err(|e| BookingError::Upstream(format!("Invalid response body: {}", e)))?;
        Ok(body.collection)
    }
}

pub struct BookingService {
    client: Option<Arc<dyn SchedulingClient>>,
    bookings: Arc<dyn BookingRepository>,
    posts: Arc<dyn PostRepository>,
    default_scheduling_url: Option<String>,
}

impl BookingService {
    pub fn new(
        client: Option<Arc<dyn SchedulingClient>>,
        bookings: Arc<dyn BookingRepository>,
        posts: Arc<dyn PostRepository>,
        default_scheduling_url: Option<String>,
    ) -> Self {
        Self {
            client,
            bookings,
            posts,
            default_scheduling_url: default_scheduling_url.filter(|u| !u.trim().is_empty()),
        }
    }

    pub fn from_config(
        config: &BookingConfig,
        bookings: Arc<dyn BookingRepository>,
        posts: Arc<dyn PostRepository>,
    ) -> anyhow::Result<Self> {
        let client: Option<Arc<dyn SchedulingClient>> = match &config.api_token {
            Some(token) if !token.is_empty() => Some(Arc::new(CalendlyClient::new(config, token.clone())?)),
            _ => None,
        };
        Ok(Self::new(client, bookings, posts, config.default_scheduling_url.clone()))
    }

    /// Bookable slots in the requested range, with past starts moved to now
    pub async fn available_times(
        &self,
        query: &AvailableTimesQuery,
        now: DateTime<Utc>,
    ) -> Result<AvailableTimesResponse, BookingError> {
        let (Some(event_type_uri), Some(start), Some(end)) = (
            non_blank(&query.event_type_uri),
            non_blank(&query.start_time),
            non_blank(&query.end_time),
        ) else {
            return Err(BookingError::ValidationError(
                "event_type_uri, start_time and end_time are required".to_string(),
            ));
        };

        let start = parse_rfc3339(start, "start_time")?.with_timezone(&Utc);
        let end = parse_rfc3339(end, "end_time")?.with_timezone(&Utc);
        if end <= start {
            return Err(BookingError::ValidationError("end_time must be after start_time".to_string()));
        }
        if end - start > Duration::days(MAX_RANGE_DAYS) {
            return Err(BookingError::ValidationError(format!(
                "Range cannot exceed {} days",
                MAX_RANGE_DAYS
            )));
        }

        let start = start.max(now);
        if end <= start {
            return Ok(AvailableTimesResponse {
                available_times: Vec::new(),
            });
        }

        let client = self.client.as_ref().ok_or(BookingError::Unavailable)?;
        let times = client.available_times(event_type_uri, start, end).await?;

        Ok(AvailableTimesResponse {
            available_times: times.into_iter().filter(AvailableTime::is_available).collect(),
        })
    }

    /// Record a booking request and return the prefilled scheduling link
    pub async fn book(&self, request: BookingRequest) -> Result<BookingResponse, BookingError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(BookingError::ValidationError("Name is required".to_string()));
        }
        let email = request.email.trim().to_string();
        if !is_valid_email(&email) {
            return Err(BookingError::ValidationError("A valid email is required".to_string()));
        }
        let start = parse_rfc3339(request.start_time.trim(), "start_time")?;

        let base_url = self.resolve_scheduling_url(request.post_id).await?;
        let message = request.message.as_deref().map(str::trim).filter(|m| !m.is_empty());
        let scheduling_url = prefilled_url(&base_url, &name, &email, message, start)?;

        let record = BookingRecord {
            id: 0,
            post_id: request.post_id,
            event_type_uri: request.event_type_uri,
            start_time: start.with_timezone(&Utc),
            name,
            email,
            phone: request.phone.filter(|p| !p.trim().is_empty()),
            company: request.company.filter(|c| !c.trim().is_empty()),
            message: message.map(str::to_string),
            timezone: request.timezone,
            scheduling_url: scheduling_url.clone(),
            created_at: Utc::now(),
        };
        let record = self
            .bookings
            .create(&record)
            .await
            .context("Failed to record booking request")?;

        tracing::info!(booking_id = record.id, post_id = ?record.post_id, "Booking request recorded");

        Ok(BookingResponse {
            success: true,
            booking_id: record.id,
            scheduling_url,
        })
    }

    async fn resolve_scheduling_url(&self, post_id: Option<i64>) -> Result<String, BookingError> {
        if let Some(post_id) = post_id {
            let post = self
                .posts
                .get_by_id(post_id)
                .await
                .context("Failed to look up post")?
                .ok_or_else(|| BookingError::ValidationError(format!("Post {} does not exist", post_id)))?;
            if let Some(url) = post.calendly_scheduling_url.filter(|u| !u.trim().is_empty()) {
                return Ok(url);
            }
        }

        self.default_scheduling_url
            .clone()
            .ok_or_else(|| BookingError::ValidationError("No scheduling link is configured".to_string()))
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_rfc3339(value: &str, field: &str) -> Result<DateTime<FixedOffset>, BookingError> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|_| BookingError::ValidationError(format!("{} must be an RFC 3339 timestamp", field)))
}

/// Scheduling link with the visitor's details and the chosen day filled in.
///
/// The day is taken in the offset the visitor sent.
fn prefilled_url(
    base: &str,
    name: &str,
    email: &str,
    message: Option<&str>,
    start: DateTime<FixedOffset>,
) -> Result<String, BookingError> {
    let base = base.trim();
    if !base.starts_with("https://") && !base.starts_with("http://") {
        return Err(BookingError::ValidationError(format!(
            "Invalid scheduling link: {}",
            base
        )));
    }

    let mut params = vec![("name", name.to_string()), ("email", email.to_string())];
    if let Some(message) = message {
        params.push(("a1", message.to_string()));
    }
    params.push(("month", start.format("%Y-%m").to_string()));
    params.push(("date", start.format("%Y-%m-%d").to_string()));

    let query = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base.contains('?') { '&' } else { '?' };

    Ok(format!("{}{}{}", base, separator, query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxBookingRepository, SqlxPostRepository};
    use crate::db::{create_test_pool, migrations, DbPool};
    use reqwest::Url;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubScheduler {
        calls: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    #[async_trait]
    impl SchedulingClient for StubScheduler {
        async fn available_times(
            &self,
            _event_type_uri: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<AvailableTime>, BookingError> {
            self.calls.lock().unwrap().push((start, end));
            Ok(vec![
                AvailableTime {
                    status: "available".to_string(),
                    start_time: "2030-01-02T10:00:00Z".to_string(),
                    invitees_remaining: Some(1),
                    scheduling_url: None,
                },
                AvailableTime {
                    status: "unavailable".to_string(),
                    start_time: "2030-01-02T11:00:00Z".to_string(),
                    invitees_remaining: Some(0),
                    scheduling_url: None,
                },
            ])
        }
    }

    async fn setup(default_url: Option<&str>) -> (DbPool, BookingService, Arc<StubScheduler>) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        sqlx::query("INSERT INTO authors (name, slug) VALUES ('Marc', 'marc')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO posts (title, slug, content, author_id, category_id, calendly_scheduling_url) VALUES ('With link', 'with-link', 'c', 1, 1, 'https://calendly.com/marc/intro')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO posts (title, slug, content, author_id, category_id) VALUES ('No link', 'no-link', 'c', 1, 1)")
            .execute(&pool)
            .await
            .unwrap();

        let stub = Arc::new(StubScheduler::default());
        let service = BookingService::new(
            Some(stub.clone()),
            SqlxBookingRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            default_url.map(str::to_string),
        );
        (pool, service, stub)
    }

    fn query(start: &str, end: &str) -> AvailableTimesQuery {
        AvailableTimesQuery {
            event_type_uri: Some("https://api.calendly.com/event_types/abc".to_string()),
            start_time: Some(start.to_string()),
            end_time: Some(end.to_string()),
        }
    }

    fn booking(post_id: Option<i64>) -> BookingRequest {
        BookingRequest {
            post_id,
            start_time: "2030-03-05T09:30:00+01:00".to_string(),
            name: "Ann Lee".to_string(),
            email: "ann@example.com".to_string(),
            message: Some("Talk about invoices".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("@c.de"));
    }

    #[tokio::test]
    async fn test_available_times_filters_slots() {
        let (_pool, service, _stub) = setup(None).await;
        let now = "2030-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let result = service
            .available_times(&query("2030-01-02T00:00:00Z", "2030-01-03T00:00:00Z"), now)
            .await
            .unwrap();
        assert_eq!(result.available_times.len(), 1);
        assert_eq!(result.available_times[0].status, "available");

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("availableTimes").is_some());
    }

    #[tokio::test]
    async fn test_available_times_validation() {
        let (_pool, service, _stub) = setup(None).await;
        let now = "2030-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let missing = AvailableTimesQuery::default();
        assert!(matches!(
            service.available_times(&missing, now).await,
            Err(BookingError::ValidationError(_))
        ));
        assert!(matches!(
            service
                .available_times(&query("2030-01-05T00:00:00Z", "2030-01-02T00:00:00Z"), now)
                .await,
            Err(BookingError::ValidationError(_))
        ));
        assert!(matches!(
            service
                .available_times(&query("2030-01-01T00:00:00Z", "2030-01-09T00:00:00Z"), now)
                .await,
            Err(BookingError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_past_start_clamped_to_now() {
        let (_pool, service, stub) = setup(None).await;
        let now = "2030-01-02T12:00:00Z".parse::<DateTime<Utc>>().unwrap();

        service
            .available_times(&query("2030-01-01T00:00:00Z", "2030-01-04T00:00:00Z"), now)
            .await
            .unwrap();

        let calls = stub.calls.lock().unwrap();
        assert_eq!(calls[0].0, now);
    }

    #[tokio::test]
    async fn test_unavailable_without_client() {
        let (pool, _service, _stub) = setup(None).await;
        let service = BookingService::new(
            None,
            SqlxBookingRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool),
            None,
        );
        let now = "2030-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();

        assert!(matches!(
            service
                .available_times(&query("2030-01-02T00:00:00Z", "2030-01-03T00:00:00Z"), now)
                .await,
            Err(BookingError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_book_uses_post_link() {
        let (_pool, service, _stub) = setup(Some("https://calendly.com/marc/default")).await;

        let response = service.book(booking(Some(1))).await.unwrap();
        assert!(response.success);
        assert!(response.booking_id > 0);

        let url = Url::parse(&response.scheduling_url).unwrap();
        assert_eq!(url.path(), "/marc/intro");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["name"], "Ann Lee");
        assert_eq!(pairs["email"], "ann@example.com");
        assert_eq!(pairs["a1"], "Talk about invoices");
        assert_eq!(pairs["month"], "2030-03");
        assert_eq!(pairs["date"], "2030-03-05");
    }

    #[tokio::test]
    async fn test_book_falls_back_to_default_link() {
        let (_pool, service, _stub) = setup(Some("https://calendly.com/marc/default")).await;
        let response = service.book(booking(Some(2))).await.unwrap();
        assert!(response.scheduling_url.starts_with("https://calendly.com/marc/default?"));

        let (_pool, no_default, _stub) = setup(None).await;
        assert!(matches!(
            no_default.book(booking(None)).await,
            Err(BookingError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_book_validation() {
        let (_pool, service, _stub) = setup(Some("https://calendly.com/marc/default")).await;

        let mut bad_email = booking(None);
        bad_email.email = "not-an-email".to_string();
        assert!(matches!(service.book(bad_email).await, Err(BookingError::ValidationError(_))));

        let mut bad_time = booking(None);
        bad_time.start_time = "next tuesday".to_string();
        assert!(matches!(service.book(bad_time).await, Err(BookingError::ValidationError(_))));

        let mut no_name = booking(None);
        no_name.name = " ".to_string();
        assert!(matches!(service.book(no_name).await, Err(BookingError::ValidationError(_))));
    }
}
