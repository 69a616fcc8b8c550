//! Enquiry service
//!
//! Survey and contact-form submissions: public capture, admin triage and
//! CSV export.

use crate::db::repositories::{EnquiryRepository, PostRepository};
use crate::models::{CreateEnquiryInput, Enquiry, EnquiryFilter, EnquiryStatus, Survey};
use crate::services::booking::is_valid_email;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

pub const CSV_HEADER: &str =
    "ID,Survey,Post,Respondent Name,Respondent Email,Status,Created At,Response Data";

#[derive(Debug, thiserror::Error)]
pub enum EnquiryServiceError {
    #[error("Enquiry not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Admin listing query as it arrives on the wire
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnquiryQuery {
    #[serde(default)]
    pub survey_id: Option<i64>,
    #[serde(default)]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
}

impl EnquiryQuery {
    /// Resolve the wire query into a repository filter.
    ///
    /// A bare `dateTo` date covers that whole day.
    pub fn to_filter(&self) -> Result<EnquiryFilter, EnquiryServiceError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(s) => Some(EnquiryStatus::from_str(s).ok_or_else(|| {
                EnquiryServiceError::ValidationError(format!("Unknown status: {}", s))
            })?),
        };

        Ok(EnquiryFilter {
            survey_id: self.survey_id,
            post_id: self.post_id,
            status,
            date_from: parse_bound(self.date_from.as_deref(), NaiveTime::MIN, "dateFrom")?,
            date_to: parse_bound(
                self.date_to.as_deref(),
                NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN),
                "dateTo",
            )?,
        })
    }
}

fn parse_bound(
    value: Option<&str>,
    time_of_day: NaiveTime,
    field: &str,
) -> Result<Option<DateTime<Utc>>, EnquiryServiceError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(datetime.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| Some(date.and_time(time_of_day).and_utc()))
        .map_err(|_| {
            EnquiryServiceError::ValidationError(format!(
                "{} must be an RFC 3339 timestamp or YYYY-MM-DD",
                field
            ))
        })
}

pub struct EnquiryService {
    repo: Arc<dyn EnquiryRepository>,
    posts: Arc<dyn PostRepository>,
}

impl EnquiryService {
    pub fn new(repo: Arc<dyn EnquiryRepository>, posts: Arc<dyn PostRepository>) -> Self {
        Self { repo, posts }
    }

    pub async fn submit(&self, mut input: CreateEnquiryInput) -> Result<Enquiry, EnquiryServiceError> {
        if !input.response_data.is_object() {
            return Err(EnquiryServiceError::ValidationError(
                "response_data must be an object".to_string(),
            ));
        }

        input.respondent_name = trimmed(input.respondent_name);
        input.respondent_email = trimmed(input.respondent_email);
        if let Some(email) = &input.respondent_email {
            if !is_valid_email(email) {
                return Err(EnquiryServiceError::ValidationError(
                    "Invalid email address".to_string(),
                ));
            }
        }

        if let Some(survey_id) = input.survey_id {
            let surveys = self.repo.list_surveys().await?;
            if !surveys.iter().any(|s| s.id == survey_id) {
                return Err(EnquiryServiceError::ValidationError(format!(
                    "Survey {} does not exist",
                    survey_id
                )));
            }
        }
        if let Some(post_id) = input.post_id {
            if self
                .posts
                .get_by_id(post_id)
                .await
                .context("Failed to look up post")?
                .is_none()
            {
                return Err(EnquiryServiceError::ValidationError(format!(
                    "Post {} does not exist",
                    post_id
                )));
            }
        }

        let enquiry = self.repo.create(&input).await?;
        tracing::info!(enquiry_id = enquiry.id, survey_id = ?enquiry.survey_id, "Enquiry received");
        Ok(enquiry)
    }

    pub async fn list(&self, query: &EnquiryQuery) -> Result<Vec<Enquiry>, EnquiryServiceError> {
        let filter = query.to_filter()?;
        Ok(self.repo.list(&filter).await?)
    }

    pub async fn update_status(
        &self,
        id: i64,
        status: EnquiryStatus,
    ) -> Result<Enquiry, EnquiryServiceError> {
        if !self.repo.update_status(id, status).await? {
            return Err(EnquiryServiceError::NotFound(id.to_string()));
        }
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| EnquiryServiceError::NotFound(id.to_string()))
    }

    pub async fn list_surveys(&self) -> Result<Vec<Survey>, EnquiryServiceError> {
        Ok(self.repo.list_surveys().await?)
    }

    /// Filtered enquiries as CSV, with the download file name for `today`
    pub async fn export_csv(
        &self,
        query: &EnquiryQuery,
        today: NaiveDate,
    ) -> Result<(String, String), EnquiryServiceError> {
        let enquiries = self.list(query).await?;
        Ok((export_filename(today), to_csv(&enquiries)))
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn export_filename(today: NaiveDate) -> String {
    format!("enquiries-export-{}.csv", today.format("%Y-%m-%d"))
}

/// Quote a cell when it holds a comma, quote or line break
pub fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn to_csv(enquiries: &[Enquiry]) -> String {
    let mut lines = Vec::with_capacity(enquiries.len() + 1);
    lines.push(CSV_HEADER.to_string());

    for enquiry in enquiries {
        let cells = [
            enquiry.id.to_string(),
            enquiry.survey_name.clone().unwrap_or_default(),
            enquiry.post_title.clone().unwrap_or_default(),
            enquiry.respondent_name.clone().unwrap_or_default(),
            enquiry.respondent_email.clone().unwrap_or_default(),
            enquiry.status.to_string(),
            enquiry.created_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            enquiry.response_data.to_string(),
        ];
        let row: Vec<String> = cells.iter().map(|c| csv_escape(c)).collect();
        lines.push(row.join(","));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxEnquiryRepository, SqlxPostRepository};
    use crate::db::{create_test_pool, migrations};
    use proptest::prelude::*;
    use serde_json::json;

    async fn setup() -> EnquiryService {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        EnquiryService::new(
            SqlxEnquiryRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool),
        )
    }

    fn submission(email: Option<&str>) -> CreateEnquiryInput {
        CreateEnquiryInput {
            survey_id: Some(1),
            respondent_name: Some(" Ann ".to_string()),
            respondent_email: email.map(str::to_string),
            response_data: json!({"budget": "10k", "notes": "Needs CRM, soon"}),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_submit_and_list() {
        let service = setup().await;
        let enquiry = service.submit(submission(Some("ann@example.com"))).await.unwrap();

        assert_eq!(enquiry.status, EnquiryStatus::New);
        assert_eq!(enquiry.respondent_name.as_deref(), Some("Ann"));
        assert_eq!(enquiry.survey_name.as_deref(), Some("Contact"));

        let all = service.list(&EnquiryQuery::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let service = setup().await;

        assert!(matches!(
            service.submit(submission(Some("nope"))).await,
            Err(EnquiryServiceError::ValidationError(_))
        ));

        let mut not_object = submission(None);
        not_object.response_data = json!(["a", "b"]);
        assert!(matches!(
            service.submit(not_object).await,
            Err(EnquiryServiceError::ValidationError(_))
        ));

        let mut unknown_post = submission(None);
        unknown_post.post_id = Some(999);
        assert!(matches!(
            service.submit(unknown_post).await,
            Err(EnquiryServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_update_status() {
        let service = setup().await;
        let enquiry = service.submit(submission(None)).await.unwrap();

        let updated = service.update_status(enquiry.id, EnquiryStatus::Read).await.unwrap();
        assert_eq!(updated.status, EnquiryStatus::Read);

        let query = EnquiryQuery {
            status: Some("new".to_string()),
            ..Default::default()
        };
        assert!(service.list(&query).await.unwrap().is_empty());

        assert!(matches!(
            service.update_status(404, EnquiryStatus::Read).await,
            Err(EnquiryServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_filter_dates() {
        let query = EnquiryQuery {
            date_from: Some("2024-03-01".to_string()),
            date_to: Some("2024-03-31".to_string()),
            ..Default::default()
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.date_from.unwrap().to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!(
            filter.date_to.unwrap().format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-03-31 23:59:59"
        );

        let rfc = EnquiryQuery {
            date_from: Some("2024-03-01T12:00:00+02:00".to_string()),
            ..Default::default()
        };
        assert_eq!(
            rfc.to_filter().unwrap().date_from.unwrap().to_rfc3339(),
            "2024-03-01T10:00:00+00:00"
        );

        let bad = EnquiryQuery {
            date_to: Some("March".to_string()),
            ..Default::default()
        };
        assert!(bad.to_filter().is_err());

        let bad_status = EnquiryQuery {
            status: Some("spam".to_string()),
            ..Default::default()
        };
        assert!(bad_status.to_filter().is_err());
    }

    #[tokio::test]
    async fn test_export_csv() {
        let service = setup().await;
        service.submit(submission(Some("ann@example.com"))).await.unwrap();

        let today = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let (filename, body) = service
            .export_csv(&EnquiryQuery::default(), today)
            .await
            .unwrap();

        assert_eq!(filename, "enquiries-export-2024-05-17.csv");
        let mut lines = body.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        let row = lines.next().unwrap();
        assert!(row.starts_with("1,Contact,,Ann,ann@example.com,new,"));
        // The JSON cell holds commas and quotes, so it is quoted with quotes doubled.
        assert!(row.ends_with(r#""{""budget"":""10k"",""notes"":""Needs CRM, soon""}""#));
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("two\nlines"), "\"two\nlines\"");
    }

    proptest! {
        #[test]
        fn prop_csv_escape_round_trips(value in ".{0,40}") {
            let escaped = csv_escape(&value);
            let unescaped = if escaped.starts_with('"') && escaped.len() >= 2 && escaped != value {
                escaped[1..escaped.len() - 1].replace("\"\"", "\"")
            } else {
                escaped.clone()
            };
            prop_assert_eq!(unescaped, value);
        }
    }
}
