//! Enquiry repository

use crate::db::DbPool;
use crate::models::{CreateEnquiryInput, Enquiry, EnquiryFilter, EnquiryStatus, Survey};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

/// Enquiry repository trait
#[async_trait]
pub trait EnquiryRepository: Send + Sync {
    async fn create(&self, input: &CreateEnquiryInput) -> Result<Enquiry>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Enquiry>>;

    /// Filtered listing, newest first
    async fn list(&self, filter: &EnquiryFilter) -> Result<Vec<Enquiry>>;

    /// Returns false when the enquiry does not exist
    async fn update_status(&self, id: i64, status: EnquiryStatus) -> Result<bool>;

    async fn list_surveys(&self) -> Result<Vec<Survey>>;
}

/// SQLx-based enquiry repository implementation
pub struct SqlxEnquiryRepository {
    pool: DbPool,
}

impl SqlxEnquiryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn EnquiryRepository> {
        Arc::new(Self::new(pool))
    }
}

const ENQUIRY_SELECT: &str = r#"
    SELECT e.id, e.survey_id, s.name AS survey_name, e.post_id, p.title AS post_title,
           e.respondent_name, e.respondent_email, e.status, e.response_data, e.created_at
    FROM enquiries e
    LEFT JOIN surveys s ON s.id = e.survey_id
    LEFT JOIN posts p ON p.id = e.post_id
"#;

#[async_trait]
impl EnquiryRepository for SqlxEnquiryRepository {
    async fn create(&self, input: &CreateEnquiryInput) -> Result<Enquiry> {
        let now = Utc::now();
        let response_data =
            serde_json::to_string(&input.response_data).context("Failed to serialize response data")?;

        let result = sqlx::query(
            r#"
            INSERT INTO enquiries (survey_id, post_id, respondent_name, respondent_email, status, response_data, created_at)
            VALUES (?, ?, ?, ?, 'new', ?, ?)
            "#,
        )
        .bind(input.survey_id)
        .bind(input.post_id)
        .bind(&input.respondent_name)
        .bind(&input.respondent_email)
        .bind(response_data)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create enquiry")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .context("Created enquiry not found")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Enquiry>> {
        let row = sqlx::query(&format!("{} WHERE e.id = ?", ENQUIRY_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get enquiry")?;

        row.as_ref().map(row_to_enquiry).transpose()
    }

    async fn list(&self, filter: &EnquiryFilter) -> Result<Vec<Enquiry>> {
        let mut sql = format!("{} WHERE 1 = 1", ENQUIRY_SELECT);
        if filter.survey_id.is_some() {
            sql.push_str(" AND e.survey_id = ?");
        }
        if filter.post_id.is_some() {
            sql.push_str(" AND e.post_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND e.status = ?");
        }
        if filter.date_from.is_some() {
            sql.push_str(" AND e.created_at >= ?");
        }
        if filter.date_to.is_some() {
            sql.push_str(" AND e.created_at <= ?");
        }
        sql.push_str(" ORDER BY e.created_at DESC, e.id DESC");

        let mut query = sqlx::query(&sql);
        if let Some(survey_id) = filter.survey_id {
            query = query.bind(survey_id);
        }
        if let Some(post_id) = filter.post_id {
            query = query.bind(post_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(date_from) = filter.date_from {
            query = query.bind(date_from);
        }
        if let Some(date_to) = filter.date_to {
            query = query.bind(date_to);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list enquiries")?;

        rows.iter().map(row_to_enquiry).collect()
    }

    async fn update_status(&self, id: i64, status: EnquiryStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE enquiries SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update enquiry status")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_surveys(&self) -> Result<Vec<Survey>> {
        let rows = sqlx::query("SELECT id, name FROM surveys ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list surveys")?;

        Ok(rows
            .iter()
            .map(|row| Survey {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }
}

fn row_to_enquiry(row: &SqliteRow) -> Result<Enquiry> {
    let status: String = row.get("status");
    let response_data: String = row.get("response_data");

    Ok(Enquiry {
        id: row.get("id"),
        survey_id: row.get("survey_id"),
        survey_name: row.get("survey_name"),
        post_id: row.get("post_id"),
        post_title: row.get("post_title"),
        respondent_name: row.get("respondent_name"),
        respondent_email: row.get("respondent_email"),
        status: EnquiryStatus::from_str(&status)
            .with_context(|| format!("Unknown enquiry status: {}", status))?,
        response_data: serde_json::from_str(&response_data)
            .unwrap_or_else(|_| serde_json::json!({})),
        created_at: row.get("created_at"),
    })
}
