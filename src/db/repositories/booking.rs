//! Booking request repository

use crate::db::DbPool;
use crate::models::BookingRecord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Record a booking request
    async fn create(&self, record: &BookingRecord) -> Result<BookingRecord>;

    /// Most recent booking requests first
    async fn list_recent(&self, limit: i64) -> Result<Vec<BookingRecord>>;
}

/// SQLx-based booking repository implementation
pub struct SqlxBookingRepository {
    pool: DbPool,
}

impl SqlxBookingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn BookingRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BookingRepository for SqlxBookingRepository {
    async fn create(&self, record: &BookingRecord) -> Result<BookingRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO booking_requests (
                post_id, event_type_uri, start_time, name, email, phone, company,
                message, timezone, scheduling_url, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.post_id)
        .bind(&record.event_type_uri)
        .bind(record.start_time)
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.phone)
        .bind(&record.company)
        .bind(&record.message)
        .bind(&record.timezone)
        .bind(&record.scheduling_url)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to record booking request")?;

        Ok(BookingRecord {
            id: result.last_insert_rowid(),
            ..record.clone()
        })
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<BookingRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, event_type_uri, start_time, name, email, phone, company,
                   message, timezone, scheduling_url, created_at
            FROM booking_requests
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list booking requests")?;

        Ok(rows
            .iter()
            .map(|row| BookingRecord {
                id: row.get("id"),
                post_id: row.get("post_id"),
                event_type_uri: row.get("event_type_uri"),
                start_time: row.get("start_time"),
                name: row.get("name"),
                email: row.get("email"),
                phone: row.get("phone"),
                company: row.get("company"),
                message: row.get("message"),
                timezone: row.get("timezone"),
                scheduling_url: row.get("scheduling_url"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}
