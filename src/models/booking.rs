//! Booking model
//!
//! Meeting slots from the scheduling API and booking requests made through
//! the site's booking widget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bookable slot returned by the scheduling API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableTime {
    pub status: String,
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitees_remaining: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling_url: Option<String>,
}

impl AvailableTime {
    pub fn is_available(&self) -> bool {
        self.status == "available"
    }
}

/// Booking submitted by a visitor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingRequest {
    #[serde(default)]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub event_type_uri: Option<String>,
    /// RFC 3339 slot start
    pub start_time: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Stored booking request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: i64,
    pub post_id: Option<i64>,
    pub event_type_uri: Option<String>,
    pub start_time: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub message: Option<String>,
    pub timezone: Option<String>,
    pub scheduling_url: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a booking: where the visitor completes the reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingResponse {
    pub success: bool,
    pub booking_id: i64,
    pub scheduling_url: String,
}
