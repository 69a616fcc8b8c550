//! Enquiry model
//!
//! Survey and contact-form submissions collected from the site.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Form an enquiry was submitted through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub id: i64,
    pub name: String,
}

/// Triage state of an enquiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnquiryStatus {
    #[default]
    New,
    Read,
    Archived,
}

impl EnquiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnquiryStatus::New => "new",
            EnquiryStatus::Read => "read",
            EnquiryStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "new" => Some(EnquiryStatus::New),
            "read" => Some(EnquiryStatus::Read),
            "archived" => Some(EnquiryStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for EnquiryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stored enquiry with the names of the survey and post it references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enquiry {
    pub id: i64,
    pub survey_id: Option<i64>,
    pub survey_name: Option<String>,
    pub post_id: Option<i64>,
    pub post_title: Option<String>,
    pub respondent_name: Option<String>,
    pub respondent_email: Option<String>,
    pub status: EnquiryStatus,
    /// Free-form answers keyed by question
    pub response_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Public submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateEnquiryInput {
    #[serde(default)]
    pub survey_id: Option<i64>,
    #[serde(default)]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub respondent_name: Option<String>,
    #[serde(default)]
    pub respondent_email: Option<String>,
    #[serde(default)]
    pub response_data: serde_json::Value,
}

/// Admin listing filter. Date bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnquiryFilter {
    pub survey_id: Option<i64>,
    pub post_id: Option<i64>,
    pub status: Option<EnquiryStatus>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}
