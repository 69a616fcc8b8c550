//! Admin new-chat alert
//!
//! A pending alert makes the dashboard favicon flash between the site icon
//! and the alert icon until an admin dismisses it. Dismissal is a
//! test-and-set: of two concurrent dismissals exactly one gets the alert.

use crate::models::{ChatEvent, Conversation};
use crate::realtime::ChatHub;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

pub const ORIGINAL_FAVICON: &str = "/favicon.png";
pub const ALERT_FAVICON: &str = "/favicon-alert.svg";

/// Alert waiting for an admin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingAlert {
    pub conversation: Conversation,
    pub reopened: bool,
    pub raised_at: DateTime<Utc>,
}

/// Favicon the dashboard should show right now
#[derive(Debug, Clone, Serialize)]
pub struct FaviconState {
    pub favicon: &'static str,
    pub alert_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<PendingAlert>,
}

pub struct ChatAlert {
    pending: Mutex<Option<PendingAlert>>,
    interval_ms: i64,
}

impl ChatAlert {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            pending: Mutex::new(None),
            interval_ms: interval_ms.clamp(1, i64::MAX as u64) as i64,
        }
    }

    /// Raise an alert, replacing any pending one
    pub async fn raise(&self, conversation: Conversation, reopened: bool, now: DateTime<Utc>) {
        let mut pending = self.pending.lock().await;
        *pending = Some(PendingAlert {
            conversation,
            reopened,
            raised_at: now,
        });
    }

    /// Take the pending alert, leaving none behind
    pub async fn dismiss(&self) -> Option<PendingAlert> {
        self.pending.lock().await.take()
    }

    pub async fn pending(&self) -> Option<PendingAlert> {
        self.pending.lock().await.clone()
    }

    pub async fn current_favicon(&self, now: DateTime<Utc>) -> FaviconState {
        let pending = self.pending.lock().await.clone();
        let favicon = match &pending {
            Some(alert) => favicon_for_phase(alert.raised_at, now, self.interval_ms),
            None => ORIGINAL_FAVICON,
        };

        FaviconState {
            favicon,
            alert_active: pending.is_some(),
            alert: pending,
        }
    }
}

/// Odd phases since the alert was raised show the alert icon
fn favicon_for_phase(raised_at: DateTime<Utc>, now: DateTime<Utc>, interval_ms: i64) -> &'static str {
    let elapsed = (now - raised_at).num_milliseconds().max(0);
    if (elapsed / interval_ms) % 2 == 1 {
        ALERT_FAVICON
    } else {
        ORIGINAL_FAVICON
    }
}

/// Raise the alert whenever a conversation starts or is reopened
pub fn spawn_alert_listener(hub: &ChatHub, alert: Arc<ChatAlert>) -> JoinHandle<()> {
    let mut events = hub.subscribe_admin();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ChatEvent::ConversationStarted(conversation)) => {
                    tracing::info!(conversation_id = %conversation.id, "New chat alert raised");
                    alert.raise(conversation, false, Utc::now()).await;
                }
                Ok(ChatEvent::ConversationReopened(conversation)) => {
                    tracing::info!(conversation_id = %conversation.id, "Reopened chat alert raised");
                    alert.raise(conversation, true, Utc::now()).await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Alert listener lagged behind chat events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
