//! Realtime delivery for live chat
//!
//! - `hub`: per-conversation and admin broadcast channels
//! - `typing`: ephemeral typing indicators with expiry
//! - `alert`: the admin new-chat alert and favicon flashing

pub mod alert;
pub mod hub;
pub mod typing;

pub use alert::{spawn_alert_listener, ChatAlert, FaviconState, PendingAlert};
pub use hub::ChatHub;
pub use typing::TypingTracker;

use crate::models::ChatEvent;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Periodically expire stale typing states and prune idle channels
pub fn spawn_sweeper(hub: Arc<ChatHub>, typing: Arc<TypingTracker>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            sweep(&hub, &typing).await;
        }
    })
}

async fn sweep(hub: &ChatHub, typing: &TypingTracker) {
    for state in typing.expire(Utc::now()).await {
        tracing::debug!(
            conversation_id = %state.conversation_id,
            sender = state.sender_type.as_str(),
            "Typing indicator expired"
        );
        hub.publish(ChatEvent::Typing(state)).await;
    }

    let pruned = hub.prune().await;
    if pruned > 0 {
        tracing::debug!(pruned, "Pruned idle chat channels");
    }
}
