//! Typing indicators
//!
//! Typing state lives only in memory. A state that is not refreshed within
//! the TTL expires and the sweeper announces `is_typing = false`.

use crate::models::{SenderType, TypingState};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

type TypingKey = (String, SenderType);

pub struct TypingTracker {
    active: RwLock<HashMap<TypingKey, DateTime<Utc>>>,
    ttl: Duration,
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn from_millis(ttl_ms: u64) -> Self {
        Self::new(Duration::milliseconds(ttl_ms.min(i64::MAX as u64) as i64))
    }

    /// Record a typing update.
    ///
    /// Returns the state to publish when it changed; a refresh of an already
    /// typing sender only extends its deadline.
    pub async fn set(
        &self,
        conversation_id: &str,
        sender: SenderType,
        is_typing: bool,
        now: DateTime<Utc>,
    ) -> Option<TypingState> {
        let mut active = self.active.write().await;
        let key = (conversation_id.to_string(), sender);

        let changed = if is_typing {
            active.insert(key, now).is_none()
        } else {
            active.remove(&key).is_some()
        };

        changed.then(|| TypingState {
            conversation_id: conversation_id.to_string(),
            sender_type: sender,
            is_typing,
            updated_at: now,
        })
    }

    /// Clear every sender in a conversation
    pub async fn clear_conversation(&self, conversation_id: &str, now: DateTime<Utc>) -> Vec<TypingState> {
        let mut active = self.active.write().await;
        let keys: Vec<TypingKey> = active
            .keys()
            .filter(|(id, _)| id == conversation_id)
            .cloned()
            .collect();

        keys.into_iter()
            .filter_map(|key| active.remove(&key).map(|_| stopped(key, now)))
            .collect()
    }

    /// Remove states older than the TTL
    pub async fn expire(&self, now: DateTime<Utc>) -> Vec<TypingState> {
        let mut active = self.active.write().await;
        let expired: Vec<TypingKey> = active
            .iter()
            .filter(|(_, updated_at)| now - **updated_at > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| active.remove(&key).map(|_| stopped(key, now)))
            .collect()
    }

    pub async fn is_typing(&self, conversation_id: &str, sender: SenderType) -> bool {
        self.active
            .read()
            .await
            .contains_key(&(conversation_id.to_string(), sender))
    }
}

fn stopped((conversation_id, sender_type): TypingKey, now: DateTime<Utc>) -> TypingState {
    TypingState {
        conversation_id,
        sender_type,
        is_typing: false,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_changes_are_reported() {
        let tracker = TypingTracker::from_millis(3000);
        let now = Utc::now();

        assert!(tracker.set("c1", SenderType::Visitor, true, now).await.is_some());
        assert!(tracker.set("c1", SenderType::Visitor, true, now).await.is_none());
        assert!(tracker.set("c1", SenderType::Admin, false, now).await.is_none());

        let stopped = tracker.set("c1", SenderType::Visitor, false, now).await.unwrap();
        assert!(!stopped.is_typing);
        assert!(!tracker.is_typing("c1", SenderType::Visitor).await);
    }

    #[tokio::test]
    async fn test_expire_after_ttl() {
        let tracker = TypingTracker::from_millis(3000);
        let start = Utc::now();

        tracker.set("c1", SenderType::Visitor, true, start).await;
        tracker.set("c2", SenderType::Admin, true, start + Duration::seconds(2)).await;

        assert!(tracker.expire(start + Duration::seconds(3)).await.is_empty());

        let expired = tracker.expire(start + Duration::milliseconds(3500)).await;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].conversation_id, "c1");
        assert!(!expired[0].is_typing);
        assert!(tracker.is_typing("c2", SenderType::Admin).await);
    }

    #[tokio::test]
    async fn test_refresh_extends_deadline() {
        let tracker = TypingTracker::from_millis(1000);
        let start = Utc::now();

        tracker.set("c1", SenderType::Visitor, true, start).await;
        tracker
            .set("c1", SenderType::Visitor, true, start + Duration::milliseconds(800))
            .await;

        assert!(tracker.expire(start + Duration::milliseconds(1500)).await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_conversation() {
        let tracker = TypingTracker::from_millis(3000);
        let now = Utc::now();

        tracker.set("c1", SenderType::Visitor, true, now).await;
        tracker.set("c1", SenderType::Admin, true, now).await;
        tracker.set("c2", SenderType::Visitor, true, now).await;

        assert_eq!(tracker.clear_conversation("c1", now).await.len(), 2);
        assert!(tracker.is_typing("c2", SenderType::Visitor).await);
    }
}
