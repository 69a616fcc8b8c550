//! Broadcast hub for live chat events
//!
//! Each conversation gets its own broadcast channel, created lazily on first
//! subscription. Every event is also sent on the admin channel, which the
//! dashboard stream and the new-chat alert listener subscribe to.

use crate::models::ChatEvent;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

/// Buffered events per channel before slow receivers start lagging
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

pub struct ChatHub {
    conversations: RwLock<HashMap<String, broadcast::Sender<ChatEvent>>>,
    admin: broadcast::Sender<ChatEvent>,
    capacity: usize,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (admin, _) = broadcast::channel(capacity);
        Self {
            conversations: RwLock::new(HashMap::new()),
            admin,
            capacity,
        }
    }

    /// Receive events for one conversation
    pub async fn subscribe_conversation(&self, conversation_id: &str) -> broadcast::Receiver<ChatEvent> {
        let mut channels = self.conversations.write().await;
        channels
            .entry(conversation_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Receive every event from every conversation
    pub fn subscribe_admin(&self) -> broadcast::Receiver<ChatEvent> {
        self.admin.subscribe()
    }

    /// Publish an event to its conversation channel and the admin channel.
    ///
    /// Returns how many receivers got it. Nobody listening is not an error.
    pub async fn publish(&self, event: ChatEvent) -> usize {
        let mut delivered = 0;

        {
            let channels = self.conversations.read().await;
            if let Some(sender) = channels.get(event.conversation_id()) {
                delivered += sender.send(event.clone()).unwrap_or(0);
            }
        }
        delivered += self.admin.send(event).unwrap_or(0);

        delivered
    }

    /// Drop conversation channels nobody is subscribed to
    pub async fn prune(&self) -> usize {
        let mut channels = self.conversations.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    pub async fn channel_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SenderType, TypingState};
    use chrono::Utc;

    fn typing(conversation_id: &str) -> ChatEvent {
        ChatEvent::Typing(TypingState {
            conversation_id: conversation_id.to_string(),
            sender_type: SenderType::Visitor,
            is_typing: true,
            updated_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let hub = ChatHub::new();
        assert_eq!(hub.publish(typing("c1")).await, 0);
        assert_eq!(hub.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_conversation_and_admin_receive() {
        let hub = ChatHub::new();
        let mut conv = hub.subscribe_conversation("c1").await;
        let mut other = hub.subscribe_conversation("c2").await;
        let mut admin = hub.subscribe_admin();

        assert_eq!(hub.publish(typing("c1")).await, 2);

        assert_eq!(conv.recv().await.unwrap().conversation_id(), "c1");
        assert_eq!(admin.recv().await.unwrap().conversation_id(), "c1");
        assert!(matches!(
            other.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_prune_removes_unused_channels() {
        let hub = ChatHub::new();
        let kept = hub.subscribe_conversation("kept").await;
        {
            let _dropped = hub.subscribe_conversation("dropped").await;
        }

        assert_eq!(hub.channel_count().await, 2);
        assert_eq!(hub.prune().await, 1);
        assert_eq!(hub.channel_count().await, 1);
        drop(kept);
    }

    #[tokio::test]
    async fn test_lagged_receiver_continues() {
        let hub = ChatHub::with_capacity(2);
        let mut conv = hub.subscribe_conversation("c1").await;

        for _ in 0..5 {
            hub.publish(typing("c1")).await;
        }

        assert!(matches!(
            conv.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert!(conv.recv().await.is_ok());
    }
}
