//! Live chat service
//!
//! Conversation lifecycle and message exchange between site visitors and the
//! admin. Every state change is persisted first and then published on the
//! realtime hub; new and reopened conversations also trigger an email
//! notification in the background.

use crate::config::ChatConfig;
use crate::db::repositories::{ConversationRepository, PostRepository};
use crate::models::{
    ChatEvent, ChatMessage, Conversation, ConversationStatus, ConversationSummary,
    ConversationWithMessages, ReadReceipt, SenderType,
};
use crate::realtime::{ChatHub, TypingTracker};
use crate::services::notification::{ChatNotification, ChatNotifier};
use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

pub const VISITOR_ID_MIN_LEN: usize = 8;
pub const VISITOR_ID_MAX_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ChatServiceError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The conversation is in the wrong state for the request
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Visitor request to open a chat
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartConversation {
    pub visitor_id: String,
    #[serde(default)]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub consent_given: bool,
}

pub struct ChatService {
    conversations: Arc<dyn ConversationRepository>,
    posts: Arc<dyn PostRepository>,
    hub: Arc<ChatHub>,
    typing: Arc<TypingTracker>,
    notifier: Arc<ChatNotifier>,
    max_message_length: usize,
}

impl ChatService {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        posts: Arc<dyn PostRepository>,
        hub: Arc<ChatHub>,
        typing: Arc<TypingTracker>,
        notifier: Arc<ChatNotifier>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            conversations,
            posts,
            hub,
            typing,
            notifier,
            max_message_length: config.max_message_length,
        }
    }

    pub fn hub(&self) -> &Arc<ChatHub> {
        &self.hub
    }

    /// Open a conversation, or return the visitor's open one for the same post.
    ///
    /// The flag is true when a new conversation was created.
    pub async fn start_conversation(
        &self,
        request: StartConversation,
    ) -> Result<(Conversation, bool), ChatServiceError> {
        if !request.consent_given {
            return Err(ChatServiceError::ValidationError(
                "Consent is required to start a chat".to_string(),
            ));
        }
        validate_visitor_id(&request.visitor_id)?;

        let post_title = match request.post_id {
            Some(post_id) => Some(
                self.posts
                    .get_by_id(post_id)
                    .await
                    .context("Failed to look up post")?
                    .ok_or_else(|| {
                        ChatServiceError::ValidationError(format!("Post {} does not exist", post_id))
                    })?
                    .title,
            ),
            None => None,
        };

        if let Some(existing) = self
            .conversations
            .find_open(&request.visitor_id, request.post_id)
            .await
            .context("Failed to look up open conversation")?
        {
            return Ok((existing, false));
        }

        let source_url = request.source_url.filter(|u| !u.trim().is_empty());
        let candidate = Conversation::new(request.visitor_id, request.post_id, source_url);
        let conversation = match self
            .conversations
            .create(&candidate)
            .await
            .context("Failed to create conversation")?
        {
            Some(conversation) => conversation,
            None => {
                // A concurrent start for the same visitor and post got there first
                let existing = self
                    .conversations
                    .find_open(&candidate.visitor_id, candidate.post_id)
                    .await
                    .context("Failed to look up open conversation")?
                    .ok_or_else(|| {
                        ChatServiceError::Conflict("Conversation changed while starting".to_string())
                    })?;
                return Ok((existing, false));
            }
        };

        tracing::info!(
            conversation_id = %conversation.id,
            post_id = ?conversation.post_id,
            "Chat conversation started"
        );

        self.hub
            .publish(ChatEvent::ConversationStarted(conversation.clone()))
            .await;
        self.notifier.dispatch(ChatNotification {
            conversation_id: conversation.id.clone(),
            visitor_id: conversation.visitor_id.clone(),
            post_title,
            source_url: conversation.source_url.clone(),
            is_reopen: false,
        });

        Ok((conversation, true))
    }

    /// Conversation owned by `visitor_id`. Someone else's id reads as missing.
    pub async fn authorize_visitor(&self, id: &str, visitor_id: &str) -> Result<Conversation, ChatServiceError> {
        let conversation = self.find(id).await?;
        if conversation.visitor_id != visitor_id {
            return Err(ChatServiceError::NotFound(id.to_string()));
        }
        Ok(conversation)
    }

    /// Visitor view of a conversation with its messages
    pub async fn get_conversation(
        &self,
        id: &str,
        visitor_id: &str,
    ) -> Result<ConversationWithMessages, ChatServiceError> {
        let conversation = self.authorize_visitor(id, visitor_id).await?;
        self.with_messages(conversation).await
    }

    /// Admin view of a conversation with its messages
    pub async fn get_conversation_admin(&self, id: &str) -> Result<ConversationWithMessages, ChatServiceError> {
        let conversation = self.find(id).await?;
        self.with_messages(conversation).await
    }

    pub async fn send_message(
        &self,
        id: &str,
        sender: SenderType,
        content: &str,
    ) -> Result<ChatMessage, ChatServiceError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatServiceError::ValidationError("Message cannot be empty".to_string()));
        }
        let length = content.chars().count();
        if length > self.max_message_length {
            return Err(ChatServiceError::ValidationError(format!(
                "Message is {} characters, the limit is {}",
                length, self.max_message_length
            )));
        }

        let conversation = self.find(id).await?;
        if !conversation.is_open() {
            return Err(not_open(&conversation));
        }

        let now = Utc::now();
        let Some(message) = self
            .conversations
            .add_message(id, sender, content, now)
            .await
            .context("Failed to store chat message")?
        else {
            // Closed or archived since the check above
            return Err(not_open(&self.find(id).await?));
        };

        tracing::debug!(conversation_id = %id, sender = sender.as_str(), message_id = message.id, "Chat message stored");

        if let Some(stopped) = self.typing.set(id, sender, false, now).await {
            self.hub.publish(ChatEvent::Typing(stopped)).await;
        }
        self.hub.publish(ChatEvent::MessageCreated(message.clone())).await;

        Ok(message)
    }

    /// Update a typing indicator. Returns true when an event was published.
    pub async fn set_typing(&self, id: &str, sender: SenderType, is_typing: bool) -> Result<bool, ChatServiceError> {
        let conversation = self.find(id).await?;
        if is_typing && !conversation.is_open() {
            return Ok(false);
        }

        match self.typing.set(id, sender, is_typing, Utc::now()).await {
            Some(state) => {
                self.hub.publish(ChatEvent::Typing(state)).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Mark the other party's messages as read by `reader`
    pub async fn mark_read(&self, id: &str, reader: SenderType) -> Result<u64, ChatServiceError> {
        self.find(id).await?;

        let now = Utc::now();
        let count = self
            .conversations
            .mark_read(id, reader.counterpart(), now)
            .await
            .context("Failed to mark messages read")?;

        if count > 0 {
            self.hub
                .publish(ChatEvent::MessagesRead(ReadReceipt {
                    conversation_id: id.to_string(),
                    reader,
                    count,
                    read_at: now,
                }))
                .await;
        }
        Ok(count)
    }

    /// Reopen a closed conversation. Reopening an open one changes nothing.
    pub async fn reopen(&self, id: &str, visitor_id: &str) -> Result<Conversation, ChatServiceError> {
        self.authorize_visitor(id, visitor_id).await?;

        let reopened = match self
            .transition(id, ConversationStatus::Open, &[ConversationStatus::Closed])
            .await?
        {
            Transition::Changed(conversation) => conversation,
            Transition::Unchanged(conversation) => {
                return match conversation.status {
                    ConversationStatus::Open => Ok(conversation),
                    ConversationStatus::Archived => Err(ChatServiceError::Conflict(
                        "Archived conversations cannot be reopened".to_string(),
                    )),
                    ConversationStatus::Closed => Err(ChatServiceError::Conflict(
                        "Visitor already has an open conversation for this post".to_string(),
                    )),
                }
            }
        };
        tracing::info!(conversation_id = %id, "Chat conversation reopened");

        self.hub
            .publish(ChatEvent::ConversationReopened(reopened.clone()))
            .await;

        let post_title = self.notification_post_title(&reopened).await;
        self.notifier.dispatch(ChatNotification {
            conversation_id: reopened.id.clone(),
            visitor_id: reopened.visitor_id.clone(),
            post_title,
            source_url: reopened.source_url.clone(),
            is_reopen: true,
        });

        Ok(reopened)
    }

    /// Admin listing ordered by last activity
    pub async fn list_conversations(
        &self,
        status: Option<ConversationStatus>,
    ) -> Result<Vec<ConversationSummary>, ChatServiceError> {
        Ok(self
            .conversations
            .list(status)
            .await
            .context("Failed to list conversations")?)
    }

    /// Close an open conversation. Closing a closed one changes nothing.
    pub async fn close(&self, id: &str) -> Result<Conversation, ChatServiceError> {
        match self
            .transition(id, ConversationStatus::Closed, &[ConversationStatus::Open])
            .await?
        {
            Transition::Changed(closed) => Ok(self.announce_status(closed).await),
            Transition::Unchanged(conversation) => match conversation.status {
                ConversationStatus::Closed => Ok(conversation),
                ConversationStatus::Archived => Err(ChatServiceError::Conflict(
                    "Archived conversations cannot be closed".to_string(),
                )),
                ConversationStatus::Open => Err(ChatServiceError::Conflict(
                    "Conversation changed while closing".to_string(),
                )),
            },
        }
    }

    /// Archive a conversation. Archiving an archived one changes nothing.
    pub async fn archive(&self, id: &str) -> Result<Conversation, ChatServiceError> {
        match self
            .transition(
                id,
                ConversationStatus::Archived,
                &[ConversationStatus::Open, ConversationStatus::Closed],
            )
            .await?
        {
            Transition::Changed(archived) => Ok(self.announce_status(archived).await),
            Transition::Unchanged(conversation) if conversation.status == ConversationStatus::Archived => {
                Ok(conversation)
            }
            Transition::Unchanged(_) => Err(ChatServiceError::Conflict(
                "Conversation changed while archiving".to_string(),
            )),
        }
    }

    async fn announce_status(&self, conversation: Conversation) -> Conversation {
        tracing::info!(
            conversation_id = %conversation.id,
            status = conversation.status.as_str(),
            "Chat conversation status changed"
        );

        for stopped in self.typing.clear_conversation(&conversation.id, Utc::now()).await {
            self.hub.publish(ChatEvent::Typing(stopped)).await;
        }
        self.hub
            .publish(ChatEvent::ConversationStatusChanged(conversation.clone()))
            .await;

        conversation
    }

    /// Conditional status change. The conversation is re-read either way so
    /// callers can tell a lost race from a missing conversation.
    async fn transition(
        &self,
        id: &str,
        to: ConversationStatus,
        from: &[ConversationStatus],
    ) -> Result<Transition, ChatServiceError> {
        let changed = self
            .conversations
            .update_status(id, to, from, Utc::now())
            .await
            .context("Failed to update conversation status")?;
        let conversation = self.find(id).await?;

        Ok(if changed {
            Transition::Changed(conversation)
        } else {
            Transition::Unchanged(conversation)
        })
    }

    /// Post title for a notification. Lookup failures only cost the title.
    async fn notification_post_title(&self, conversation: &Conversation) -> Option<String> {
        let post_id = conversation.post_id?;
        match self.posts.get_by_id(post_id).await {
            Ok(post) => post.map(|p| p.title),
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation.id,
                    post_id,
                    "Failed to look up post title for notification: {:#}",
                    e
                );
                None
            }
        }
    }

    async fn find(&self, id: &str) -> Result<Conversation, ChatServiceError> {
        self.conversations
            .get_by_id(id)
            .await
            .context("Failed to get conversation")?
            .ok_or_else(|| ChatServiceError::NotFound(id.to_string()))
    }

    async fn with_messages(&self, conversation: Conversation) -> Result<ConversationWithMessages, ChatServiceError> {
        let messages = self
            .conversations
            .list_messages(&conversation.id)
            .await
            .context("Failed to list chat messages")?;
        Ok(ConversationWithMessages {
            conversation,
            messages,
        })
    }
}

enum Transition {
    Changed(Conversation),
    Unchanged(Conversation),
}

fn not_open(conversation: &Conversation) -> ChatServiceError {
    ChatServiceError::Conflict(format!("Conversation is {}", conversation.status.as_str()))
}

/// Visitor ids are 8 to 64 characters of `[A-Za-z0-9_-]`
pub fn validate_visitor_id(visitor_id: &str) -> Result<(), ChatServiceError> {
    let len = visitor_id.len();
    let charset_ok = visitor_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if !(VISITOR_ID_MIN_LEN..=VISITOR_ID_MAX_LEN).contains(&len) || !charset_ok {
        return Err(ChatServiceError::ValidationError(format!(
            "visitor_id must be {}-{} characters of letters, digits, '_' or '-'",
            VISITOR_ID_MIN_LEN, VISITOR_ID_MAX_LEN
        )));
    }
    Ok(())
}
