//! Live chat model
//!
//! Conversations between a site visitor and the site owner, their messages,
//! ephemeral typing state, and the events published to realtime subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    /// Accepting messages
    #[default]
    Open,
    /// Ended, can be reopened by the visitor
    Closed,
    /// Ended for good
    Archived,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Open => "open",
            ConversationStatus::Closed => "closed",
            ConversationStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(ConversationStatus::Open),
            "closed" => Some(ConversationStatus::Closed),
            "archived" => Some(ConversationStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Visitor,
    Admin,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::Visitor => "visitor",
            SenderType::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "visitor" => Some(SenderType::Visitor),
            "admin" => Some(SenderType::Admin),
            _ => None,
        }
    }

    /// The other party of the conversation
    pub fn counterpart(&self) -> Self {
        match self {
            SenderType::Visitor => SenderType::Admin,
            SenderType::Admin => SenderType::Visitor,
        }
    }
}

impl std::fmt::Display for SenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Live chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// UUID string
    pub id: String,
    /// Anonymous identifier kept by the visitor's browser
    pub visitor_id: String,
    /// Post the chat was started from
    pub post_id: Option<i64>,
    pub source_url: Option<String>,
    pub status: ConversationStatus,
    pub consent_given_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// A fresh open conversation with a random id
    pub fn new(visitor_id: String, post_id: Option<i64>, source_url: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            visitor_id,
            post_id,
            source_url,
            status: ConversationStatus::Open,
            consent_given_at: now,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == ConversationStatus::Open
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub conversation_id: String,
    pub sender_type: SenderType,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Conversation with its messages, as seen by the visitor widget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<ChatMessage>,
}

/// Row in the admin conversation list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub post_title: Option<String>,
    /// Visitor messages the admin has not read
    pub unread_count: i64,
    pub last_message: Option<ChatMessage>,
}

/// Ephemeral typing indicator, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingState {
    pub conversation_id: String,
    pub sender_type: SenderType,
    pub is_typing: bool,
    pub updated_at: DateTime<Utc>,
}

/// Read receipt broadcast after `mark_read`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub conversation_id: String,
    /// Party that read the messages
    pub reader: SenderType,
    pub count: u64,
    pub read_at: DateTime<Utc>,
}

/// Event published on the realtime hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChatEvent {
    ConversationStarted(Conversation),
    ConversationReopened(Conversation),
    ConversationStatusChanged(Conversation),
    MessageCreated(ChatMessage),
    Typing(TypingState),
    MessagesRead(ReadReceipt),
}

impl ChatEvent {
    /// SSE event name
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::ConversationStarted(_) => "conversation_started",
            ChatEvent::ConversationReopened(_) => "conversation_reopened",
            ChatEvent::ConversationStatusChanged(_) => "conversation_status_changed",
            ChatEvent::MessageCreated(_) => "message_created",
            ChatEvent::Typing(_) => "typing",
            ChatEvent::MessagesRead(_) => "messages_read",
        }
    }

    /// Conversation the event belongs to
    pub fn conversation_id(&self) -> &str {
        match self {
            ChatEvent::ConversationStarted(c)
            | ChatEvent::ConversationReopened(c)
            | ChatEvent::ConversationStatusChanged(c) => &c.id,
            ChatEvent::MessageCreated(m) => &m.conversation_id,
            ChatEvent::Typing(t) => &t.conversation_id,
            ChatEvent::MessagesRead(r) => &r.conversation_id,
        }
    }
}
