//! Live chat repository
//!
//! Conversations and their messages. Typing state is ephemeral and never
//! reaches this layer.

use crate::db::DbPool;
use crate::models::{ChatMessage, Conversation, ConversationStatus, ConversationSummary, SenderType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

/// Conversation repository trait
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Insert a conversation. Returns None when the visitor already has an
    /// open conversation for the same post.
    async fn create(&self, conversation: &Conversation) -> Result<Option<Conversation>>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Conversation>>;

    /// The visitor's open conversation for the same post (or for no post)
    async fn find_open(&self, visitor_id: &str, post_id: Option<i64>) -> Result<Option<Conversation>>;

    /// Move to `status` if the current status is one of `from`.
    ///
    /// Returns false when nothing changed: the conversation is missing, in
    /// another state, or reopening it would give the visitor a second open
    /// conversation for the same post.
    async fn update_status(
        &self,
        id: &str,
        status: ConversationStatus,
        from: &[ConversationStatus],
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Conversations by last activity, newest first, with unread counts
    async fn list(&self, status: Option<ConversationStatus>) -> Result<Vec<ConversationSummary>>;

    /// Store a message and bump the conversation's last_message_at.
    /// Returns None unless the conversation is open.
    async fn add_message(
        &self,
        conversation_id: &str,
        sender: SenderType,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ChatMessage>>;

    /// Messages ordered by (created_at, id)
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>>;

    /// Set read_at on unread messages written by `author`. Returns rows updated.
    async fn mark_read(&self, conversation_id: &str, author: SenderType, at: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based conversation repository implementation
pub struct SqlxConversationRepository {
    pool: DbPool,
}

impl SqlxConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn ConversationRepository> {
        Arc::new(Self::new(pool))
    }
}

const CONVERSATION_COLUMNS: &str = r#"
    c.id, c.visitor_id, c.post_id, c.source_url, c.status, c.consent_given_at,
    c.last_message_at, c.created_at, c.updated_at
"#;

#[async_trait]
impl ConversationRepository for SqlxConversationRepository {
    async fn create(&self, conversation: &Conversation) -> Result<Option<Conversation>> {
        let result = sqlx::query(
            r#"
            INSERT INTO chat_conversations (
                id, visitor_id, post_id, source_url, status, consent_given_at,
                last_message_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&conversation.id)
        .bind(&conversation.visitor_id)
        .bind(conversation.post_id)
        .bind(&conversation.source_url)
        .bind(conversation.status.as_str())
        .bind(conversation.consent_given_at)
        .bind(conversation.last_message_at)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to create conversation")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(conversation.clone()))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM chat_conversations c WHERE c.id = ?",
            CONVERSATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get conversation")?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn find_open(&self, visitor_id: &str, post_id: Option<i64>) -> Result<Option<Conversation>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM chat_conversations c
            WHERE c.visitor_id = ? AND c.post_id IS ? AND c.status = 'open'
            ORDER BY c.created_at DESC
            LIMIT 1
            "#,
            CONVERSATION_COLUMNS
        ))
        .bind(visitor_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find open conversation")?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn update_status(
        &self,
        id: &str,
        status: ConversationStatus,
        from: &[ConversationStatus],
        at: DateTime<Utc>,
    ) -> Result<bool> {
        if from.is_empty() {
            return Ok(false);
        }

        // OR IGNORE skips a reopen that would collide with the open-scope index
        let sql = format!(
            "UPDATE OR IGNORE chat_conversations SET status = ?, updated_at = ? WHERE id = ? AND status IN ({})",
            vec!["?"; from.len()].join(", ")
        );
        let mut query = sqlx::query(&sql).bind(status.as_str()).bind(at).bind(id);
        for state in from {
            query = query.bind(state.as_str());
        }

        let result = query
            .execute(&self.pool)
            .await
            .context("Failed to update conversation status")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, status: Option<ConversationStatus>) -> Result<Vec<ConversationSummary>> {
        let mut sql = format!(
            r#"
            SELECT {},
                p.title AS post_title,
                (SELECT COUNT(*) FROM chat_messages m
                 WHERE m.conversation_id = c.id AND m.sender_type = 'visitor' AND m.read_at IS NULL) AS unread_count
            FROM chat_conversations c
            LEFT JOIN posts p ON p.id = c.post_id
            "#,
            CONVERSATION_COLUMNS
        );
        if status.is_some() {
            sql.push_str(" WHERE c.status = ?");
        }
        sql.push_str(" ORDER BY COALESCE(c.last_message_at, c.created_at) DESC, c.created_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list conversations")?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let conversation = row_to_conversation(row)?;
            let last_message = last_message(&self.pool, &conversation.id).await?;
            summaries.push(ConversationSummary {
                post_title: row.get("post_title"),
                unread_count: row.get("unread_count"),
                last_message,
                conversation,
            });
        }

        Ok(summaries)
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        sender: SenderType,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ChatMessage>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let result = sqlx::query(
            r#"
            INSERT INTO chat_messages (conversation_id, sender_type, content, created_at)
            SELECT ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM chat_conversations WHERE id = ? AND status = 'open')
            "#,
        )
        .bind(conversation_id)
        .bind(sender.as_str())
        .bind(content)
        .bind(at)
        .bind(conversation_id)
        .execute(&mut *tx)
        .await
        .context("Failed to insert message")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query("UPDATE chat_conversations SET last_message_at = ?, updated_at = ? WHERE id = ?")
            .bind(at)
            .bind(at)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update last_message_at")?;

        tx.commit().await.context("Failed to commit message")?;

        Ok(Some(ChatMessage {
            id: result.last_insert_rowid(),
            conversation_id: conversation_id.to_string(),
            sender_type: sender,
            content: content.to_string(),
            created_at: at,
            read_at: None,
        }))
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, sender_type, content, created_at, read_at
            FROM chat_messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list messages")?;

        rows.iter().map(row_to_message).collect()
    }

    async fn mark_read(&self, conversation_id: &str, author: SenderType, at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE chat_messages SET read_at = ?
            WHERE conversation_id = ? AND sender_type = ? AND read_at IS NULL
            "#,
        )
        .bind(at)
        .bind(conversation_id)
        .bind(author.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to mark messages read")?;

        Ok(result.rows_affected())
    }
}

async fn last_message(pool: &DbPool, conversation_id: &str) -> Result<Option<ChatMessage>> {
    let row = sqlx::query(
        r#"
        SELECT id, conversation_id, sender_type, content, created_at, read_at
        FROM chat_messages
        WHERE conversation_id = ?
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(conversation_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get last message")?;

    row.as_ref().map(row_to_message).transpose()
}

fn row_to_conversation(row: &SqliteRow) -> Result<Conversation> {
    let status: String = row.get("status");

    Ok(Conversation {
        id: row.get("id"),
        visitor_id: row.get("visitor_id"),
        post_id: row.get("post_id"),
        source_url: row.get("source_url"),
        status: ConversationStatus::from_str(&status)
            .with_context(|| format!("Unknown conversation status: {}", status))?,
        consent_given_at: row.get("consent_given_at"),
        last_message_at: row.get("last_message_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_message(row: &SqliteRow) -> Result<ChatMessage> {
    let sender: String = row.get("sender_type");

    Ok(ChatMessage {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_type: SenderType::from_str(&sender)
            .with_context(|| format!("Unknown sender type: {}", sender))?,
        content: row.get("content"),
        created_at: row.get("created_at"),
        read_at: row.get("read_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> SqlxConversationRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxConversationRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_find_open() {
        let repo = setup_test_repo().await;

        let conversation = Conversation::new("visitor-0001".to_string(), None, None);
        assert!(repo.create(&conversation).await.unwrap().is_some());

        let found = repo.find_open("visitor-0001", None).await.unwrap();
        assert_eq!(found.map(|c| c.id), Some(conversation.id.clone()));

        // Different post scope does not match
        assert!(repo.find_open("visitor-0001", Some(7)).await.unwrap().is_none());

        repo.update_status(&conversation.id, ConversationStatus::Closed, &[ConversationStatus::Open], Utc::now())
            .await
            .unwrap();
        assert!(repo.find_open("visitor-0001", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status_missing_returns_false() {
        let repo = setup_test_repo().await;
        let updated = repo
            .update_status("missing", ConversationStatus::Closed, &[ConversationStatus::Open], Utc::now())
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_second_open_conversation_in_scope_is_ignored() {
        let repo = setup_test_repo().await;

        let first = Conversation::new("visitor-0001".to_string(), None, None);
        let second = Conversation::new("visitor-0001".to_string(), None, None);
        assert!(repo.create(&first).await.unwrap().is_some());
        assert!(repo.create(&second).await.unwrap().is_none());
        assert!(repo.get_by_id(&second.id).await.unwrap().is_none());

        // A closed conversation frees the scope
        repo.update_status(&first.id, ConversationStatus::Closed, &[ConversationStatus::Open], Utc::now())
            .await
            .unwrap();
        assert!(repo.create(&second).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_status_checks_current_status() {
        let repo = setup_test_repo().await;
        let conversation = Conversation::new("visitor-0001".to_string(), None, None);
        repo.create(&conversation).await.unwrap();
        let now = Utc::now();

        assert!(repo
            .update_status(&conversation.id, ConversationStatus::Archived, &[ConversationStatus::Open], now)
            .await
            .unwrap());
        // Archived is not an allowed starting point for close
        assert!(!repo
            .update_status(&conversation.id, ConversationStatus::Closed, &[ConversationStatus::Open], now)
            .await
            .unwrap());

        let stored = repo.get_by_id(&conversation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConversationStatus::Archived);
    }

    #[tokio::test]
    async fn test_reopen_ignored_when_scope_already_open() {
        let repo = setup_test_repo().await;
        let now = Utc::now();

        let old = Conversation::new("visitor-0001".to_string(), None, None);
        repo.create(&old).await.unwrap();
        repo.update_status(&old.id, ConversationStatus::Closed, &[ConversationStatus::Open], now)
            .await
            .unwrap();
        let current = Conversation::new("visitor-0001".to_string(), None, None);
        repo.create(&current).await.unwrap();

        assert!(!repo
            .update_status(&old.id, ConversationStatus::Open, &[ConversationStatus::Closed], now)
            .await
            .unwrap());
        let stored = repo.get_by_id(&old.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConversationStatus::Closed);
    }

    #[tokio::test]
    async fn test_add_message_requires_open_conversation() {
        let repo = setup_test_repo().await;
        let conversation = Conversation::new("visitor-0001".to_string(), None, None);
        repo.create(&conversation).await.unwrap();
        let now = Utc::now();

        repo.update_status(&conversation.id, ConversationStatus::Closed, &[ConversationStatus::Open], now)
            .await
            .unwrap();

        let stored = repo
            .add_message(&conversation.id, SenderType::Visitor, "too late", now)
            .await
            .unwrap();
        assert!(stored.is_none());
        assert!(repo.list_messages(&conversation.id).await.unwrap().is_empty());

        let after = repo.get_by_id(&conversation.id).await.unwrap().unwrap();
        assert!(after.last_message_at.is_none());
    }

    #[tokio::test]
    async fn test_messages_ordered_and_last_message_at_bumped() {
        let repo = setup_test_repo().await;
        let conversation = repo
            .create(&Conversation::new("visitor-0002".to_string(), None, None))
            .await
            .unwrap()
            .unwrap();

        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);
        repo.add_message(&conversation.id, SenderType::Visitor, "first", t0).await.unwrap();
        repo.add_message(&conversation.id, SenderType::Admin, "second", t1).await.unwrap();
        // Same timestamp as the first: ordered by id after it
        repo.add_message(&conversation.id, SenderType::Visitor, "third", t0).await.unwrap();

        let messages = repo.list_messages(&conversation.id).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "third", "second"]);

        let stored = repo.get_by_id(&conversation.id).await.unwrap().unwrap();
        assert_eq!(stored.last_message_at, Some(t0));
    }

    #[tokio::test]
    async fn test_mark_read_only_touches_author_messages() {
        let repo = setup_test_repo().await;
        let conversation = repo
            .create(&Conversation::new("visitor-0003".to_string(), None, None))
            .await
            .unwrap()
            .unwrap();
        let now = Utc::now();

        repo.add_message(&conversation.id, SenderType::Visitor, "hi", now).await.unwrap();
        repo.add_message(&conversation.id, SenderType::Visitor, "anyone?", now).await.unwrap();
        repo.add_message(&conversation.id, SenderType::Admin, "hello", now).await.unwrap();

        assert_eq!(repo.mark_read(&conversation.id, SenderType::Visitor, now).await.unwrap(), 2);
        assert_eq!(repo.mark_read(&conversation.id, SenderType::Visitor, now).await.unwrap(), 0);

        let messages = repo.list_messages(&conversation.id).await.unwrap();
        let admin = messages.iter().find(|m| m.sender_type == SenderType::Admin).unwrap();
        assert!(admin.read_at.is_none());
    }

    #[tokio::test]
    async fn test_list_summaries() {
        let repo = setup_test_repo().await;
        let now = Utc::now();

        let quiet = repo
            .create(&Conversation::new("visitor-quiet".to_string(), None, None))
            .await
            .unwrap()
            .unwrap();
        let busy = repo
            .create(&Conversation::new("visitor-busy".to_string(), None, None))
            .await
            .unwrap()
            .unwrap();
        repo.add_message(&busy.id, SenderType::Visitor, "ping", now + Duration::seconds(5))
            .await
            .unwrap();

        let all = repo.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].conversation.id, busy.id);
        assert_eq!(all[0].unread_count, 1);
        assert_eq!(all[0].last_message.as_ref().map(|m| m.content.as_str()), Some("ping"));
        assert!(all[1].last_message.is_none());

        repo.update_status(&quiet.id, ConversationStatus::Archived, &[ConversationStatus::Open], now)
            .await
            .unwrap();
        let open = repo.list(Some(ConversationStatus::Open)).await.unwrap();
        assert_eq!(open.len(), 1);
    }
}
