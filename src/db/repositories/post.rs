//! Post repository
//!
//! Database operations for posts and the records owned by a post: its tag
//! links, FAQs and manual related-post links. Writes that touch several
//! tables run in one transaction.

use crate::db::DbPool;
use crate::models::{Faq, ListParams, Post, PostStatus, PostWrite};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use std::sync::Arc;

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post with its tags, FAQs and related links
    async fn create(&self, write: &PostWrite) -> Result<Post>;

    /// Replace a post and its tags, FAQs and related links
    async fn update(&self, id: i64, write: &PostWrite) -> Result<Post>;

    /// Delete a post
    async fn delete(&self, id: i64) -> Result<()>;

    /// Get post by ID regardless of status
    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Get post by slug regardless of status
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    /// Whether another post already uses the slug
    async fn slug_taken(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Admin listing, newest first, optionally by status
    async fn list(&self, params: &ListParams, status: Option<PostStatus>) -> Result<(Vec<Post>, i64)>;

    /// Published posts, newest first
    async fn list_published(&self, params: &ListParams) -> Result<(Vec<Post>, i64)>;

    /// Published posts in a category, newest first
    async fn list_published_by_category(&self, category_id: i64, params: &ListParams) -> Result<(Vec<Post>, i64)>;

    /// Published posts carrying a tag, newest first
    async fn list_published_by_tag(&self, tag_id: i64, params: &ListParams) -> Result<(Vec<Post>, i64)>;

    /// Published featured posts by featured_order
    async fn featured(&self, limit: i64) -> Result<Vec<Post>>;

    /// Published manual related posts by relevance
    async fn related_manual(&self, post_id: i64, limit: i64) -> Result<Vec<Post>>;

    /// Published posts in the same category, newest first, excluding `exclude_id`
    async fn same_category(&self, category_id: i64, exclude_id: i64, limit: i64) -> Result<Vec<Post>>;

    /// FAQs of a post in display order
    async fn get_faqs(&self, post_id: i64) -> Result<Vec<Faq>>;

    /// Increment the view counter
    async fn increment_view_count(&self, id: i64) -> Result<()>;

    /// Publish scheduled posts due at `now`. Returns the number published.
    async fn publish_due(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DbPool,
}

impl SqlxPostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

const POST_COLUMNS: &str = r#"
    p.id, p.title, p.slug, p.subtitle, p.excerpt, p.content, p.featured_image,
    p.featured_image_alt, p.og_image, p.author_id, p.category_id, p.status,
    p.published_at, p.scheduled_for, p.is_featured, p.featured_order, p.meta_title,
    p.meta_description, p.canonical_url, p.primary_keyword, p.secondary_keywords,
    p.ai_summary, p.key_takeaways, p.definitive_statements, p.questions_answered,
    p.entities, p.sources, p.read_time_minutes, p.word_count, p.view_count,
    p.calendly_enabled, p.calendly_event_type_uri, p.calendly_scheduling_url,
    p.calendly_cta_title, p.calendly_cta_description, p.created_at, p.updated_at
"#;

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, write: &PostWrite) -> Result<Post> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let id = insert_post(&mut tx, write).await?;
        replace_children(&mut tx, id, write).await?;
        tx.commit().await.context("Failed to commit post")?;

        self.get_by_id(id)
            .await?
            .context("Created post not found")
    }

    async fn update(&self, id: i64, write: &PostWrite) -> Result<Post> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        update_post(&mut tx, id, write).await?;
        replace_children(&mut tx, id, write).await?;
        tx.commit().await.context("Failed to commit post")?;

        self.get_by_id(id)
            .await?
            .context("Updated post not found")
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete post")?;
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts p WHERE p.id = ?", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get post by ID")?;

        row.as_ref().map(row_to_post).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts p WHERE p.slug = ?", POST_COLUMNS))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get post by slug")?;

        row.as_ref().map(row_to_post).transpose()
    }

    async fn slug_taken(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM posts WHERE slug = ? AND id != ?")
            .bind(slug)
            .bind(exclude_id.unwrap_or(0))
            .fetch_one(&self.pool)
            .await
            .context("Failed to check post slug")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    async fn list(&self, params: &ListParams, status: Option<PostStatus>) -> Result<(Vec<Post>, i64)> {
        match status {
            Some(status) => {
                list_where(
                    &self.pool,
                    "WHERE p.status = ?",
                    "ORDER BY p.updated_at DESC, p.id DESC",
                    Bind::Text(status.as_str().to_string()),
                    params,
                )
                .await
            }
            None => {
                list_where(
                    &self.pool,
                    "WHERE 1 = ?",
                    "ORDER BY p.updated_at DESC, p.id DESC",
                    Bind::Int(1),
                    params,
                )
                .await
            }
        }
    }

    async fn list_published(&self, params: &ListParams) -> Result<(Vec<Post>, i64)> {
        list_where(
            &self.pool,
            "WHERE p.status = ?",
            "ORDER BY p.published_at DESC, p.id DESC",
            Bind::Text(PostStatus::Published.as_str().to_string()),
            params,
        )
        .await
    }

    async fn list_published_by_category(&self, category_id: i64, params: &ListParams) -> Result<(Vec<Post>, i64)> {
        list_where(
            &self.pool,
            "WHERE p.status = 'published' AND p.category_id = ?",
            "ORDER BY p.published_at DESC, p.id DESC",
            Bind::Int(category_id),
            params,
        )
        .await
    }

    async fn list_published_by_tag(&self, tag_id: i64, params: &ListParams) -> Result<(Vec<Post>, i64)> {
        list_where(
            &self.pool,
            "WHERE p.status = 'published' AND p.id IN (SELECT post_id FROM post_tags WHERE tag_id = ?)",
            "ORDER BY p.published_at DESC, p.id DESC",
            Bind::Int(tag_id),
            params,
        )
        .await
    }

    async fn featured(&self, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM posts p
            WHERE p.status = 'published' AND p.is_featured = 1
            ORDER BY p.featured_order IS NULL, p.featured_order ASC, p.published_at DESC
            LIMIT ?
            "#,
            POST_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list featured posts")?;

        rows.iter().map(row_to_post).collect()
    }

    async fn related_manual(&self, post_id: i64, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM posts p
            INNER JOIN related_posts r ON r.related_post_id = p.id
            WHERE r.post_id = ? AND p.status = 'published' AND p.id != r.post_id
            ORDER BY r.relevance_score DESC, p.published_at DESC
            LIMIT ?
            "#,
            POST_COLUMNS
        ))
        .bind(post_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get related posts")?;

        rows.iter().map(row_to_post).collect()
    }

    async fn same_category(&self, category_id: i64, exclude_id: i64, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM posts p
            WHERE p.status = 'published' AND p.category_id = ? AND p.id != ?
            ORDER BY p.published_at DESC, p.id DESC
            LIMIT ?
            "#,
            POST_COLUMNS
        ))
        .bind(category_id)
        .bind(exclude_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get same-category posts")?;

        rows.iter().map(row_to_post).collect()
    }

    async fn get_faqs(&self, post_id: i64) -> Result<Vec<Faq>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, question, answer, display_order
            FROM faqs
            WHERE post_id = ?
            ORDER BY display_order ASC, id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get FAQs")?;

        Ok(rows
            .iter()
            .map(|row| Faq {
                id: row.get("id"),
                post_id: row.get("post_id"),
                question: row.get("question"),
                answer: row.get("answer"),
                display_order: row.get("display_order"),
            })
            .collect())
    }

    async fn increment_view_count(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to increment view count")?;
        Ok(())
    }

    async fn publish_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'published', published_at = scheduled_for, updated_at = ?
            WHERE status = 'scheduled' AND scheduled_for IS NOT NULL AND scheduled_for <= ?
            "#,
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to publish scheduled posts")?;

        Ok(result.rows_affected())
    }
}

/// Single bind value for the shared list query
enum Bind {
    Int(i64),
    Text(String),
}

async fn list_where(
    pool: &DbPool,
    where_clause: &str,
    order_clause: &str,
    bind: Bind,
    params: &ListParams,
) -> Result<(Vec<Post>, i64)> {
    let count_sql = format!("SELECT COUNT(*) as count FROM posts p {}", where_clause);
    let list_sql = format!(
        "SELECT {} FROM posts p {} {} LIMIT ? OFFSET ?",
        POST_COLUMNS, where_clause, order_clause
    );

    let count_query = sqlx::query(&count_sql);
    let list_query = sqlx::query(&list_sql);
    let (count_query, list_query) = match &bind {
        Bind::Int(v) => (count_query.bind(*v), list_query.bind(*v)),
        Bind::Text(v) => (count_query.bind(v.clone()), list_query.bind(v.clone())),
    };

    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?
        .get("count");

    let rows = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let posts = rows.iter().map(row_to_post).collect::<Result<Vec<_>>>()?;
    Ok((posts, total))
}

fn json_text<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to serialize post field")
}

async fn insert_post(tx: &mut Transaction<'_, Sqlite>, write: &PostWrite) -> Result<i64> {
    let now = Utc::now();
    let input = &write.input;

    let result = sqlx::query(
        r#"
        INSERT INTO posts (
            title, slug, subtitle, excerpt, content, featured_image, featured_image_alt, og_image,
            author_id, category_id, status, published_at, scheduled_for, is_featured, featured_order,
            meta_title, meta_description, canonical_url, primary_keyword, secondary_keywords,
            ai_summary, key_takeaways, definitive_statements, questions_answered, entities, sources,
            read_time_minutes, word_count, calendly_enabled, calendly_event_type_uri,
            calendly_scheduling_url, calendly_cta_title, calendly_cta_description, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&write.slug)
    .bind(&input.subtitle)
    .bind(&input.excerpt)
    .bind(&input.content)
    .bind(&input.featured_image)
    .bind(&input.featured_image_alt)
    .bind(&input.og_image)
    .bind(input.author_id)
    .bind(input.category_id)
    .bind(input.status.as_str())
    .bind(write.published_at)
    .bind(input.scheduled_for)
    .bind(input.is_featured)
    .bind(input.featured_order)
    .bind(&input.meta_title)
    .bind(&input.meta_description)
    .bind(&input.canonical_url)
    .bind(&input.primary_keyword)
    .bind(json_text(&input.secondary_keywords)?)
    .bind(&input.ai_summary)
    .bind(json_text(&input.key_takeaways)?)
    .bind(json_text(&input.definitive_statements)?)
    .bind(json_text(&input.questions_answered)?)
    .bind(json_text(&input.entities)?)
    .bind(json_text(&input.sources)?)
    .bind(write.read_time_minutes)
    .bind(write.word_count)
    .bind(input.calendly_enabled)
    .bind(&input.calendly_event_type_uri)
    .bind(&input.calendly_scheduling_url)
    .bind(&input.calendly_cta_title)
    .bind(&input.calendly_cta_description)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await
    .context("Failed to create post")?;

    Ok(result.last_insert_rowid())
}

async fn update_post(tx: &mut Transaction<'_, Sqlite>, id: i64, write: &PostWrite) -> Result<()> {
    let input = &write.input;

    sqlx::query(
        r#"
        UPDATE posts SET
            title = ?, slug = ?, subtitle = ?, excerpt = ?, content = ?, featured_image = ?,
            featured_image_alt = ?, og_image = ?, author_id = ?, category_id = ?, status = ?,
            published_at = ?, scheduled_for = ?, is_featured = ?, featured_order = ?,
            meta_title = ?, meta_description = ?, canonical_url = ?, primary_keyword = ?,
            secondary_keywords = ?, ai_summary = ?, key_takeaways = ?, definitive_statements = ?,
            questions_answered = ?, entities = ?, sources = ?, read_time_minutes = ?,
            word_count = ?, calendly_enabled = ?, calendly_event_type_uri = ?,
            calendly_scheduling_url = ?, calendly_cta_title = ?, calendly_cta_description = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.title)
    .bind(&write.slug)
    .bind(&input.subtitle)
    .bind(&input.excerpt)
    .bind(&input.content)
    .bind(&input.featured_image)
    .bind(&input.featured_image_alt)
    .bind(&input.og_image)
    .bind(input.author_id)
    .bind(input.category_id)
    .bind(input.status.as_str())
    .bind(write.published_at)
    .bind(input.scheduled_for)
    .bind(input.is_featured)
    .bind(input.featured_order)
    .bind(&input.meta_title)
    .bind(&input.meta_description)
    .bind(&input.canonical_url)
    .bind(&input.primary_keyword)
    .bind(json_text(&input.secondary_keywords)?)
    .bind(&input.ai_summary)
    .bind(json_text(&input.key_takeaways)?)
    .bind(json_text(&input.definitive_statements)?)
    .bind(json_text(&input.questions_answered)?)
    .bind(json_text(&input.entities)?)
    .bind(json_text(&input.sources)?)
    .bind(write.read_time_minutes)
    .bind(write.word_count)
    .bind(input.calendly_enabled)
    .bind(&input.calendly_event_type_uri)
    .bind(&input.calendly_scheduling_url)
    .bind(&input.calendly_cta_title)
    .bind(&input.calendly_cta_description)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut **tx)
    .await
    .context("Failed to update post")?;

    Ok(())
}

/// Replace tag links, FAQs and related links with the ones in `write`
async fn replace_children(tx: &mut Transaction<'_, Sqlite>, post_id: i64, write: &PostWrite) -> Result<()> {
    let input = &write.input;

    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut **tx)
        .await
        .context("Failed to clear post tags")?;
    for tag_id in &input.tag_ids {
        sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await
            .context("Failed to link tag")?;
    }

    sqlx::query("DELETE FROM faqs WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut **tx)
        .await
        .context("Failed to clear FAQs")?;
    for (order, faq) in input.faqs.iter().enumerate() {
        sqlx::query("INSERT INTO faqs (post_id, question, answer, display_order) VALUES (?, ?, ?, ?)")
            .bind(post_id)
            .bind(faq.question.trim())
            .bind(faq.answer.trim())
            .bind(order as i32)
            .execute(&mut **tx)
            .await
            .context("Failed to insert FAQ")?;
    }

    sqlx::query("DELETE FROM related_posts WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut **tx)
        .await
        .context("Failed to clear related posts")?;
    for related in input.related.iter().filter(|r| r.post_id != post_id) {
        sqlx::query(
            "INSERT OR REPLACE INTO related_posts (post_id, related_post_id, relevance_score) VALUES (?, ?, ?)",
        )
        .bind(post_id)
        .bind(related.post_id)
        .bind(related.relevance_score)
        .execute(&mut **tx)
        .await
        .context("Failed to link related post")?;
    }

    Ok(())
}

fn json_column<T: serde::de::DeserializeOwned + Default>(row: &SqliteRow, column: &str) -> T {
    let text: Option<String> = row.get(column);
    text.and_then(|t| serde_json::from_str(&t).ok())
        .unwrap_or_default()
}

fn row_to_post(row: &SqliteRow) -> Result<Post> {
    let status: String = row.get("status");

    Ok(Post {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        subtitle: row.get("subtitle"),
        excerpt: row.get("excerpt"),
        content: row.get("content"),
        featured_image: row.get("featured_image"),
        featured_image_alt: row.get("featured_image_alt"),
        og_image: row.get("og_image"),
        author_id: row.get("author_id"),
        category_id: row.get("category_id"),
        status: PostStatus::from_str(&status)
            .with_context(|| format!("Unknown post status: {}", status))?,
        published_at: row.get("published_at"),
        scheduled_for: row.get("scheduled_for"),
        is_featured: row.get("is_featured"),
        featured_order: row.get("featured_order"),
        meta_title: row.get("meta_title"),
        meta_description: row.get("meta_description"),
        canonical_url: row.get("canonical_url"),
        primary_keyword: row.get("primary_keyword"),
        secondary_keywords: json_column(row, "secondary_keywords"),
        ai_summary: row.get("ai_summary"),
        key_takeaways: json_column(row, "key_takeaways"),
        definitive_statements: json_column(row, "definitive_statements"),
        questions_answered: json_column(row, "questions_answered"),
        entities: json_column(row, "entities"),
        sources: json_column(row, "sources"),
        read_time_minutes: row.get("read_time_minutes"),
        word_count: row.get("word_count"),
        view_count: row.get("view_count"),
        calendly_enabled: row.get("calendly_enabled"),
        calendly_event_type_uri: row.get("calendly_event_type_uri"),
        calendly_scheduling_url: row.get("calendly_scheduling_url"),
        calendly_cta_title: row.get("calendly_cta_title"),
        calendly_cta_description: row.get("calendly_cta_description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
