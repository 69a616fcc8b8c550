//! Database migrations module
//!
//! Migrations are embedded directly in Rust code as SQL strings so the service
//! ships as a single binary.
//!
//! # Usage
//!
//! ```ignore
//! use folio::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```
//!
//! Each migration has a unique `version`, a human-readable `name`, and the `up`
//! SQL. Statements are split on `;`, so seed data must not contain semicolons
//! inside string literals.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::DbPool;

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements to apply
    pub up: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, applied in version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_authors",
        up: r#"
            CREATE TABLE IF NOT EXISTS authors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                slug VARCHAR(100) NOT NULL UNIQUE,
                bio TEXT,
                avatar_url TEXT,
                social_links TEXT NOT NULL DEFAULT '{}',
                expertise TEXT NOT NULL DEFAULT '[]',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_authors_slug ON authors(slug);
        "#,
    },
    Migration {
        version: 2,
        name: "create_categories",
        up: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                slug VARCHAR(100) NOT NULL UNIQUE,
                description TEXT,
                subtitle TEXT,
                meta_title VARCHAR(255),
                meta_description TEXT,
                color VARCHAR(20),
                icon VARCHAR(50),
                display_order INTEGER NOT NULL DEFAULT 0,
                show_in_nav INTEGER NOT NULL DEFAULT 1,
                show_on_homepage INTEGER NOT NULL DEFAULT 0,
                parent_id INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (parent_id) REFERENCES categories(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_categories_slug ON categories(slug);
            CREATE INDEX IF NOT EXISTS idx_categories_display_order ON categories(display_order);
            INSERT OR IGNORE INTO categories (name, slug, description, display_order)
            VALUES ('General', 'general', 'Posts without a more specific home', 0);
        "#,
    },
    Migration {
        version: 3,
        name: "create_tags",
        up: r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                slug VARCHAR(100) NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_tags_slug ON tags(slug);
        "#,
    },
    Migration {
        version: 4,
        name: "create_posts",
        up: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                slug VARCHAR(255) NOT NULL UNIQUE,
                subtitle TEXT,
                excerpt TEXT,
                content TEXT NOT NULL,
                featured_image TEXT,
                featured_image_alt TEXT,
                og_image TEXT,
                author_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                published_at TIMESTAMP,
                scheduled_for TIMESTAMP,
                is_featured INTEGER NOT NULL DEFAULT 0,
                featured_order INTEGER,
                meta_title VARCHAR(255),
                meta_description TEXT,
                canonical_url TEXT,
                primary_keyword VARCHAR(255),
                secondary_keywords TEXT NOT NULL DEFAULT '[]',
                ai_summary TEXT,
                key_takeaways TEXT NOT NULL DEFAULT '[]',
                definitive_statements TEXT NOT NULL DEFAULT '[]',
                questions_answered TEXT NOT NULL DEFAULT '[]',
                entities TEXT NOT NULL DEFAULT '[]',
                sources TEXT NOT NULL DEFAULT '[]',
                read_time_minutes INTEGER NOT NULL DEFAULT 1,
                word_count INTEGER NOT NULL DEFAULT 0,
                view_count INTEGER NOT NULL DEFAULT 0,
                calendly_enabled INTEGER NOT NULL DEFAULT 0,
                calendly_event_type_uri TEXT,
                calendly_scheduling_url TEXT,
                calendly_cta_title TEXT,
                calendly_cta_description TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (author_id) REFERENCES authors(id),
                FOREIGN KEY (category_id) REFERENCES categories(id)
            );
            CREATE INDEX IF NOT EXISTS idx_posts_slug ON posts(slug);
            CREATE INDEX IF NOT EXISTS idx_posts_status ON posts(status);
            CREATE INDEX IF NOT EXISTS idx_posts_published_at ON posts(published_at);
            CREATE INDEX IF NOT EXISTS idx_posts_category_id ON posts(category_id);
            CREATE INDEX IF NOT EXISTS idx_posts_scheduled_for ON posts(scheduled_for);
        "#,
    },
    Migration {
        version: 5,
        name: "create_post_relations",
        up: r#"
            CREATE TABLE IF NOT EXISTS post_tags (
                post_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (post_id, tag_id),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_post_tags_tag_id ON post_tags(tag_id);
            CREATE TABLE IF NOT EXISTS faqs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                display_order INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_faqs_post_id ON faqs(post_id);
            CREATE TABLE IF NOT EXISTS related_posts (
                post_id INTEGER NOT NULL,
                related_post_id INTEGER NOT NULL,
                relevance_score REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (post_id, related_post_id),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (related_post_id) REFERENCES posts(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 6,
        name: "create_live_chat",
        up: r#"
            CREATE TABLE IF NOT EXISTS chat_conversations (
                id VARCHAR(36) PRIMARY KEY,
                visitor_id VARCHAR(64) NOT NULL,
                post_id INTEGER,
                source_url TEXT,
                status VARCHAR(20) NOT NULL DEFAULT 'open',
                consent_given_at TIMESTAMP NOT NULL,
                last_message_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_conversations_visitor ON chat_conversations(visitor_id);
            CREATE INDEX IF NOT EXISTS idx_chat_conversations_status ON chat_conversations(status);
            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id VARCHAR(36) NOT NULL,
                sender_type VARCHAR(10) NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                read_at TIMESTAMP,
                FOREIGN KEY (conversation_id) REFERENCES chat_conversations(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_chat_messages_conversation ON chat_messages(conversation_id, created_at);
        "#,
    },
    Migration {
        version: 7,
        name: "create_enquiries",
        up: r#"
            CREATE TABLE IF NOT EXISTS surveys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(255) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS enquiries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                survey_id INTEGER,
                post_id INTEGER,
                respondent_name VARCHAR(255),
                respondent_email VARCHAR(255),
                status VARCHAR(20) NOT NULL DEFAULT 'new',
                response_data TEXT NOT NULL DEFAULT '{}',
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (survey_id) REFERENCES surveys(id) ON DELETE SET NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_enquiries_created_at ON enquiries(created_at);
            CREATE INDEX IF NOT EXISTS idx_enquiries_status ON enquiries(status);
            INSERT OR IGNORE INTO surveys (name) VALUES ('Contact');
        "#,
    },
    Migration {
        version: 8,
        name: "create_booking_requests",
        up: r#"
            CREATE TABLE IF NOT EXISTS booking_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER,
                event_type_uri TEXT,
                start_time TIMESTAMP NOT NULL,
                name VARCHAR(255) NOT NULL,
                email VARCHAR(255) NOT NULL,
                phone VARCHAR(50),
                company VARCHAR(255),
                message TEXT,
                timezone VARCHAR(64),
                scheduling_url TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE SET NULL
            );
        "#,
    },
    Migration {
        version: 9,
        name: "unique_open_conversation",
        up: r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_chat_conversations_open_scope
                ON chat_conversations(visitor_id, IFNULL(post_id, -1))
                WHERE status = 'open';
        "#,
    },
];

/// Run all pending migrations
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DbPool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create migrations table")?;
    Ok(())
}

async fn get_applied_migrations(pool: &DbPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;

    let mut records = Vec::new();
    for row in rows {
        records.push(MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        });
    }

    Ok(records)
}

/// Apply a single migration inside a transaction
async fn apply_migration(pool: &DbPool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for statement in split_sql_statements(migration.up) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

    tx.commit().await.context("Failed to commit migration")?;
    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

/// Check if a string contains only SQL comments
fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DbPool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Get pending migrations count
pub async fn pending_count(pool: &DbPool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        // Running again should apply 0 migrations
        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_is_up_to_date() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert!(!is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());

        run_migrations(&pool).await.expect("Failed to run migrations");
        assert!(is_up_to_date(&pool).await.unwrap());
    }

    #[tokio::test]
    async fn test_default_rows_seeded() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let row = sqlx::query("SELECT COUNT(*) as count FROM categories WHERE slug = 'general'")
            .fetch_one(&pool)
            .await
            .unwrap();
        let count: i64 = row.get("count");
        assert_eq!(count, 1);

        let row = sqlx::query("SELECT COUNT(*) as count FROM surveys WHERE name = 'Contact'")
            .fetch_one(&pool)
            .await
            .unwrap();
        let count: i64 = row.get("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_chat_message_requires_conversation() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO chat_messages (conversation_id, sender_type, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind("missing")
        .bind("visitor")
        .bind("hello")
        .bind(Utc::now())
        .execute(&pool)
        .await;

        assert!(result.is_err(), "foreign key should reject orphan message");
    }

    #[tokio::test]
    async fn test_one_open_conversation_per_visitor_and_post() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let insert = |id: &'static str, status: &'static str| {
            sqlx::query(
                "INSERT INTO chat_conversations (id, visitor_id, post_id, status, consent_given_at, created_at, updated_at) VALUES (?, 'visitor-0001', NULL, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .bind(Utc::now())
            .bind(Utc::now())
        };

        insert("a", "open").execute(&pool).await.unwrap();
        assert!(insert("b", "open").execute(&pool).await.is_err());
        // Closed and archived rows are outside the index
        insert("c", "closed").execute(&pool).await.unwrap();
        insert("d", "archived").execute(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_unique_post_slug() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        sqlx::query("INSERT INTO authors (name, slug) VALUES ('Marc', 'marc')")
            .execute(&pool)
            .await
            .unwrap();

        let insert = "INSERT INTO posts (title, slug, content, author_id, category_id) VALUES ('T', 'same', 'c', 1, 1)";
        sqlx::query(insert).execute(&pool).await.unwrap();
        assert!(sqlx::query(insert).execute(&pool).await.is_err());
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- only a comment\n;\nINSERT INTO a VALUES (1)";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "CREATE TABLE a (id INT)");
        assert_eq!(statements[1], "INSERT INTO a VALUES (1)");
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- comment\n  -- another"));
        assert!(!is_comment_only("-- comment\nSELECT 1"));
    }

    #[test]
    fn test_migration_versions_are_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version, i as i32 + 1);
        }
    }
}
