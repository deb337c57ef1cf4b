//! Store initialization
//!
//! Opens the SQLite store named by `store_connection` and creates the
//! `calls` and `packets` tables if they do not exist. Initialization is
//! idempotent and safe to run on every startup.

use crate::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

/// Connect to the store and apply the schema.
///
/// `store_connection` is either a full SQLite URL (`sqlite://...`,
/// `sqlite::memory:`) or a bare filesystem path, which is opened in
/// create-if-missing mode.
pub async fn connect(store_connection: &str) -> Result<SqlitePool> {
    let url = if store_connection.starts_with("sqlite:") {
        store_connection.to_string()
    } else {
        format!("sqlite://{}?mode=rwc", store_connection)
    };

    // An in-memory store exists per connection, so the pool must not open a
    // second one.
    let pool = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await?
    } else {
        SqlitePool::connect(&url).await?
    };

    info!("Store opened: {}", store_connection);

    // Enforce referential integrity
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // Wait briefly on writer contention instead of failing immediately
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_calls_table(&pool).await?;
    create_packets_table(&pool).await?;

    Ok(pool)
}

async fn create_calls_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS calls (
            call_id TEXT PRIMARY KEY,
            state TEXT NOT NULL DEFAULT 'IN_PROGRESS'
                CHECK (state IN ('IN_PROGRESS', 'COMPLETED', 'PROCESSING_AI', 'ARCHIVED', 'FAILED')),
            received_count INTEGER NOT NULL DEFAULT 0,
            expected_total INTEGER,
            expected_next INTEGER NOT NULL DEFAULT 0,
            missing_sequences TEXT NOT NULL DEFAULT '[]',
            transcription TEXT,
            sentiment TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (received_count >= 0),
            CHECK (expected_total IS NULL OR expected_total > 0),
            CHECK (expected_next >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_packets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS packets (
            guid TEXT PRIMARY KEY,
            call_id TEXT NOT NULL REFERENCES calls(call_id) ON DELETE CASCADE,
            sequence INTEGER NOT NULL,
            data TEXT NOT NULL,
            timestamp REAL NOT NULL,
            received_at TEXT NOT NULL,
            UNIQUE (call_id, sequence),
            CHECK (sequence >= 0),
            CHECK (length(data) > 0),
            CHECK (timestamp > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_packets_call_id ON packets(call_id)")
        .execute(pool)
        .await?;

    Ok(())
}
