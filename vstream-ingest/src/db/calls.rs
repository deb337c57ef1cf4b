//! Call row access
//!
//! Read and mutate one call's row. Callers must hold the call's exclusive
//! lock (see [`super::locks`]) for any read-modify-write cycle; these
//! functions only issue the SQL.

use crate::error::{Error, Result};
use chrono::Utc;
use sqlx::SqliteConnection;
use vstream_common::db::models::Call;

/// Load a call's row, or `None` if it has never been seen
pub async fn load_call(conn: &mut SqliteConnection, call_id: &str) -> Result<Option<Call>> {
    let row = sqlx::query(
        r#"
        SELECT call_id, state, received_count, expected_total, expected_next,
               missing_sequences, transcription, sentiment, created_at, updated_at
        FROM calls
        WHERE call_id = ?
        "#,
    )
    .bind(call_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(Call::from_row(&row)?)),
        None => Ok(None),
    }
}

/// Create the call at IN_PROGRESS if absent, then return its row.
///
/// Idempotent: an existing row is left untouched.
pub async fn create_if_absent(conn: &mut SqliteConnection, call_id: &str) -> Result<Call> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO calls (call_id, state, created_at, updated_at)
        VALUES (?, 'IN_PROGRESS', ?, ?)
        "#,
    )
    .bind(call_id)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    load_call(conn, call_id).await?.ok_or_else(|| {
        Error::Internal(format!("call {} missing immediately after creation", call_id))
    })
}

/// Write a call's mutated fields
///
/// `expected_total` is written as-is; the engine never clears it once set.
pub async fn save_call(conn: &mut SqliteConnection, call: &Call) -> Result<()> {
    let missing = serde_json::to_string(&call.missing_sequences)
        .map_err(|e| Error::Internal(format!("missing_sequences encode: {}", e)))?;

    sqlx::query(
        r#"
        UPDATE calls
        SET state = ?,
            received_count = ?,
            expected_total = ?,
            expected_next = ?,
            missing_sequences = ?,
            transcription = ?,
            sentiment = ?,
            updated_at = ?
        WHERE call_id = ?
        "#,
    )
    .bind(call.state.as_str())
    .bind(call.received_count)
    .bind(call.expected_total)
    .bind(call.expected_next)
    .bind(missing)
    .bind(&call.transcription)
    .bind(&call.sentiment)
    .bind(Utc::now().to_rfc3339())
    .bind(&call.call_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vstream_common::db::models::CallState;

    async fn test_pool() -> sqlx::SqlitePool {
        vstream_common::db::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_if_absent_initial_state() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let call = create_if_absent(&mut conn, "c1").await.unwrap();
        assert_eq!(call.call_id, "c1");
        assert_eq!(call.state, CallState::InProgress);
        assert_eq!(call.received_count, 0);
        assert_eq!(call.expected_next, 0);
        assert_eq!(call.expected_total, None);
        assert!(call.missing_sequences.is_empty());
        assert!(call.transcription.is_none());
        assert!(call.sentiment.is_none());
    }

    #[tokio::test]
    async fn test_create_if_absent_is_idempotent() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let mut call = create_if_absent(&mut conn, "c1").await.unwrap();
        call.received_count = 3;
        call.expected_next = 3;
        save_call(&mut conn, &call).await.unwrap();

        // A second creation must not reset the existing row
        let call = create_if_absent(&mut conn, "c1").await.unwrap();
        assert_eq!(call.received_count, 3);
        assert_eq!(call.expected_next, 3);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let mut call = create_if_absent(&mut conn, "c1").await.unwrap();
        call.state = CallState::Completed;
        call.received_count = 4;
        call.expected_total = Some(6);
        call.expected_next = 6;
        call.missing_sequences = vec![2, 5];
        save_call(&mut conn, &call).await.unwrap();

        let loaded = load_call(&mut conn, "c1").await.unwrap().unwrap();
        assert_eq!(loaded.state, CallState::Completed);
        assert_eq!(loaded.received_count, 4);
        assert_eq!(loaded.expected_total, Some(6));
        assert_eq!(loaded.expected_next, 6);
        assert_eq!(loaded.missing_sequences, vec![2, 5]);
    }

    #[tokio::test]
    async fn test_load_unknown_call_is_none() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        assert!(load_call(&mut conn, "nope").await.unwrap().is_none());
    }
}
