//! Packet row access
//!
//! Insert with `(call_id, sequence)` uniqueness detection and the ordered
//! scan consumed by the AI payload builder.

use crate::error::{Error, Result};
use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;
use vstream_common::db::models::Packet;

/// Outcome of a packet insert attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written
    Inserted,
    /// The `(call_id, sequence)` pair already exists; nothing was written
    Duplicate,
}

/// Insert one packet row, signalling `Duplicate` if the uniqueness
/// constraint would be violated. Atomic against concurrent inserts of the
/// same `(call_id, sequence)`: the store's UNIQUE index is the arbiter.
pub async fn insert_packet(
    conn: &mut SqliteConnection,
    call_id: &str,
    sequence: i64,
    data: &str,
    timestamp: f64,
) -> Result<InsertOutcome> {
    let result = sqlx::query(
        r#"
        INSERT INTO packets (guid, call_id, sequence, data, timestamp, received_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(call_id)
    .bind(sequence)
    .bind(data)
    .bind(timestamp)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(InsertOutcome::Inserted),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Ok(InsertOutcome::Duplicate)
        }
        Err(e) => Err(e.into()),
    }
}

/// All packets for a call, ascending by sequence
pub async fn list_packets_ordered(
    conn: &mut SqliteConnection,
    call_id: &str,
) -> Result<Vec<Packet>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, call_id, sequence, data, timestamp, received_at
        FROM packets
        WHERE call_id = ?
        ORDER BY sequence ASC
        "#,
    )
    .bind(call_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| Packet::from_row(row).map_err(Error::from))
        .collect()
}

/// Number of packet rows stored for a call
pub async fn count_packets(conn: &mut SqliteConnection, call_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM packets WHERE call_id = ?")
        .bind(call_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::calls::create_if_absent;

    async fn test_pool() -> sqlx::SqlitePool {
        vstream_common::db::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_duplicate() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        create_if_absent(&mut conn, "c1").await.unwrap();

        let first = insert_packet(&mut conn, "c1", 0, "hello", 1.0).await.unwrap();
        assert_eq!(first, InsertOutcome::Inserted);

        let second = insert_packet(&mut conn, "c1", 0, "hello again", 2.0)
            .await
            .unwrap();
        assert_eq!(second, InsertOutcome::Duplicate);

        // Exactly one row survives
        assert_eq!(count_packets(&mut conn, "c1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_sequence_different_calls() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        create_if_absent(&mut conn, "a").await.unwrap();
        create_if_absent(&mut conn, "b").await.unwrap();

        assert_eq!(
            insert_packet(&mut conn, "a", 0, "x", 1.0).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            insert_packet(&mut conn, "b", 0, "y", 1.0).await.unwrap(),
            InsertOutcome::Inserted
        );
    }

    #[tokio::test]
    async fn test_list_packets_ordered_by_sequence() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        create_if_absent(&mut conn, "c1").await.unwrap();

        // Out-of-order arrival
        for (seq, data) in [(2, "two"), (0, "zero"), (1, "one")] {
            insert_packet(&mut conn, "c1", seq, data, 1.0 + seq as f64)
                .await
                .unwrap();
        }

        let packets = list_packets_ordered(&mut conn, "c1").await.unwrap();
        let sequences: Vec<i64> = packets.iter().map(|p| p.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        let datas: Vec<&str> = packets.iter().map(|p| p.data.as_str()).collect();
        assert_eq!(datas, vec!["zero", "one", "two"]);
    }
}
