//! Tests for store initialization
//!
//! Verifies automatic schema creation, idempotent re-initialization, and
//! that the packet uniqueness constraint is enforced by the store itself.

use vstream_common::db::connect;

#[tokio::test]
async fn test_store_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("vstream.db");

    let result = connect(db_path.to_str().unwrap()).await;
    assert!(result.is_ok(), "store initialization failed: {:?}", result.err());

    assert!(db_path.exists(), "store file was not created");
}

#[tokio::test]
async fn test_store_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("vstream.db");
    let db_str = db_path.to_str().unwrap();

    let pool1 = connect(db_str).await.unwrap();
    drop(pool1);

    // Re-initialization must be idempotent
    let pool2 = connect(db_str).await;
    assert!(pool2.is_ok(), "failed to reopen existing store: {:?}", pool2.err());
}

#[tokio::test]
async fn test_schema_tables_exist() {
    let pool = connect("sqlite::memory:").await.unwrap();

    for table in ["calls", "packets"] {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1, "table {} missing", table);
    }
}

#[tokio::test]
async fn test_packet_uniqueness_enforced_by_store() {
    let pool = connect("sqlite::memory:").await.unwrap();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO calls (call_id, created_at, updated_at) VALUES ('c1', ?, ?)",
    )
    .bind(&now)
    .bind(&now)
    .execute(&pool)
    .await
    .unwrap();

    let insert = "INSERT INTO packets (guid, call_id, sequence, data, timestamp, received_at) \
                  VALUES (?, 'c1', 0, 'payload', 1.0, ?)";

    sqlx::query(insert)
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&now)
        .execute(&pool)
        .await
        .unwrap();

    // Second insert of the same (call_id, sequence) must be rejected
    let err = sqlx::query(insert)
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&now)
        .execute(&pool)
        .await
        .expect_err("duplicate (call_id, sequence) should violate UNIQUE");

    match err {
        sqlx::Error::Database(db_err) => assert!(db_err.is_unique_violation()),
        other => panic!("expected database error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_corrupt_call_row_surfaces_decode_error() {
    use vstream_common::db::models::Call;
    use vstream_common::Error;

    let pool = connect("sqlite::memory:").await.unwrap();
    let now = chrono::Utc::now().to_rfc3339();

    // The store accepts any text in missing_sequences; decoding is what
    // guards the model
    sqlx::query(
        "INSERT INTO calls (call_id, missing_sequences, created_at, updated_at) \
         VALUES ('c1', 'not-json', ?, ?)",
    )
    .bind(&now)
    .bind(&now)
    .execute(&pool)
    .await
    .unwrap();

    let row = sqlx::query("SELECT * FROM calls WHERE call_id = 'c1'")
        .fetch_one(&pool)
        .await
        .unwrap();

    match Call::from_row(&row) {
        Err(Error::CorruptCall { call_id, detail }) => {
            assert_eq!(call_id, "c1");
            assert!(detail.contains("missing_sequences"));
        }
        other => panic!("expected CorruptCall, got {:?}", other),
    }
}

#[tokio::test]
async fn test_state_check_constraint() {
    let pool = connect("sqlite::memory:").await.unwrap();
    let now = chrono::Utc::now().to_rfc3339();

    let result = sqlx::query(
        "INSERT INTO calls (call_id, state, created_at, updated_at) VALUES ('c1', 'BOGUS', ?, ?)",
    )
    .bind(&now)
    .bind(&now)
    .execute(&pool)
    .await;

    assert!(result.is_err(), "unknown state literal should be rejected");
}
