//! Call ingest and lifecycle API handlers
//!
//! - `POST /v1/call/stream/{call_id}`: ingest one packet
//! - `POST /v1/call/complete/{call_id}`: signal call completion
//! - `GET  /v1/call/{call_id}`: call status snapshot

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use vstream_common::db::models::CallState;

use crate::engine::IngestRequest;
use crate::error::Result;
use crate::AppState;

/// Packet ingestion request body
#[derive(Debug, Deserialize)]
pub struct PacketRequest {
    pub sequence: i64,
    pub data: String,
    pub timestamp: f64,
}

/// Packet ingestion response, reflecting tracking state as of commit
#[derive(Debug, Serialize)]
pub struct PacketResponse {
    pub status: &'static str,
    pub call_id: String,
    pub sequence: i64,
    pub total_received: i64,
    pub missing_sequences: Vec<i64>,
    pub duplicate: bool,
}

/// Completion signal request body
#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    pub total_packets: i64,
}

/// Completion signal response
#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub status: &'static str,
    pub call_id: String,
    pub expected_total_packets: Option<i64>,
}

/// Call status snapshot
#[derive(Debug, Serialize)]
pub struct CallStatusResponse {
    pub call_id: String,
    pub state: CallState,
    pub total_packets_received: i64,
    pub expected_total_packets: Option<i64>,
    pub missing_sequences: Vec<i64>,
    pub transcription: Option<String>,
    pub sentiment: Option<String>,
}

/// POST /v1/call/stream/{call_id}
///
/// Replies 202 once the packet mutation commits; duplicates are idempotent
/// and reported in the body, never as an error status.
pub async fn ingest_packet(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(packet): Json<PacketRequest>,
) -> Result<(StatusCode, Json<PacketResponse>)> {
    let request = IngestRequest {
        call_id,
        sequence: packet.sequence,
        data: packet.data,
        timestamp: packet.timestamp,
    };
    let outcome = state.engine.ingest(&request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PacketResponse {
            status: if outcome.duplicate { "duplicate" } else { "accepted" },
            call_id: request.call_id,
            sequence: request.sequence,
            total_received: outcome.total_received,
            missing_sequences: outcome.missing_sequences,
            duplicate: outcome.duplicate,
        }),
    ))
}

/// POST /v1/call/complete/{call_id}
///
/// Replies 202; a repeated signal reports `already_completed` or
/// `already_terminal` without re-running the pipeline. Unknown calls are
/// 404: a call only exists once it has streamed a packet.
pub async fn complete_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(completion): Json<CompletionRequest>,
) -> Result<(StatusCode, Json<CompletionResponse>)> {
    let outcome = state
        .engine
        .complete(&call_id, completion.total_packets)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CompletionResponse {
            status: outcome.status_str(),
            call_id,
            expected_total_packets: outcome.expected_total(),
        }),
    ))
}

/// GET /v1/call/{call_id}
pub async fn get_call_status(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<Json<CallStatusResponse>> {
    let call = state
        .engine
        .call_snapshot(&call_id)
        .await?
        .ok_or_else(|| crate::error::Error::CallNotFound(call_id))?;

    Ok(Json(CallStatusResponse {
        call_id: call.call_id,
        state: call.state,
        total_packets_received: call.received_count,
        expected_total_packets: call.expected_total,
        missing_sequences: call.missing_sequences,
        transcription: call.transcription,
        sentiment: call.sentiment,
    }))
}

/// Build call ingest/lifecycle routes
pub fn call_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/call/stream/:call_id", post(ingest_packet))
        .route("/v1/call/complete/:call_id", post(complete_call))
        .route("/v1/call/:call_id", get(get_call_status))
}
