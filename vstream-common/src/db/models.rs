//! Store row models and the call lifecycle state machine

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Upper bound on tracked missing sequences per call.
///
/// Once a call's missing set reaches this size, further gaps are logged but
/// not recorded, preventing unbounded memory growth from a broken producer.
pub const MAX_MISSING_SEQUENCES: usize = 100;

/// Call lifecycle state
///
/// Allowed transitions:
/// - IN_PROGRESS → COMPLETED (completion signal)
/// - COMPLETED → PROCESSING_AI (after the grace interval)
/// - PROCESSING_AI → ARCHIVED (AI success)
/// - PROCESSING_AI → FAILED (AI exhaustion)
///
/// ARCHIVED and FAILED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    /// Packets are being ingested
    InProgress,
    /// Completion signal received, grace interval admits late packets
    Completed,
    /// AI transcription/sentiment pipeline in flight
    ProcessingAi,
    /// AI pipeline succeeded, transcription and sentiment recorded
    Archived,
    /// AI pipeline exhausted its retry budget
    Failed,
}

impl CallState {
    /// Literal state string as stored and as carried in events
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::InProgress => "IN_PROGRESS",
            CallState::Completed => "COMPLETED",
            CallState::ProcessingAi => "PROCESSING_AI",
            CallState::Archived => "ARCHIVED",
            CallState::Failed => "FAILED",
        }
    }

    /// Parse the literal state string used in the store
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN_PROGRESS" => Some(CallState::InProgress),
            "COMPLETED" => Some(CallState::Completed),
            "PROCESSING_AI" => Some(CallState::ProcessingAi),
            "ARCHIVED" => Some(CallState::Archived),
            "FAILED" => Some(CallState::Failed),
            _ => None,
        }
    }

    /// Whether a transition from `self` to `to` is allowed
    pub fn can_transition_to(&self, to: CallState) -> bool {
        matches!(
            (self, to),
            (CallState::InProgress, CallState::Completed)
                | (CallState::Completed, CallState::ProcessingAi)
                | (CallState::ProcessingAi, CallState::Archived)
                | (CallState::ProcessingAi, CallState::Failed)
        )
    }

    /// Whether this state admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Archived | CallState::Failed)
    }

    /// Whether the call has received its completion signal
    /// (COMPLETED or any later state)
    pub fn is_at_or_past_completed(&self) -> bool {
        !matches!(self, CallState::InProgress)
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call: lifecycle state plus packet-sequence tracking fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// Opaque non-empty identifier, primary key
    pub call_id: String,
    /// Lifecycle state
    pub state: CallState,
    /// Count of distinct sequence numbers accepted
    pub received_count: i64,
    /// Total packet count announced by the completion signal
    pub expected_total: Option<i64>,
    /// Lowest sequence not yet accepted and not yet known missing;
    /// monotonically non-decreasing
    pub expected_next: i64,
    /// Sequences below `expected_next` not yet received, ascending,
    /// bounded by [`MAX_MISSING_SEQUENCES`]
    pub missing_sequences: Vec<i64>,
    /// Written at most once, on ARCHIVED
    pub transcription: Option<String>,
    /// Written at most once, on ARCHIVED
    pub sentiment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Call {
    /// Decode a call from its store row
    pub fn from_row(row: &SqliteRow) -> Result<Call> {
        let call_id: String = row.get("call_id");

        let state: String = row.get("state");
        let state = CallState::parse(&state).ok_or(Error::UnknownCallState(state))?;

        let missing: String = row.get("missing_sequences");
        let missing_sequences: Vec<i64> = serde_json::from_str(&missing).map_err(|e| {
            Error::CorruptCall {
                call_id: call_id.clone(),
                detail: format!("missing_sequences: {}", e),
            }
        })?;

        let created_at = parse_timestamp(&row.get::<String, _>("created_at")).map_err(|e| {
            Error::CorruptCall {
                call_id: call_id.clone(),
                detail: format!("created_at: {}", e),
            }
        })?;
        let updated_at = parse_timestamp(&row.get::<String, _>("updated_at")).map_err(|e| {
            Error::CorruptCall {
                call_id: call_id.clone(),
                detail: format!("updated_at: {}", e),
            }
        })?;

        Ok(Call {
            call_id,
            state,
            received_count: row.get("received_count"),
            expected_total: row.get("expected_total"),
            expected_next: row.get("expected_next"),
            missing_sequences,
            transcription: row.get("transcription"),
            sentiment: row.get("sentiment"),
            created_at,
            updated_at,
        })
    }
}

/// One accepted packet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    pub guid: Uuid,
    pub call_id: String,
    pub sequence: i64,
    pub data: String,
    pub timestamp: f64,
    pub received_at: DateTime<Utc>,
}

impl Packet {
    /// Decode a packet from its store row
    pub fn from_row(row: &SqliteRow) -> Result<Packet> {
        let call_id: String = row.get("call_id");

        let guid: String = row.get("guid");
        let guid = Uuid::parse_str(&guid).map_err(|e| Error::CorruptPacket {
            call_id: call_id.clone(),
            detail: format!("guid: {}", e),
        })?;

        let received_at = parse_timestamp(&row.get::<String, _>("received_at")).map_err(|e| {
            Error::CorruptPacket {
                call_id: call_id.clone(),
                detail: format!("received_at: {}", e),
            }
        })?;

        Ok(Packet {
            guid,
            call_id,
            sequence: row.get("sequence"),
            data: row.get("data"),
            timestamp: row.get("timestamp"),
            received_at,
        })
    }
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_string_round_trip() {
        for state in [
            CallState::InProgress,
            CallState::Completed,
            CallState::ProcessingAi,
            CallState::Archived,
            CallState::Failed,
        ] {
            assert_eq!(CallState::parse(state.as_str()), Some(state));
        }
        assert_eq!(CallState::parse("BOGUS"), None);
    }

    #[test]
    fn test_state_serializes_to_literal_strings() {
        assert_eq!(
            serde_json::to_string(&CallState::ProcessingAi).unwrap(),
            "\"PROCESSING_AI\""
        );
        assert_eq!(
            serde_json::to_string(&CallState::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
    }

    #[test]
    fn test_allowed_transitions() {
        assert!(CallState::InProgress.can_transition_to(CallState::Completed));
        assert!(CallState::Completed.can_transition_to(CallState::ProcessingAi));
        assert!(CallState::ProcessingAi.can_transition_to(CallState::Archived));
        assert!(CallState::ProcessingAi.can_transition_to(CallState::Failed));
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        // Skipping a state is never allowed
        assert!(!CallState::InProgress.can_transition_to(CallState::ProcessingAi));
        assert!(!CallState::InProgress.can_transition_to(CallState::Archived));
        assert!(!CallState::InProgress.can_transition_to(CallState::Failed));
        assert!(!CallState::Completed.can_transition_to(CallState::Archived));
        // Backwards is never allowed
        assert!(!CallState::Completed.can_transition_to(CallState::InProgress));
        assert!(!CallState::ProcessingAi.can_transition_to(CallState::Completed));
        // Self-transitions are not transitions
        assert!(!CallState::InProgress.can_transition_to(CallState::InProgress));
    }

    #[test]
    fn test_terminal_states_admit_nothing() {
        for from in [CallState::Archived, CallState::Failed] {
            assert!(from.is_terminal());
            for to in [
                CallState::InProgress,
                CallState::Completed,
                CallState::ProcessingAi,
                CallState::Archived,
                CallState::Failed,
            ] {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_at_or_past_completed() {
        assert!(!CallState::InProgress.is_at_or_past_completed());
        assert!(CallState::Completed.is_at_or_past_completed());
        assert!(CallState::ProcessingAi.is_at_or_past_completed());
        assert!(CallState::Archived.is_at_or_past_completed());
        assert!(CallState::Failed.is_at_or_past_completed());
    }
}
