//! Call engine
//!
//! The only writer to call state and the only caller of the AI client.
//! Every mutation for a call runs under that call's exclusive lock, inside
//! a store transaction, with events published after commit while the lock
//! is still held, so per-call updates are linearizable and events leave in
//! linearization order.

use crate::db::calls;
use crate::db::locks::CallLocks;
use crate::db::packets::{self, InsertOutcome};
use crate::db::retry::retry_transient;
use crate::engine::sequence::{Classification, SequenceTracking};
use crate::error::{Error, Result};
use crate::services::ai_client::{AiAnalysis, AiClient};
use crate::services::retry::retry_with_backoff;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use vstream_common::db::models::{Call, CallState};
use vstream_common::events::{CallEvent, EventBus};

/// Wait between the completion signal and the AI pipeline, admitting late
/// packets
pub const GRACE_PERIOD: Duration = Duration::from_secs(3);

/// One packet ingest request, already parsed from the wire
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub call_id: String,
    pub sequence: i64,
    pub data: String,
    pub timestamp: f64,
}

/// Result of an ingest mutation, as of its commit
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub duplicate: bool,
    pub total_received: i64,
    pub missing_sequences: Vec<i64>,
}

/// Result of a completion signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// The call transitioned to COMPLETED; the pipeline was scheduled
    Accepted { expected_total: i64 },
    /// Already at or past COMPLETED; the pipeline was not re-entered
    AlreadyCompleted { expected_total: Option<i64> },
    /// Already ARCHIVED or FAILED
    AlreadyTerminal { expected_total: Option<i64> },
}

impl CompleteOutcome {
    pub fn status_str(&self) -> &'static str {
        match self {
            CompleteOutcome::Accepted { .. } => "accepted",
            CompleteOutcome::AlreadyCompleted { .. } => "already_completed",
            CompleteOutcome::AlreadyTerminal { .. } => "already_terminal",
        }
    }

    pub fn expected_total(&self) -> Option<i64> {
        match self {
            CompleteOutcome::Accepted { expected_total } => Some(*expected_total),
            CompleteOutcome::AlreadyCompleted { expected_total }
            | CompleteOutcome::AlreadyTerminal { expected_total } => *expected_total,
        }
    }
}

/// Orchestrator for per-call mutations, the completion pipeline, and event
/// fan-out
#[derive(Clone)]
pub struct CallEngine {
    db: SqlitePool,
    locks: CallLocks,
    bus: EventBus,
    ai: Arc<dyn AiClient>,
}

impl CallEngine {
    pub fn new(db: SqlitePool, bus: EventBus, ai: Arc<dyn AiClient>) -> Self {
        Self {
            db,
            locks: CallLocks::new(),
            bus,
            ai,
        }
    }

    /// Ingest one packet: validate, then mutate the call under its
    /// exclusive lock. Returns the tracking state as of commit.
    pub async fn ingest(&self, req: &IngestRequest) -> Result<IngestOutcome> {
        validate_packet(req)?;

        let _guard = self.locks.acquire(&req.call_id).await;
        let (outcome, event) =
            retry_transient("packet ingest", || async move { self.ingest_locked(req).await })
                .await?;

        // Published before the lock releases so same-call events keep
        // linearization order
        if let Some(event) = event {
            self.bus.emit_lossy(event);
        }

        Ok(outcome)
    }

    async fn ingest_locked(&self, req: &IngestRequest) -> Result<(IngestOutcome, Option<CallEvent>)> {
        let mut tx = self.db.begin().await?;
        let mut call = calls::create_if_absent(&mut tx, &req.call_id).await?;

        // A pipeline already in flight (or finished) never restarts: the
        // packet is kept for audit but tracking state stays frozen.
        if call.state.is_terminal() || call.state == CallState::ProcessingAi {
            let outcome = packets::insert_packet(
                &mut tx,
                &req.call_id,
                req.sequence,
                &req.data,
                req.timestamp,
            )
            .await?;
            let duplicate = match outcome {
                InsertOutcome::Inserted => {
                    call.received_count += 1;
                    calls::save_call(&mut tx, &call).await?;
                    false
                }
                InsertOutcome::Duplicate => true,
            };
            tx.commit().await?;
            debug!(
                call_id = %req.call_id,
                sequence = req.sequence,
                state = %call.state,
                duplicate,
                "Packet stored best-effort; call no longer mutable"
            );
            return Ok((
                IngestOutcome {
                    duplicate,
                    total_received: call.received_count,
                    missing_sequences: call.missing_sequences,
                },
                None,
            ));
        }

        match packets::insert_packet(&mut tx, &req.call_id, req.sequence, &req.data, req.timestamp)
            .await?
        {
            InsertOutcome::Duplicate => {
                tx.commit().await?;
                warn!(call_id = %req.call_id, sequence = req.sequence, "Duplicate packet");
                Ok((
                    IngestOutcome {
                        duplicate: true,
                        total_received: call.received_count,
                        missing_sequences: call.missing_sequences,
                    },
                    None,
                ))
            }
            InsertOutcome::Inserted => {
                let mut tracking =
                    SequenceTracking::new(call.expected_next, std::mem::take(&mut call.missing_sequences));
                let sealed = call.state.is_at_or_past_completed();
                match tracking.accept(req.sequence, sealed) {
                    Classification::InOrder => {
                        debug!(call_id = %req.call_id, sequence = req.sequence, "In-order packet");
                    }
                    Classification::Gap => {
                        warn!(
                            call_id = %req.call_id,
                            sequence = req.sequence,
                            missing = ?tracking.missing,
                            "Gap detected"
                        );
                    }
                    Classification::LateFill => {
                        info!(call_id = %req.call_id, sequence = req.sequence, "Late packet filled gap");
                    }
                    Classification::Duplicate => {
                        // Row was new but the sealed window no longer moves
                        debug!(call_id = %req.call_id, sequence = req.sequence, "Post-completion packet outside window");
                    }
                }

                call.expected_next = tracking.expected_next;
                call.missing_sequences = tracking.missing;
                call.received_count += 1;
                calls::save_call(&mut tx, &call).await?;
                tx.commit().await?;

                let event = CallEvent::PacketReceived {
                    call_id: call.call_id.clone(),
                    sequence: req.sequence,
                    total_received: call.received_count,
                    missing_sequences: call.missing_sequences.clone(),
                };
                Ok((
                    IngestOutcome {
                        duplicate: false,
                        total_received: call.received_count,
                        missing_sequences: call.missing_sequences,
                    },
                    Some(event),
                ))
            }
        }
    }

    /// Handle a completion signal. On first acceptance the call moves to
    /// COMPLETED and the background pipeline is scheduled; repeated signals
    /// are idempotent.
    pub async fn complete(&self, call_id: &str, total_packets: i64) -> Result<CompleteOutcome> {
        if call_id.trim().is_empty() {
            return Err(Error::InvalidInput("call_id must not be empty".to_string()));
        }
        if total_packets <= 0 {
            return Err(Error::InvalidInput(
                "total_packets must be positive".to_string(),
            ));
        }

        let outcome;
        {
            let _guard = self.locks.acquire(call_id).await;
            let (result, event) = retry_transient("call completion", || async move {
                self.complete_locked(call_id, total_packets).await
            })
            .await?;
            if let Some(event) = event {
                self.bus.emit_lossy(event);
            }
            outcome = result;
        }

        if let CompleteOutcome::Accepted { .. } = outcome {
            let engine = self.clone();
            let call_id = call_id.to_string();
            tokio::spawn(async move {
                engine.run_completion_pipeline(call_id).await;
            });
        }

        Ok(outcome)
    }

    async fn complete_locked(
        &self,
        call_id: &str,
        total_packets: i64,
    ) -> Result<(CompleteOutcome, Option<CallEvent>)> {
        let mut tx = self.db.begin().await?;
        let mut call = calls::load_call(&mut tx, call_id)
            .await?
            .ok_or_else(|| Error::CallNotFound(call_id.to_string()))?;

        match call.state {
            CallState::InProgress => {
                let event = transition(&mut call, CallState::Completed)?;
                call.expected_total = Some(total_packets);
                calls::save_call(&mut tx, &call).await?;
                tx.commit().await?;
                info!(
                    call_id = %call_id,
                    expected_total = total_packets,
                    received = call.received_count,
                    "Completion signal accepted"
                );
                Ok((
                    CompleteOutcome::Accepted {
                        expected_total: total_packets,
                    },
                    Some(event),
                ))
            }
            CallState::Completed | CallState::ProcessingAi => {
                info!(call_id = %call_id, state = %call.state, "Duplicate completion signal ignored");
                Ok((
                    CompleteOutcome::AlreadyCompleted {
                        expected_total: call.expected_total,
                    },
                    None,
                ))
            }
            CallState::Archived | CallState::Failed => {
                info!(call_id = %call_id, state = %call.state, "Completion signal for terminal call");
                Ok((
                    CompleteOutcome::AlreadyTerminal {
                        expected_total: call.expected_total,
                    },
                    None,
                ))
            }
        }
    }

    /// Read one call's current row; no lock is taken
    pub async fn call_snapshot(&self, call_id: &str) -> Result<Option<Call>> {
        let mut conn = self.db.acquire().await?;
        calls::load_call(&mut conn, call_id).await
    }

    async fn run_completion_pipeline(self, call_id: String) {
        if let Err(err) = self.completion_pipeline(&call_id).await {
            error!(call_id = %call_id, error = %err, "Completion pipeline failed");
            self.force_fail(&call_id).await;
        }
    }

    /// Grace wait, PROCESSING_AI transition, AI analysis with retry, then
    /// the terminal transition. No call lock is held across the grace wait
    /// or any AI attempt.
    async fn completion_pipeline(&self, call_id: &str) -> Result<()> {
        debug!(
            call_id = %call_id,
            grace_secs = GRACE_PERIOD.as_secs(),
            "Grace interval for late packets"
        );
        tokio::time::sleep(GRACE_PERIOD).await;

        {
            let _guard = self.locks.acquire(call_id).await;
            let event = retry_transient("start ai processing", || async move {
                let mut tx = self.db.begin().await?;
                let mut call = calls::load_call(&mut tx, call_id)
                    .await?
                    .ok_or_else(|| Error::CallNotFound(call_id.to_string()))?;

                if call.missing_sequences.is_empty() {
                    info!(call_id = %call_id, received = call.received_count, "All tracked packets received");
                } else {
                    warn!(
                        call_id = %call_id,
                        missing = ?call.missing_sequences,
                        received = call.received_count,
                        expected_total = ?call.expected_total,
                        count_matches_expected = call.expected_total == Some(call.received_count),
                        "Call completing with missing packets"
                    );
                }

                let event = transition(&mut call, CallState::ProcessingAi)?;
                calls::save_call(&mut tx, &call).await?;
                tx.commit().await?;
                Ok(event)
            })
            .await?;
            self.bus.emit_lossy(event);
        }

        let payload = {
            let mut conn = self.db.acquire().await?;
            let packets = packets::list_packets_ordered(&mut conn, call_id).await?;
            packets
                .iter()
                .map(|p| p.data.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        };

        let ai_result = retry_with_backoff("ai analysis", || {
            let ai = self.ai.clone();
            let payload = payload.clone();
            async move { ai.analyze(&payload).await }
        })
        .await;

        let _guard = self.locks.acquire(call_id).await;
        match ai_result {
            Ok(analysis) => self.archive_call(call_id, &analysis).await,
            Err(err) => {
                error!(call_id = %call_id, error = %err, "AI processing failed after retries");
                self.fail_call(call_id).await
            }
        }
    }

    /// Record the AI outcome and move to ARCHIVED. Caller holds the lock.
    async fn archive_call(&self, call_id: &str, analysis: &AiAnalysis) -> Result<()> {
        let event = retry_transient("archive call", || async move {
            let mut tx = self.db.begin().await?;
            let mut call = calls::load_call(&mut tx, call_id)
                .await?
                .ok_or_else(|| Error::CallNotFound(call_id.to_string()))?;
            call.transcription = Some(analysis.transcription.clone());
            call.sentiment = Some(analysis.sentiment.clone());
            let event = transition(&mut call, CallState::Archived)?;
            calls::save_call(&mut tx, &call).await?;
            tx.commit().await?;
            Ok(event)
        })
        .await?;

        self.bus.emit_lossy(CallEvent::AiCompleted {
            call_id: call_id.to_string(),
            transcription: analysis.transcription.clone(),
            sentiment: analysis.sentiment.clone(),
        });
        self.bus.emit_lossy(event);
        info!(call_id = %call_id, "AI processing completed, call archived");
        Ok(())
    }

    /// Move to FAILED after AI exhaustion. Caller holds the lock.
    async fn fail_call(&self, call_id: &str) -> Result<()> {
        let event = retry_transient("fail call", || async move {
            let mut tx = self.db.begin().await?;
            let mut call = calls::load_call(&mut tx, call_id)
                .await?
                .ok_or_else(|| Error::CallNotFound(call_id.to_string()))?;
            let event = transition(&mut call, CallState::Failed)?;
            calls::save_call(&mut tx, &call).await?;
            tx.commit().await?;
            Ok(event)
        })
        .await?;

        self.bus.emit_lossy(CallEvent::AiFailed {
            call_id: call_id.to_string(),
            reason: "AI service failed after maximum retries".to_string(),
        });
        self.bus.emit_lossy(event);
        Ok(())
    }

    /// Last-resort failure path for a pipeline that died on an internal
    /// error. Uses the clean transition when legal, otherwise writes the
    /// state directly so the call never sticks in a non-terminal state
    /// without a pipeline behind it.
    async fn force_fail(&self, call_id: &str) {
        let _guard = self.locks.acquire(call_id).await;
        let result: Result<Option<CallEvent>> = async {
            let mut tx = self.db.begin().await?;
            let Some(mut call) = calls::load_call(&mut tx, call_id).await? else {
                return Ok(None);
            };
            if call.state.is_terminal() {
                return Ok(None);
            }
            let from = call.state;
            if from.can_transition_to(CallState::Failed) {
                call.state = CallState::Failed;
                calls::save_call(&mut tx, &call).await?;
            } else {
                sqlx::query("UPDATE calls SET state = 'FAILED', updated_at = ? WHERE call_id = ?")
                    .bind(chrono::Utc::now().to_rfc3339())
                    .bind(call_id)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(Some(CallEvent::StateChanged {
                call_id: call_id.to_string(),
                from_state: from,
                to_state: CallState::Failed,
            }))
        }
        .await;

        match result {
            Ok(Some(event)) => {
                self.bus.emit_lossy(CallEvent::AiFailed {
                    call_id: call_id.to_string(),
                    reason: "Internal pipeline error".to_string(),
                });
                self.bus.emit_lossy(event);
            }
            Ok(None) => {}
            Err(err) => {
                error!(call_id = %call_id, error = %err, "Failed to mark call as FAILED");
            }
        }
    }
}

/// Gate a lifecycle transition through the state machine, producing the
/// event to publish after commit
fn transition(call: &mut Call, to: CallState) -> Result<CallEvent> {
    if !call.state.can_transition_to(to) {
        return Err(Error::InvalidTransition {
            from: call.state,
            to,
        });
    }
    let from = call.state;
    call.state = to;
    info!(call_id = %call.call_id, from = %from, to = %to, "State transition");
    Ok(CallEvent::StateChanged {
        call_id: call.call_id.clone(),
        from_state: from,
        to_state: to,
    })
}

fn validate_packet(req: &IngestRequest) -> Result<()> {
    if req.call_id.trim().is_empty() {
        return Err(Error::InvalidInput("call_id must not be empty".to_string()));
    }
    if req.sequence < 0 {
        return Err(Error::InvalidInput(
            "sequence must be non-negative".to_string(),
        ));
    }
    if req.data.is_empty() {
        return Err(Error::InvalidInput("data must not be empty".to_string()));
    }
    if req.timestamp <= 0.0 {
        return Err(Error::InvalidInput("timestamp must be positive".to_string()));
    }
    Ok(())
}
