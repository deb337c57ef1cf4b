//! Packet sequence tracker
//!
//! Pure classification of an arriving sequence number against a call's
//! tracking state. No I/O; the call engine persists whatever this produces.

use tracing::warn;
use vstream_common::db::models::MAX_MISSING_SEQUENCES;

/// How an arriving packet relates to the stream so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Exactly the next expected sequence
    InOrder,
    /// Jumped past the expected sequence, opening a gap
    Gap,
    /// Filled a previously recorded gap
    LateFill,
    /// Already accepted (or below the window with no recorded gap)
    Duplicate,
}

/// A call's sequence-tracking fields, as read from and written back to the
/// call row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceTracking {
    /// Lowest sequence not yet accepted and not known missing
    pub expected_next: i64,
    /// Sequences below `expected_next` not yet received, ascending
    pub missing: Vec<i64>,
}

impl SequenceTracking {
    pub fn new(expected_next: i64, missing: Vec<i64>) -> Self {
        Self {
            expected_next,
            missing,
        }
    }

    /// Classify `sequence` and update the tracking fields accordingly.
    ///
    /// `sealed` marks a call at or past COMPLETED: the window no longer
    /// advances, so anything outside the recorded gaps classifies as a
    /// duplicate and only late fills mutate state.
    ///
    /// Gap fills are capped at [`MAX_MISSING_SEQUENCES`] tracked entries;
    /// overflow is logged and dropped.
    pub fn accept(&mut self, sequence: i64, sealed: bool) -> Classification {
        if sequence < self.expected_next || sealed {
            return match self.missing.binary_search(&sequence) {
                Ok(idx) => {
                    self.missing.remove(idx);
                    Classification::LateFill
                }
                Err(_) => Classification::Duplicate,
            };
        }

        if sequence == self.expected_next {
            self.expected_next = sequence + 1;
            return Classification::InOrder;
        }

        // Gap: record expected_next..sequence as missing, then jump past it
        let gap_len = (sequence - self.expected_next) as usize;
        let room = MAX_MISSING_SEQUENCES.saturating_sub(self.missing.len());
        if gap_len > room {
            warn!(
                dropped = gap_len - room,
                cap = MAX_MISSING_SEQUENCES,
                "Missing-sequence cap reached; further gaps untracked"
            );
        }
        // New gap entries are always above everything recorded, so the list
        // stays sorted
        self.missing
            .extend((self.expected_next..sequence).take(room));
        self.expected_next = sequence + 1;
        Classification::Gap
    }
}
