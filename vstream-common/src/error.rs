//! Store-facing error types shared across VoiceStream crates
//!
//! Covers opening the store, applying the schema, and decoding persisted
//! call/packet rows back into their models.

use thiserror::Error;

/// Result type for store and model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by the shared store/model layer
#[derive(Error, Debug)]
pub enum Error {
    /// Store-level failure: connection, schema application, or query
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A persisted call row no longer decodes into a Call
    #[error("Corrupt call row for {call_id}: {detail}")]
    CorruptCall { call_id: String, detail: String },

    /// A persisted packet row no longer decodes into a Packet
    #[error("Corrupt packet row for call {call_id}: {detail}")]
    CorruptPacket { call_id: String, detail: String },

    /// A state literal in the store is not a known lifecycle state
    #[error("Unknown call state in store: {0}")]
    UnknownCallState(String),
}
