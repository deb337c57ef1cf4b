//! Store access for VoiceStream
//!
//! Schema creation and shared row models. Query helpers that are specific to
//! one service live in that service's crate.

pub mod init;
pub mod models;

pub use init::connect;
