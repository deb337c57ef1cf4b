//! Store access layer for vstream-ingest
//!
//! The call engine only touches the store through the narrow operations in
//! these modules: per-call row read/mutate under the exclusive lock from
//! [`locks`], packet insert with uniqueness detection, and the ordered
//! packet scan.

pub mod calls;
pub mod locks;
pub mod packets;
pub mod retry;
