//! Sync engine components
//!
//! Building blocks the store composes: request tokens, the detail cache,
//! aggregate counters, the status transition table, optimistic mutations,
//! bulk execution and undo history.

pub mod bulk;
pub mod coordinator;
pub mod counts;
pub mod detail_cache;
pub mod mutation;
pub mod transitions;
pub mod undo;
