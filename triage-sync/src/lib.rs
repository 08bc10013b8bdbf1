//! Triage Sync - optimistic mutation and sync engine for shared mailbox triage
//!
//! Keeps a locally held view of the shared inbox responsive while every
//! change is confirmed by the remote triage service.
//!
//! ## Module Organization
//!
//! - `state/`: Triage store, derived list pipeline and write path
//! - `sync/`: Request coordination, detail cache, counters, mutations, bulk and undo
//! - `backend/`: Remote triage service contract
//! - `types/`: Data structures and the error type
//! - `config/`: Engine tunables
//! - `clock`: Injectable time source for cache expiry

pub mod backend;
pub mod clock;
pub mod config;
pub mod state;
pub mod sync;
pub mod types;

use tracing_subscriber::EnvFilter;

pub use backend::TriageService;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use state::{StoreEvent, TriageStore};
pub use types::{Item, ItemStatus, Result, TriageAction, TriageError, View};

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence. Calling this more than once is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            // Debug build: debug logs for this crate, info for others
            EnvFilter::new("triage_sync=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
