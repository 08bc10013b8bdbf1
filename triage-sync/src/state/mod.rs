//! Store state management
//!
//! The triage store owns the canonical item list and exposes the read, view
//! and write surface used by the view layer. Shared state is guarded by a
//! single mutex that is never held across an await point.

mod triage_store;
mod view;
mod writes;

pub use triage_store::{
    BulkFailureRecord, DetailRequest, DetailState, LoadOutcome, PendingBulk, Selection,
    StoreEvent, TriageStore,
};
pub use view::{ItemPredicate, ViewFilter};
pub use writes::{BulkSubmission, MutationOutcome, MutationTicket, UndoOutcome};
