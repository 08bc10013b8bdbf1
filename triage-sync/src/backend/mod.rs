//! Remote triage service contract
//!
//! The engine reaches the shared mailbox service only through this trait.
//! Every call is network-fallible and may be cancelled by dropping its future;
//! the engine never assumes ordering or batching guarantees from the transport.

use async_trait::async_trait;

use crate::types::error::Result;
use crate::types::{CountSnapshot, DetailBody, ListPage, ListRequest, MutateMode, TriageAction};

#[async_trait]
pub trait TriageService: Send + Sync {
    /// Fetch one ordered page of items for a view
    async fn list(&self, request: &ListRequest) -> Result<ListPage>;

    /// Fetch the body content of one item
    ///
    /// Returns `TriageError::NotFound` when the item no longer exists remotely.
    async fn detail(&self, id: &str) -> Result<DetailBody>;

    /// Apply one action to one item
    ///
    /// Assignment may fail with `TriageError::Conflict` when someone else holds
    /// the item; `MutateMode::Override` takes it over.
    async fn mutate(&self, id: &str, action: &TriageAction, mode: MutateMode) -> Result<()>;

    /// Authoritative per-status counters
    async fn counts(&self) -> Result<CountSnapshot>;
}
