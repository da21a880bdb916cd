//! The dual-write saga between the relational system of record and the
//! document store: transactional outbox, idempotency registry, outbox
//! delivery, and the periodic reconciliation loop.
//!
//! The relational side is authoritative. No document-store write happens
//! anywhere but the outbox processor and the reconciler's repair step.

mod docstore;
mod dual_write;
mod outbox_proc;
mod reconcile;

pub use docstore::{DebtRecord, DocError, DocumentStore, HttpDocumentStore, MemoryDocumentStore};
pub use dual_write::{dual_write, DualWriteRequest};
pub use outbox_proc::{process_batch, process_single};
pub use reconcile::{reconcile, ReconcileConfig};

/// Sync-status values tracked on the job row, owned by this crate.
pub mod sync_status {
    pub const NONE: &str = "none";
    pub const PENDING: &str = "pending";
    pub const SYNCED: &str = "synced";
    pub const FAILED: &str = "failed";
}
