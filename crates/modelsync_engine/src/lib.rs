//! # modelsync engine
//!
//! Keeps a local store of model records synchronized with a remote service.
//!
//! This crate provides:
//! - [`ModelSyncOperation`] - full or delta paged download of one model
//! - [`SyncCoordinator`] - runs every syncable model in dependency order
//! - [`ReconciliationQueue`] - version-based merge of remote records into the store
//! - [`SyncCompletionTracker`] - per-model "synced" and global "ready" signals
//! - [`SyncEngine`] - wires the above to a store, a reader and live updates
//!
//! ## Architecture
//!
//! ```text
//! SyncCoordinator ──▶ ModelSyncOperation ──▶ RemoteReader (pages)
//!        │                    │
//!        │              offer(records)
//!        ▼                    ▼
//!  ModelSyncEvent      ReconciliationQueue ──▶ LocalStore
//!        │                    │
//!        └────────┬───────────┘
//!                 ▼
//!       SyncCompletionTracker ──▶ HubEvent
//! ```
//!
//! Components talk through multi-subscriber [`EventStream`]s rather than
//! shared state. The only shared mutable state is the local store.
//!
//! ## Key Invariants
//!
//! - The higher version always wins; equal versions are duplicates
//! - Records sharing an identifier are reconciled one at a time, in order
//! - A dropped record never touches the store
//! - A cancelled model keeps its previous checkpoint
//! - "Ready" fires once, after every model's "synced" event

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod clock;
mod config;
mod coordinator;
mod engine;
mod error;
mod events;
mod operation;
mod reader;
mod reconcile;
mod tracker;

pub use cancel::CancellationToken;
pub use clock::{Clock, SystemClock};
pub use config::{SyncConfig, SyncFilter};
pub use coordinator::{SyncCoordinator, SyncOutcome};
pub use engine::{EngineState, SyncEngine};
pub use error::{ModelFailure, SyncError, SyncResult};
pub use events::{
    DropReason, EventHub, EventStream, HubEvent, ModelSyncEvent, ModelSyncedEvent, MutationType,
    ReconciliationEvent, SyncKind,
};
pub use operation::{resolve_sync_kind, ModelSyncOperation, OperationReport, SyncContext};
pub use reader::{LiveUpdates, Page, PageRequest, RemoteReader};
pub use reconcile::{ReconciliationQueue, ReconciliationQueueBuilder};
pub use tracker::{CompletionState, SyncCompletionTracker};
