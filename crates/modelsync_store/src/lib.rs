//! # modelsync store
//!
//! Local persistence interfaces used by the sync engine.
//!
//! The engine never talks to a storage engine directly. It goes through:
//!
//! - [`LocalStore`], a key-addressable record store with transactional
//!   [`WriteBatch`] commits and the sync metadata tables
//! - [`Outbox`], the read side of the pending local mutation queue
//!
//! ## Available Implementations
//!
//! - [`MemoryStore`] - For testing and ephemeral storage
//! - [`MemoryOutbox`] - In-memory pending mutation set
//!
//! ## Example
//!
//! ```rust
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! use modelsync_model::{Record, RecordId};
//! use modelsync_store::{LocalStore, MemoryStore, WriteBatch};
//!
//! let store = MemoryStore::new();
//! let batch = WriteBatch::new().put_record(RecordId::new("p1"), Record::with_id("Post", "p1"));
//! store.apply(batch).await.unwrap();
//!
//! let found = store.get("Post", &RecordId::new("p1")).await.unwrap();
//! assert!(found.is_some());
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod memory;
mod outbox;
mod store;

pub use batch::{Precondition, WriteBatch, WriteOp};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use outbox::{MemoryOutbox, Outbox};
pub use store::LocalStore;
