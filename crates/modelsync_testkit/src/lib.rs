//! # modelsync testkit
//!
//! Test utilities for modelsync.
//!
//! This crate provides:
//! - Schema and record fixtures
//! - A scripted remote reader with live update injection
//! - A store wrapper that injects write failures
//! - A manually driven clock
//! - Timed helpers for reading event receivers
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use modelsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn downloads_posts() {
//!     let reader = ScriptedReader::new();
//!     reader.push_page("Post", page(vec![post("a", 1)], None, 1_000));
//!     // ... run a sync against `reader`
//! }
//! ```
//!
//! Types that implement engine traits ([`ScriptedReader`], [`ManualClock`])
//! are meant for the engine's integration tests. Store-level helpers work
//! anywhere.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod events;
pub mod fixtures;
pub mod generators;
pub mod reader;
pub mod store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::*;
    pub use crate::events::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::reader::*;
    pub use crate::store::*;
}

pub use clock::*;
pub use events::*;
pub use fixtures::*;
pub use generators::*;
pub use reader::*;
pub use store::*;
