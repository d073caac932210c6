//! Engine Module
//!
//! A small keyed log store that the facade drives through sessions.
//!
//! ## Responsibilities
//! - Point upserts and point reads keyed by [`Key`]
//! - Append-only hybrid log: recent pages in memory, older pages on a device
//! - Per-type serializer hook, invoked when a page leaves memory
//! - Asynchronous reads: device hits are served off the calling task
//!
//! ## Layout
//! ```text
//!   Session ──► LogStore ──► index: Key → LogAddress
//!                   │
//!                   ▼
//!   ┌────────────── HybridLog ──────────────┐
//!   │  flushed pages  │  in-memory pages    │
//!   │  (LogDevice)    │  (≤ memory budget)  │
//!   └─────────────────┴─────────────────────┘
//! ```
//!
//! ## Concurrency
//! The store itself is safe to use from many sessions at once. A single
//! [`Session`] is not: every operation takes `&mut self`, so exclusive use is
//! enforced by the borrow checker rather than by convention.

mod buffer;
mod device;
mod functions;
mod log;
mod serializer;
mod span;
mod store;

pub use buffer::{BufferPool, PooledBuffer};
pub use device::{open_device, FileDevice, LogDevice, MemoryDevice};
pub use functions::{MemoryFunctions, ObjectFunctions, SessionFunctions, SpanByteFunctions};
pub use log::{LogAddress, RECORD_HEADER_SIZE};
pub use serializer::{RawBytes, ValueSerializer};
pub use span::SpanByte;
pub use store::{LogStore, LogStoreConfig, Session};

/// Key type used by the engine and every store
pub type Key = i64;

/// Outcome of an engine point read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A record exists for the key
    Found,

    /// The key was never written
    NotFound,
}
