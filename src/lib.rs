//! # SpanKV
//!
//! A key-value facade for concurrent point reads and writes over a
//! session-based log store, with three interchangeable value strategies:
//! - **Object**: values cross the engine boundary as `String`s and are
//!   encoded by the engine's serializer hook when their page is flushed
//! - **Owned buffer**: values are encoded up front into a buffer the engine
//!   takes ownership of
//! - **Borrowed span**: values are encoded into scratch space and passed as a
//!   view that is only valid for the call
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Callers (many tasks)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ upsert / read_async
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │          KvStore: ObjectStore | OwnedBufferStore |          │
//! │                    SpanStore  (+ ValueCodec)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ one lease per operation
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       SessionPool                           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ &mut Session
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        LogStore                             │
//! │       index ─► hybrid log (memory pages ─► LogDevice)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod engine;
pub mod pool;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{SpanKvError, Result};
pub use config::Config;
pub use codec::{BincodeCodec, MessagePackCodec, ValueCodec};
pub use engine::Key;
pub use store::{
    open_store, open_store_with_codec, KvStore, LifecycleState, ObjectStore, OwnedBufferStore,
    ReadStatus, SpanStore, Strategy,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of SpanKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
