//! Store Facade Module
//!
//! One contract, three ways of getting a value across the engine boundary.
//!
//! | Strategy | Write path | Read path |
//! |---|---|---|
//! | [`ObjectStore`] | value handed to the engine; encoded by its serializer hook at page flush | object cloned from memory, or rebuilt by the hook from the device |
//! | [`OwnedBufferStore`] | encoded into an owned buffer that the engine takes over | engine returns a pooled buffer; decoded, then released |
//! | [`SpanStore`] | encoded into scratch space, passed as a call-scoped span; the engine copies | same as owned buffer |
//!
//! Every operation leases one session from the pool for its duration.
//! Reads release the session before decoding.

mod lifecycle;
mod object;
mod owned;
mod span;

pub use lifecycle::LifecycleState;
pub use object::{CodecSerializer, ObjectStore, OBJECT_SLOT_SIZE};
pub use owned::OwnedBufferStore;
pub use span::SpanStore;

use std::fmt;

use async_trait::async_trait;

use crate::codec::{BincodeCodec, ValueCodec};
use crate::config::Config;
use crate::engine::{Key, PooledBuffer, Status};
use crate::error::Result;

/// Terminal status of a facade read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The key exists and its value decoded
    Found,

    /// The key was never written
    NotFound,

    /// The key exists but its bytes did not decode
    Error,
}

/// Value representation at the engine boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Object,
    OwnedBuffer,
    BorrowedSpan,
}

impl Strategy {
    /// Every strategy, in a stable order
    pub const ALL: [Strategy; 3] = [
        Strategy::Object,
        Strategy::OwnedBuffer,
        Strategy::BorrowedSpan,
    ];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Object => "object",
            Strategy::OwnedBuffer => "owned-buffer",
            Strategy::BorrowedSpan => "borrowed-span",
        };
        f.write_str(name)
    }
}

/// Concurrent point reads and writes over a pooled set of engine sessions
///
/// ## Disposal
/// `dispose` closes the session pool, disposes every idle session, then
/// disposes the engine. It is idempotent: a second call returns `Ok(())`
/// and does nothing. Dropping a store that was not disposed disposes it.
/// After disposal every operation fails with `SpanKvError::Disposed`.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Which value representation this store uses
    fn strategy(&self) -> Strategy;

    /// Insert or replace the value for `key`
    ///
    /// Codec and engine failures are returned to the caller unchanged.
    ///
    /// The owned-buffer and borrowed-span strategies store the encoded value
    /// inline in a log page, so a value whose encoding plus the record
    /// header exceeds the configured page size fails with
    /// `SpanKvError::RecordTooLarge` (about 4 KiB with default settings).
    /// The object strategy accepts it.
    fn upsert(&self, key: Key, value: &str) -> Result<()>;

    /// Point read
    ///
    /// Returns `(NotFound, None)` for a key never written and
    /// `(Error, None)` when stored bytes do not decode. Engine failures are
    /// returned as `Err`. Must be polled inside a Tokio runtime.
    async fn read_async(&self, key: Key) -> Result<(ReadStatus, Option<String>)>;

    /// Idle sessions in the pool (diagnostic)
    fn num_sessions(&self) -> usize;

    /// Current lifecycle state
    fn state(&self) -> LifecycleState;

    /// Release every session, then the engine
    fn dispose(&self) -> Result<()>;
}

/// Open a store for `strategy` with the default codec
pub fn open_store(strategy: Strategy, config: &Config) -> Result<Box<dyn KvStore>> {
    open_store_with_codec(strategy, config, BincodeCodec)
}

/// Open a store for `strategy` with a caller-chosen codec
pub fn open_store_with_codec<C: ValueCodec>(
    strategy: Strategy,
    config: &Config,
    codec: C,
) -> Result<Box<dyn KvStore>> {
    Ok(match strategy {
        Strategy::Object => Box::new(ObjectStore::with_codec(config, codec)?),
        Strategy::OwnedBuffer => Box::new(OwnedBufferStore::with_codec(config, codec)?),
        Strategy::BorrowedSpan => Box::new(SpanStore::with_codec(config, codec)?),
    })
}

/// Decode a byte-valued read result. The pooled buffer is released when this
/// returns, on the success and the decode-failure path alike.
fn decode_pooled<C: ValueCodec>(
    codec: &C,
    key: Key,
    status: Status,
    output: Option<PooledBuffer>,
) -> (ReadStatus, Option<String>) {
    match (status, output) {
        (Status::Found, Some(buffer)) => match codec.decode(&buffer) {
            Ok(value) => (ReadStatus::Found, Some(value)),
            Err(e) => {
                tracing::warn!(key, codec = codec.name(), "Stored value failed to decode: {}", e);
                (ReadStatus::Error, None)
            }
        },
        _ => (ReadStatus::NotFound, None),
    }
}
