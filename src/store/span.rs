//! Borrowed-span strategy
//!
//! Values are encoded into a per-thread scratch buffer and passed to the
//! engine as a `SpanByte` that is only valid for the upsert call. The next
//! upsert on the same thread overwrites the scratch buffer, so the engine
//! must have copied the bytes, and the span's lifetime makes sure it did.

use std::cell::RefCell;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::{BincodeCodec, ValueCodec};
use crate::config::Config;
use crate::engine::{BufferPool, Key, LogStore, RawBytes, SpanByte, SpanByteFunctions, ValueSerializer};
use crate::error::Result;

use super::lifecycle::{LifecycleState, StoreCore};
use super::{decode_pooled, KvStore, ReadStatus, Strategy};

/// Scratch capacity kept between upserts; larger buffers are released
const MAX_RETAINED_SCRATCH: usize = 64 * 1024;

thread_local! {
    static ENCODE_SCRATCH: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

/// Store that passes values to the engine as borrowed spans
pub struct SpanStore<C: ValueCodec = BincodeCodec> {
    core: StoreCore<Bytes, SpanByteFunctions>,
    codec: C,
}

impl SpanStore<BincodeCodec> {
    /// Open with the default codec
    pub fn open(config: &Config) -> Result<Self> {
        Self::with_codec(config, BincodeCodec)
    }
}

impl<C: ValueCodec> SpanStore<C> {
    pub fn with_codec(config: &Config, codec: C) -> Result<Self> {
        let serializer: Arc<dyn ValueSerializer<Bytes>> = Arc::new(RawBytes);
        let core = StoreCore::open(Strategy::BorrowedSpan, config, serializer, |engine| {
            SpanByteFunctions::new(engine.buffer_pool())
        })?;

        Ok(Self { core, codec })
    }

    /// The underlying engine
    pub fn engine(&self) -> &Arc<LogStore<Bytes>> {
        self.core.engine()
    }

    /// Pool that read results are rented from
    pub fn buffer_pool(&self) -> Arc<BufferPool> {
        self.core.engine().buffer_pool()
    }

    /// Sessions created over the store's lifetime
    pub fn sessions_created(&self) -> usize {
        self.core.pool().created()
    }
}

#[async_trait]
impl<C: ValueCodec> KvStore for SpanStore<C> {
    fn strategy(&self) -> Strategy {
        Strategy::BorrowedSpan
    }

    fn upsert(&self, key: Key, value: &str) -> Result<()> {
        ENCODE_SCRATCH.with(|scratch| {
            let mut buf = scratch.borrow_mut();
            buf.clear();
            if buf.capacity() > MAX_RETAINED_SCRATCH {
                buf.shrink_to(MAX_RETAINED_SCRATCH);
            }
            self.codec.encode_into(value, &mut buf)?;

            let mut session = self.core.lease()?;
            session.upsert(key, SpanByte::from_slice(&buf))
        })
    }

    async fn read_async(&self, key: Key) -> Result<(ReadStatus, Option<String>)> {
        let (status, output) = {
            let mut session = self.core.lease()?;
            session.read_async(key).await?
        };

        Ok(decode_pooled(&self.codec, key, status, output))
    }

    fn num_sessions(&self) -> usize {
        self.core.pool().count()
    }

    fn state(&self) -> LifecycleState {
        self.core.state()
    }

    fn dispose(&self) -> Result<()> {
        self.core.shutdown()
    }
}
