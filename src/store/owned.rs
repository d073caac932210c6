//! Owned-buffer strategy
//!
//! Values are encoded into a fresh buffer whose ownership moves into the
//! engine. Reads come back in an engine-owned pooled buffer.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::{BincodeCodec, ValueCodec};
use crate::config::Config;
use crate::engine::{BufferPool, Key, LogStore, MemoryFunctions, RawBytes, ValueSerializer};
use crate::error::Result;

use super::lifecycle::{LifecycleState, StoreCore};
use super::{decode_pooled, KvStore, ReadStatus, Strategy};

/// Store that passes values to the engine as owned byte buffers
pub struct OwnedBufferStore<C: ValueCodec = BincodeCodec> {
    core: StoreCore<Bytes, MemoryFunctions>,
    codec: C,
}

impl OwnedBufferStore<BincodeCodec> {
    /// Open with the default codec
    pub fn open(config: &Config) -> Result<Self> {
        Self::with_codec(config, BincodeCodec)
    }
}

impl<C: ValueCodec> OwnedBufferStore<C> {
    pub fn with_codec(config: &Config, codec: C) -> Result<Self> {
        let serializer: Arc<dyn ValueSerializer<Bytes>> = Arc::new(RawBytes);
        let core = StoreCore::open(Strategy::OwnedBuffer, config, serializer, |engine| {
            MemoryFunctions::new(engine.buffer_pool())
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
impl<C: ValueCodec> KvStore for OwnedBufferStore<C> {
    fn strategy(&self) -> Strategy {
        Strategy::OwnedBuffer
    }

    fn upsert(&self, key: Key, value: &str) -> Result<()> {
        let encoded = self.codec.encode(value)?;

        let mut session = self.core.lease()?;
        session.upsert(key, encoded)
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
