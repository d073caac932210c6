//! Object strategy
//!
//! The facade hands the `String` itself to the engine. Encoding happens later,
//! inside the engine, when the page holding the value is flushed: the
//! `CodecSerializer` hook runs then and again when a flushed value is read
//! back. Until that flush a read simply clones the stored object.
//!
//! There is no barrier between `upsert` returning and the hook running;
//! reads do not depend on one, since an unflushed value is read from memory.

use std::sync::Arc;

use async_trait::async_trait;

use crate::codec::{BincodeCodec, ValueCodec};
use crate::config::Config;
use crate::engine::{Key, LogStore, ObjectFunctions, Status, ValueSerializer};
use crate::error::Result;

use super::lifecycle::{LifecycleState, StoreCore};
use super::{KvStore, ReadStatus, Strategy};

/// In-page footprint of an object record's value (a reference, not the bytes)
pub const OBJECT_SLOT_SIZE: usize = 8;

/// Serializer hook that runs a `ValueCodec` at flush and device-read time
pub struct CodecSerializer<C> {
    codec: Arc<C>,
}

impl<C: ValueCodec> CodecSerializer<C> {
    pub fn new(codec: Arc<C>) -> Self {
        Self { codec }
    }
}

impl<C: ValueCodec> ValueSerializer<String> for CodecSerializer<C> {
    fn inline_size(&self, _value: &String) -> usize {
        OBJECT_SLOT_SIZE
    }

    fn serialize(&self, value: &String, buf: &mut Vec<u8>) -> Result<()> {
        self.codec.encode_into(value, buf)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String> {
        self.codec.decode(bytes)
    }
}

/// Store that passes values to the engine as objects
pub struct ObjectStore<C: ValueCodec = BincodeCodec> {
    core: StoreCore<String, ObjectFunctions<String>>,
    codec: Arc<C>,
}

impl ObjectStore<BincodeCodec> {
    /// Open with the default codec
    pub fn open(config: &Config) -> Result<Self> {
        Self::with_codec(config, BincodeCodec)
    }
}

impl<C: ValueCodec> ObjectStore<C> {
    /// Open with `codec` installed as the engine's serializer hook
    pub fn with_codec(config: &Config, codec: C) -> Result<Self> {
        let codec = Arc::new(codec);
        let serializer: Arc<dyn ValueSerializer<String>> =
            Arc::new(CodecSerializer::new(Arc::clone(&codec)));
        let core = StoreCore::open(Strategy::Object, config, serializer, |_| {
            ObjectFunctions::new()
        })?;

        Ok(Self { core, codec })
    }

    /// The underlying engine
    pub fn engine(&self) -> &Arc<LogStore<String>> {
        self.core.engine()
    }

    /// Sessions created over the store's lifetime
    pub fn sessions_created(&self) -> usize {
        self.core.pool().created()
    }

    /// Codec used by the serializer hook
    pub fn codec(&self) -> &C {
        &self.codec
    }
}

#[async_trait]
impl<C: ValueCodec> KvStore for ObjectStore<C> {
    fn strategy(&self) -> Strategy {
        Strategy::Object
    }

    fn upsert(&self, key: Key, value: &str) -> Result<()> {
        let mut session = self.core.lease()?;
        session.upsert(key, value.to_owned())
    }

    async fn read_async(&self, key: Key) -> Result<(ReadStatus, Option<String>)> {
        let result = {
            let mut session = self.core.lease()?;
            session.read_async(key).await
        };

        match result {
            Ok((Status::Found, Some(value))) => Ok((ReadStatus::Found, Some(value))),
            Ok(_) => Ok((ReadStatus::NotFound, None)),
            Err(e) if e.is_decode() => {
                tracing::warn!(key, codec = self.codec.name(), "Stored object failed to decode: {}", e);
                Ok((ReadStatus::Error, None))
            }
            Err(e) => Err(e),
        }
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
