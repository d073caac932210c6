//! Session functions
//!
//! A session is parameterised by a `SessionFunctions` implementation that
//! decides what an upsert accepts and what a read hands back. The engine
//! itself only ever stores `V`.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;

use super::buffer::{BufferPool, PooledBuffer};
use super::span::SpanByte;

/// Input/output conversion for one value strategy
pub trait SessionFunctions<V>: Send + Sync + 'static {
    /// What `Session::upsert` accepts
    type Input<'a>;

    /// What `Session::read_async` returns for a found key
    type Output: Send + 'static;

    /// Turn upsert input into the value the log stores
    fn upsert_value(&self, input: Self::Input<'_>) -> V;

    /// Produce read output from a stored value
    fn read_value(&self, value: &V) -> Self::Output;
}

/// Values are stored and returned as objects
pub struct ObjectFunctions<V> {
    _value: PhantomData<fn() -> V>,
}

impl<V> ObjectFunctions<V> {
    pub fn new() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<V> Default for ObjectFunctions<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for ObjectFunctions<V> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync + 'static> SessionFunctions<V> for ObjectFunctions<V> {
    type Input<'a> = V;
    type Output = V;

    fn upsert_value(&self, input: V) -> V {
        input
    }

    fn read_value(&self, value: &V) -> V {
        value.clone()
    }
}

/// Owned buffers in, pooled buffers out
///
/// The caller hands over ownership of its encoded buffer, so the log can keep
/// the allocation without copying.
#[derive(Clone)]
pub struct MemoryFunctions {
    buffers: Arc<BufferPool>,
}

impl MemoryFunctions {
    pub fn new(buffers: Arc<BufferPool>) -> Self {
        Self { buffers }
    }
}

impl SessionFunctions<Bytes> for MemoryFunctions {
    type Input<'a> = Vec<u8>;
    type Output = PooledBuffer;

    fn upsert_value(&self, input: Vec<u8>) -> Bytes {
        Bytes::from(input)
    }

    fn read_value(&self, value: &Bytes) -> PooledBuffer {
        self.buffers.rent_copy(value)
    }
}

/// Borrowed spans in, pooled buffers out
///
/// The span is only valid for the upsert call, so its bytes are copied into
/// log-owned memory before the call returns.
#[derive(Clone)]
pub struct SpanByteFunctions {
    buffers: Arc<BufferPool>,
}

impl SpanByteFunctions {
    pub fn new(buffers: Arc<BufferPool>) -> Self {
        Self { buffers }
    }
}

impl SessionFunctions<Bytes> for SpanByteFunctions {
    type Input<'a> = SpanByte<'a>;
    type Output = PooledBuffer;

    fn upsert_value(&self, input: SpanByte<'_>) -> Bytes {
        Bytes::copy_from_slice(input.as_slice())
    }

    fn read_value(&self, value: &Bytes) -> PooledBuffer {
        self.buffers.rent_copy(value)
    }
}
