//! Value serializer hook
//!
//! The log keeps recent values in memory as they are. When a page is flushed
//! to the device each value goes through the store's `ValueSerializer`, and
//! device reads come back through it. For object values this is where the
//! encode actually happens, which is later than (and on a different call
//! than) the upsert that stored the object.

use bytes::Bytes;

use crate::error::Result;

/// Converts stored values to device bytes and back
pub trait ValueSerializer<V>: Send + Sync + 'static {
    /// Bytes the value occupies inside an in-memory page
    fn inline_size(&self, value: &V) -> usize;

    /// Append the device form of `value` to `buf`
    fn serialize(&self, value: &V, buf: &mut Vec<u8>) -> Result<()>;

    /// Rebuild a value from its device form
    fn deserialize(&self, bytes: &[u8]) -> Result<V>;
}

/// Identity serializer for byte values
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytes;

impl ValueSerializer<Bytes> for RawBytes {
    fn inline_size(&self, value: &Bytes) -> usize {
        value.len()
    }

    fn serialize(&self, value: &Bytes, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(value);
        Ok(())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(bytes))
    }
}
