//! Value Codec Module
//!
//! The serialize/deserialize boundary between domain values (`String`) and
//! the bytes the engine stores.
//!
//! ## Responsibilities
//! - Deterministic encoding within one process run
//! - Reject malformed or truncated input with `SpanKvError::Decode`
//! - Know nothing about the engine or the session pool
//!
//! ## Implementations
//! - [`BincodeCodec`]: length-prefixed UTF-8 (default)
//! - [`MessagePackCodec`]: MessagePack `str` family

mod bincode_codec;
mod msgpack_codec;

pub use self::bincode_codec::BincodeCodec;
pub use self::msgpack_codec::MessagePackCodec;

use crate::error::Result;

/// Turns a value into bytes and back
///
/// Codecs are shared by every in-flight operation of a store, so they must be
/// usable through `&self` from many threads.
pub trait ValueCodec: Send + Sync + 'static {
    /// Short name used in log output
    fn name(&self) -> &'static str;

    /// Append the encoding of `value` to `buf`
    fn encode_into(&self, value: &str, buf: &mut Vec<u8>) -> Result<()>;

    /// Decode a value, failing on malformed or truncated bytes
    fn decode(&self, bytes: &[u8]) -> Result<String>;

    /// Encode `value` into a fresh buffer
    fn encode(&self, value: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(value.len() + 9);
        self.encode_into(value, &mut buf)?;
        Ok(buf)
    }
}
