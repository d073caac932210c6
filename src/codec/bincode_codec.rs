//! Bincode codec
//!
//! Encodes a string as an 8-byte little-endian length followed by its UTF-8
//! bytes.

use bincode::Options;

use crate::error::{Result, SpanKvError};

use super::ValueCodec;

/// Default codec backed by `bincode`
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl ValueCodec for BincodeCodec {
    fn name(&self) -> &'static str {
        "bincode"
    }

    fn encode_into(&self, value: &str, buf: &mut Vec<u8>) -> Result<()> {
        bincode::serialize_into(buf, value).map_err(|e| SpanKvError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        // Same fixed-int layout as `serialize_into`, but bytes after the value are an error
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .reject_trailing_bytes()
            .deserialize::<String>(bytes)
            .map_err(|e| SpanKvError::Decode(e.to_string()))
    }
}
