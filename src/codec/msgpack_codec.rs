//! MessagePack codec

use crate::error::{Result, SpanKvError};

use super::ValueCodec;

/// Codec backed by `rmp-serde`
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackCodec;

impl ValueCodec for MessagePackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn encode_into(&self, value: &str, buf: &mut Vec<u8>) -> Result<()> {
        rmp_serde::encode::write(buf, value).map_err(|e| SpanKvError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        rmp_serde::from_slice::<String>(bytes).map_err(|e| SpanKvError::Decode(e.to_string()))
    }
}
