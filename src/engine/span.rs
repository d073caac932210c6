//! Borrowed byte spans
//!
//! A `SpanByte` is an address + length view over bytes the caller owns. It
//! lives exactly as long as the borrow it was built from, so an engine call
//! that receives one can read it but cannot keep it: the stored value type is
//! `'static` and must be produced by copying.

/// Non-owning view over caller memory, valid for a single engine call
#[derive(Debug, Clone, Copy)]
pub struct SpanByte<'a> {
    bytes: &'a [u8],
}

impl<'a> SpanByte<'a> {
    /// Build a span over `bytes`
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Length of the viewed region
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Start address of the viewed region (diagnostics only)
    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    /// Borrow the viewed bytes
    pub fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }
}
