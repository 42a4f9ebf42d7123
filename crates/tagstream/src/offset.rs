//! Virtual offsets into a block-compressed stream.
//!
//! A virtual offset names a byte of the uncompressed stream by the address of
//! the compressed block holding it and the position inside that block:
//!
//! ```text
//! raw = block_address << 16 | within_block
//! ```
//!
//! Offsets are opaque to everything except the stream that produced them.
//! Streams without positioning support report `None` wherever an offset
//! would be returned.

use std::fmt;

use crate::error::OffsetError;

/// Largest block address representable in a virtual offset.
pub const MAX_BLOCK_ADDRESS: u64 = (1 << 48) - 1;

/// An opaque position token into a block-compressed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Composes an offset from a compressed block address and a position
    /// within that block's uncompressed data.
    pub fn new(block_address: u64, within_block: u16) -> Result<Self, OffsetError> {
        if block_address > MAX_BLOCK_ADDRESS {
            return Err(OffsetError::OutOfRange(block_address));
        }
        Ok(Self((block_address << 16) | within_block as u64))
    }

    /// Wraps a raw offset previously obtained from [`raw`](Self::raw).
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit value, suitable for storing in an index.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns the byte address of the compressed block.
    pub const fn block_address(self) -> u64 {
        self.0 >> 16
    }

    /// Returns the position within the block's uncompressed data.
    pub const fn within_block(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl TryFrom<i64> for VirtualOffset {
    type Error = OffsetError;

    /// Accepts signed offsets as stored by indexes that use `-1` for "none".
    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        if raw < 0 {
            return Err(OffsetError::NegativeOffset(raw));
        }
        Ok(Self(raw as u64))
    }
}

impl From<VirtualOffset> for u64 {
    fn from(offset: VirtualOffset) -> u64 {
        offset.0
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_address(), self.within_block())
    }
}
