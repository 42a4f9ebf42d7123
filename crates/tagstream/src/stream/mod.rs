//! Block-compressed byte streams addressed by virtual offsets.
//!
//! The group writer and reader only need the narrow capabilities described by
//! [`BlockSink`] and [`BlockSource`]. The crate ships one implementation,
//! blocked zstd, where the stream is a sequence of independently
//! decompressible blocks:
//!
//! ```text
//! Block := "TSZB" u32le(uncompressed_len) u32le(compressed_len) zstd_frame
//! EOF   := "TSZB" u32le(0) u32le(0)
//! ```
//!
//! A virtual offset is the byte address of a block header combined with a
//! position inside that block's uncompressed data. Several files, each closed
//! by an EOF marker, may be concatenated and read as one stream.

mod reader;
mod unseekable;
mod writer;

pub use reader::BlockedZstdReader;
pub use unseekable::Unseekable;
pub use writer::BlockedZstdWriter;

use std::io::{Read, Write};

use crate::error::{DecodeError, EncodeError};
use crate::limits::DEFAULT_COMPRESSION_LEVEL;
use crate::offset::VirtualOffset;

/// Output side of a block-compressed stream.
pub trait BlockSink: Write {
    /// Returns the virtual offset of the next byte to be written, or `None`
    /// if the stream does not know its position.
    fn tell(&self) -> Option<VirtualOffset>;

    /// Declares that the next byte written is the start of a new file,
    /// making positions known from here on.
    fn start_file(&mut self);

    /// Flushes buffered data as a complete block and marks end of file.
    fn end_file(&mut self) -> Result<(), EncodeError>;
}

/// Input side of a block-compressed stream.
pub trait BlockSource: Read {
    /// Returns the virtual offset of the next byte to be read, or `None` if
    /// the stream cannot position.
    fn tell(&self) -> Option<VirtualOffset>;

    /// Repositions the stream. Returns `Ok(false)` without side effects if
    /// the stream does not support seeking.
    fn seek(&mut self, offset: VirtualOffset) -> Result<bool, DecodeError>;
}

impl<S: BlockSink + ?Sized> BlockSink for Box<S> {
    fn tell(&self) -> Option<VirtualOffset> {
        (**self).tell()
    }

    fn start_file(&mut self) {
        (**self).start_file()
    }

    fn end_file(&mut self) -> Result<(), EncodeError> {
        (**self).end_file()
    }
}

impl<S: BlockSource + ?Sized> BlockSource for Box<S> {
    fn tell(&self) -> Option<VirtualOffset> {
        (**self).tell()
    }

    fn seek(&mut self, offset: VirtualOffset) -> Result<bool, DecodeError> {
        (**self).seek(offset)
    }
}

/// Options for block compression.
#[derive(Debug, Clone, Copy)]
pub struct BlockOptions {
    /// zstd compression level.
    pub level: i32,
}

impl BlockOptions {
    /// Creates default block options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the zstd compression level.
    pub fn level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}
