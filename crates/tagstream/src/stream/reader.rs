use std::io::{self, Read, Seek, SeekFrom};

use log::trace;

use crate::error::DecodeError;
use crate::limits::{BLOCK_CAPACITY, BLOCK_HEADER_SIZE, BLOCK_MAGIC, MAX_COMPRESSED_BLOCK_SIZE};
use crate::offset::VirtualOffset;
use crate::stream::BlockSource;

/// Reads a blocked zstd stream.
///
/// Blocks are decompressed lazily, one at a time. Positioning is available
/// when the inner reader can report its position; wrap non-seekable inputs
/// in [`Unseekable`](crate::stream::Unseekable).
#[derive(Debug)]
pub struct BlockedZstdReader<R: Read + Seek> {
    inner: R,
    block: Vec<u8>,
    pos: usize,
    /// Address of the block in `block`, if positioning is supported.
    block_address: Option<u64>,
    /// Address of the next block header to read.
    next_address: Option<u64>,
    compressed: Vec<u8>,
}

/// Outcome of reading one block header and payload.
enum Block {
    Data,
    EndOfFile,
    EndOfInput,
}

impl<R: Read + Seek> BlockedZstdReader<R> {
    /// Creates a reader starting at the current position of `inner`.
    pub fn new(mut inner: R) -> Self {
        let start = inner.stream_position().ok();
        Self {
            inner,
            block: Vec::with_capacity(BLOCK_CAPACITY),
            pos: 0,
            block_address: start,
            next_address: start,
            compressed: Vec::new(),
        }
    }

    /// Returns the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads exactly `buf.len()` bytes, or reports how many were available.
    fn read_fully(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Reads the block at the current inner position into `self.block`.
    fn read_block(&mut self) -> Result<Block, DecodeError> {
        let address = self.next_address.unwrap_or(0);
        let mut header = [0u8; BLOCK_HEADER_SIZE];
        match self.read_fully(&mut header)? {
            0 => return Ok(Block::EndOfInput),
            BLOCK_HEADER_SIZE => {}
            _ => return Err(DecodeError::UnexpectedEof { context: "block header" }),
        }

        if &header[0..4] != BLOCK_MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(&header[0..4]);
            return Err(DecodeError::InvalidBlockMagic { address, found });
        }
        let uncompressed_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let compressed_len = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;

        if uncompressed_len > BLOCK_CAPACITY {
            return Err(DecodeError::LengthExceedsLimit {
                field: "block",
                len: uncompressed_len as u64,
                max: BLOCK_CAPACITY,
            });
        }
        if compressed_len > MAX_COMPRESSED_BLOCK_SIZE {
            return Err(DecodeError::LengthExceedsLimit {
                field: "compressed block",
                len: compressed_len as u64,
                max: MAX_COMPRESSED_BLOCK_SIZE,
            });
        }

        let block_end = self
            .next_address
            .map(|a| a + (BLOCK_HEADER_SIZE + compressed_len) as u64);

        if compressed_len == 0 {
            if uncompressed_len != 0 {
                return Err(DecodeError::BlockSizeMismatch {
                    address,
                    declared: uncompressed_len,
                    actual: 0,
                });
            }
            self.next_address = block_end;
            trace!("end-of-file marker at {}", address);
            return Ok(Block::EndOfFile);
        }

        self.compressed.resize(compressed_len, 0);
        let mut compressed = std::mem::take(&mut self.compressed);
        let read = self.read_fully(&mut compressed);
        self.compressed = compressed;
        if read? != compressed_len {
            return Err(DecodeError::UnexpectedEof { context: "compressed block" });
        }

        self.block.clear();
        let mut decoder = zstd::stream::Decoder::new(&self.compressed[..]).map_err(|e| {
            DecodeError::DecompressionFailed {
                address,
                reason: e.to_string(),
            }
        })?;
        // One byte past the declared length is enough to detect a mismatch.
        (&mut decoder)
            .take(uncompressed_len as u64 + 1)
            .read_to_end(&mut self.block)
            .map_err(|e| DecodeError::DecompressionFailed {
                address,
                reason: e.to_string(),
            })?;

        if self.block.len() != uncompressed_len {
            return Err(DecodeError::BlockSizeMismatch {
                address,
                declared: uncompressed_len,
                actual: self.block.len(),
            });
        }

        trace!("loaded block of {} bytes at {}", uncompressed_len, address);
        self.block_address = self.next_address;
        self.next_address = block_end;
        self.pos = 0;
        Ok(Block::Data)
    }

    /// Advances to the next block with data. Returns false at end of input.
    fn load_next_block(&mut self) -> Result<bool, DecodeError> {
        loop {
            match self.read_block()? {
                Block::Data if !self.block.is_empty() => return Ok(true),
                Block::Data | Block::EndOfFile => continue,
                Block::EndOfInput => {
                    self.block.clear();
                    self.pos = 0;
                    return Ok(false);
                }
            }
        }
    }
}

impl<R: Read + Seek> Read for BlockedZstdReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos == self.block.len() && !self.load_next_block()? {
            return Ok(0);
        }
        let n = buf.len().min(self.block.len() - self.pos);
        buf[..n].copy_from_slice(&self.block[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl<R: Read + Seek> BlockSource for BlockedZstdReader<R> {
    fn tell(&self) -> Option<VirtualOffset> {
        // The end of a block and the start of the next are the same position.
        let offset = if self.pos == self.block.len() {
            VirtualOffset::new(self.next_address?, 0)
        } else {
            VirtualOffset::new(self.block_address?, self.pos as u16)
        };
        offset.ok()
    }

    fn seek(&mut self, offset: VirtualOffset) -> Result<bool, DecodeError> {
        if self.next_address.is_none() {
            return Ok(false);
        }
        let address = offset.block_address();
        self.inner.seek(SeekFrom::Start(address))?;
        self.block.clear();
        self.pos = 0;
        self.block_address = Some(address);
        self.next_address = Some(address);

        let within = offset.within_block();
        if within > 0 {
            match self.read_block()? {
                Block::Data if within as usize <= self.block.len() => self.pos = within as usize,
                Block::Data => {
                    return Err(DecodeError::SeekPastBlockEnd {
                        within,
                        len: self.block.len(),
                    });
                }
                Block::EndOfFile | Block::EndOfInput => {
                    return Err(DecodeError::SeekPastBlockEnd { within, len: 0 });
                }
            }
        }
        trace!("seeked to {}", offset);
        Ok(true)
    }
}
