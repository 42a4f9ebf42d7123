use std::io::{self, Write};

use log::trace;

use crate::error::EncodeError;
use crate::limits::{BLOCK_CAPACITY, BLOCK_HEADER_SIZE, BLOCK_MAGIC, MAX_COMPRESSED_BLOCK_SIZE};
use crate::offset::VirtualOffset;
use crate::stream::{BlockOptions, BlockSink};

/// Writes a blocked zstd stream.
///
/// Bytes accumulate in an uncompressed block buffer and are compressed as a
/// unit when the buffer fills or the stream is flushed.
#[derive(Debug)]
pub struct BlockedZstdWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
    /// Byte address the next block header will be written at, if known.
    address: Option<u64>,
    options: BlockOptions,
}

impl<W: Write> BlockedZstdWriter<W> {
    /// Creates a writer whose position in `inner` is unknown.
    ///
    /// `tell` returns `None` until [`start_file`](BlockSink::start_file) is
    /// called.
    pub fn new(inner: W, options: BlockOptions) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(BLOCK_CAPACITY),
            address: None,
            options,
        }
    }

    /// Creates a writer positioned at `byte_offset` of `inner`, for appending
    /// to an existing stream.
    pub fn at_offset(inner: W, byte_offset: u64, options: BlockOptions) -> Self {
        let mut writer = Self::new(inner, options);
        writer.address = Some(byte_offset);
        writer
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Ends the file and returns the underlying writer.
    pub fn finish(mut self) -> Result<W, EncodeError> {
        self.end_file()?;
        Ok(self.inner)
    }

    /// Returns the underlying writer without flushing buffered data.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_header(&mut self, uncompressed_len: usize, compressed_len: usize) -> io::Result<()> {
        let mut header = [0u8; BLOCK_HEADER_SIZE];
        header[0..4].copy_from_slice(BLOCK_MAGIC);
        header[4..8].copy_from_slice(&(uncompressed_len as u32).to_le_bytes());
        header[8..12].copy_from_slice(&(compressed_len as u32).to_le_bytes());
        self.inner.write_all(&header)
    }

    /// Compresses and writes the buffered bytes as one block.
    fn emit_block(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let compressed = compress_block(&self.buffer, self.options.level)
            .map_err(|e| io::Error::other(EncodeError::CompressionFailed(e.to_string())))?;

        if compressed.len() > MAX_COMPRESSED_BLOCK_SIZE {
            return Err(io::Error::other(EncodeError::LengthExceedsLimit {
                field: "compressed block",
                len: compressed.len(),
                max: MAX_COMPRESSED_BLOCK_SIZE,
            }));
        }

        self.write_header(self.buffer.len(), compressed.len())?;
        self.inner.write_all(&compressed)?;

        trace!(
            "wrote block of {} bytes ({} compressed) at {:?}",
            self.buffer.len(),
            compressed.len(),
            self.address
        );

        if let Some(address) = self.address.as_mut() {
            *address += (BLOCK_HEADER_SIZE + compressed.len()) as u64;
        }
        self.buffer.clear();
        Ok(())
    }
}

impl<W: Write> Write for BlockedZstdWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = BLOCK_CAPACITY - self.buffer.len();
        let n = room.min(buf.len());
        self.buffer.extend_from_slice(&buf[..n]);
        if self.buffer.len() == BLOCK_CAPACITY {
            self.emit_block()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit_block()?;
        self.inner.flush()
    }
}

impl<W: Write> BlockSink for BlockedZstdWriter<W> {
    fn tell(&self) -> Option<VirtualOffset> {
        let address = self.address?;
        VirtualOffset::new(address, self.buffer.len() as u16).ok()
    }

    fn start_file(&mut self) {
        self.address = Some(0);
    }

    fn end_file(&mut self) -> Result<(), EncodeError> {
        self.emit_block()?;
        self.write_header(0, 0)?;
        self.inner.flush()?;
        if let Some(address) = self.address.as_mut() {
            *address += BLOCK_HEADER_SIZE as u64;
        }
        Ok(())
    }
}

fn compress_block(data: &[u8], level: i32) -> io::Result<Vec<u8>> {
    let mut encoder = zstd::stream::Encoder::new(Vec::with_capacity(data.len() / 2), level)?;
    encoder.include_checksum(true)?;
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_position_until_start_file() {
        let mut writer = BlockedZstdWriter::new(Vec::new(), BlockOptions::default());
        assert_eq!(writer.tell(), None);
        writer.start_file();
        assert_eq!(writer.tell(), Some(VirtualOffset::new(0, 0).unwrap()));
        writer.write_all(b"abc").unwrap();
        assert_eq!(writer.tell(), Some(VirtualOffset::new(0, 3).unwrap()));
    }

    #[test]
    fn test_at_offset() {
        let writer = BlockedZstdWriter::at_offset(Vec::new(), 500, BlockOptions::default());
        assert_eq!(writer.tell(), Some(VirtualOffset::new(500, 0).unwrap()));
    }

    #[test]
    fn test_block_layout() {
        let mut writer = BlockedZstdWriter::new(Vec::new(), BlockOptions::default());
        writer.start_file();
        writer.write_all(b"hello blocks").unwrap();
        let bytes = writer.finish().unwrap();

        assert_eq!(&bytes[0..4], BLOCK_MAGIC);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 12);
        let compressed_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let eof = &bytes[BLOCK_HEADER_SIZE + compressed_len..];
        assert_eq!(eof, b"TSZB\0\0\0\0\0\0\0\0");
    }

    #[test]
    fn test_full_block_is_emitted_and_position_advances() {
        let mut writer = BlockedZstdWriter::new(Vec::new(), BlockOptions::default());
        writer.start_file();
        writer.write_all(&vec![7u8; BLOCK_CAPACITY]).unwrap();

        let written = writer.get_ref().len() as u64;
        assert!(written > BLOCK_HEADER_SIZE as u64);
        assert_eq!(writer.tell(), Some(VirtualOffset::new(written, 0).unwrap()));
    }

    #[test]
    fn test_compressed_size_error_unwraps() {
        let io = io::Error::other(EncodeError::LengthExceedsLimit {
            field: "compressed block",
            len: 2,
            max: 1,
        });
        assert!(matches!(
            EncodeError::from(io),
            EncodeError::LengthExceedsLimit { field: "compressed block", .. }
        ));
    }

    #[test]
    fn test_end_file_on_empty_writes_only_marker() {
        let mut writer = BlockedZstdWriter::new(Vec::new(), BlockOptions::default());
        writer.start_file();
        writer.end_file().unwrap();
        assert_eq!(writer.get_ref().len(), BLOCK_HEADER_SIZE);
        assert_eq!(
            writer.tell(),
            Some(VirtualOffset::new(BLOCK_HEADER_SIZE as u64, 0).unwrap())
        );
    }
}
