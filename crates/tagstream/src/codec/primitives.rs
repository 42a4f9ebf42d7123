//! Primitive encoding/decoding for the group framing.
//!
//! Implements unsigned varints (protobuf-compatible LEB128) and
//! length-prefixed slots.

use std::io::{self, Read};

use crate::error::DecodeError;
use crate::limits::{BLOCK_CAPACITY, MAX_VARINT_BYTES};

// =============================================================================
// DECODING
// =============================================================================

/// Reads a single byte, returning `None` at end of input.
#[inline]
fn read_byte<R: Read + ?Sized>(reader: &mut R) -> Result<Option<u8>, DecodeError> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DecodeError::from(e)),
        }
    }
}

/// Reads an unsigned varint (LEB128).
///
/// Returns `Ok(None)` if the input ends before the first byte, which callers
/// at a group boundary treat as clean end of stream. Running out of input
/// after the first byte is an error.
pub fn read_varint_or_eof<R: Read + ?Sized>(
    reader: &mut R,
    context: &'static str,
) -> Result<Option<u64>, DecodeError> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for i in 0..MAX_VARINT_BYTES {
        let byte = match read_byte(reader)? {
            Some(byte) => byte,
            None if i == 0 => return Ok(None),
            None => return Err(DecodeError::UnexpectedEof { context }),
        };
        let value = (byte & 0x7F) as u64;

        // Check for overflow
        if shift == 63 && value > 1 {
            return Err(DecodeError::VarintOverflow { context });
        }

        result |= value << shift;

        if byte & 0x80 == 0 {
            return Ok(Some(result));
        }
        shift += 7;
    }

    Err(DecodeError::VarintTooLong { context })
}

/// Reads an unsigned varint that must be present.
#[inline]
pub fn read_varint<R: Read + ?Sized>(
    reader: &mut R,
    context: &'static str,
) -> Result<u64, DecodeError> {
    read_varint_or_eof(reader, context)?.ok_or(DecodeError::UnexpectedEof { context })
}

/// Reads a length-prefixed slot, rejecting declared lengths above `max_len`.
///
/// The declared length is checked before anything is allocated, and the
/// buffer grows with the bytes actually read, so a corrupt prefix on a short
/// stream cannot force a large allocation.
pub fn read_slot<R: Read + ?Sized>(
    reader: &mut R,
    max_len: usize,
    field: &'static str,
) -> Result<Vec<u8>, DecodeError> {
    let len = read_varint(reader, field)?;
    if len > max_len as u64 {
        return Err(DecodeError::LengthExceedsLimit {
            field,
            len,
            max: max_len,
        });
    }
    let len = len as usize;
    let mut bytes = Vec::with_capacity(len.min(BLOCK_CAPACITY));
    (&mut *reader).take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(DecodeError::UnexpectedEof { context: field });
    }
    Ok(bytes)
}

// =============================================================================
// ENCODING
// =============================================================================

/// Writer for encoding framing into a byte buffer.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Creates a new writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Creates a new writer with capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Returns a reference to the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discards the written bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes an unsigned varint (LEB128).
    #[inline]
    pub fn write_varint(&mut self, mut value: u64) {
        let mut buf = [0u8; MAX_VARINT_BYTES];
        let mut len = 0;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            buf[len] = byte;
            len += 1;
            if value == 0 {
                break;
            }
        }
        self.buf.extend_from_slice(&buf[..len]);
    }

    /// Writes a length-prefixed slot.
    pub fn write_slot(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }
}
