//! Error types for reading and writing grouped message streams.
//!
//! Clean end of stream is not an error: running out of input exactly at a
//! group boundary ends iteration. Everything here is fatal to the reader or
//! writer that produced it.

use thiserror::Error;

/// Boxed error returned by a group listener.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Broad classification of a [`DecodeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The underlying stream failed.
    Io,
    /// A declared length exceeds a limit.
    Oversize,
    /// Framing is malformed or truncated.
    MalformedFraming,
}

/// Error while reading a stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    // === Framing ===
    #[error("unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("varint exceeds maximum length (10 bytes) in {context}")]
    VarintTooLong { context: &'static str },

    #[error("varint overflow (value exceeds u64) in {context}")]
    VarintOverflow { context: &'static str },

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: u64,
        max: usize,
    },

    // === Compressed blocks ===
    #[error("invalid block magic at byte {address}: found {found:?}")]
    InvalidBlockMagic { address: u64, found: [u8; 4] },

    #[error("block at byte {address} failed to decompress: {reason}")]
    DecompressionFailed { address: u64, reason: String },

    #[error("block at byte {address} decompressed to {actual} bytes, header declared {declared}")]
    BlockSizeMismatch {
        address: u64,
        declared: usize,
        actual: usize,
    },

    #[error("seek target {within} lies past the end of a {len}-byte block")]
    SeekPastBlockEnd { within: u16, len: usize },

    #[error("reader was poisoned by an earlier error")]
    Poisoned,
}

impl From<std::io::Error> for DecodeError {
    /// Unwraps decode errors that were smuggled through an `io::Read` impl,
    /// so block corruption keeps its own variant.
    fn from(err: std::io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<DecodeError>()) {
            let kind = err.kind();
            return match err.into_inner().map(|inner| inner.downcast::<DecodeError>()) {
                Some(Ok(inner)) => *inner,
                _ => DecodeError::Io(std::io::Error::from(kind)),
            };
        }
        DecodeError::Io(err)
    }
}

impl From<DecodeError> for std::io::Error {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Io(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

impl DecodeError {
    /// Returns the broad kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::Io(_) => ErrorKind::Io,
            DecodeError::LengthExceedsLimit { .. } => ErrorKind::Oversize,
            _ => ErrorKind::MalformedFraming,
        }
    }
}

/// Error while writing a stream.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("zstd compression failed: {0}")]
    CompressionFailed(String),

    #[error("group listener failed: {0}")]
    Listener(ListenerError),

    #[error("writer has already been finished")]
    Finished,
}

impl From<std::io::Error> for EncodeError {
    /// Unwraps encode errors raised inside an `io::Write` impl.
    fn from(err: std::io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<EncodeError>()) {
            let kind = err.kind();
            return match err.into_inner().map(|inner| inner.downcast::<EncodeError>()) {
                Some(Ok(inner)) => *inner,
                _ => EncodeError::Io(std::io::Error::from(kind)),
            };
        }
        EncodeError::Io(err)
    }
}

/// Error constructing a [`VirtualOffset`](crate::offset::VirtualOffset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OffsetError {
    #[error("virtual offset {0} is negative")]
    NegativeOffset(i64),

    #[error("block address {0} does not fit in 48 bits")]
    OutOfRange(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            DecodeError::LengthExceedsLimit { field: "message", len: 1, max: 0 }.kind(),
            ErrorKind::Oversize
        );
        assert_eq!(
            DecodeError::UnexpectedEof { context: "message" }.kind(),
            ErrorKind::MalformedFraming
        );
        let io = std::io::Error::other("boom");
        assert_eq!(DecodeError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_decode_error_survives_io_roundtrip() {
        let original = DecodeError::InvalidBlockMagic { address: 12, found: *b"ABCD" };
        let io: std::io::Error = original.into();
        assert!(matches!(
            DecodeError::from(io),
            DecodeError::InvalidBlockMagic { address: 12, .. }
        ));
    }
}
