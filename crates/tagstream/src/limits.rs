//! Size limits shared by writers and readers.
//!
//! Writers and readers must agree on these bounds: a stream written with a
//! larger message limit than the reader accepts is unreadable by that reader.

/// Maximum length of a single message (or tag) slot, in bytes (64 MiB).
///
/// Enforced on the actual length when writing and on the declared length
/// when reading. Exceeding it is a format violation, never a truncation.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Maximum number of bytes in an unsigned LEB128 varint holding a `u64`.
pub const MAX_VARINT_BYTES: usize = 10;

/// Default number of messages buffered before a group is flushed.
pub const DEFAULT_MAX_GROUP_SIZE: usize = 1000;

/// Uncompressed capacity of one compressed block.
///
/// Must stay below 2^16 so the within-block part of a virtual offset fits in
/// its 16 bits, including the position one past the last byte.
pub const BLOCK_CAPACITY: usize = 0xFF00;

/// Upper bound on a declared compressed block payload.
///
/// zstd never expands incompressible input by more than a small frame
/// overhead, so anything beyond this is corruption.
pub const MAX_COMPRESSED_BLOCK_SIZE: usize = BLOCK_CAPACITY + 1024;

/// Magic bytes opening every compressed block header.
pub const BLOCK_MAGIC: &[u8; 4] = b"TSZB";

/// Size of a compressed block header: magic, uncompressed length, compressed length.
pub const BLOCK_HEADER_SIZE: usize = 12;

/// Default zstd compression level for blocks.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;
