//! tagstream: seekable, block-compressed streams of grouped messages.
//!
//! A stream is a sequence of groups. Each group is a varint count followed by
//! that many length-prefixed slots. The first slot of a group may be a *tag*,
//! a short string naming the type of the messages that follow.
//! Groups are written into a block-compressed byte stream, so any group can be
//! revisited later by its [`VirtualOffset`].
//!
//! # Quick Start
//!
//! ```rust
//! use std::io::Cursor;
//! use tagstream::{GroupReader, GroupWriter, KnownTags, TaggedMessage, WriterOptions};
//! use tagstream::stream::BlockOptions;
//!
//! let mut writer = GroupWriter::compressed(
//!     Vec::new(),
//!     WriterOptions::new().tag("GAM").max_group_size(2),
//!     BlockOptions::default(),
//! )
//! .unwrap();
//! writer.write(b"first".to_vec()).unwrap();
//! writer.write(b"second".to_vec()).unwrap();
//! writer.write(b"third".to_vec()).unwrap();
//! let bytes = writer.finish().unwrap().into_inner();
//!
//! let reader = GroupReader::compressed(Cursor::new(bytes), KnownTags::new().with_tag("GAM")).unwrap();
//! let messages: Vec<TaggedMessage> = reader.collect::<Result<_, _>>().unwrap();
//! assert_eq!(messages.len(), 3);
//! assert!(messages.iter().all(|m| m.tag == "GAM"));
//! ```
//!
//! # Modules
//!
//! - [`group`]: Group writer and reader
//! - [`stream`]: Blocked zstd streams and the capabilities groups need from them
//! - [`registry`]: Tag registries used to recognize tag slots
//! - [`model`]: Tagged messages and flushed group records
//! - [`codec`]: Varint and slot primitives
//! - [`offset`]: Virtual offsets
//! - [`error`]: Error types
//! - [`limits`]: Size limits and format constants
//!
//! # Security
//!
//! Readers are meant to handle untrusted input:
//! - Slot and block lengths are checked before anything is allocated
//! - Varints are limited to ten bytes
//! - Malformed framing is reported, never skipped

pub mod codec;
pub mod error;
pub mod group;
pub mod limits;
pub mod model;
pub mod offset;
pub mod registry;
pub mod stream;

// Re-export commonly used types at crate root
pub use error::{DecodeError, EncodeError, ErrorKind, ListenerError, OffsetError};
pub use group::{GroupReader, GroupWriter, Listener, WriterOptions};
pub use model::{FlushedGroup, TaggedMessage};
pub use offset::VirtualOffset;
pub use registry::{register_tag, GlobalRegistry, KnownTags, NoTags, TagRegistry};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
