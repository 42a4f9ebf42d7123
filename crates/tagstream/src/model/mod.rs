//! Data model types for grouped message streams.
//!
//! - Tagged messages (what readers yield)
//! - Flushed groups (what writers report to listeners)

pub mod group;
pub mod message;

pub use group::FlushedGroup;
pub use message::TaggedMessage;
