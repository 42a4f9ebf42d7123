//! Views of groups as they are flushed.

use crate::offset::VirtualOffset;

/// A group that has just been written, as seen by a listener.
///
/// Borrowed from the writer for the duration of the listener call only.
#[derive(Debug, Clone, Copy)]
pub struct FlushedGroup<'a> {
    /// Tag written in the group's first slot, or `""` for an untagged group.
    pub tag: &'a str,
    /// Messages in write order, excluding the tag slot.
    pub messages: &'a [Vec<u8>],
    /// Offset of the group's count varint, if the stream knows its position.
    pub start: Option<VirtualOffset>,
    /// Offset just past the group's last byte, if the stream knows its position.
    pub end: Option<VirtualOffset>,
}

impl FlushedGroup<'_> {
    /// Number of slots on the wire, including the tag slot.
    pub fn slot_count(&self) -> usize {
        self.messages.len() + usize::from(!self.tag.is_empty())
    }

    /// Returns true if the group carries a tag and no messages.
    pub fn is_tag_only(&self) -> bool {
        self.messages.is_empty() && !self.tag.is_empty()
    }
}
