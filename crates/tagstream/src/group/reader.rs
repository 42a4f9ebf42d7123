//! Pull-based cursor over a grouped message stream.
//!
//! A group's first slot is either a tag or an ordinary message; nothing on
//! the wire says which. The reader resolves it when the group is entered:
//!
//! | first slot                                  | becomes                          |
//! |---------------------------------------------|----------------------------------|
//! | equal to the non-empty tag already in effect | tag (registry not consulted)    |
//! | recognized by the registry                  | tag, now in effect               |
//! | anything else                               | message with tag `""`; tag cleared |
//!
//! A tag alone in its group is yielded as a tag-only observation. A tag
//! followed by messages is not yielded itself; its messages are.

use std::io::{Read, Seek};

use log::{debug, trace};

use crate::codec::{read_slot, read_varint_or_eof};
use crate::error::DecodeError;
use crate::limits::MAX_MESSAGE_SIZE;
use crate::model::TaggedMessage;
use crate::offset::VirtualOffset;
use crate::registry::TagRegistry;
use crate::stream::{BlockSource, BlockedZstdReader};

/// Where the reader stands relative to group framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// The next slot read is a group's first slot, which may be a tag.
    AtTagCandidate,
    /// The next slot read is a message of the current group.
    InGroup { tagged: bool },
    /// No more input; permanent until a successful seek.
    Exhausted,
    /// A fatal error was returned; permanent until a successful seek.
    Poisoned,
}

/// How a group's first slot was classified.
enum FirstSlot {
    Tag(String),
    Message(Vec<u8>),
}

/// Reads tagged messages from a grouped stream.
///
/// The reader is always either positioned at a current tagged message or
/// exhausted. Construction loads the first message.
///
/// Two readers compare equal when both are exhausted or both are not; the
/// comparison says nothing about their positions.
pub struct GroupReader<S: BlockSource, G: TagRegistry> {
    stream: S,
    registry: G,
    state: State,
    current: Option<TaggedMessage>,
    previous_tag: String,
    /// Slots in the current group, including a tag slot.
    group_count: u64,
    /// Slots consumed from the current group.
    group_index: u64,
    group_start: Option<VirtualOffset>,
    item_start: Option<VirtualOffset>,
    /// Groups whose headers have been read, counting empty ones.
    groups_started: u64,
    /// True while the current message is the first yielded from its group.
    fresh: bool,
    deferred_error: Option<DecodeError>,
}

impl<S: BlockSource, G: TagRegistry> GroupReader<S, G> {
    /// Creates a reader and loads the first tagged message.
    pub fn new(stream: S, registry: G) -> Result<Self, DecodeError> {
        let mut reader = Self {
            stream,
            registry,
            state: State::AtTagCandidate,
            current: None,
            previous_tag: String::new(),
            group_count: 0,
            group_index: 0,
            group_start: None,
            item_start: None,
            groups_started: 0,
            fresh: false,
            deferred_error: None,
        };
        reader.advance()?;
        Ok(reader)
    }

    /// Returns true unless the reader is exhausted or poisoned.
    pub fn has_current(&self) -> bool {
        matches!(self.state, State::AtTagCandidate | State::InGroup { .. })
    }

    /// Returns the current tagged message without advancing.
    pub fn current(&self) -> Option<&TaggedMessage> {
        self.current.as_ref()
    }

    /// Returns the current tagged message mutably without advancing.
    pub fn current_mut(&mut self) -> Option<&mut TaggedMessage> {
        self.current.as_mut()
    }

    /// Moves out the current tagged message and advances.
    ///
    /// If advancing fails after a message was moved out, the message is
    /// returned and the error is returned by the following call.
    pub fn take(&mut self) -> Result<Option<TaggedMessage>, DecodeError> {
        if let Some(e) = self.deferred_error.take() {
            return Err(e);
        }
        let value = self.current.take();
        if let Err(e) = self.advance() {
            if value.is_none() {
                return Err(e);
            }
            self.deferred_error = Some(e);
        }
        Ok(value)
    }

    /// Returns true if the current group's first slot was a tag.
    pub fn in_tagged_group(&self) -> bool {
        matches!(self.state, State::InGroup { tagged: true })
    }

    /// Returns the tag currently in effect, or `""`.
    pub fn previous_tag(&self) -> &str {
        &self.previous_tag
    }

    /// Returns the zero-based ordinal of the current group among all group
    /// headers read since construction, counting empty groups. Available even
    /// when the stream cannot position.
    pub fn group_ordinal(&self) -> Option<u64> {
        match self.state {
            State::Exhausted | State::Poisoned => None,
            _ => self.groups_started.checked_sub(1),
        }
    }

    /// Returns the start offset of the group being read.
    ///
    /// Once exhausted, returns the stream's current position. Returns `None`
    /// if the stream does not support positioning.
    pub fn tell_group(&self) -> Option<VirtualOffset> {
        let here = self.stream.tell()?;
        match self.state {
            State::Exhausted => Some(here),
            _ => self.group_start.or(Some(here)),
        }
    }

    /// Returns the offset of the current message's slot, if positioning is
    /// supported and a message is current.
    pub fn tell_item(&self) -> Option<VirtualOffset> {
        self.stream.tell()?;
        self.item_start
    }

    /// Positions the reader at the group starting at `offset` and loads its
    /// first tagged message.
    ///
    /// Returns `Ok(false)` with no change of state if the stream cannot seek.
    /// An error from the stream poisons the reader.
    /// `offset` must come from a writer listener or [`tell_group`](Self::tell_group);
    /// anything else is read as whatever bytes lie there.
    pub fn seek_group(&mut self, offset: VirtualOffset) -> Result<bool, DecodeError> {
        if self.fresh && self.has_current() && self.group_start == Some(offset) {
            trace!("already at group {}", offset);
            return Ok(true);
        }

        match self.stream.seek(offset) {
            Ok(true) => {}
            Ok(false) => {
                debug!("stream could not seek to {}", offset);
                return Ok(false);
            }
            Err(e) => {
                // The stream may have moved.
                self.poison();
                return Err(e);
            }
        }

        self.group_count = 0;
        self.group_index = 0;
        self.current = None;
        self.deferred_error = None;
        self.state = State::AtTagCandidate;
        self.advance()?;
        Ok(true)
    }

    /// Like [`seek_group`](Self::seek_group) for offsets stored as signed
    /// integers. Negative offsets fail with no change of state.
    pub fn seek_group_raw(&mut self, raw: i64) -> Result<bool, DecodeError> {
        match VirtualOffset::try_from(raw) {
            Ok(offset) => self.seek_group(offset),
            Err(_) => Ok(false),
        }
    }

    /// Loads the next tagged message, or becomes exhausted.
    ///
    /// Exhaustion is stable: advancing an exhausted reader does nothing. An
    /// error poisons the reader until a successful seek.
    pub fn advance(&mut self) -> Result<(), DecodeError> {
        match self.state {
            State::Exhausted => return Ok(()),
            State::Poisoned => return Err(DecodeError::Poisoned),
            _ => {}
        }
        if let Err(e) = self.step() {
            self.poison();
            return Err(e);
        }
        Ok(())
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn step(&mut self) -> Result<(), DecodeError> {
        let mut entered_group = false;

        while self.group_index == self.group_count {
            self.state = State::AtTagCandidate;
            self.group_index = 0;
            let group_start = self.stream.tell();

            let Some(count) = read_varint_or_eof(&mut self.stream, "group count")? else {
                debug!("end of stream at group {:?}", group_start);
                self.exhaust();
                return Ok(());
            };
            self.groups_started += 1;
            self.group_start = group_start;
            self.group_count = count;
            entered_group = true;

            if count == 0 {
                trace!("skipping empty group at {:?}", group_start);
                continue;
            }

            let item_start = self.stream.tell();
            let candidate = read_slot(&mut self.stream, MAX_MESSAGE_SIZE, "tag")?;
            self.item_start = item_start;
            self.group_index = 1;

            match self.classify(candidate) {
                FirstSlot::Message(message) => {
                    trace!("first slot of group at {:?} is a message", group_start);
                    self.previous_tag.clear();
                    self.state = State::InGroup { tagged: false };
                    self.current = Some(TaggedMessage::new(String::new(), message));
                    self.fresh = true;
                    return Ok(());
                }
                FirstSlot::Tag(tag) => {
                    self.previous_tag = tag;
                    self.state = State::InGroup { tagged: true };
                    if count == 1 {
                        trace!("tag-only group {:?} at {:?}", self.previous_tag, group_start);
                        self.current = Some(TaggedMessage::tag_only(self.previous_tag.clone()));
                        self.fresh = true;
                        return Ok(());
                    }
                }
            }
        }

        let item_start = self.stream.tell();
        let message = read_slot(&mut self.stream, MAX_MESSAGE_SIZE, "message")?;
        self.item_start = item_start;
        self.group_index += 1;
        self.fresh = entered_group;
        self.current = Some(TaggedMessage::new(self.previous_tag.clone(), message));
        Ok(())
    }

    fn classify(&self, candidate: Vec<u8>) -> FirstSlot {
        if !self.previous_tag.is_empty() && candidate == self.previous_tag.as_bytes() {
            return FirstSlot::Tag(self.previous_tag.clone());
        }
        match String::from_utf8(candidate) {
            Ok(tag) if self.registry.is_valid_tag(&tag) => {
                debug!("registry recognized tag {:?}", tag);
                FirstSlot::Tag(tag)
            }
            Ok(text) => FirstSlot::Message(text.into_bytes()),
            Err(e) => FirstSlot::Message(e.into_bytes()),
        }
    }

    fn poison(&mut self) {
        self.state = State::Poisoned;
        self.current = None;
        self.fresh = false;
        self.deferred_error = None;
    }

    fn exhaust(&mut self) {
        self.state = State::Exhausted;
        self.current = None;
        self.group_start = None;
        self.item_start = None;
        self.group_count = 0;
        self.group_index = 0;
        self.fresh = false;
    }
}

impl<R: Read + Seek, G: TagRegistry> GroupReader<BlockedZstdReader<R>, G> {
    /// Creates a reader over a blocked zstd stream.
    pub fn compressed(inner: R, registry: G) -> Result<Self, DecodeError> {
        Self::new(BlockedZstdReader::new(inner), registry)
    }
}

impl<S: BlockSource, G: TagRegistry> Iterator for GroupReader<S, G> {
    type Item = Result<TaggedMessage, DecodeError>;

    /// Yields the current message, then advances. An error while advancing
    /// is yielded on the following call, after which iteration ends.
    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() && self.deferred_error.is_none() {
            return None;
        }
        self.take().transpose()
    }
}

impl<S, G, S2, G2> PartialEq<GroupReader<S2, G2>> for GroupReader<S, G>
where
    S: BlockSource,
    G: TagRegistry,
    S2: BlockSource,
    G2: TagRegistry,
{
    fn eq(&self, other: &GroupReader<S2, G2>) -> bool {
        self.has_current() == other.has_current()
    }
}
