//! Buffers messages and flushes them as framed groups.
//!
//! Wire format of one group, with protobuf-compatible varints:
//!
//! ```text
//! Group := varint(slot_count) Slot{slot_count}
//! Slot  := varint(byte_length) raw_bytes[byte_length]
//! ```
//!
//! A non-empty tag occupies the first slot of every group it applies to.

use std::io::Write;

use log::{debug, error, trace};

use crate::codec::Writer;
use crate::error::{EncodeError, ListenerError};
use crate::limits::{DEFAULT_MAX_GROUP_SIZE, MAX_MESSAGE_SIZE};
use crate::model::FlushedGroup;
use crate::stream::{BlockOptions, BlockSink, BlockedZstdWriter};

/// Callback observing every flushed group.
pub type Listener = Box<dyn FnMut(&FlushedGroup<'_>) -> Result<(), ListenerError>>;

/// Options for a [`GroupWriter`].
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Messages buffered before a group is flushed. Zero is treated as one.
    pub max_group_size: usize,
    /// Tag written at the head of each group; empty for untagged streams.
    pub tag: String,
}

impl WriterOptions {
    /// Creates default writer options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of messages per group.
    pub fn max_group_size(mut self, max_group_size: usize) -> Self {
        self.max_group_size = max_group_size;
        self
    }

    /// Sets the tag written at the head of each group.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            max_group_size: DEFAULT_MAX_GROUP_SIZE,
            tag: String::new(),
        }
    }
}

/// Writes messages to a block-compressed stream in length-prefixed groups.
///
/// The writer owns its stream. Call [`finish`](Self::finish) to flush the
/// last group, end the file and get the stream back; dropping an unfinished
/// writer does the same but can only log failures.
///
/// A writer is driven by one caller at a time. Concurrent producers should
/// each own a writer over an independent output.
pub struct GroupWriter<S: BlockSink> {
    stream: Option<S>,
    group: Vec<Vec<u8>>,
    tag: String,
    max_group_size: usize,
    listeners: Vec<Listener>,
    framing: Writer,
    groups_written: u64,
}

impl<S: BlockSink> GroupWriter<S> {
    /// Creates a writer over `stream`.
    ///
    /// If the stream cannot report its position, it is told a new file starts
    /// here so group offsets are known.
    pub fn new(mut stream: S, options: WriterOptions) -> Result<Self, EncodeError> {
        check_length("tag", options.tag.len())?;
        if stream.tell().is_none() {
            stream.start_file();
        }
        Ok(Self {
            stream: Some(stream),
            group: Vec::new(),
            tag: options.tag,
            max_group_size: options.max_group_size.max(1),
            listeners: Vec::new(),
            framing: Writer::with_capacity(16),
            groups_written: 0,
        })
    }

    /// Returns the tag applied to buffered and future messages.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Returns the maximum number of messages per group.
    pub fn max_group_size(&self) -> usize {
        self.max_group_size
    }

    /// Returns the number of buffered messages not yet flushed.
    pub fn pending(&self) -> usize {
        self.group.len()
    }

    /// Returns the number of groups flushed so far.
    pub fn groups_written(&self) -> u64 {
        self.groups_written
    }

    /// Returns a reference to the underlying stream.
    pub fn get_ref(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    /// Registers a listener called after every flushed group.
    ///
    /// Listeners run synchronously in registration order. An error from a
    /// listener fails the flush that triggered it.
    pub fn register_listener<F>(&mut self, listener: F)
    where
        F: FnMut(&FlushedGroup<'_>) -> Result<(), ListenerError> + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Appends a message to the pending group, flushing first if it is full.
    ///
    /// Oversize messages are rejected without touching the pending group.
    pub fn write(&mut self, message: Vec<u8>) -> Result<(), EncodeError> {
        check_length("message", message.len())?;
        if self.group.len() >= self.max_group_size {
            self.flush()?;
        }
        self.group.push(message);
        Ok(())
    }

    /// Appends a copy of `message` to the pending group.
    pub fn write_copy(&mut self, message: &[u8]) -> Result<(), EncodeError> {
        check_length("message", message.len())?;
        self.write(message.to_vec())
    }

    /// Appends a message under `tag`, flushing the pending group if its tag
    /// differs.
    pub fn write_tagged(&mut self, tag: &str, message: Vec<u8>) -> Result<(), EncodeError> {
        self.set_tag(tag)?;
        self.write(message)
    }

    /// Changes the tag for future messages, flushing the pending group first.
    pub fn set_tag(&mut self, tag: &str) -> Result<(), EncodeError> {
        if tag == self.tag {
            return Ok(());
        }
        check_length("tag", tag.len())?;
        self.flush()?;
        self.tag = tag.to_string();
        Ok(())
    }

    /// Writes the pending group, if any, and notifies listeners.
    pub fn flush(&mut self) -> Result<(), EncodeError> {
        if self.group.is_empty() {
            return Ok(());
        }
        self.emit_group()
    }

    fn emit_group(&mut self) -> Result<(), EncodeError> {
        let stream = self.stream.as_mut().ok_or(EncodeError::Finished)?;

        let start = stream.tell();
        let tagged = !self.tag.is_empty();
        let slot_count = self.group.len() + usize::from(tagged);

        self.framing.clear();
        self.framing.write_varint(slot_count as u64);
        if tagged {
            self.framing.write_slot(self.tag.as_bytes());
        }
        stream.write_all(self.framing.as_bytes())?;

        for message in &self.group {
            trace!("writing message of {} bytes in group at {:?}", message.len(), start);
            self.framing.clear();
            self.framing.write_varint(message.len() as u64);
            stream.write_all(self.framing.as_bytes())?;
            stream.write_all(message)?;
        }

        let end = stream.tell();
        self.groups_written += 1;
        debug!(
            "flushed group of {} slots (tag {:?}) spanning {:?}..{:?}",
            slot_count, self.tag, start, end
        );

        // The buffer is cleared even if a listener fails; its bytes are already written.
        let messages = std::mem::take(&mut self.group);
        let flushed = FlushedGroup {
            tag: &self.tag,
            messages: &messages,
            start,
            end,
        };
        for listener in &mut self.listeners {
            listener(&flushed).map_err(EncodeError::Listener)?;
        }

        self.group = messages;
        self.group.clear();
        Ok(())
    }

    /// Flushes the last group and ends the file, returning the stream.
    ///
    /// A tagged writer that never flushed a group writes a tag-only group so
    /// the output still declares its type.
    pub fn finish(mut self) -> Result<S, EncodeError> {
        self.close()?.ok_or(EncodeError::Finished)
    }

    fn close(&mut self) -> Result<Option<S>, EncodeError> {
        if self.stream.is_none() {
            return Ok(None);
        }
        let flushed = if self.group.is_empty() && self.groups_written == 0 && !self.tag.is_empty() {
            self.emit_group()
        } else {
            self.flush()
        };
        // Taken before checking the flush so a failed close is never retried.
        let Some(mut stream) = self.stream.take() else {
            return Ok(None);
        };
        flushed?;
        stream.end_file()?;
        Ok(Some(stream))
    }
}

impl<W: Write> GroupWriter<BlockedZstdWriter<W>> {
    /// Creates a writer producing a new blocked zstd file on `inner`.
    pub fn compressed(
        inner: W,
        options: WriterOptions,
        block_options: BlockOptions,
    ) -> Result<Self, EncodeError> {
        Self::new(BlockedZstdWriter::new(inner, block_options), options)
    }
}

impl<S: BlockSink> Drop for GroupWriter<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("failed to close group writer: {}", e);
        }
    }
}

fn check_length(field: &'static str, len: usize) -> Result<(), EncodeError> {
    if len > MAX_MESSAGE_SIZE {
        return Err(EncodeError::LengthExceedsLimit {
            field,
            len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::group::testing::MemorySink;
    use crate::offset::VirtualOffset;

    type Seen = Rc<RefCell<Vec<(String, usize, Option<VirtualOffset>, Option<VirtualOffset>)>>>;

    fn recording(writer: &mut GroupWriter<MemorySink>) -> Seen {
        let seen: Seen = Rc::default();
        let sink = Rc::clone(&seen);
        writer.register_listener(move |group| {
            sink.borrow_mut()
                .push((group.tag.to_string(), group.messages.len(), group.start, group.end));
            Ok(())
        });
        seen
    }

    #[test]
    fn test_groups_split_at_max_size() {
        let sink = MemorySink::new();
        let mut writer =
            GroupWriter::new(sink.clone(), WriterOptions::new().max_group_size(2)).unwrap();
        let seen = recording(&mut writer);

        for i in 0..5u8 {
            writer.write(vec![i]).unwrap();
        }
        assert_eq!(seen.borrow().len(), 2);
        writer.finish().unwrap();

        let counts: Vec<usize> = seen.borrow().iter().map(|g| g.1).collect();
        assert_eq!(counts, vec![2, 2, 1]);
    }

    #[test]
    fn test_wire_layout() {
        let sink = MemorySink::new();
        let mut writer = GroupWriter::new(sink.clone(), WriterOptions::new()).unwrap();
        writer.write(b"ab".to_vec()).unwrap();
        writer.write_copy(b"").unwrap();
        writer.finish().unwrap();

        assert_eq!(sink.bytes(), vec![2, 2, b'a', b'b', 0]);
        assert_eq!(sink.end_files(), 1);
    }

    #[test]
    fn test_tag_written_in_first_slot() {
        let sink = MemorySink::new();
        let mut writer = GroupWriter::new(sink.clone(), WriterOptions::new().tag("GAM")).unwrap();
        writer.write(b"x".to_vec()).unwrap();
        writer.finish().unwrap();

        assert_eq!(sink.bytes(), vec![2, 3, b'G', b'A', b'M', 1, b'x']);
    }

    #[test]
    fn test_offsets_are_contiguous() {
        let sink = MemorySink::new();
        let mut writer =
            GroupWriter::new(sink.clone(), WriterOptions::new().max_group_size(1)).unwrap();
        let seen = recording(&mut writer);
        writer.write(b"first".to_vec()).unwrap();
        writer.write(b"second".to_vec()).unwrap();
        writer.finish().unwrap();

        let seen = seen.borrow();
        assert_eq!(seen[0].2, Some(VirtualOffset::from_raw(0)));
        assert_eq!(seen[0].3, seen[1].2);
        assert_eq!(seen[1].3, Some(VirtualOffset::from_raw(sink.bytes().len() as u64)));
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut writer = GroupWriter::new(MemorySink::new(), WriterOptions::new()).unwrap();
        for id in 0..3 {
            let order = Rc::clone(&order);
            writer.register_listener(move |_| {
                order.borrow_mut().push(id);
                Ok(())
            });
        }
        writer.write(b"m".to_vec()).unwrap();
        writer.flush().unwrap();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_listener_error_propagates() {
        let mut writer =
            GroupWriter::new(MemorySink::new(), WriterOptions::new().max_group_size(1)).unwrap();
        writer.register_listener(|_| Err("index full".into()));
        writer.write(b"a".to_vec()).unwrap();
        let err = writer.write(b"b".to_vec()).unwrap_err();
        assert!(matches!(err, EncodeError::Listener(_)));
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn test_oversize_rejected_without_buffering() {
        let mut writer = GroupWriter::new(MemorySink::new(), WriterOptions::new()).unwrap();
        let big = vec![0u8; MAX_MESSAGE_SIZE + 1];
        let err = writer.write_copy(&big).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::LengthExceedsLimit { field: "message", .. }
        ));
        let err = writer.write(big).unwrap_err();
        assert!(matches!(err, EncodeError::LengthExceedsLimit { .. }));
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn test_empty_flush_is_noop() {
        let sink = MemorySink::new();
        let mut writer = GroupWriter::new(sink.clone(), WriterOptions::new()).unwrap();
        let seen = recording(&mut writer);
        writer.flush().unwrap();
        assert!(seen.borrow().is_empty());
        assert!(sink.bytes().is_empty());
    }

    #[test]
    fn test_tagged_writer_without_messages_emits_tag_only_group() {
        let sink = MemorySink::new();
        let writer = GroupWriter::new(sink.clone(), WriterOptions::new().tag("VG")).unwrap();
        writer.finish().unwrap();
        assert_eq!(sink.bytes(), vec![1, 2, b'V', b'G']);
    }

    #[test]
    fn test_switching_tag_flushes() {
        let sink = MemorySink::new();
        let mut writer = GroupWriter::new(sink.clone(), WriterOptions::new()).unwrap();
        let seen = recording(&mut writer);
        writer.write_tagged("A", b"1".to_vec()).unwrap();
        writer.write_tagged("A", b"2".to_vec()).unwrap();
        writer.write_tagged("B", b"3".to_vec()).unwrap();
        writer.finish().unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!((seen[0].0.as_str(), seen[0].1), ("A", 2));
        assert_eq!((seen[1].0.as_str(), seen[1].1), ("B", 1));
    }

    #[test]
    fn test_drop_flushes_and_ends_file_once() {
        let sink = MemorySink::new();
        {
            let mut writer = GroupWriter::new(sink.clone(), WriterOptions::new()).unwrap();
            writer.write(b"late".to_vec()).unwrap();
        }
        assert_eq!(sink.bytes(), vec![1, 4, b'l', b'a', b't', b'e']);
        assert_eq!(sink.end_files(), 1);
    }

    #[test]
    fn test_unpositioned_stream_is_started() {
        let sink = MemorySink::unpositioned();
        let writer = GroupWriter::new(sink.clone(), WriterOptions::new()).unwrap();
        assert_eq!(sink.start_files(), 1);
        drop(writer);
    }

    #[test]
    fn test_zero_group_size_treated_as_one() {
        let writer =
            GroupWriter::new(MemorySink::new(), WriterOptions::new().max_group_size(0)).unwrap();
        assert_eq!(writer.max_group_size(), 1);
    }
}
