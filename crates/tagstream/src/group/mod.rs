//! Grouped message framing over block-compressed streams.
//!
//! [`GroupWriter`] buffers messages and flushes them as framed groups;
//! [`GroupReader`] walks groups back, resolving which first slots are tags.

pub mod reader;
pub mod writer;

pub use reader::GroupReader;
pub use writer::{GroupWriter, Listener, WriterOptions};


#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    use proptest::prelude::*;

    use super::*;
    use crate::error::DecodeError;
    use crate::model::TaggedMessage;
    use crate::offset::VirtualOffset;
    use crate::registry::{KnownTags, NoTags};
    use crate::stream::{BlockOptions, BlockedZstdReader};

    fn write_compressed(
        messages: &[Vec<u8>],
        options: WriterOptions,
    ) -> (Vec<u8>, Vec<(usize, VirtualOffset)>) {
        let groups = Rc::new(RefCell::new(Vec::new()));
        let mut writer =
            GroupWriter::compressed(Vec::new(), options, BlockOptions::default()).unwrap();
        let seen = Rc::clone(&groups);
        writer.register_listener(move |group| {
            seen.borrow_mut()
                .push((group.messages.len(), group.start.expect("positioned")));
            Ok(())
        });
        for message in messages {
            writer.write_copy(message).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();
        let groups = groups.borrow().clone();
        (bytes, groups)
    }

    fn read_all<G: crate::registry::TagRegistry>(bytes: Vec<u8>, registry: G) -> Vec<TaggedMessage> {
        let reader = GroupReader::new(BlockedZstdReader::new(Cursor::new(bytes)), registry).unwrap();
        reader.collect::<Result<Vec<_>, _>>().unwrap()
    }

    #[test]
    fn test_tagged_stream_roundtrip() {
        let messages: Vec<Vec<u8>> = (0..7u8).map(|i| vec![i; i as usize + 1]).collect();
        let (bytes, groups) =
            write_compressed(&messages, WriterOptions::new().tag("GAM").max_group_size(3));
        assert_eq!(groups.len(), 3);

        let read = read_all(bytes, KnownTags::new().with_tag("GAM"));
        assert_eq!(read.len(), 7);
        for (got, want) in read.iter().zip(&messages) {
            assert_eq!(got.tag, "GAM");
            assert_eq!(got.message.as_ref(), Some(want));
        }
    }

    #[test]
    fn test_seek_to_every_reported_group() {
        let messages: Vec<Vec<u8>> = (0..50u32).map(|i| i.to_le_bytes().to_vec()).collect();
        let (bytes, groups) = write_compressed(&messages, WriterOptions::new().max_group_size(4));

        let mut reader =
            GroupReader::new(BlockedZstdReader::new(Cursor::new(bytes)), NoTags).unwrap();
        for (index, (_, start)) in groups.iter().enumerate().rev() {
            assert!(reader.seek_group(*start).unwrap());
            assert_eq!(reader.tell_group(), Some(*start));
            let first = reader.current().unwrap();
            assert_eq!(first.message(), Some(&messages[index * 4][..]));
        }
    }

    #[test]
    fn test_large_messages_span_blocks() {
        let messages: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i; 100_000]).collect();
        let (bytes, groups) = write_compressed(&messages, WriterOptions::new().max_group_size(1));

        let read = read_all(bytes.clone(), NoTags);
        assert_eq!(read.len(), 4);
        assert!(read.iter().zip(&messages).all(|(got, want)| got.message.as_ref() == Some(want)));

        let mut reader =
            GroupReader::new(BlockedZstdReader::new(Cursor::new(bytes)), NoTags).unwrap();
        assert!(reader.seek_group(groups[2].1).unwrap());
        assert_eq!(reader.current().unwrap().message(), Some(&messages[2][..]));
    }

    #[test]
    fn test_failed_seek_poisons_reader() {
        let messages = vec![b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()];
        let (bytes, groups) = write_compressed(&messages, WriterOptions::new());

        let mut reader =
            GroupReader::new(BlockedZstdReader::new(Cursor::new(bytes)), NoTags).unwrap();
        assert_eq!(GroupReader::take(&mut reader).unwrap().unwrap().message(), Some(&b"alpha"[..]));

        let past_end = VirtualOffset::new(0, 60000).unwrap();
        assert!(matches!(
            reader.seek_group(past_end),
            Err(DecodeError::SeekPastBlockEnd { within: 60000, .. })
        ));
        assert!(!reader.has_current());
        assert!(reader.current().is_none());
        assert!(matches!(reader.advance(), Err(DecodeError::Poisoned)));

        assert!(reader.seek_group(groups[0].1).unwrap());
        assert_eq!(reader.current().unwrap().message(), Some(&b"alpha"[..]));
    }

    proptest! {
        #[test]
        fn prop_untagged_roundtrip(
            messages in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..40),
            group_size in 1usize..8,
        ) {
            let (bytes, _) =
                write_compressed(&messages, WriterOptions::new().max_group_size(group_size));
            let read = read_all(bytes, NoTags);
            prop_assert_eq!(read.len(), messages.len());
            for (got, want) in read.iter().zip(&messages) {
                prop_assert_eq!(got.tag.as_str(), "");
                prop_assert_eq!(got.message.as_ref(), Some(want));
            }
        }

        #[test]
        fn prop_group_batching(count in 0usize..60, group_size in 1usize..10) {
            let messages: Vec<Vec<u8>> = (0..count).map(|i| vec![i as u8]).collect();
            let (_, groups) =
                write_compressed(&messages, WriterOptions::new().max_group_size(group_size));
            prop_assert_eq!(groups.len(), count.div_ceil(group_size));
            prop_assert!(groups.iter().all(|(n, _)| *n <= group_size));
            prop_assert_eq!(groups.iter().map(|(n, _)| n).sum::<usize>(), count);
        }
    }
}
