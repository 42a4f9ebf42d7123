//! The reader-facing unit of a stream.

/// A message paired with the tag in effect when it was read.
///
/// An empty tag means no tag is known. A missing message means the group
/// held only a tag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaggedMessage {
    pub tag: String,
    pub message: Option<Vec<u8>>,
}

impl TaggedMessage {
    /// Creates a tagged message carrying a payload.
    pub fn new(tag: impl Into<String>, message: Vec<u8>) -> Self {
        Self {
            tag: tag.into(),
            message: Some(message),
        }
    }

    /// Creates a tag-only observation.
    pub fn tag_only(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            message: None,
        }
    }

    /// Returns true if this observation carries no message.
    pub fn is_tag_only(&self) -> bool {
        self.message.is_none()
    }

    /// Returns true if no tag is known for this message.
    pub fn is_untagged(&self) -> bool {
        self.tag.is_empty()
    }

    /// Returns the payload, if any.
    pub fn message(&self) -> Option<&[u8]> {
        self.message.as_deref()
    }

    /// Splits into tag and payload.
    pub fn into_parts(self) -> (String, Option<Vec<u8>>) {
        (self.tag, self.message)
    }
}
