//! Tag registries.
//!
//! A reader cannot tell a tag slot from a message slot by its bytes alone. It
//! asks a [`TagRegistry`] whether a candidate string names a known type.
//! Registries are consulted only for group first slots that do not repeat the
//! tag already in effect.

use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;
use rustc_hash::FxHashSet;

/// Answers whether a string is a recognized tag.
pub trait TagRegistry {
    /// Returns true if `tag` names a registered type.
    fn is_valid_tag(&self, tag: &str) -> bool;
}

impl<T: TagRegistry + ?Sized> TagRegistry for &T {
    fn is_valid_tag(&self, tag: &str) -> bool {
        (**self).is_valid_tag(tag)
    }
}

impl<T: TagRegistry + ?Sized> TagRegistry for Arc<T> {
    fn is_valid_tag(&self, tag: &str) -> bool {
        (**self).is_valid_tag(tag)
    }
}

/// Registry that recognizes nothing; every slot is a message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTags;

impl TagRegistry for NoTags {
    fn is_valid_tag(&self, _tag: &str) -> bool {
        false
    }
}

/// An owned set of recognized tags.
#[derive(Debug, Clone, Default)]
pub struct KnownTags {
    tags: FxHashSet<String>,
}

impl KnownTags {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag, builder style.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.register(tag);
        self
    }

    /// Adds a tag. The empty string is never a tag and is ignored.
    pub fn register(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !tag.is_empty() {
            self.tags.insert(tag);
        }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for KnownTags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tags = KnownTags::new();
        for tag in iter {
            tags.register(tag);
        }
        tags
    }
}

impl TagRegistry for KnownTags {
    fn is_valid_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

lazy_static! {
    static ref GLOBAL_TAGS: RwLock<KnownTags> = RwLock::new(KnownTags::new());
}

/// Registers a tag in the process-wide registry.
pub fn register_tag(tag: impl Into<String>) {
    // A poisoned lock still holds a consistent set; insertion cannot panic midway.
    let mut tags = GLOBAL_TAGS.write().unwrap_or_else(|e| e.into_inner());
    tags.register(tag);
}

/// Handle to the process-wide registry populated by [`register_tag`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalRegistry;

impl TagRegistry for GlobalRegistry {
    fn is_valid_tag(&self, tag: &str) -> bool {
        GLOBAL_TAGS
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_valid_tag(tag)
    }
}
