//! Tagged records: the unit of the registry.
//!
//! A record's path is its identity. Tags form a small ordered set capped at
//! [`MAX_TAGS`]; insertion order is preserved and duplicates collapse.

use serde::Serialize;
use thiserror::Error;

/// Maximum number of tags a single record may carry.
pub const MAX_TAGS: usize = 5;

/// Errors raised when a record or tag would violate the registry invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("Record path cannot be empty")]
    EmptyPath,

    #[error("Tag cannot be empty")]
    EmptyTag,

    #[error("Slot limit reached for {path} (max 5 tags)")]
    TagLimit { path: String },
}

/// Ordered, duplicate-free tag list with a fixed ceiling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tag set from untrusted input, collapsing duplicates and
    /// dropping anything past the ceiling.
    ///
    /// Returns the set and the number of tags that were dropped for capacity.
    pub fn from_lossy<I, S>(tags: I) -> (Self, usize)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        let mut dropped = 0;
        for tag in tags {
            let tag = tag.into();
            if set.contains(&tag) {
                continue;
            }
            if set.is_full() {
                dropped += 1;
                continue;
            }
            set.0.push(tag);
        }
        (set, dropped)
    }

    /// Append a tag.
    ///
    /// Returns `Ok(false)` when the tag was already present (no change).
    /// A full set rejects new tags with [`RecordError::TagLimit`].
    pub fn insert(&mut self, path: &str, tag: impl Into<String>) -> Result<bool, RecordError> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(RecordError::EmptyTag);
        }
        if self.contains(&tag) {
            return Ok(false);
        }
        if self.is_full() {
            return Err(RecordError::TagLimit {
                path: path.to_string(),
            });
        }
        self.0.push(tag);
        Ok(true)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.0.len() >= MAX_TAGS
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// How close a record is to its tag ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagHealth {
    /// Fewer than 3 tags
    Low,
    /// 3 or 4 tags
    Medium,
    /// At the ceiling
    Full,
}

/// A named, tagged unit in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Slash-segmented path; unique key
    #[serde(rename = "name")]
    path: String,
    tags: TagSet,
}

impl Record {
    /// Create an untagged record.
    pub fn new(path: impl Into<String>) -> Result<Self, RecordError> {
        Self::with_tags(path, TagSet::new())
    }

    pub fn with_tags(path: impl Into<String>, tags: TagSet) -> Result<Self, RecordError> {
        let path = path.into();
        if path.is_empty() {
            return Err(RecordError::EmptyPath);
        }
        Ok(Self { path, tags })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final path segment.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Path segments, split literally on `/`.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/')
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Append a tag, enforcing the ceiling.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> Result<bool, RecordError> {
        self.tags.insert(&self.path, tag)
    }

    /// Check whether one more tag could be added on top of `pending` others.
    pub fn ensure_tag_capacity(&self, pending: usize) -> Result<(), RecordError> {
        if self.tags.len() + pending >= MAX_TAGS {
            return Err(RecordError::TagLimit {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    pub fn health(&self) -> TagHealth {
        match self.tags.len() {
            0..=2 => TagHealth::Low,
            3..=4 => TagHealth::Medium,
            _ => TagHealth::Full,
        }
    }
}
