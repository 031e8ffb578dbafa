//! Append-only catalog of every tag this session has seen.

/// Tags offered as quick-search shortcuts before anything has been observed.
pub const DEFAULT_TAGS: [&str; 3] = ["Important", "Draft", "Source"];

/// Monotonically growing set of known tag strings, in first-seen order.
///
/// The catalog is a client-local convenience: it never shrinks, even when the
/// last record carrying a tag is deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagCatalog {
    tags: Vec<String>,
}

impl TagCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog seeded with the given tags.
    pub fn seeded<I, S>(seed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self::new();
        catalog.extend(seed);
        catalog
    }

    /// Record a tag. Returns true if it was not known before.
    pub fn observe(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if tag.is_empty() || self.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    pub fn extend<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            self.observe(tag);
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_catalog_keeps_order() {
        let catalog = TagCatalog::seeded(DEFAULT_TAGS);
        assert_eq!(catalog.iter().collect::<Vec<_>>(), DEFAULT_TAGS.to_vec());
    }

    #[test]
    fn test_observe_is_idempotent() {
        let mut catalog = TagCatalog::new();
        assert!(catalog.observe("urgent"));
        assert!(!catalog.observe("urgent"));
        assert!(!catalog.observe(""));
        assert_eq!(catalog.len(), 1);
    }
}
