//! Store → client responses.
//!
//! The store emits one of three shapes, distinguished only by which fields
//! are present:
//! - Listing: `{"files":[...],"message":"...","status":"ok"}`
//! - Content: `{"file":"a.txt","content":"...","source":"CACHE","predictions":[...],...}`
//! - Acknowledgement: `{"message":"...","status":"ok"|"error"}`
//!
//! Listing entries may be bare path strings or `{name, tags}` objects.

use super::ProtocolError;
use crate::record::{Record, RecordError, TagSet};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

/// Outcome reported by the store.
///
/// Decoding is lenient: only `"error"` means failure. The original engine
/// reports success as `"success"`, this protocol as `"ok"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Ok,
    Error,
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(match self {
            Status::Ok => "ok",
            Status::Error => "error",
        })
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = Option::<String>::deserialize(d)?;
        Ok(match value.as_deref() {
            Some(s) if s.eq_ignore_ascii_case("error") => Status::Error,
            _ => Status::Ok,
        })
    }
}

/// One entry of a `files` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListingEntry {
    Path(String),
    Tagged {
        name: String,
        #[serde(default)]
        tags: Option<Vec<String>>,
    },
}

impl ListingEntry {
    pub fn name(&self) -> &str {
        match self {
            ListingEntry::Path(name) => name,
            ListingEntry::Tagged { name, .. } => name,
        }
    }

    /// Normalize into a [`Record`]; bare strings become untagged records.
    pub fn into_record(self) -> Result<Record, RecordError> {
        match self {
            ListingEntry::Path(name) => Record::new(name),
            ListingEntry::Tagged { name, tags } => {
                let (tags, dropped) = TagSet::from_lossy(tags.unwrap_or_default());
                if dropped > 0 {
                    warn!("Listing entry {} carried {} tag(s) past the ceiling", name, dropped);
                }
                Record::with_tags(name, tags)
            }
        }
    }
}

/// A response line from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<ListingEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Where a READ was served from: `"DISK"` or `"CACHE"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Paths usually opened after the one just read, most likely first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn listing(message: impl Into<String>, files: Vec<ListingEntry>) -> Self {
        Self {
            files: Some(files),
            ..Self::ok(message)
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }

    /// Whether the message text marks this as a search result.
    pub fn looks_like_search(&self) -> bool {
        self.message.as_deref().is_some_and(is_search_message)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Response serialization should not fail")
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Case-insensitive check for the word "search" in a response message.
///
/// The protocol carries no explicit intent on listings, so this substring is
/// the compatibility discriminator between search results and refreshes.
pub fn is_search_message(message: &str) -> bool {
    message.to_lowercase().contains("search")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_normalizes_mixed_entries() {
        let response =
            Response::from_json(r#"{"files":["a.txt",{"name":"dir/b.txt","tags":["x"]},{"name":"c"}],"message":"Directory listed","status":"ok"}"#)
                .unwrap();

        let records: Vec<Record> = response
            .files
            .unwrap()
            .into_iter()
            .map(|e| e.into_record().unwrap())
            .collect();
        assert_eq!(records[0].path(), "a.txt");
        assert!(records[0].tags().is_empty());
        assert_eq!(records[1].tags().iter().collect::<Vec<_>>(), vec!["x"]);
        assert!(records[2].tags().is_empty());
    }

    #[test]
    fn test_status_is_lenient() {
        let ok = Response::from_json(r#"{"status":"success","message":"Read successful"}"#).unwrap();
        assert_eq!(ok.status, Status::Ok);
        let err = Response::from_json(r#"{"status":"error","message":"File not found"}"#).unwrap();
        assert!(err.is_error());
        let missing = Response::from_json(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(missing.status, Status::Ok);
    }

    #[test]
    fn test_content_response_may_be_empty() {
        let response =
            Response::from_json(r#"{"file":"a.txt","content":"","message":"Read successful","status":"ok"}"#)
                .unwrap();
        assert!(response.files.is_none());
        assert_eq!(response.content.as_deref(), Some(""));
        assert!(response.source.is_none() && response.predictions.is_none());
    }

    #[test]
    fn test_read_reply_carries_source_and_predictions() {
        let response = Response::from_json(
            r#"{"status":"success","message":"Read successful","content":"x","source":"CACHE","predictions":["b.txt","c.txt"]}"#,
        )
        .unwrap();
        assert_eq!(response.source.as_deref(), Some("CACHE"));
        assert_eq!(response.predictions, Some(vec!["b.txt".to_string(), "c.txt".to_string()]));
    }

    #[test]
    fn test_write_ack_with_file_is_still_ack() {
        let response =
            Response::from_json(r#"{"status":"success","message":"File written successfully","file":"x.txt"}"#)
                .unwrap();
        assert!(response.content.is_none() && response.files.is_none());
        assert_eq!(response.file.as_deref(), Some("x.txt"));
    }

    #[test]
    fn test_search_heuristic_is_case_insensitive() {
        assert!(is_search_message("Search complete"));
        assert!(is_search_message("RESEARCH done"));
        assert!(!is_search_message("Directory listed"));
        assert!(!is_search_message("No files found for this key"));
    }

    #[test]
    fn test_oversized_tag_list_is_capped() {
        let entry = ListingEntry::Tagged {
            name: "a".into(),
            tags: Some((0..8).map(|i| i.to_string()).collect()),
        };
        assert_eq!(entry.into_record().unwrap().tags().len(), crate::record::MAX_TAGS);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            Response::from_json("not json at all"),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_serialized_response_omits_absent_fields() {
        let json = Response::ok("Relationship learned").to_json();
        assert_eq!(json, r#"{"status":"ok","message":"Relationship learned"}"#);
    }
}
