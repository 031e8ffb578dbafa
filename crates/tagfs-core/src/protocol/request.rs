//! Client → store commands.

use super::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A command understood by the record store.
///
/// Wire format: `{"action":"TAG","file":"a.txt","key":"draft"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    List,
    Read { file: String },
    Write { file: String, data: String },
    Delete { file: String },
    Tag { file: String, key: String },
    SearchKey { key: String },
    SuggestKeys { prefix: String },
}

impl Command {
    /// Wire name of the action.
    pub fn action(&self) -> &'static str {
        match self {
            Command::List => "LIST",
            Command::Read { .. } => "READ",
            Command::Write { .. } => "WRITE",
            Command::Delete { .. } => "DELETE",
            Command::Tag { .. } => "TAG",
            Command::SearchKey { .. } => "SEARCH_KEY",
            Command::SuggestKeys { .. } => "SUGGEST_KEYS",
        }
    }
}

/// Correlation id: `<session>:<seq>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId {
    pub session: String,
    pub seq: u64,
}

impl RequestId {
    pub fn new(session: impl Into<String>, seq: u64) -> Self {
        Self {
            session: session.into(),
            seq,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.session, self.seq)
    }
}

impl FromStr for RequestId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (session, seq) = s
            .rsplit_once(':')
            .ok_or_else(|| ProtocolError::BadRequestId(s.to_string()))?;
        let seq = seq
            .parse()
            .map_err(|_| ProtocolError::BadRequestId(s.to_string()))?;
        Ok(Self::new(session, seq))
    }
}

/// A command plus its optional correlation id, as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(flatten)]
    pub command: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Request {
    pub fn new(command: Command) -> Self {
        Self { command, id: None }
    }

    pub fn with_id(command: Command, id: &RequestId) -> Self {
        Self {
            command,
            id: Some(id.to_string()),
        }
    }

    /// Serialize to a single JSON line (without the trailing newline).
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Request serialization should not fail")
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}
