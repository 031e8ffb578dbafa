//! tagfs-store: In-memory reference Record Store.
//!
//! Speaks the line protocol on any async reader/writer pair: one JSON request
//! per input line, exactly one JSON response line per request. The binary
//! wires it to stdin/stdout so the gateway can supervise it like any other
//! backend.
//!
//! Reads report whether the record was warm and which records were opened
//! after it before, learned from consecutive reads within a session.

pub mod access;

use access::{AccessGraph, PREDICTION_LIMIT, ReadCache};
use std::collections::{BTreeMap, HashMap};
use tagfs_core::protocol::{Command, ListingEntry, Request, RequestId, Response};
use tagfs_core::record::{RecordError, TagSet};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Store-level failures, reported to clients as error responses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("File not found")]
    NotFound,

    #[error("Cannot tag: File does not exist")]
    TagMissingFile,

    #[error("Limit reached: Maximum 5 keys per file")]
    TagLimit,

    #[error("Invalid path: path must not be empty")]
    EmptyPath,

    #[error("Invalid key: key must not be empty")]
    EmptyKey,
}

impl From<RecordError> for StoreError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::EmptyPath => StoreError::EmptyPath,
            RecordError::EmptyTag => StoreError::EmptyKey,
            RecordError::TagLimit { .. } => StoreError::TagLimit,
        }
    }
}

#[derive(Debug, Default)]
struct Entry {
    content: String,
    tags: TagSet,
}

/// Path-keyed records plus a tag → paths index.
#[derive(Debug, Default)]
pub struct RecordStore {
    files: BTreeMap<String, Entry>,
    keyword_index: BTreeMap<String, Vec<String>>,
    cache: ReadCache,
    graph: AccessGraph,
    /// Last path read, per client session
    last_read: HashMap<String, String>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Create or overwrite a record. Existing tags survive an overwrite.
    pub fn write(&mut self, path: &str, data: String) -> Result<(), StoreError> {
        if path.is_empty() {
            return Err(StoreError::EmptyPath);
        }
        self.files.entry(path.to_string()).or_default().content = data;
        self.cache.warm(path);
        Ok(())
    }

    pub fn read(&self, path: &str) -> Result<&str, StoreError> {
        self.files
            .get(path)
            .map(|e| e.content.as_str())
            .ok_or(StoreError::NotFound)
    }

    pub fn delete(&mut self, path: &str) -> Result<(), StoreError> {
        let entry = self.files.remove(path).ok_or(StoreError::NotFound)?;
        self.cache.evict(path);
        self.graph.forget(path);
        self.last_read.retain(|_, last| last != path);
        for tag in entry.tags.iter() {
            if let Some(paths) = self.keyword_index.get_mut(tag) {
                paths.retain(|p| p != path);
                if paths.is_empty() {
                    self.keyword_index.remove(tag);
                }
            }
        }
        Ok(())
    }

    /// Read on behalf of a session, learning from the session's previous read.
    pub fn open(&mut self, session: &str, path: &str) -> Result<Response, StoreError> {
        let content = self.read(path)?.to_string();
        let source = self.cache.touch(path);
        if let Some(previous) = self.last_read.insert(session.to_string(), path.to_string()) {
            self.graph.learn(&previous, path);
        }
        debug!("Read {} from {} for session '{}'", path, source.as_str(), session);

        Ok(Response {
            file: Some(path.to_string()),
            content: Some(content),
            source: Some(source.as_str().to_string()),
            predictions: Some(self.graph.predict(path, PREDICTION_LIMIT)),
            ..Response::ok("Read successful")
        })
    }

    /// Every record with its tags, in path order.
    pub fn list(&self) -> Vec<ListingEntry> {
        self.files
            .iter()
            .map(|(path, entry)| ListingEntry::Tagged {
                name: path.clone(),
                tags: Some(entry.tags.as_slice().to_vec()),
            })
            .collect()
    }

    /// Attach a tag. Returns false when the tag was already present.
    pub fn tag(&mut self, path: &str, key: &str) -> Result<bool, StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let entry = self.files.get_mut(path).ok_or(StoreError::TagMissingFile)?;
        let added = entry.tags.insert(path, key)?;
        if added {
            self.keyword_index
                .entry(key.to_string())
                .or_default()
                .push(path.to_string());
        }
        Ok(added)
    }

    /// Paths carrying exactly this tag, in tagging order.
    pub fn search(&self, key: &str) -> Vec<String> {
        self.keyword_index.get(key).cloned().unwrap_or_default()
    }

    /// Known tags starting with `prefix`.
    pub fn suggest(&self, prefix: &str) -> Vec<String> {
        self.keyword_index
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Execute one request from `session` and build its response.
    pub fn execute(&mut self, session: &str, command: Command) -> Response {
        let result = match command {
            Command::List => Ok(Response::listing("Directory listed", self.list())),
            Command::Read { file } => self.open(session, &file),
            Command::Write { file, data } => self.write(&file, data).map(|()| Response {
                file: Some(file),
                ..Response::ok("File written successfully")
            }),
            Command::Delete { file } => self
                .delete(&file)
                .map(|()| Response::ok(format!("File '{file}' deleted"))),
            Command::Tag { file, key } => self
                .tag(&file, &key)
                .map(|_| Response::ok(format!("Keyword '{key}' associated with {file}"))),
            Command::SearchKey { key } => {
                let hits = self.search(&key);
                let message = if hits.is_empty() {
                    "No files found for this key"
                } else {
                    "Search complete"
                };
                Ok(Response::listing(
                    message,
                    hits.into_iter().map(ListingEntry::Path).collect(),
                ))
            }
            Command::SuggestKeys { prefix } => Ok(Response {
                suggestions: Some(self.suggest(&prefix)),
                ..Response::ok("Suggestions fetched")
            }),
        };

        result.unwrap_or_else(|e| Response::error(e.to_string()))
    }

    /// Parse a request line and execute it, echoing the request id.
    pub fn handle_line(&mut self, line: &str) -> Response {
        match Request::from_json(line) {
            Ok(request) => {
                debug!("Executing {}", request.command.action());
                let session = session_of(request.id.as_deref());
                self.execute(&session, request.command).with_id(request.id)
            }
            Err(e) => {
                warn!("Unrecognized request: {}", e);
                Response::error(format!("Unknown command received: {line}"))
                    .with_id(recover_id(line))
            }
        }
    }
}

/// Session part of a correlation id; requests without one share a session.
fn session_of(id: Option<&str>) -> String {
    match id {
        Some(id) => id
            .parse::<RequestId>()
            .map(|id| id.session)
            .unwrap_or_else(|_| id.to_string()),
        None => String::new(),
    }
}

/// Best-effort id extraction from a line that failed to parse as a request.
fn recover_id(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    value.get("id")?.as_str().map(str::to_string)
}

/// Serve requests from `reader` until end of input, writing responses to `writer`.
///
/// A line that is not valid UTF-8 gets an error response; serving continues.
pub async fn serve<R, W>(store: &mut RecordStore, mut reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let response = match std::str::from_utf8(&buf) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                store.handle_line(line)
            }
            Err(e) => {
                let lossy = String::from_utf8_lossy(&buf);
                warn!("Request is not valid UTF-8: {}", e);
                Response::error("Invalid request: not valid UTF-8").with_id(recover_id(lossy.trim()))
            }
        };
        let mut out = response.to_json();
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }
    info!("Input closed, {} record(s) in store", store.len());
    Ok(())
}
