//! Client-side reconciliation of the cached record view.
//!
//! The reconciler owns everything a client shows: the primary listing, search
//! results, the previewed record, the activity log and the tag catalog. It is
//! a plain state machine with no I/O. Commands queue [`Effect`]s which the
//! driver executes (send a request, arm a deferred refresh timer); incoming
//! lines are applied with [`Reconciler::handle_message`].
//!
//! Responses are an unordered stream. Routing uses, in order:
//! 1. The echoed request id, when the store echoes one of ours
//! 2. The "search" substring in the message
//! 3. Which listing intents are still outstanding
//!
//! Consistency is eventual: every mutation arms a deferred LIST, and a LIST
//! result always fully replaces the listing for its intent.

use crate::catalog::{DEFAULT_TAGS, TagCatalog};
use crate::log::{ActivityLog, LOG_CAPACITY, LogEntry, LogStatus};
use crate::protocol::{Command, ListingEntry, Request, RequestId, Response, Status};
use crate::record::{Record, RecordError};
use crate::tree::{FolderNode, build_tree_sorted};
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Name shown for previews whose response omitted the path.
pub const PLACEHOLDER_PREVIEW_NAME: &str = "Loaded File";

/// Oldest pending requests are forgotten past this many.
const PENDING_LIMIT: usize = 256;

/// Errors surfaced locally, before anything is sent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Not connected")]
    NotConnected,

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("No such folder: {0}")]
    UnknownFolder(String),
}

/// Session connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Purpose of a listing request, used to route its eventual response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// General refresh of the primary listing
    Refresh,
    /// Keyword search
    Search,
}

/// Work the driver must perform on the reconciler's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send a request to the gateway
    Send(Request),
    /// Call [`Reconciler::refresh`] after the delay. Not cancelable.
    RefreshAfter(Duration),
}

/// Delay before the corrective LIST after each kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshDelays {
    pub write: Duration,
    pub tag: Duration,
    pub delete: Duration,
    pub upload: Duration,
}

impl Default for RefreshDelays {
    fn default() -> Self {
        Self {
            write: Duration::from_millis(300),
            tag: Duration::from_millis(300),
            delete: Duration::from_millis(200),
            upload: Duration::from_millis(600),
        }
    }
}

/// Reconciler tuning.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub refresh: RefreshDelays,
    pub log_capacity: usize,
    /// Silence after a command longer than this is reported as a likely backend failure
    pub response_timeout: Duration,
    /// Attach `id` to outgoing requests
    pub correlate_requests: bool,
    /// Seed for the tag catalog
    pub default_tags: Vec<String>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            refresh: RefreshDelays::default(),
            log_capacity: LOG_CAPACITY,
            response_timeout: Duration::from_secs(10),
            correlate_requests: true,
            default_tags: DEFAULT_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// The record currently shown in the preview pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub name: String,
    pub content: String,
    /// Store tier that served the read, when reported
    pub source: Option<String>,
    /// Related records the store expects to be opened next
    pub predictions: Vec<String>,
}

impl Preview {
    /// File name to use when saving the preview locally.
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// A file queued for bulk upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: String,
    pub data: String,
}

/// What an incoming line did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// A listing replaced the state for this intent
    Listing(Intent),
    /// A listing older than one already applied was discarded
    StaleListing(Intent),
    Preview,
    Suggestions,
    /// Acknowledgement (possibly applied speculatively)
    Ack,
    /// Not a valid message; only logged
    Malformed,
}

#[derive(Debug, Clone)]
enum Pending {
    Listing(Intent),
    Mutation(Command),
    Other,
}

/// Client-side cache of engine state.
pub struct Reconciler {
    config: ReconcilerConfig,
    state: SessionState,
    session_id: String,
    next_seq: u64,
    /// Requests awaiting a response, keyed by sequence number
    pending: BTreeMap<u64, Pending>,
    /// Newest correlated listing applied, per intent
    applied_refresh_seq: u64,
    applied_search_seq: u64,
    records: Vec<Record>,
    search_results: Vec<Record>,
    preview: Option<Preview>,
    suggestions: Vec<String>,
    log: ActivityLog,
    catalog: TagCatalog,
    effects: Vec<Effect>,
    last_sent: Option<Instant>,
    last_received: Option<Instant>,
    silence_reported: bool,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig, session_id: impl Into<String>) -> Self {
        let log = ActivityLog::with_capacity(config.log_capacity);
        let catalog = TagCatalog::seeded(config.default_tags.iter().cloned());
        Self {
            config,
            state: SessionState::Disconnected,
            session_id: session_id.into(),
            next_seq: 1,
            pending: BTreeMap::new(),
            applied_refresh_seq: 0,
            applied_search_seq: 0,
            records: Vec::new(),
            search_results: Vec::new(),
            preview: None,
            suggestions: Vec::new(),
            log,
            catalog,
            effects: Vec::new(),
            last_sent: None,
            last_received: None,
            silence_reported: false,
        }
    }

    // ==================== Lifecycle ====================

    pub fn connecting(&mut self) {
        self.state = SessionState::Connecting;
    }

    /// Enter `Connected` and populate eagerly with a LIST.
    pub fn connected(&mut self) {
        self.state = SessionState::Connected;
        self.pending.clear();
        self.issue(Command::List, Pending::Listing(Intent::Refresh));
    }

    pub fn disconnected(&mut self) {
        self.state = SessionState::Disconnected;
        self.pending.clear();
        self.last_sent = None;
        self.silence_reported = false;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Take the effects queued since the last call.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // ==================== Commands ====================

    /// Issue a plain LIST. Also the target of deferred refresh timers.
    pub fn refresh(&mut self) -> Result<(), ReconcileError> {
        self.ensure_connected()?;
        self.issue(Command::List, Pending::Listing(Intent::Refresh));
        Ok(())
    }

    /// Drop search results and re-list.
    ///
    /// Search responses still in flight are treated as stale once they land.
    pub fn clear_search(&mut self) -> Result<(), ReconcileError> {
        self.ensure_connected()?;
        self.search_results.clear();
        self.applied_search_seq = self.next_seq;
        self.issue(Command::List, Pending::Listing(Intent::Refresh));
        Ok(())
    }

    pub fn search(&mut self, key: impl Into<String>) -> Result<(), ReconcileError> {
        self.ensure_connected()?;
        let key = key.into();
        self.issue(Command::SearchKey { key }, Pending::Listing(Intent::Search));
        Ok(())
    }

    pub fn read(&mut self, path: impl Into<String>) -> Result<(), ReconcileError> {
        self.ensure_connected()?;
        let file = non_empty_path(path.into())?;
        self.issue(Command::Read { file }, Pending::Other);
        Ok(())
    }

    pub fn suggest(&mut self, prefix: impl Into<String>) -> Result<(), ReconcileError> {
        self.ensure_connected()?;
        let prefix = prefix.into();
        self.issue(Command::SuggestKeys { prefix }, Pending::Other);
        Ok(())
    }

    pub fn write(
        &mut self,
        path: impl Into<String>,
        data: impl Into<String>,
    ) -> Result<(), ReconcileError> {
        self.ensure_connected()?;
        let file = non_empty_path(path.into())?;
        self.send_mutation(Command::Write {
            file,
            data: data.into(),
        });
        self.schedule_refresh(self.config.refresh.write);
        Ok(())
    }

    pub fn delete(&mut self, path: impl Into<String>) -> Result<(), ReconcileError> {
        self.ensure_connected()?;
        let file = non_empty_path(path.into())?;
        self.send_mutation(Command::Delete { file });
        self.schedule_refresh(self.config.refresh.delete);
        Ok(())
    }

    /// Tag a record.
    ///
    /// A record already at the ceiling is rejected here: nothing is sent and
    /// the cache is left untouched. Tags sent but not yet confirmed count
    /// toward the ceiling.
    pub fn tag(
        &mut self,
        path: impl Into<String>,
        key: impl Into<String>,
    ) -> Result<(), ReconcileError> {
        self.ensure_connected()?;
        let file = non_empty_path(path.into())?;
        let key = key.into();
        if key.is_empty() {
            return Err(RecordError::EmptyTag.into());
        }

        let capacity = self
            .cached(&file)
            .filter(|record| !record.tags().contains(&key))
            .map(|record| record.ensure_tag_capacity(self.in_flight_tags(record, &key)));
        if let Some(Err(e)) = capacity {
            self.log.push(LogEntry::new(e.to_string(), LogStatus::Error));
            return Err(e.into());
        }

        self.catalog.observe(key.clone());
        self.send_mutation(Command::Tag { file, key });
        self.schedule_refresh(self.config.refresh.tag);
        Ok(())
    }

    /// Write a batch of files, followed by a single deferred refresh.
    pub fn upload(&mut self, files: Vec<UploadFile>) -> Result<usize, ReconcileError> {
        self.ensure_connected()?;
        if let Some(bad) = files.iter().find(|f| f.path.is_empty()) {
            debug!("Rejecting upload batch, empty path for {} byte file", bad.data.len());
            return Err(RecordError::EmptyPath.into());
        }

        let count = files.len();
        for file in files {
            self.send_mutation(Command::Write {
                file: file.path,
                data: file.data,
            });
        }
        if count > 0 {
            self.schedule_refresh(self.config.refresh.upload);
        }
        Ok(count)
    }

    /// Delete every record under a folder of the primary listing.
    pub fn delete_folder(&mut self, folder: &str) -> Result<usize, ReconcileError> {
        self.ensure_connected()?;
        let folder = folder.trim_end_matches('/');
        let tree = build_tree_sorted(&self.records);
        let paths: Vec<String> = match tree.find(folder) {
            Some(node) if !folder.is_empty() => {
                node.record_paths().into_iter().map(str::to_string).collect()
            }
            _ => Vec::new(),
        };
        if paths.is_empty() {
            return Err(ReconcileError::UnknownFolder(folder.to_string()));
        }

        for file in &paths {
            self.send_mutation(Command::Delete { file: file.clone() });
        }
        self.schedule_refresh(self.config.refresh.delete);
        Ok(paths.len())
    }

    // ==================== Incoming ====================

    /// Apply one incoming line.
    ///
    /// Every line, valid or not, adds exactly one log entry. Malformed lines
    /// change nothing else.
    pub fn handle_message(&mut self, text: &str) -> Update {
        self.last_received = Some(Instant::now());
        self.silence_reported = false;

        let response = match Response::from_json(text) {
            Ok(r) => r,
            Err(e) => {
                warn!("Dropping malformed response: {}", e);
                self.log
                    .push(LogEntry::new(format!("Parse error: {e}"), LogStatus::Error));
                return Update::Malformed;
            }
        };

        let status = match response.status {
            Status::Ok => LogStatus::Ok,
            Status::Error => LogStatus::Error,
        };
        let message = response
            .message
            .clone()
            .unwrap_or_else(|| "(no message)".to_string());
        self.log.push(LogEntry::new(message, status));

        self.apply(response)
    }

    /// Report a silent backend once per silence period.
    ///
    /// Returns true when this call logged a new silence report.
    pub fn check_silence(&mut self, now: Instant) -> bool {
        let Some(sent) = self.last_sent else {
            return false;
        };
        let answered = self.last_received.is_some_and(|r| r >= sent);
        if answered || self.silence_reported {
            return false;
        }
        let waited = now.saturating_duration_since(sent);
        if waited < self.config.response_timeout {
            return false;
        }

        self.silence_reported = true;
        self.log.push(LogEntry::new(
            format!(
                "No response from backend for {}s; it may have stopped",
                waited.as_secs()
            ),
            LogStatus::Error,
        ));
        true
    }

    // ==================== Views ====================

    /// Primary listing, in the order the store sent it.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn search_results(&self) -> &[Record] {
        &self.search_results
    }

    /// Search results when present, otherwise the primary listing; sorted by path.
    pub fn visible_records(&self) -> Vec<&Record> {
        let source = if self.search_results.is_empty() {
            &self.records
        } else {
            &self.search_results
        };
        let mut visible: Vec<&Record> = source.iter().collect();
        visible.sort_by(|a, b| a.path().cmp(b.path()));
        visible
    }

    /// Folder tree of the visible records.
    pub fn tree(&self) -> FolderNode {
        let visible: Vec<Record> = self.visible_records().into_iter().cloned().collect();
        build_tree_sorted(&visible)
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn catalog(&self) -> &TagCatalog {
        &self.catalog
    }

    /// Look up a record in the primary listing or the search results.
    pub fn cached(&self, path: &str) -> Option<&Record> {
        self.records
            .iter()
            .chain(self.search_results.iter())
            .find(|r| r.path() == path)
    }

    // ==================== Internals ====================

    fn ensure_connected(&self) -> Result<(), ReconcileError> {
        if self.state == SessionState::Connected {
            Ok(())
        } else {
            Err(ReconcileError::NotConnected)
        }
    }

    fn issue(&mut self, command: Command, pending: Pending) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let request = if self.config.correlate_requests {
            Request::with_id(command, &RequestId::new(self.session_id.clone(), seq))
        } else {
            Request::new(command)
        };
        debug!("Issuing {} (seq {})", request.command.action(), seq);

        self.pending.insert(seq, pending);
        while self.pending.len() > PENDING_LIMIT {
            self.pending.pop_first();
        }

        self.effects.push(Effect::Send(request));
        if self.last_sent.is_none_or(|sent| self.last_received.is_some_and(|r| r >= sent)) {
            self.last_sent = Some(Instant::now());
        }
    }

    /// Distinct unconfirmed tags for a record, other than `key` and those it already has.
    fn in_flight_tags(&self, record: &Record, key: &str) -> usize {
        let keys: HashSet<&str> = self
            .pending
            .values()
            .filter_map(|p| match p {
                Pending::Mutation(Command::Tag { file, key: tag }) if file == record.path() => {
                    Some(tag.as_str())
                }
                _ => None,
            })
            .filter(|k| *k != key && !record.tags().contains(k))
            .collect();
        keys.len()
    }

    /// Forget mutations issued before a LIST whose result has been applied.
    fn settle_mutations(&mut self, listed_seq: u64) {
        self.pending
            .retain(|seq, p| *seq >= listed_seq || !matches!(p, Pending::Mutation(_)));
    }

    fn send_mutation(&mut self, command: Command) {
        self.issue(command.clone(), Pending::Mutation(command));
    }

    fn schedule_refresh(&mut self, delay: Duration) {
        self.effects.push(Effect::RefreshAfter(delay));
    }

    /// Sequence number if the id belongs to this session.
    fn own_seq(&self, id: Option<&str>) -> Option<u64> {
        let id: RequestId = id?.parse().ok()?;
        (id.session == self.session_id).then_some(id.seq)
    }

    fn apply(&mut self, mut response: Response) -> Update {
        let own_seq = self.own_seq(response.id.as_deref());
        let uncorrelated = response.id.is_none();
        let pending = own_seq.and_then(|seq| self.pending.remove(&seq));
        let mut update = Update::Ack;

        if let Some(files) = response.files.take() {
            let (intent, seq, answered) = match pending {
                Some(Pending::Listing(intent)) => (intent, own_seq, own_seq),
                _ => {
                    let (intent, answered) = self.guess_intent(&response, uncorrelated);
                    (intent, None, answered)
                }
            };
            update = self.apply_listing(intent, seq, files);
            if let (Update::Listing(Intent::Refresh), Some(listed)) = (update, answered) {
                self.settle_mutations(listed);
            }
        }

        if let Some(content) = response.content.take() {
            self.preview = Some(Preview {
                name: response
                    .file
                    .take()
                    .unwrap_or_else(|| PLACEHOLDER_PREVIEW_NAME.to_string()),
                content,
                source: response.source.take(),
                predictions: response.predictions.take().unwrap_or_default(),
            });
            update = Update::Preview;
        }

        if let Some(suggestions) = response.suggestions.take() {
            self.suggestions = suggestions;
            update = Update::Suggestions;
        }

        if update == Update::Ack && !response.is_error() {
            match pending {
                Some(Pending::Mutation(command)) => self.speculate(&command),
                // Only WRITE acknowledgements echo the path
                None => {
                    if let Some(file) = response.file.take() {
                        self.speculate(&Command::Write {
                            file,
                            data: String::new(),
                        });
                    }
                }
                _ => {}
            }
        }

        update
    }

    /// Fallback routing for listings without one of our ids.
    ///
    /// Also returns the sequence number of the request presumed answered.
    fn guess_intent(&mut self, response: &Response, uncorrelated: bool) -> (Intent, Option<u64>) {
        let searching = self.has_pending(Intent::Search);
        let refreshing = self.has_pending(Intent::Refresh);

        let intent = if response.looks_like_search() || (searching && !refreshing) {
            Intent::Search
        } else {
            Intent::Refresh
        };

        // A reply with no id at all is presumed to answer our oldest request of that intent
        if !uncorrelated {
            return (intent, None);
        }
        let oldest = self
            .pending
            .iter()
            .find(|(_, p)| matches!(p, Pending::Listing(i) if *i == intent))
            .map(|(seq, _)| *seq);
        if let Some(seq) = oldest {
            self.pending.remove(&seq);
        }
        (intent, oldest)
    }

    fn has_pending(&self, intent: Intent) -> bool {
        self.pending
            .values()
            .any(|p| matches!(p, Pending::Listing(i) if *i == intent))
    }

    fn apply_listing(
        &mut self,
        intent: Intent,
        seq: Option<u64>,
        files: Vec<ListingEntry>,
    ) -> Update {
        if let Some(seq) = seq {
            let applied = match intent {
                Intent::Refresh => &mut self.applied_refresh_seq,
                Intent::Search => &mut self.applied_search_seq,
            };
            if seq < *applied {
                debug!("Discarding stale {:?} listing (seq {} < {})", intent, seq, applied);
                return Update::StaleListing(intent);
            }
            *applied = seq;
        }

        let records = normalize(files);
        for record in &records {
            self.catalog.extend(record.tags().iter());
        }

        match intent {
            Intent::Refresh => {
                self.records = records;
                self.search_results.clear();
            }
            Intent::Search => {
                self.search_results = records;
            }
        }
        Update::Listing(intent)
    }

    /// Optimistically apply an acknowledged mutation until the next LIST lands.
    fn speculate(&mut self, command: &Command) {
        match command {
            Command::Write { file, .. } => {
                if self.records.iter().all(|r| r.path() != file) {
                    if let Ok(record) = Record::new(file.clone()) {
                        self.records.push(record);
                    }
                }
            }
            Command::Tag { file, key } => {
                for record in self
                    .records
                    .iter_mut()
                    .chain(self.search_results.iter_mut())
                    .filter(|r| r.path() == file)
                {
                    if let Err(e) = record.add_tag(key.clone()) {
                        debug!("Not applying tag speculatively: {}", e);
                    }
                }
            }
            Command::Delete { file } => {
                self.records.retain(|r| r.path() != file);
                self.search_results.retain(|r| r.path() != file);
            }
            _ => {}
        }
    }
}

fn non_empty_path(path: String) -> Result<String, RecordError> {
    if path.is_empty() {
        Err(RecordError::EmptyPath)
    } else {
        Ok(path)
    }
}

/// Turn listing entries into records, skipping invalid and duplicate paths.
fn normalize(files: Vec<ListingEntry>) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(files.len());
    for entry in files {
        if !seen.insert(entry.name().to_string()) {
            warn!("Duplicate path in listing: {}", entry.name());
            continue;
        }
        match entry.into_record() {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping listing entry: {}", e),
        }
    }
    records
}
