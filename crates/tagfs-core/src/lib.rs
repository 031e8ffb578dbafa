//! tagfs-core: Shared library for the tagged-record sync layer.
//!
//! This crate provides:
//! - The record data model with its five-tag ceiling
//! - The newline-delimited JSON request/response protocol
//! - Folder tree synthesis from flat paths
//! - The client reconciler that keeps a cached view consistent with the store

pub mod catalog;
pub mod log;
pub mod protocol;
pub mod reconciler;
pub mod record;
pub mod tree;

pub use catalog::{DEFAULT_TAGS, TagCatalog};
pub use log::{ActivityLog, LogEntry, LogStatus};
pub use protocol::{Command, LineBuffer, ListingEntry, ProtocolError, Request, RequestId, Response, Status};
pub use reconciler::{
    Effect, Intent, Preview, ReconcileError, Reconciler, ReconcilerConfig, RefreshDelays,
    SessionState, Update, UploadFile,
};
pub use record::{MAX_TAGS, Record, RecordError, TagHealth, TagSet};
pub use tree::{FolderNode, TreeEntry, build_tree, build_tree_sorted};
