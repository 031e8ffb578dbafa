//! Plain-text rendering of the cached view.

use std::fmt::Write;
use tagfs_core::log::{ActivityLog, LogStatus};
use tagfs_core::reconciler::Preview;
use tagfs_core::record::{MAX_TAGS, Record, TagHealth};
use tagfs_core::tree::{FolderNode, TreeEntry};

/// Slot meter for a record's tags, e.g. `[##---] 2/5`.
pub fn tag_meter(record: &Record) -> String {
    let used = record.tags().len();
    let label = match record.health() {
        TagHealth::Low => "",
        TagHealth::Medium => " filling",
        TagHealth::Full => " full",
    };
    format!(
        "[{}{}] {}/{}{}",
        "#".repeat(used),
        "-".repeat(MAX_TAGS.saturating_sub(used)),
        used,
        MAX_TAGS,
        label
    )
}

pub fn tree(root: &FolderNode) -> String {
    let mut out = String::new();
    for entry in root.walk() {
        match entry {
            TreeEntry::Folder { node, depth } => {
                let _ = writeln!(out, "{}{}/", "  ".repeat(depth), node.name());
            }
            TreeEntry::Record { record, depth } => {
                let tags: Vec<&str> = record.tags().iter().collect();
                let _ = write!(out, "{}{}  {}", "  ".repeat(depth), record.file_name(), tag_meter(record));
                if !tags.is_empty() {
                    let _ = write!(out, "  {}", tags.join(", "));
                }
                out.push('\n');
            }
        }
    }
    if out.is_empty() {
        out.push_str("(no records)\n");
    }
    out
}

pub fn log(log: &ActivityLog) -> String {
    let mut out = String::new();
    for entry in log.iter() {
        let marker = match entry.status {
            LogStatus::Ok => "  ",
            LogStatus::Error => "! ",
        };
        let _ = writeln!(out, "{marker}{entry}");
    }
    out
}

pub fn preview(preview: &Preview) -> String {
    let mut out = match &preview.source {
        Some(source) => format!("--- {} ({}) ---\n", preview.name, source),
        None => format!("--- {} ---\n", preview.name),
    };
    let _ = writeln!(out, "{}", preview.content);
    out.push_str("---");
    if !preview.predictions.is_empty() {
        let _ = write!(out, "\nRelated: {}", preview.predictions.join(", "));
    }
    out
}
