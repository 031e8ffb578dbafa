//! Console command parsing.

use std::path::PathBuf;
use thiserror::Error;

/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Re-list and show the folder tree
    Refresh,
    /// Show the tree of visible records
    Tree,
    Read(String),
    Write { path: String, data: String },
    Delete(String),
    DeleteFolder(String),
    Tag { path: String, key: String },
    Search(String),
    ClearSearch,
    Suggest(String),
    /// Upload a local file or folder
    Upload(PathBuf),
    /// Save the current preview into a local directory
    Download(PathBuf),
    Log,
    Tags,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty input")]
    Empty,

    #[error("Unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
Commands:
  ls | refresh               re-list all records
  tree                       show the folder tree
  read <path>                preview a record
  write <path> <text...>     create or overwrite a record
  rm <path>                  delete a record
  rmdir <folder>             delete every record under a folder
  tag <path> <key>           attach a tag (max 5 per record)
  search <key>               show records carrying a tag
  clear                      clear search results
  suggest <prefix>           suggest known tags
  upload <local path>        upload a file or folder
  download <local dir>       save the previewed record
  log                        show the activity log
  tags                       show known tags
  help | quit";

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb {
            "" => return Err(ParseError::Empty),
            "ls" | "refresh" => ConsoleCommand::Refresh,
            "tree" => ConsoleCommand::Tree,
            "read" | "cat" => ConsoleCommand::Read(one_arg(rest, "read <path>")?),
            "write" => {
                let (path, data) = rest
                    .split_once(char::is_whitespace)
                    .map(|(p, d)| (p, d.trim_start()))
                    .unwrap_or((rest, ""));
                if path.is_empty() {
                    return Err(ParseError::Usage("write <path> <text...>"));
                }
                ConsoleCommand::Write {
                    path: path.to_string(),
                    data: data.to_string(),
                }
            }
            "rm" | "delete" => ConsoleCommand::Delete(one_arg(rest, "rm <path>")?),
            "rmdir" => ConsoleCommand::DeleteFolder(one_arg(rest, "rmdir <folder>")?),
            "tag" => {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(path), Some(key), None) => ConsoleCommand::Tag {
                        path: path.to_string(),
                        key: key.to_string(),
                    },
                    _ => return Err(ParseError::Usage("tag <path> <key>")),
                }
            }
            "search" => ConsoleCommand::Search(one_arg(rest, "search <key>")?),
            "clear" => ConsoleCommand::ClearSearch,
            "suggest" => ConsoleCommand::Suggest(rest.to_string()),
            "upload" => ConsoleCommand::Upload(PathBuf::from(one_arg(rest, "upload <local path>")?)),
            "download" => {
                let dir = if rest.is_empty() { "." } else { rest };
                ConsoleCommand::Download(PathBuf::from(dir))
            }
            "log" => ConsoleCommand::Log,
            "tags" => ConsoleCommand::Tags,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

fn one_arg(rest: &str, usage: &'static str) -> Result<String, ParseError> {
    if rest.is_empty() {
        Err(ParseError::Usage(usage))
    } else {
        Ok(rest.to_string())
    }
}
