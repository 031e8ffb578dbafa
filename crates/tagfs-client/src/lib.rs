//! tagfs-client library: Session, console parsing, and rendering.
//!
//! Exposed as a library so integration tests can drive a real session.

pub mod commands;
pub mod render;
pub mod session;
pub mod transfer;

pub use commands::{ConsoleCommand, ParseError};
pub use session::{ClientConfig, ClientSession, DEFAULT_URL, SessionError, SessionEvent};
pub use transfer::{TransferError, collect_upload, save_preview};
