//! Wire protocol between clients, the gateway, and the record store.
//!
//! Messages are newline-delimited JSON objects:
//! - Requests carry an `action` discriminator (see [`Command`])
//! - Responses are untyped on the wire; shape (`files`, `content`,
//!   `suggestions`) determines meaning (see [`Response`])
//!
//! An optional `id` field correlates a response with the request that caused
//! it. Stores that don't echo it stay compatible; the client falls back to
//! message heuristics.

pub mod framing;
pub mod request;
pub mod response;

pub use framing::{LineBuffer, frame};
pub use request::{Command, Request, RequestId};
pub use response::{ListingEntry, Response, Status, is_search_message};

use thiserror::Error;

/// Errors raised while decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed request id: {0}")]
    BadRequestId(String),
}
