//! Error types for the ferry transfer core.
//!
//! The library reports failures through these enums so callers can branch
//! on the failure domain; the binaries wrap them in `anyhow` at the seams.
//! Recoverable protocol conditions (malformed header, truncated body) are
//! NOT errors; they are folded into the transfer record as Failed status.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Header framing violations caught on the sending side.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A header field contains the field separator or a newline, which
    /// would corrupt the single-line framing.
    #[error("header field {field} contains a reserved character: {value:?}")]
    ReservedCharacter {
        field: &'static str,
        value: String,
    },
}

/// Failures surfaced by `client::send_file`. One transfer per call, no
/// retry; truncation is detected on the receiving side.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The TCP connect itself failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The outgoing header could not be encoded.
    #[error("header encode failed: {0}")]
    Header(#[from] ProtocolError),

    /// Local file read or socket write failed mid-transfer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failures that stop the server's accept loop. Per-connection handler
/// faults never surface here; they are logged and absorbed.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Could not bind/listen on the requested address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The storage directory could not be created.
    #[error("failed to create save directory {path}: {source}")]
    SaveDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Accept failed while the server was still meant to be running.
    #[error("accept failed: {0}")]
    Accept(io::Error),
}
