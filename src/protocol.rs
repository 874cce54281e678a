//! Wire format for ferry transfers.
//!
//! A transfer is one TCP connection carrying a single newline-terminated
//! header line followed by raw file bytes until the peer closes its write
//! half:
//!
//! ```text
//! <file_name>|<file_size>|<file_type>\n<body bytes...>
//! ```
//!
//! There is no escaping of `|` or `\n` inside fields; instead `encode`
//! refuses to produce a header whose fields would corrupt the framing.
//! `decode` never fails: an unparseable line yields a sentinel header and
//! the receiver drains the body anyway, recording the transfer as Failed.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Chunk size for the client read loop and the server copy loop.
pub const CHUNK_SIZE: usize = 4096;

/// Field separator inside the header line.
pub const FIELD_SEPARATOR: char = '|';

/// The header line ends at the first newline.
pub const HEADER_TERMINATOR: u8 = b'\n';

/// Cap on accumulated header bytes. A peer that never sends a newline
/// cannot grow the header buffer past this; whatever accumulated is decoded
/// as-is (and will normally come out as the sentinel).
pub const MAX_HEADER_LEN: usize = 4096;

/// File name substituted when the header line cannot be decoded.
pub const UNKNOWN_FILE_NAME: &str = "unknown";

/// Metadata line exchanged before the file bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHeader {
    /// Display name of the file, no path expected.
    pub file_name: String,
    /// Declared body length in bytes; `None` when the sender did not know
    /// it (encoded as `-1` on the wire).
    pub file_size: Option<u64>,
    /// Extension including the leading dot, or empty.
    pub file_type: String,
}

impl TransferHeader {
    pub fn new(file_name: impl Into<String>, file_size: u64, file_type: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_size: Some(file_size),
            file_type: file_type.into(),
        }
    }

    /// Header used when the line off the wire cannot be parsed.
    pub fn sentinel() -> Self {
        Self {
            file_name: UNKNOWN_FILE_NAME.to_string(),
            file_size: None,
            file_type: String::new(),
        }
    }

    /// Serialize to the single-line wire form, newline included.
    ///
    /// Fails if `file_name` or `file_type` contains the separator or a
    /// newline. The format has no escaping, so such values are rejected
    /// at the source rather than sent as corrupt framing.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        check_field("file_name", &self.file_name)?;
        check_field("file_type", &self.file_type)?;
        let size = match self.file_size {
            Some(n) => n as i64,
            None => -1,
        };
        Ok(format!(
            "{}{sep}{}{sep}{}\n",
            self.file_name,
            size,
            self.file_type,
            sep = FIELD_SEPARATOR
        )
        .into_bytes())
    }

    /// Parse a header line (without the terminating newline).
    ///
    /// Expects exactly three `|`-separated fields with an integer size
    /// field; a negative size means "unknown". Anything else yields the
    /// sentinel header; callers still drain the body and mark the
    /// transfer Failed.
    pub fn decode(line: &str) -> Self {
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if fields.len() != 3 {
            return Self::sentinel();
        }
        let size: i64 = match fields[1].trim().parse() {
            Ok(n) => n,
            Err(_) => return Self::sentinel(),
        };
        Self {
            file_name: fields[0].to_string(),
            file_size: u64::try_from(size).ok(),
            file_type: fields[2].to_string(),
        }
    }
}

fn check_field(field: &'static str, value: &str) -> Result<(), ProtocolError> {
    if value.contains(FIELD_SEPARATOR) || value.contains('\n') || value.contains('\r') {
        return Err(ProtocolError::ReservedCharacter {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
