//! Client side: one connection, one file.
//!
//! `send_file` opens a single TCP connection, writes the encoded header,
//! then streams the file in fixed-size chunks until EOF. Partial writes are
//! not retried; truncation is detected on the receiving side via the
//! declared-size/byte-count mismatch.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::ClientError;
use crate::observer::TransferObserver;
use crate::protocol::{TransferHeader, CHUNK_SIZE, UNKNOWN_FILE_NAME};

/// What one `send_file` call did, for CLI display.
#[derive(Clone, Debug)]
pub struct SendReport {
    pub file_name: String,
    pub bytes_sent: u64,
    pub elapsed: Duration,
}

/// Build the wire header for a local file: basename, declared size, and the
/// extension including its dot, lowercased (empty when there is none).
pub fn header_for_path(path: &Path, size: u64) -> TransferHeader {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| UNKNOWN_FILE_NAME.to_string());
    let file_type = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default();
    TransferHeader::new(file_name, size, file_type)
}

/// Send one file to `host:port`. Exactly one connection per call; the
/// connection is closed on every exit path when the stream drops.
pub async fn send_file(
    host: &str,
    port: u16,
    path: &Path,
    observer: &dyn TransferObserver,
) -> Result<SendReport, ClientError> {
    let meta = tokio::fs::metadata(path).await?;
    if !meta.is_file() {
        return Err(ClientError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        )));
    }
    let header = header_for_path(path, meta.len());
    let encoded = header.encode()?;
    let mut file = File::open(path).await?;

    let addr = format!("{host}:{port}");
    let mut stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| ClientError::Connect {
            addr: addr.clone(),
            source,
        })?;
    observer.on_log(&format!("connected to {addr}"));

    let start = Instant::now();
    stream.write_all(&encoded).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent: u64 = 0;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n]).await?;
        sent += n as u64;
    }
    stream.shutdown().await?;

    let elapsed = start.elapsed();
    observer.on_log(&format!(
        "sent {} ({sent} bytes) to {addr}",
        header.file_name
    ));
    Ok(SendReport {
        file_name: header.file_name,
        bytes_sent: sent,
        elapsed,
    })
}
