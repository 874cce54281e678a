//! ferry: header-delimited file transfer over TCP with live transfer
//! metrics.
//!
//! A client sends `name|size|type\n` followed by raw file bytes; the server
//! stores the body and samples throughput/CPU/RAM while it streams in,
//! reporting realtime samples and a final per-transfer summary through an
//! observer interface.

pub mod cli;
pub mod client;
pub mod control;
pub mod error;
pub mod metrics;
pub mod observer;
pub mod protocol;
pub mod server;
pub mod sysmon;
