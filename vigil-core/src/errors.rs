//! Error Types for the Ingestion Core
//!
//! ## Design Philosophy
//!
//! The pipeline is best-effort: losing a single sample is preferable to
//! head-of-line blocking on the transport's delivery thread. Errors in this
//! crate therefore describe *why one message was dropped*, and never need to
//! cross a component boundary as anything richer than a log line.
//!
//! The only fallible operation in the core is envelope decoding. Dedup,
//! rollover and aggregation are total functions over already-decoded data;
//! storage and cache failures belong to the connectors crate.

use thiserror::Error;

/// Result type for envelope decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Why an inbound message could not be decoded.
///
/// Per the pipeline's error policy these are logged and the message is
/// dropped without retry.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload was not valid JSON or did not match the expected shape
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Command tag does not map to a known payload shape
    #[error("unknown command tag {0}")]
    UnknownCommand(u32),

    /// Envelope carried no device id, so the message cannot be keyed
    #[error("missing device id")]
    MissingDeviceId,
}
