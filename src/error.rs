//! Pipeline error taxonomy.
//!
//! Every stage boundary returns `Result<_, PipelineError>`. The variants
//! carry enough context for the run record's single human-readable error
//! message, and each maps to a stable error code for classification.

use crate::schema::{ChannelKind, Source};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input fails domain invariants (entity construction, run records).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Non-2xx response, empty body, or implausible payload.
    #[error("download failed for {src}: {reason}")]
    Download { src: Source, reason: String },

    /// Transport-level failure before a response was obtained.
    #[error("network error: {0}")]
    Network(String),

    /// A stage or run exceeded its deadline.
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// The document itself could not be decoded.
    #[error("parse failure for {src}: {reason}")]
    Parsing { src: Source, reason: String },

    /// Sanity-floor breach: the document decoded but yielded too few
    /// entities to be the real list. Prior data must be preserved.
    #[error("{src} produced {count} entities, below the sanity floor of {floor}")]
    InvalidSourceData {
        src: Source,
        count: usize,
        floor: usize,
    },

    #[error("database error: {0}")]
    Database(String),

    /// Unit-of-work misuse or failed commit; the transaction is rolled back.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Channel-isolated dispatch failure; never rolls back a run.
    #[error("notification error on {channel}: {reason}")]
    Notification { channel: ChannelKind, reason: String },

    /// A run for this source is already in flight.
    #[error("a run is already in flight for {0}")]
    Busy(Source),
}

impl PipelineError {
    /// Stable code for log filtering and run-record classification.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "VALIDATION_ERROR",
            PipelineError::Download { .. } => "DOWNLOAD_ERROR",
            PipelineError::Network(_) => "NETWORK_ERROR",
            PipelineError::Timeout(_) => "TIMEOUT",
            PipelineError::Parsing { .. } => "PARSING_ERROR",
            PipelineError::InvalidSourceData { .. } => "INVALID_SOURCE_DATA",
            PipelineError::Database(_) => "DATABASE_ERROR",
            PipelineError::Transaction(_) => "TRANSACTION_ERROR",
            PipelineError::Notification { .. } => "NOTIFICATION_ERROR",
            PipelineError::Busy(_) => "SOURCE_BUSY",
        }
    }

    /// Whether the orchestrator may retry the attempt.
    ///
    /// Parsing and sanity-floor failures are deterministic for a given
    /// payload; commits are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Download { .. }
                | PipelineError::Network(_)
                | PipelineError::Timeout(_)
                | PipelineError::Database(_)
        )
    }

    /// Error message stored on a FAILED run: stable code + readable text.
    pub fn run_message(&self) -> String {
        format!("[{}] {}", self.code(), self)
    }
}
