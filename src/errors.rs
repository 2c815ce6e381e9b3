/*!
 * Error types for the batchlate application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

use crate::ledger::BatchStatus;

/// Errors that can occur when talking to the batch translation service
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Whether waiting and asking again can reasonably succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimitExceeded(_) | Self::ConnectionError(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Map a non-success HTTP status and body to the matching error
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            429 => Self::RateLimitExceeded(message),
            401 | 403 => Self::AuthenticationError(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

/// Errors raised by the batch ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Underlying file system failure
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding failure
    #[error("Ledger CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The ledger file exists but cannot be decoded
    #[error("Ledger file is corrupt: {0}")]
    Corrupt(String),

    /// An out-of-order status update was refused; the stored status is unchanged
    #[error("Rejected status transition for {batch_id}: {from} -> {to}")]
    TransitionRejected {
        batch_id: String,
        from: BatchStatus,
        to: BatchStatus,
    },

    /// A different record already uses this batch id
    #[error("Batch id already recorded with different fields: {0}")]
    DuplicateBatchId(String),

    /// No record exists for this batch id
    #[error("Unknown batch id: {0}")]
    UnknownBatch(String),

    /// The cross-process ledger lock could not be taken
    #[error("Failed to lock ledger: {0}")]
    Lock(String),
}

/// Errors that can occur while running a batch job against the service
#[derive(Error, Debug)]
pub enum BatchError {
    /// Error from the service API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the ledger
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Polling ran out of attempts before the job reached a terminal status
    #[error("Job {job_id} still {last_status} after {polls} polls")]
    PollTimeout {
        job_id: String,
        last_status: String,
        polls: usize,
    },

    /// The job completed but reported no output file
    #[error("Job {0} completed without an output file")]
    MissingOutputFile(String),

    /// The job ended in a non-completed terminal status
    #[error("Job {job_id} ended with status {status}")]
    JobFailed { job_id: String, status: String },
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the ledger
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Error from a batch job
    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
