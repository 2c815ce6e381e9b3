/*!
 * Batch service clients.
 *
 * This module contains client implementations for asynchronous batch
 * translation services:
 * - OpenAI: OpenAI Batch API integration (file upload, batch jobs, file download)
 * - Mock: scripted in-memory service for tests
 */

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;

/// State of a remote batch job as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBatch {
    /// Service-assigned job id
    pub id: String,

    /// Raw service status (`validating`, `in_progress`, `completed`, ...)
    pub status: String,

    /// File holding the per-batch responses, once completed
    #[serde(default)]
    pub output_file_id: Option<String>,

    /// File holding per-request errors, if the service produced one
    #[serde(default)]
    pub error_file_id: Option<String>,
}

/// Common trait for batch translation services
///
/// A job is submitted by uploading a JSONL request file and creating a batch
/// job over it. The job is then polled until it reaches a terminal status and
/// its output file is downloaded.
#[async_trait]
pub trait BatchService: Send + Sync + Debug {
    /// Upload a JSONL request file
    ///
    /// # Returns
    /// * `Result<String, ProviderError>` - The service file id
    async fn upload_batch_file(&self, path: &Path) -> Result<String, ProviderError>;

    /// Create a batch job over an uploaded request file
    async fn create_batch(&self, input_file_id: &str) -> Result<RemoteBatch, ProviderError>;

    /// Fetch the current state of a batch job
    async fn retrieve_batch(&self, job_id: &str) -> Result<RemoteBatch, ProviderError>;

    /// Download the content of a service file
    async fn download_file(&self, file_id: &str) -> Result<String, ProviderError>;
}

pub mod mock;
pub mod openai;
