/*!
 * Mock batch service for testing.
 *
 * The mock follows a script instead of talking to a network:
 * - `MockBatchService::completing()` - Completes on the first poll
 * - `with_polls(...)` - Walks through scripted statuses and transient failures
 * - `with_responder(...)` - Builds the output file from the uploaded requests
 * - `failing_download()` - Completes but cannot serve its output file
 */

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::errors::ProviderError;
use crate::providers::{BatchService, RemoteBatch};

/// One scripted answer to a status poll
#[derive(Debug, Clone, PartialEq)]
pub enum MockPoll {
    /// Report this raw service status
    Status(String),
    /// Fail with a rate limit error
    RateLimited,
    /// Fail with a connection error
    ConnectionLost,
    /// Fail with an authentication error
    Unauthorized,
}

impl MockPoll {
    pub fn status(status: &str) -> Self {
        Self::Status(status.to_string())
    }
}

/// Builds output content from the uploaded request JSONL
pub type Responder = fn(&str) -> String;

const OUTPUT_FILE_ID: &str = "file-output-mock";

/// Scripted in-memory batch service
#[derive(Debug)]
pub struct MockBatchService {
    polls: Mutex<VecDeque<MockPoll>>,
    output: Option<String>,
    responder: Option<Responder>,
    fail_download: bool,
    uploads: Mutex<Vec<String>>,
    poll_count: AtomicUsize,
    job_count: AtomicUsize,
}

impl MockBatchService {
    fn new(polls: Vec<MockPoll>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
            output: None,
            responder: None,
            fail_download: false,
            uploads: Mutex::new(Vec::new()),
            poll_count: AtomicUsize::new(0),
            job_count: AtomicUsize::new(0),
        }
    }

    /// A service whose jobs complete on the first poll
    pub fn completing() -> Self {
        Self::new(vec![MockPoll::status("completed")])
    }

    /// A service answering polls from `script`; the last entry repeats forever
    pub fn with_polls(script: Vec<MockPoll>) -> Self {
        Self::new(script)
    }

    /// Serve fixed output content
    pub fn with_output(mut self, content: impl Into<String>) -> Self {
        self.output = Some(content.into());
        self
    }

    /// Build output content from the most recent upload
    pub fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Report an output file but fail to download it
    pub fn failing_download(mut self) -> Self {
        self.fail_download = true;
        self
    }

    /// Number of status polls answered so far
    pub fn poll_count(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }

    /// Contents of every uploaded request file
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().clone()
    }

    fn has_output(&self) -> bool {
        self.output.is_some() || self.responder.is_some() || self.fail_download
    }

    fn next_poll(&self) -> MockPoll {
        let mut polls = self.polls.lock();
        if polls.len() > 1 {
            polls.pop_front().unwrap_or_else(|| MockPoll::status("completed"))
        } else {
            polls.front().cloned().unwrap_or_else(|| MockPoll::status("completed"))
        }
    }

    /// Responder that translates every prompt line as `<target>:<text>`
    ///
    /// The target prefix is taken from the first word after "into" in the system prompt,
    /// falling back to `xx`.
    pub fn prefixing_responder(request_jsonl: &str) -> String {
        let mut output = String::new();

        for line in request_jsonl.lines().filter(|l| !l.trim().is_empty()) {
            let Ok(request) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            let custom_id = request["custom_id"].as_str().unwrap_or_default();
            let messages = request["body"]["messages"].as_array().cloned().unwrap_or_default();
            let system = messages
                .iter()
                .find(|m| m["role"] == "system")
                .and_then(|m| m["content"].as_str())
                .unwrap_or_default();
            let target = system
                .split_whitespace()
                .skip_while(|w| *w != "into")
                .nth(1)
                .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
                .unwrap_or_else(|| "xx".to_string());
            let prompt = messages
                .iter()
                .find(|m| m["role"] == "user")
                .and_then(|m| m["content"].as_str())
                .unwrap_or_default();

            let mut translations = serde_json::Map::new();
            for prompt_line in prompt.lines() {
                let Some(marker) = prompt_line.find("[ID:") else {
                    continue;
                };
                let rest = &prompt_line[marker + 4..];
                let Some(close) = rest.find(']') else {
                    continue;
                };
                let id = rest[..close].trim();
                let text = rest[close + 1..].trim();
                translations.insert(id.to_string(), Value::String(format!("{}:{}", target, text)));
            }

            output.push_str(&Self::response_line(custom_id, 200, &Value::Object(translations).to_string()));
            output.push('\n');
        }

        output
    }

    /// Render one batch response line in the service's output format
    pub fn response_line(custom_id: &str, status_code: u16, content: &str) -> String {
        json!({
            "id": format!("resp_{}", custom_id),
            "custom_id": custom_id,
            "response": {
                "status_code": status_code,
                "body": {
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
                }
            },
            "error": null
        })
        .to_string()
    }
}

#[async_trait]
impl BatchService for MockBatchService {
    async fn upload_batch_file(&self, path: &Path) -> Result<String, ProviderError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let mut uploads = self.uploads.lock();
        uploads.push(content);
        Ok(format!("file-input-{}", uploads.len()))
    }

    async fn create_batch(&self, _input_file_id: &str) -> Result<RemoteBatch, ProviderError> {
        let n = self.job_count.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RemoteBatch {
            id: format!("batch_mock_{}", n),
            status: "validating".to_string(),
            output_file_id: None,
            error_file_id: None,
        })
    }

    async fn retrieve_batch(&self, job_id: &str) -> Result<RemoteBatch, ProviderError> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);

        match self.next_poll() {
            MockPoll::Status(status) => {
                let output_file_id =
                    (status == "completed" && self.has_output()).then(|| OUTPUT_FILE_ID.to_string());
                Ok(RemoteBatch {
                    id: job_id.to_string(),
                    status,
                    output_file_id,
                    error_file_id: None,
                })
            }
            MockPoll::RateLimited => Err(ProviderError::RateLimitExceeded("mock rate limit".to_string())),
            MockPoll::ConnectionLost => Err(ProviderError::ConnectionError("mock connection reset".to_string())),
            MockPoll::Unauthorized => Err(ProviderError::AuthenticationError("mock invalid key".to_string())),
        }
    }

    async fn download_file(&self, file_id: &str) -> Result<String, ProviderError> {
        if self.fail_download || file_id != OUTPUT_FILE_ID {
            return Err(ProviderError::ApiError {
                status_code: 404,
                message: format!("No such file: {}", file_id),
            });
        }

        if let Some(responder) = self.responder {
            let last_upload = self.uploads.lock().last().cloned().unwrap_or_default();
            return Ok(responder(&last_upload));
        }

        Ok(self.output.clone().unwrap_or_default())
    }
}
