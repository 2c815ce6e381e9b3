use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::error;
use reqwest::{Client, Response, multipart};
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::providers::{BatchService, RemoteBatch};

/// Default public API base
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com";

/// Relative URL every batch request line targets
pub const CHAT_COMPLETIONS_URL: &str = "/v1/chat/completions";

/// OpenAI chat completion request, as embedded in batch request lines
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIRequest {
    /// The model to use
    pub model: String,

    /// The messages for the conversation
    pub messages: Vec<OpenAIMessage>,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// OpenAI message format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAIMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,
}

impl Default for OpenAIRequest {
    fn default() -> Self {
        Self {
            model: String::new(),
            messages: Vec::new(),
            temperature: Some(0.0),
            max_tokens: None,
        }
    }
}

impl OpenAIRequest {
    /// Create a new OpenAI request
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(OpenAIMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of tokens
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Body of a batch creation request
#[derive(Debug, Serialize)]
struct CreateBatchRequest<'a> {
    input_file_id: &'a str,
    endpoint: &'a str,
    completion_window: &'a str,
}

/// Response of a file upload
#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

/// Client for the OpenAI Batch API
#[derive(Debug)]
pub struct OpenAIBatchClient {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API base URL
    endpoint: String,
    /// Completion window requested for new jobs
    completion_window: String,
}

impl OpenAIBatchClient {
    /// Create a new client; an empty endpoint selects the public API
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        completion_window: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        let endpoint = endpoint.into();
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: if endpoint.is_empty() {
                DEFAULT_ENDPOINT.to_string()
            } else {
                endpoint.trim_end_matches('/').to_string()
            },
            completion_window: completion_window.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn send_error(e: reqwest::Error) -> ProviderError {
        if e.is_connect() || e.is_timeout() {
            ProviderError::ConnectionError(e.to_string())
        } else {
            ProviderError::RequestFailed(e.to_string())
        }
    }

    /// Turn a non-success response into the matching error
    async fn check(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error response text".to_string());
        error!("OpenAI API error ({}): {}", status, error_text);
        Err(ProviderError::from_status(status.as_u16(), error_text))
    }

    async fn json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, ProviderError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl BatchService for OpenAIBatchClient {
    async fn upload_batch_file(&self, path: &Path) -> Result<String, ProviderError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| ProviderError::RequestFailed(format!("Failed to read {}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "batch_input.jsonl".to_string());

        let part = multipart::Part::bytes(content)
            .file_name(file_name)
            .mime_str("application/jsonl")
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let form = multipart::Form::new().text("purpose", "batch").part("file", part);

        let response = self
            .client
            .post(self.url("/v1/files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(Self::send_error)?;

        let file: FileObject = Self::json(Self::check(response).await?).await?;
        Ok(file.id)
    }

    async fn create_batch(&self, input_file_id: &str) -> Result<RemoteBatch, ProviderError> {
        let request = CreateBatchRequest {
            input_file_id,
            endpoint: CHAT_COMPLETIONS_URL,
            completion_window: &self.completion_window,
        };

        let response = self
            .client
            .post(self.url("/v1/batches"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Self::send_error)?;

        Self::json(Self::check(response).await?).await
    }

    async fn retrieve_batch(&self, job_id: &str) -> Result<RemoteBatch, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/batches/{}", job_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::send_error)?;

        Self::json(Self::check(response).await?).await
    }

    async fn download_file(&self, file_id: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/files/{}/content", file_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::send_error)?;

        Self::check(response)
            .await?
            .text()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))
    }
}
