/*!
 * Core data model shared by the batcher, parser and reconciler.
 */

use serde::{Deserialize, Serialize};

/// One source record to translate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Identifier, unique within a job and opaque beyond equality
    pub id: String,

    /// Text to translate
    pub text: String,
}

impl SourceRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// A bounded group of records sent together as one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Batch identifier, `batch-NNNN` in submission order
    pub batch_id: String,

    /// Records in prompt order
    pub records: Vec<SourceRecord>,

    /// Configured upper bound this batch was built with
    pub max_size: usize,
}

impl Batch {
    /// Format the batch identifier for a 1-based batch number
    pub fn id_for(number: usize) -> String {
        format!("batch-{:04}", number)
    }

    /// Ids in prompt order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    /// Whether `id` belongs to this batch
    pub fn contains(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    /// Source text for `id`, if the record belongs to this batch
    pub fn source_text(&self, id: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// One prompt line for the record at 1-based `position`
    pub fn prompt_line(position: usize, record: &SourceRecord) -> String {
        format!("{}. [ID:{}] {}", position, record.id, record.text)
    }

    /// Render the user prompt, one `"<n>. [ID:<id>] <text>"` line per record
    pub fn render_prompt(&self) -> String {
        self.records
            .iter()
            .enumerate()
            .map(|(idx, record)| Self::prompt_line(idx + 1, record))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The raw per-batch answer from the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub batch_id: String,

    /// HTTP-like status code; 0 when the service did not report one
    pub http_status: u16,

    /// Free-form text that nominally holds an id to translation mapping
    pub body: String,
}

impl RawResponse {
    pub fn new(batch_id: impl Into<String>, http_status: u16, body: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            http_status,
            body: body.into(),
        }
    }

    /// Success means a 2xx status, or no status reported at all
    pub fn is_success(&self) -> bool {
        self.http_status == 0 || (200..300).contains(&self.http_status)
    }
}

/// One translation recovered from a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTranslation {
    pub id: String,
    pub text: String,

    /// Set by the low-confidence heuristic
    pub suspicious: bool,
}
