/*!
 * Request batching.
 *
 * Splits a job's source records into batches bounded by a record count and,
 * optionally, a token budget, and renders them as batch request lines. Every prompt line carries an explicit `[ID:<id>]` marker so the
 * mapping back to source records survives reordering in the response.
 */

use std::collections::HashMap;
use std::fmt;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::providers::openai::OpenAIRequest;

use super::records::{Batch, SourceRecord};
use super::tokens::TokenBudget;

/// Default number of records per batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Why a record was kept out of every batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The id is empty after trimming
    EmptyId,
    /// Another record in the job uses the same id
    DuplicateId,
    /// There is no text to translate
    EmptyText,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyId => write!(f, "empty id"),
            Self::DuplicateId => write!(f, "duplicate id"),
            Self::EmptyText => write!(f, "empty text"),
        }
    }
}

/// A record refused before batching
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    /// 0-based position in the input
    pub position: usize,
    pub record: SourceRecord,
    pub reason: RejectionReason,
}

/// Result of batching one job
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    pub batches: Vec<Batch>,
    pub rejected: Vec<RejectedRecord>,
}

impl BatchPlan {
    /// Number of records that made it into a batch
    pub fn accepted_count(&self) -> usize {
        self.batches.iter().map(|b| b.len()).sum()
    }

    /// Every accepted record in input order
    pub fn accepted_records(&self) -> impl Iterator<Item = &SourceRecord> {
        self.batches.iter().flat_map(|b| b.records.iter())
    }

    pub fn find_batch(&self, batch_id: &str) -> Option<&Batch> {
        self.batches.iter().find(|b| b.batch_id == batch_id)
    }
}

/// Settings used to render batch request lines
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    /// Model name sent with every request
    pub model: String,

    /// System prompt, already specialized for the target language
    pub system_prompt: String,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Service endpoint each line targets
    pub url: String,
}

/// One line of the batch request JSONL file
#[derive(Debug, Serialize)]
pub struct BatchRequestLine<'a> {
    pub custom_id: &'a str,
    pub method: &'static str,
    pub url: &'a str,
    pub body: OpenAIRequest,
}

/// Partitions source records into batches
#[derive(Debug, Clone)]
pub struct RequestBatcher {
    max_batch_size: usize,
    budget: Option<TokenBudget>,
}

impl Default for RequestBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BATCH_SIZE)
    }
}

impl RequestBatcher {
    /// Create a batcher; a size of zero is treated as one
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            budget: None,
        }
    }

    /// Also close a batch once its request would exceed `budget`
    pub fn with_token_budget(mut self, budget: TokenBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Validate and partition records; input order is preserved
    pub fn prepare(&self, records: Vec<SourceRecord>) -> BatchPlan {
        let mut id_counts: HashMap<String, usize> = HashMap::new();
        for record in &records {
            *id_counts.entry(record.id.clone()).or_insert(0) += 1;
        }

        let mut accepted = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();

        for (position, record) in records.into_iter().enumerate() {
            let reason = if record.id.trim().is_empty() {
                Some(RejectionReason::EmptyId)
            } else if id_counts.get(&record.id).copied().unwrap_or(0) > 1 {
                Some(RejectionReason::DuplicateId)
            } else if record.text.trim().is_empty() {
                Some(RejectionReason::EmptyText)
            } else {
                None
            };

            match reason {
                Some(reason) => rejected.push(RejectedRecord {
                    position,
                    record,
                    reason,
                }),
                None => accepted.push(record),
            }
        }

        let batches = self
            .partition(accepted)
            .into_iter()
            .enumerate()
            .map(|(idx, records)| Batch {
                batch_id: Batch::id_for(idx + 1),
                records,
                max_size: self.max_batch_size,
            })
            .collect();

        BatchPlan { batches, rejected }
    }

    /// Greedy split in input order; a record too large for any budget still gets a batch of its own
    fn partition(&self, records: Vec<SourceRecord>) -> Vec<Vec<SourceRecord>> {
        let base = self.budget.map_or(0, |b| b.prompt_tokens);
        let mut groups = Vec::new();
        let mut current: Vec<SourceRecord> = Vec::new();
        let mut used = base;

        for record in records {
            if current.len() == self.max_batch_size {
                groups.push(std::mem::take(&mut current));
                used = base;
            }

            if let Some(budget) = &self.budget {
                let mut cost = budget.line_cost(&Batch::prompt_line(current.len() + 1, &record));
                if !current.is_empty() && used + cost > budget.max_tokens {
                    groups.push(std::mem::take(&mut current));
                    used = base;
                    cost = budget.line_cost(&Batch::prompt_line(1, &record));
                }
                used += cost;
            }

            current.push(record);
        }

        if !current.is_empty() {
            groups.push(current);
        }
        groups
    }

    /// Render one JSONL request line per batch
    pub fn render_requests(&self, batches: &[Batch], template: &RequestTemplate) -> Result<String> {
        let mut out = String::new();
        for batch in batches {
            let line = BatchRequestLine {
                custom_id: &batch.batch_id,
                method: "POST",
                url: &template.url,
                body: OpenAIRequest::new(&template.model)
                    .add_message("system", &template.system_prompt)
                    .add_message("user", batch.render_prompt())
                    .temperature(template.temperature)
                    .max_tokens(template.max_tokens),
            };
            let json = serde_json::to_string(&line)
                .with_context(|| format!("Failed to serialize request for {}", batch.batch_id))?;
            out.push_str(&json);
            out.push('\n');
        }
        Ok(out)
    }
}
