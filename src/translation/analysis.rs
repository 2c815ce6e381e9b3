/*!
 * Error analysis for a finished job.
 *
 * Turns the parse outcomes, the reconciliation and any refused ledger updates
 * into a categorized report with a per-job success rate.
 */

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::ledger::LedgerRejection;

use super::batcher::RejectedRecord;
use super::parser::{ParseOutcome, ParseStrategy, ParsedBatch, TruncationStatus};
use super::reconcile::Reconciliation;
use super::records::Batch;

/// Error taxonomy of a job report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ErrorCategory {
    ParseFailure,
    TruncationUnrepairable,
    MissingTranslation,
    OrphanTranslation,
    SuspiciousTranslation,
    LedgerTransitionRejected,
    ServiceStatusError,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One itemized problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorItem {
    pub category: ErrorCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub message: String,
}

/// Per-batch line of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub outcome: ParseOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ParseStrategy>,
    pub expected: usize,
    pub translated: usize,
    pub successful: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicate_ids: Vec<String>,
}

/// Categorized account of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub total_batches: usize,
    pub successful_batches: usize,
    pub failed_batches: usize,
    pub counts: BTreeMap<ErrorCategory, usize>,
    pub success_rate_percentage: f64,
    pub batches: Vec<BatchSummary>,
    pub errors: Vec<ErrorItem>,

    /// Input records refused before batching
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected_records: Vec<RejectedRecord>,
}

impl JobReport {
    pub fn count(&self, category: ErrorCategory) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn errors_in(&self, category: ErrorCategory) -> impl Iterator<Item = &ErrorItem> {
        self.errors.iter().filter(move |e| e.category == category)
    }

    /// Attach records the batcher refused
    pub fn with_rejected_records(mut self, rejected: Vec<RejectedRecord>) -> Self {
        self.rejected_records = rejected;
        self
    }
}

/// Builds job reports
pub struct ErrorAnalyzer;

impl ErrorAnalyzer {
    /// Success rule: clean or repaired, or partial with none of the batch's own ids missing
    fn is_successful(parsed: Option<&ParsedBatch>, missing: usize) -> bool {
        match parsed.map(|p| p.outcome) {
            Some(ParseOutcome::Clean | ParseOutcome::Repaired) => true,
            Some(ParseOutcome::Partial) => missing == 0,
            _ => false,
        }
    }

    pub fn analyze(
        batches: &[Batch],
        parsed: &[ParsedBatch],
        reconciliation: &Reconciliation,
        ledger_rejections: &[LedgerRejection],
    ) -> JobReport {
        let mut errors = Vec::new();
        let mut summaries = Vec::with_capacity(batches.len());

        let by_batch: HashMap<&str, &ParsedBatch> =
            parsed.iter().rev().map(|p| (p.batch_id.as_str(), p)).collect();

        for batch in batches {
            let response = by_batch.get(batch.batch_id.as_str()).copied();
            let missing = reconciliation.missing_in(&batch.batch_id);
            let successful = Self::is_successful(response, missing);

            match response {
                None => errors.push(ErrorItem {
                    category: ErrorCategory::ParseFailure,
                    batch_id: Some(batch.batch_id.clone()),
                    record_id: None,
                    message: "No response received for batch".to_string(),
                }),
                Some(response) => {
                    if let Some(excerpt) = &response.service_error {
                        errors.push(ErrorItem {
                            category: ErrorCategory::ServiceStatusError,
                            batch_id: Some(batch.batch_id.clone()),
                            record_id: None,
                            message: format!("Service returned status {}: {}", response.http_status, excerpt),
                        });
                    }

                    let unrepairable = matches!(response.truncation, TruncationStatus::Unrepairable { .. });
                    if let TruncationStatus::Unrepairable { open_delimiters } = response.truncation {
                        errors.push(ErrorItem {
                            category: ErrorCategory::TruncationUnrepairable,
                            batch_id: Some(batch.batch_id.clone()),
                            record_id: None,
                            message: format!(
                                "Truncated response with {} open delimiter(s) and no complete entry",
                                open_delimiters
                            ),
                        });
                    }

                    if response.outcome == ParseOutcome::Failed && !response.is_service_error() && !unrepairable {
                        errors.push(ErrorItem {
                            category: ErrorCategory::ParseFailure,
                            batch_id: Some(batch.batch_id.clone()),
                            record_id: None,
                            message: "No parse strategy recovered any translation".to_string(),
                        });
                    }
                }
            }

            summaries.push(BatchSummary {
                batch_id: batch.batch_id.clone(),
                outcome: response.map(|r| r.outcome).unwrap_or(ParseOutcome::Failed),
                strategy: response.and_then(|r| r.strategy),
                expected: batch.len(),
                translated: batch.len().saturating_sub(missing),
                successful,
                duplicate_ids: response.map(|r| r.duplicate_ids.clone()).unwrap_or_default(),
            });
        }

        for missing in &reconciliation.missing {
            errors.push(ErrorItem {
                category: ErrorCategory::MissingTranslation,
                batch_id: Some(missing.batch_id.clone()),
                record_id: Some(missing.id.clone()),
                message: "No translation returned".to_string(),
            });
        }

        for orphan in &reconciliation.orphans {
            let message = match &orphan.owner_batch {
                Some(owner) => format!("Id belongs to {}, not to the batch that returned it", owner),
                None => "Id is not part of this job".to_string(),
            };
            errors.push(ErrorItem {
                category: ErrorCategory::OrphanTranslation,
                batch_id: Some(orphan.batch_id.clone()),
                record_id: Some(orphan.id.clone()),
                message,
            });
        }

        for conflict in &reconciliation.conflicts {
            errors.push(ErrorItem {
                category: ErrorCategory::OrphanTranslation,
                batch_id: Some(conflict.discarded_batch.clone()),
                record_id: Some(conflict.id.clone()),
                message: format!("Id already translated by {}; this copy was discarded", conflict.kept_batch),
            });
        }

        for id in &reconciliation.suspicious {
            let batch_id = batches.iter().find(|b| b.contains(id)).map(|b| b.batch_id.clone());
            let text = reconciliation.translation(id).unwrap_or_default();
            errors.push(ErrorItem {
                category: ErrorCategory::SuspiciousTranslation,
                batch_id,
                record_id: Some(id.clone()),
                message: format!("Low-confidence translation: {:?}", text),
            });
        }

        for rejection in ledger_rejections {
            errors.push(ErrorItem {
                category: ErrorCategory::LedgerTransitionRejected,
                batch_id: Some(rejection.batch_id.clone()),
                record_id: None,
                message: format!("Status {} -> {} rejected", rejection.from, rejection.to),
            });
        }

        let mut counts = BTreeMap::new();
        for error in &errors {
            *counts.entry(error.category).or_insert(0) += 1;
        }

        let total_batches = batches.len();
        let successful_batches = summaries.iter().filter(|s| s.successful).count();
        let success_rate_percentage = if total_batches == 0 {
            100.0
        } else {
            successful_batches as f64 / total_batches as f64 * 100.0
        };

        JobReport {
            total_batches,
            successful_batches,
            failed_batches: total_batches - successful_batches,
            counts,
            success_rate_percentage,
            batches: summaries,
            errors,
            rejected_records: Vec::new(),
        }
    }
}
