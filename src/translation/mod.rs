/*!
 * Batch response reconstruction engine.
 *
 * This module turns source records into batch requests and rebuilds a verified
 * translation table from whatever the service sends back. It is split into
 * several submodules:
 *
 * - `records`: Core data model (source records, batches, raw responses)
 * - `batcher`: Batch partitioning and JSONL request rendering
 * - `tokens`: Token counting and per-request budgets
 * - `parser`: Fallback parser chain
 * - `repair`: Structural repair of truncated bodies
 * - `heuristics`: Low-confidence translation classifier
 * - `reconcile`: Id reconciliation into a translation table and problem sets
 * - `analysis`: Categorized job reports
 * - `response`: Decoding of the service's output JSONL
 * - `poller`: Job status polling against the ledger
 */

// Re-export main types for easier usage
pub use self::analysis::{BatchSummary, ErrorAnalyzer, ErrorCategory, ErrorItem, JobReport};
pub use self::batcher::{BatchPlan, RejectedRecord, RejectionReason, RequestBatcher, RequestTemplate};
pub use self::parser::{ParseOutcome, ParseStrategy, ParsedBatch, ResponseParser, TruncationStatus};
pub use self::poller::{JobPoller, PollConfig, PollFailure, PollResult};
pub use self::reconcile::{Conflict, IdReconciler, MissingTranslation, OrphanTranslation, Reconciliation};
pub use self::records::{Batch, ParsedTranslation, RawResponse, SourceRecord};
pub use self::repair::{RepairOutcome, RepairedBody, TruncationRepairer};
pub use self::response::read_responses;
pub use self::tokens::{TokenBudget, TokenCounter};

// Submodules
pub mod analysis;
pub mod batcher;
pub mod heuristics;
pub mod parser;
pub mod poller;
pub mod reconcile;
pub mod records;
pub mod repair;
pub mod response;
pub mod tokens;
