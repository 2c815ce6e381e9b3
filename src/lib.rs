/*!
 * # batchlate - Batch translation with verified id reconciliation
 *
 * A Rust library for translating large sets of short technical records through
 * an asynchronous large-batch translation service, and for rebuilding a verified
 * one-to-one translation table from the service's unreliable responses.
 *
 * ## Features
 *
 * - Deterministic batching with an `[ID:<id>]` marker embedded in every prompt line
 * - Response parsing through an ordered fallback chain:
 *   strict JSON, fence stripping, truncation repair, line-pattern extraction
 * - Structural repair of truncated responses that never fabricates content
 * - Reconciliation into missing, orphan and suspicious problem sets
 * - A persistent CSV ledger tracking every batch through the external job lifecycle
 * - Categorized error reports with per-job success rates
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `translation`: Reconstruction and reconciliation engine:
 *   - `translation::records`: Core data model
 *   - `translation::batcher`: Request batching and JSONL rendering
 *   - `translation::parser`: Fallback parser chain
 *   - `translation::repair`: Truncation repair
 *   - `translation::heuristics`: Suspicious translation classifier
 *   - `translation::reconcile`: Id reconciliation
 *   - `translation::analysis`: Error analysis and reporting
 *   - `translation::response`: Batch response JSONL decoding
 *   - `translation::poller`: Job status polling
 * - `ledger`: Persistent batch lifecycle ledger
 * - `providers`: Batch service clients
 * - `app_controller`: End-to-end pipeline controller
 * - `file_utils`: CSV and file system operations
 * - `language_utils`: ISO language code utilities
 * - `logging`: Per-job log handle
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod ledger;
pub mod logging;
pub mod providers;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{AppError, BatchError, LedgerError, ProviderError};
pub use ledger::{BatchJobRecord, BatchLedger, BatchStatus};
pub use logging::JobLog;
pub use translation::{
    Batch, ErrorAnalyzer, IdReconciler, JobReport, ParsedTranslation, RawResponse,
    RequestBatcher, ResponseParser, SourceRecord, TruncationRepairer,
};
