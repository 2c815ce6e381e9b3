/*!
 * Persistent batch ledger.
 *
 * Every submitted batch gets one row that tracks it through the external job
 * lifecycle. Rows are only ever appended or moved forward through validated
 * status transitions, which makes the ledger file the source of truth across
 * restarts.
 */

pub mod status;
pub mod store;

pub use status::{BatchStatus, Rejection, Transition};
pub use store::{
    AppendOutcome, BatchJobRecord, BatchLedger, LEDGER_HEADER, LedgerRejection, LedgerSummary, RowUpdate,
};
