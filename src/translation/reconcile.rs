/*!
 * Id reconciliation.
 *
 * Merges parsed batches into one translation table keyed by record id and
 * separates out every id that cannot be trusted. Attribution relies only on the
 * ids embedded in each response, never on the order entries came back in.
 */

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::parser::ParsedBatch;
use super::records::{Batch, ParsedTranslation};

/// An expected id with no translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingTranslation {
    pub batch_id: String,
    pub id: String,
}

/// A translation whose id does not belong to the batch that returned it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanTranslation {
    /// Batch whose response contained the entry
    pub batch_id: String,
    pub id: String,
    pub text: String,

    /// Another batch of the job that does own this id
    pub owner_batch: Option<String>,
}

/// The same id translated by more than one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub id: String,
    pub kept_batch: String,
    pub discarded_batch: String,
}

/// Final table plus the problem sets
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub table: BTreeMap<String, ParsedTranslation>,
    pub missing: Vec<MissingTranslation>,
    pub orphans: Vec<OrphanTranslation>,

    /// Ids kept in the table but flagged as low confidence, in submission order
    pub suspicious: Vec<String>,

    pub conflicts: Vec<Conflict>,
}

impl Reconciliation {
    pub fn translation(&self, id: &str) -> Option<&str> {
        self.table.get(id).map(|t| t.text.as_str())
    }

    /// Missing ids belonging to one batch
    pub fn missing_in(&self, batch_id: &str) -> usize {
        self.missing.iter().filter(|m| m.batch_id == batch_id).count()
    }
}

/// Builds the translation table for a job
pub struct IdReconciler;

impl IdReconciler {
    /// Reconcile parsed responses against the job's batches, given in submission order
    pub fn reconcile(batches: &[Batch], parsed: &[ParsedBatch]) -> Reconciliation {
        let mut result = Reconciliation::default();

        let mut owners: HashMap<&str, &str> = HashMap::new();
        for batch in batches {
            for id in batch.ids() {
                owners.entry(id).or_insert(batch.batch_id.as_str());
            }
        }

        let mut by_batch: HashMap<&str, &ParsedBatch> = HashMap::new();
        for response in parsed {
            by_batch.entry(response.batch_id.as_str()).or_insert(response);
        }

        // Table holder per id, so conflicts can name the winning batch
        let mut kept_from: HashMap<String, String> = HashMap::new();

        for batch in batches {
            let Some(response) = by_batch.get(batch.batch_id.as_str()) else {
                continue;
            };

            for (id, translation) in &response.translations {
                if !batch.contains(id) {
                    result.orphans.push(OrphanTranslation {
                        batch_id: batch.batch_id.clone(),
                        id: id.clone(),
                        text: translation.text.clone(),
                        owner_batch: owners.get(id.as_str()).map(|b| b.to_string()),
                    });
                    continue;
                }

                if let Some(kept) = kept_from.get(id) {
                    result.conflicts.push(Conflict {
                        id: id.clone(),
                        kept_batch: kept.clone(),
                        discarded_batch: batch.batch_id.clone(),
                    });
                    continue;
                }

                kept_from.insert(id.clone(), batch.batch_id.clone());
                result.table.insert(id.clone(), translation.clone());
            }
        }

        // Responses for batches this job never submitted
        for response in parsed {
            if batches.iter().any(|b| b.batch_id == response.batch_id) {
                continue;
            }
            for (id, translation) in &response.translations {
                result.orphans.push(OrphanTranslation {
                    batch_id: response.batch_id.clone(),
                    id: id.clone(),
                    text: translation.text.clone(),
                    owner_batch: owners.get(id.as_str()).map(|b| b.to_string()),
                });
            }
        }

        for batch in batches {
            for id in batch.ids() {
                match result.table.get(id) {
                    Some(translation) if translation.suspicious => {
                        if !result.suspicious.iter().any(|s| s == id) {
                            result.suspicious.push(id.to_string());
                        }
                    }
                    Some(_) => {}
                    None => result.missing.push(MissingTranslation {
                        batch_id: batch.batch_id.clone(),
                        id: id.to_string(),
                    }),
                }
            }
        }

        result
    }
}
