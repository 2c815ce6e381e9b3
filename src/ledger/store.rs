/*!
 * CSV-backed ledger store.
 *
 * The whole table is rewritten on every mutation: read, change in memory, write
 * a temporary file in the same directory and rename it over the ledger. A
 * process-local mutex plus an advisory lock on `<ledger>.lock` serialize
 * writers, so concurrent jobs never lose each other's rows.
 */

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use fd_lock::RwLock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::errors::LedgerError;
use crate::logging::JobLog;

use super::status::{BatchStatus, Rejection, Transition};

/// Column order of the ledger file
pub const LEDGER_HEADER: [&str; 7] = [
    "batch_id",
    "input_file",
    "job_id",
    "status",
    "timestamp",
    "target_language",
    "output_file",
];

/// Number of rows shown as recent activity in a summary
const RECENT_ROWS: usize = 5;

/// One persisted ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJobRecord {
    pub batch_id: String,
    pub input_file: String,
    pub job_id: String,
    pub status: BatchStatus,

    /// Submission time in unix seconds
    #[serde(rename = "timestamp")]
    pub submitted_at: i64,

    pub target_language: String,
    pub output_file: String,
}

impl BatchJobRecord {
    /// A freshly submitted row stamped with the current time
    pub fn submitted(
        batch_id: impl Into<String>,
        input_file: impl Into<String>,
        job_id: impl Into<String>,
        target_language: impl Into<String>,
        output_file: impl Into<String>,
    ) -> Self {
        Self {
            batch_id: batch_id.into(),
            input_file: input_file.into(),
            job_id: job_id.into(),
            status: BatchStatus::Submitted,
            submitted_at: chrono::Utc::now().timestamp(),
            target_language: target_language.into(),
            output_file: output_file.into(),
        }
    }

    /// Ledger key of a batch; request batch ids repeat across jobs, so they are qualified by job
    pub fn ledger_key(job_id: &str, batch_id: &str) -> String {
        format!("{}/{}", job_id, batch_id)
    }

    /// Submission time formatted for display
    pub fn formatted_time(&self) -> String {
        chrono::DateTime::from_timestamp(self.submitted_at, 0)
            .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| self.submitted_at.to_string())
    }
}

/// Result of appending a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// An identical row was already present
    AlreadyPresent,
}

/// A refused status update, as reported to the analyzer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRejection {
    pub batch_id: String,
    pub from: BatchStatus,
    pub to: BatchStatus,
}

impl LedgerRejection {
    /// Extract the rejection carried by a ledger error, if any
    pub fn from_error(error: &LedgerError) -> Option<Self> {
        match error {
            LedgerError::TransitionRejected { batch_id, from, to } => Some(Self {
                batch_id: batch_id.clone(),
                from: from.clone(),
                to: to.clone(),
            }),
            _ => None,
        }
    }
}

/// Per-row result of a job-wide status update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpdate {
    pub batch_id: String,
    pub outcome: Result<Transition, Rejection>,
}

impl RowUpdate {
    pub fn rejection(&self) -> Option<LedgerRejection> {
        self.outcome.as_ref().err().map(|r| LedgerRejection {
            batch_id: self.batch_id.clone(),
            from: r.from.clone(),
            to: r.to.clone(),
        })
    }
}

/// Aggregate view of the ledger
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_language: BTreeMap<String, usize>,

    /// Most recently submitted rows, newest first
    pub recent: Vec<BatchJobRecord>,
}

/// Persistent table of batch rows
#[derive(Debug)]
pub struct BatchLedger {
    path: PathBuf,
    guard: Mutex<()>,
    log: JobLog,
}

impl BatchLedger {
    /// Open the ledger at `path`, creating it when missing
    ///
    /// A ledger that cannot be decoded is moved aside to `<ledger>.corrupt-<unix>`
    /// and replaced by an empty one.
    pub fn open(path: impl Into<PathBuf>, log: JobLog) -> Result<Self, LedgerError> {
        let ledger = Self {
            path: path.into(),
            guard: Mutex::new(()),
            log,
        };

        fs::create_dir_all(ledger.directory())?;

        let is_empty = match fs::metadata(&ledger.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        if is_empty {
            ledger.write_all(&[])?;
            ledger.log.debug(format!("Initialized ledger at {}", ledger.path.display()));
            return Ok(ledger);
        }

        match ledger.read_all() {
            Ok(_) => {}
            Err(LedgerError::Corrupt(reason)) => ledger.quarantine(&reason)?,
            Err(LedgerError::Csv(e)) => ledger.quarantine(&e.to_string())?,
            Err(other) => return Err(other),
        }

        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn quarantine(&self, reason: &str) -> Result<(), LedgerError> {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".corrupt-{}", chrono::Utc::now().timestamp()));
        let moved = self.path.with_file_name(name);

        fs::rename(&self.path, &moved)?;
        self.log.warn(format!(
            "Ledger {} is corrupt ({}); moved to {} and started a new ledger",
            self.path.display(),
            reason,
            moved.display()
        ));
        self.write_all(&[])
    }

    fn read_all(&self) -> Result<Vec<BatchJobRecord>, LedgerError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        if headers.iter().ne(LEDGER_HEADER.iter().copied()) {
            return Err(LedgerError::Corrupt(format!(
                "unexpected header: {}",
                headers.iter().collect::<Vec<_>>().join(",")
            )));
        }

        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }
        Ok(records)
    }

    fn write_all(&self, records: &[BatchJobRecord]) -> Result<(), LedgerError> {
        let mut tmp = NamedTempFile::new_in(self.directory())?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file_mut());
            writer.write_record(LEDGER_HEADER)?;
            for record in records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&self.path).map_err(|e| LedgerError::Io(e.error))?;
        Ok(())
    }

    /// Run one read-modify-write cycle under both locks
    ///
    /// The closure returns its result and whether the table changed.
    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut Vec<BatchJobRecord>) -> Result<(T, bool), LedgerError>,
    ) -> Result<T, LedgerError> {
        let _local = self.guard.lock();

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.lock_path())?;
        let mut file_lock = RwLock::new(lock_file);
        let _held = file_lock.write().map_err(|e| LedgerError::Lock(e.to_string()))?;

        let mut records = self.read_all()?;
        let (result, changed) = apply(&mut records)?;
        if changed {
            self.write_all(&records)?;
        }
        Ok(result)
    }

    /// Append a new row; an identical row is a no-op, a conflicting one an error
    pub fn append(&self, record: BatchJobRecord) -> Result<AppendOutcome, LedgerError> {
        self.mutate(|records| match records.iter().find(|r| r.batch_id == record.batch_id) {
            Some(existing) if *existing == record => Ok((AppendOutcome::AlreadyPresent, false)),
            Some(_) => Err(LedgerError::DuplicateBatchId(record.batch_id.clone())),
            None => {
                records.push(record);
                Ok((AppendOutcome::Appended, true))
            }
        })
    }

    /// Apply a validated status transition to one row
    pub fn update_status(&self, batch_id: &str, status: BatchStatus) -> Result<Transition, LedgerError> {
        let result = self.mutate(|records| {
            let record = records
                .iter_mut()
                .find(|r| r.batch_id == batch_id)
                .ok_or_else(|| LedgerError::UnknownBatch(batch_id.to_string()))?;

            match record.status.transition(&status) {
                Ok(Transition::Unchanged) => Ok((Transition::Unchanged, false)),
                Ok(applied) => {
                    record.status = status.clone();
                    Ok((applied, true))
                }
                Err(rejection) => Err(LedgerError::TransitionRejected {
                    batch_id: batch_id.to_string(),
                    from: rejection.from,
                    to: rejection.to,
                }),
            }
        });

        if let Err(error) = &result {
            if matches!(error, LedgerError::TransitionRejected { .. }) {
                self.log.warn(error.to_string());
            }
        }
        result
    }

    /// Apply one validated transition to every row of a job
    pub fn update_job_status(&self, job_id: &str, status: BatchStatus) -> Result<Vec<RowUpdate>, LedgerError> {
        let updates = self.mutate(|records| {
            let mut updates = Vec::new();
            let mut changed = false;

            for record in records.iter_mut().filter(|r| r.job_id == job_id) {
                let outcome = record.status.transition(&status);
                if let Ok(Transition::Applied { .. }) = outcome {
                    record.status = status.clone();
                    changed = true;
                }
                updates.push(RowUpdate {
                    batch_id: record.batch_id.clone(),
                    outcome,
                });
            }

            Ok((updates, changed))
        })?;

        for update in &updates {
            if let Err(rejection) = &update.outcome {
                self.log.warn(format!(
                    "Rejected status transition for {}: {}",
                    update.batch_id, rejection
                ));
            }
        }
        Ok(updates)
    }

    /// All rows in insertion order
    pub fn records(&self) -> Result<Vec<BatchJobRecord>, LedgerError> {
        self.read_all()
    }

    pub fn get(&self, batch_id: &str) -> Result<Option<BatchJobRecord>, LedgerError> {
        Ok(self.read_all()?.into_iter().find(|r| r.batch_id == batch_id))
    }

    /// Rows belonging to one service job
    pub fn find_by_job(&self, job_id: &str) -> Result<Vec<BatchJobRecord>, LedgerError> {
        Ok(self.read_all()?.into_iter().filter(|r| r.job_id == job_id).collect())
    }

    /// Rows, optionally restricted to one status
    pub fn list(&self, status: Option<&BatchStatus>) -> Result<Vec<BatchJobRecord>, LedgerError> {
        let records = self.read_all()?;
        Ok(match status {
            Some(wanted) => records.into_iter().filter(|r| &r.status == wanted).collect(),
            None => records,
        })
    }

    /// Counts per status and target language plus the most recent rows
    pub fn summary(&self) -> Result<LedgerSummary, LedgerError> {
        let records = self.read_all()?;
        let mut summary = LedgerSummary {
            total: records.len(),
            ..Default::default()
        };

        for record in &records {
            *summary.by_status.entry(record.status.to_string()).or_insert(0) += 1;
            *summary
                .by_language
                .entry(record.target_language.clone())
                .or_insert(0) += 1;
        }

        let mut recent: Vec<BatchJobRecord> = records.into_iter().rev().collect();
        recent.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        recent.truncate(RECENT_ROWS);
        summary.recent = recent;

        Ok(summary)
    }
}
