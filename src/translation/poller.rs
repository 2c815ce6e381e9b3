/*!
 * Job status polling.
 *
 * Polls the service until a job reaches a terminal status, applying every
 * observed status to the job's ledger rows as a validated transition. Transient
 * service errors back off geometrically; too many in a row, or too many polls
 * overall, end the wait with an error while the ledger stays consistent.
 */

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::app_config::PollingConfig;
use crate::errors::BatchError;
use crate::ledger::{BatchLedger, BatchStatus, LedgerRejection};
use crate::logging::JobLog;
use crate::providers::{BatchService, RemoteBatch};

/// Service statuses that end a job without passing through the lifecycle
const FINAL_SERVICE_STATUSES: &[&str] = &["expired", "cancelled"];

/// Timing and retry limits for polling
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_interval: Duration,
    pub backoff_multiplier: f64,
    pub max_polls: usize,
    pub max_consecutive_errors: usize,
}

impl From<&PollingConfig> for PollConfig {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            max_interval: Duration::from_secs(config.max_interval_secs.max(config.interval_secs)),
            backoff_multiplier: config.backoff_multiplier.max(1.0),
            max_polls: config.max_polls.max(1),
            max_consecutive_errors: config.max_consecutive_errors.max(1),
        }
    }
}

/// Final state of a successful wait
#[derive(Debug, Clone)]
pub struct PollResult {
    pub remote: RemoteBatch,
    pub status: BatchStatus,
    pub polls: usize,

    /// Ledger updates refused along the way
    pub rejections: Vec<LedgerRejection>,
}

/// A wait that ended without a final status, with the refusals seen before it
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PollFailure {
    #[source]
    pub error: BatchError,
    pub rejections: Vec<LedgerRejection>,
}

/// Waits for a service job to finish
pub struct JobPoller<'a> {
    service: &'a dyn BatchService,
    ledger: &'a BatchLedger,
    log: JobLog,
    config: PollConfig,
    show_progress: bool,
}

impl<'a> JobPoller<'a> {
    pub fn new(service: &'a dyn BatchService, ledger: &'a BatchLedger, log: JobLog, config: PollConfig) -> Self {
        Self {
            service,
            ledger,
            log,
            config,
            show_progress: false,
        }
    }

    /// Show a console spinner while waiting
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn spinner(&self, job_id: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(format!("Waiting for job {}", job_id));
        bar
    }

    /// Whether a raw status ends the job
    pub fn is_final(status: &BatchStatus, raw: &str) -> bool {
        status.is_terminal() || FINAL_SERVICE_STATUSES.contains(&raw.trim().to_lowercase().as_str())
    }

    /// Poll `job_id` until it is final
    pub async fn wait(&self, job_id: &str) -> Result<PollResult, PollFailure> {
        let mut rejections = Vec::new();
        match self.poll_until_final(job_id, &mut rejections).await {
            Ok((remote, status, polls)) => Ok(PollResult {
                remote,
                status,
                polls,
                rejections,
            }),
            Err(error) => Err(PollFailure { error, rejections }),
        }
    }

    async fn poll_until_final(
        &self,
        job_id: &str,
        rejections: &mut Vec<LedgerRejection>,
    ) -> Result<(RemoteBatch, BatchStatus, usize), BatchError> {
        let spinner = self.spinner(job_id);
        let mut delay = self.config.interval;
        let mut consecutive_errors = 0;
        let mut last_status = BatchStatus::Submitted.to_string();

        for poll in 1..=self.config.max_polls {
            match self.service.retrieve_batch(job_id).await {
                Ok(remote) => {
                    consecutive_errors = 0;
                    delay = self.config.interval;

                    let status = BatchStatus::parse_raw(&remote.status);
                    let updates = self.ledger.update_job_status(job_id, status.clone())?;
                    rejections.extend(updates.iter().filter_map(|u| u.rejection()));

                    last_status = remote.status.clone();
                    spinner.set_message(format!("Job {}: {} (poll {})", job_id, remote.status, poll));
                    self.log.debug(format!("Job {} status {} on poll {}", job_id, remote.status, poll));

                    if Self::is_final(&status, &remote.status) {
                        spinner.finish_and_clear();
                        self.log.info(format!("Job {} finished with status {}", job_id, remote.status));
                        return Ok((remote, status, poll));
                    }
                }
                Err(e) if e.is_transient() => {
                    consecutive_errors += 1;
                    self.log.warn(format!(
                        "Transient error polling job {} ({}/{}): {}",
                        job_id, consecutive_errors, self.config.max_consecutive_errors, e
                    ));
                    if consecutive_errors >= self.config.max_consecutive_errors {
                        spinner.finish_and_clear();
                        return Err(e.into());
                    }
                    delay = delay.mul_f64(self.config.backoff_multiplier).min(self.config.max_interval);
                }
                Err(e) => {
                    spinner.finish_and_clear();
                    self.log.error(format!("Polling job {} failed: {}", job_id, e));
                    return Err(e.into());
                }
            }

            if poll < self.config.max_polls {
                tokio::time::sleep(delay).await;
            }
        }

        spinner.finish_and_clear();
        self.log.error(format!(
            "Job {} still {} after {} polls",
            job_id, last_status, self.config.max_polls
        ));
        Err(BatchError::PollTimeout {
            job_id: job_id.to_string(),
            last_status,
            polls: self.config.max_polls,
        })
    }
}
