use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use tokio::sync::Semaphore;

use crate::app_config::Config;
use crate::errors::BatchError;
use crate::file_utils::{FileManager, MISSING_TRANSLATION_MARKER, OutputRow};
use crate::language_utils;
use crate::ledger::{BatchJobRecord, BatchLedger, BatchStatus, LedgerRejection};
use crate::logging::JobLog;
use crate::providers::openai::{CHAT_COMPLETIONS_URL, OpenAIBatchClient};
use crate::providers::{BatchService, RemoteBatch};
use crate::translation::{
    BatchPlan, ErrorAnalyzer, IdReconciler, JobPoller, JobReport, ParsedBatch, PollConfig, RequestBatcher,
    RequestTemplate, ResponseParser, TokenBudget, TokenCounter, read_responses,
};

// @module: Application controller for batch translation jobs

/// Files produced by one finished job
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Service job id; `None` when nothing was submitted
    pub job_id: Option<String>,
    pub output_path: PathBuf,
    pub report_path: PathBuf,
    pub log_path: PathBuf,
    pub report: JobReport,
}

/// Totals of a folder run
#[derive(Debug, Default)]
pub struct FolderSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<JobOutcome>,
}

/// Main application controller for batch translation
pub struct Controller {
    // @field: App configuration
    config: Config,

    // @field: Batch service client; `None` for offline reprocessing
    service: Option<Arc<dyn BatchService>>,

    // @field: Shared batch ledger
    ledger: Arc<BatchLedger>,

    // @field: Console progress display
    show_progress: bool,
}

impl Controller {
    // @method: Create a controller talking to the configured service
    pub fn with_config(config: Config) -> Result<Self> {
        let api_key = config.api_key()?;
        let service = OpenAIBatchClient::new(
            api_key,
            &config.service.endpoint,
            &config.service.completion_window,
            config.service.timeout_secs,
        );
        Self::with_service(config, Arc::new(service))
    }

    // @method: Create a controller over any batch service
    pub fn with_service(config: Config, service: Arc<dyn BatchService>) -> Result<Self> {
        let mut controller = Self::offline(config)?;
        controller.service = Some(service);
        Ok(controller)
    }

    // @method: Create a controller that only reprocesses downloaded responses
    pub fn offline(config: Config) -> Result<Self> {
        let ledger = BatchLedger::open(&config.ledger.path, JobLog::new(true))
            .with_context(|| format!("Failed to open ledger: {}", config.ledger.path))?;

        Ok(Self {
            config,
            service: None,
            ledger: Arc::new(ledger),
            show_progress: false,
        })
    }

    /// Show spinners and progress bars on the console
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &BatchLedger {
        &self.ledger
    }

    fn service(&self) -> Result<&dyn BatchService> {
        self.service
            .as_deref()
            .ok_or_else(|| anyhow!("No batch service configured"))
    }

    fn batcher(&self) -> RequestBatcher {
        let batching = &self.config.batching;
        let batcher = RequestBatcher::new(batching.max_batch_size);
        if batching.max_request_tokens == 0 {
            return batcher;
        }

        let budget = TokenBudget::new(
            batching.max_request_tokens,
            batching.expected_output_factor,
            TokenCounter::for_model(&self.config.service.model),
        )
        .with_system_prompt(&self.config.system_prompt());
        batcher.with_token_budget(budget)
    }

    fn request_template(&self) -> RequestTemplate {
        RequestTemplate {
            model: self.config.service.model.clone(),
            system_prompt: self.config.system_prompt(),
            temperature: self.config.service.temperature,
            max_tokens: self.config.service.max_tokens,
            url: CHAT_COMPLETIONS_URL.to_string(),
        }
    }

    fn plan(&self, input_file: &Path, log: &JobLog) -> Result<BatchPlan> {
        let records = FileManager::read_source_csv(input_file, log)?;
        let plan = self.batcher().prepare(records);

        for rejected in &plan.rejected {
            log.warn(format!(
                "Record at position {} (id {:?}) rejected: {}",
                rejected.position, rejected.record.id, rejected.reason
            ));
        }
        log.info(format!(
            "Prepared {} batch(es) for {} record(s)",
            plan.batches.len(),
            plan.accepted_count()
        ));
        Ok(plan)
    }

    /// Translate one source CSV end to end
    ///
    /// The job always ends with an output CSV, a report and a log. Failures after
    /// submission degrade into missing translations rather than aborting.
    pub async fn translate_file(&self, input_file: &Path, output_file: &Path) -> Result<JobOutcome> {
        let start_time = Instant::now();

        if !FileManager::file_exists(input_file) {
            return Err(anyhow!("Input file does not exist: {:?}", input_file));
        }

        let service = self.service()?;
        let log = JobLog::new(true);
        log.info(format!("Translating {:?} into {}", input_file, self.config.target_language));

        let plan = self.plan(input_file, &log)?;
        if plan.batches.is_empty() {
            log.warn("Nothing to submit");
            return self.finish_job(None, &plan, "", Vec::new(), output_file, &log).await;
        }

        let requests = self.batcher().render_requests(&plan.batches, &self.request_template())?;
        let requests_path = FileManager::sibling_path(output_file, ".requests.jsonl");
        FileManager::write_to_file(&requests_path, &requests)?;

        let remote = match self.submit(service, &requests_path, &plan, input_file, output_file, &log).await {
            Ok(remote) => remote,
            Err(e) => {
                log.error(format!("Submission failed: {:#}", e));
                self.flush_log(&log, output_file);
                return Err(e);
            }
        };

        let poller = JobPoller::new(
            service,
            &self.ledger,
            log.clone(),
            PollConfig::from(&self.config.polling),
        )
        .with_progress(self.show_progress);

        let (content, rejections) = match poller.wait(&remote.id).await {
            Ok(result) => {
                let mut rejections = result.rejections;
                let content = self
                    .fetch_output(service, &result.remote, &result.status, &mut rejections, &log).await;
                (content, rejections)
            }
            Err(failure) => {
                log.error(format!("Job {} did not finish: {}", remote.id, failure));
                (String::new(), failure.rejections)
            }
        };

        let responses_path = FileManager::sibling_path(output_file, ".responses.jsonl");
        if !content.is_empty() {
            FileManager::write_to_file(&responses_path, &content)?;
        }

        let outcome = self
            .finish_job(Some(remote.id.clone()), &plan, &content, rejections, output_file, &log)
            .await?;

        info!(
            "Job {} finished in {:.1}s with {:.1}% successful batches",
            remote.id,
            start_time.elapsed().as_secs_f64(),
            outcome.report.success_rate_percentage
        );
        Ok(outcome)
    }

    /// Upload the requests, create the job and record every batch in the ledger
    async fn submit(
        &self,
        service: &dyn BatchService,
        requests_path: &Path,
        plan: &BatchPlan,
        input_file: &Path,
        output_file: &Path,
        log: &JobLog,
    ) -> Result<RemoteBatch> {
        let file_id = service
            .upload_batch_file(requests_path)
            .await
            .context("Failed to upload batch request file")?;
        let remote = service
            .create_batch(&file_id)
            .await
            .context("Failed to create batch job")?;
        log.info(format!("Submitted job {} with {} batch(es)", remote.id, plan.batches.len()));

        for batch in &plan.batches {
            let record = BatchJobRecord::submitted(
                BatchJobRecord::ledger_key(&remote.id, &batch.batch_id),
                input_file.to_string_lossy(),
                &remote.id,
                &self.config.target_language,
                output_file.to_string_lossy(),
            );
            self.ledger.append(record)?;
        }

        Ok(remote)
    }

    /// Download the job's output and error files; failures are logged and yield no content
    async fn fetch_output(
        &self,
        service: &dyn BatchService,
        remote: &RemoteBatch,
        status: &BatchStatus,
        rejections: &mut Vec<LedgerRejection>,
        log: &JobLog,
    ) -> String {
        if *status != BatchStatus::Completed {
            log.error(
                BatchError::JobFailed {
                    job_id: remote.id.clone(),
                    status: remote.status.clone(),
                }
                .to_string(),
            );
        }

        let mut content = String::new();
        match &remote.output_file_id {
            Some(file_id) => match service.download_file(file_id).await {
                Ok(output) => content.push_str(&output),
                Err(e) => {
                    log.error(format!("Failed to download output of job {}: {}", remote.id, e));
                    match self.ledger.update_job_status(&remote.id, BatchStatus::DownloadFailed) {
                        Ok(updates) => rejections.extend(updates.iter().filter_map(|u| u.rejection())),
                        Err(e) => log.error(format!("Failed to record download failure: {}", e)),
                    }
                }
            },
            None if *status == BatchStatus::Completed => {
                log.error(BatchError::MissingOutputFile(remote.id.clone()).to_string());
            }
            None => {}
        }

        if let Some(error_file_id) = &remote.error_file_id {
            match service.download_file(error_file_id).await {
                Ok(errors) => {
                    if !content.is_empty() && !content.ends_with('\n') {
                        content.push('\n');
                    }
                    content.push_str(&errors);
                }
                Err(e) => log.warn(format!("Failed to download error file of job {}: {}", remote.id, e)),
            }
        }

        content
    }

    /// Rebuild the output of an already downloaded response file
    pub async fn process_output(&self, input_file: &Path, responses_file: &Path, output_file: &Path) -> Result<JobOutcome> {
        let log = JobLog::new(true);
        log.info(format!("Processing {:?} against {:?}", responses_file, input_file));

        let plan = self.plan(input_file, &log)?;
        let content = FileManager::read_to_string(responses_file)?;
        self.finish_job(None, &plan, &content, Vec::new(), output_file, &log).await
    }

    /// Parse, reconcile and analyze the responses, then write the output files
    async fn finish_job(
        &self,
        job_id: Option<String>,
        plan: &BatchPlan,
        content: &str,
        ledger_rejections: Vec<LedgerRejection>,
        output_file: &Path,
        log: &JobLog,
    ) -> Result<JobOutcome> {
        let parsed = self.parse_responses(plan, content, log).await;
        let reconciliation = IdReconciler::reconcile(&plan.batches, &parsed);

        for rejection in &ledger_rejections {
            log.warn(format!(
                "Ledger kept {} at {} instead of {}",
                rejection.batch_id, rejection.from, rejection.to
            ));
        }

        let report = ErrorAnalyzer::analyze(&plan.batches, &parsed, &reconciliation, &ledger_rejections)
            .with_rejected_records(plan.rejected.clone());
        for item in &report.errors {
            log.debug(format!(
                "{} [{}{}] {}",
                item.category,
                item.batch_id.as_deref().unwrap_or("-"),
                item.record_id.as_deref().map(|id| format!(" id {}", id)).unwrap_or_default(),
                item.message
            ));
        }

        let rows: Vec<OutputRow<'_>> = plan
            .accepted_records()
            .map(|record| OutputRow {
                description_id: &record.id,
                english_sentence: &record.text,
                translated_sentence: reconciliation.translation(&record.id).unwrap_or(MISSING_TRANSLATION_MARKER),
            })
            .collect();
        FileManager::write_translations_csv(output_file, &rows)?;

        let report_path = FileManager::sibling_path(output_file, ".report.json");
        let report_json = serde_json::to_string_pretty(&report).context("Failed to serialize job report")?;
        FileManager::write_to_file(&report_path, &report_json)?;

        log.info(format!(
            "{}/{} batches successful ({:.1}%), {} missing, {} orphan, {} suspicious",
            report.successful_batches,
            report.total_batches,
            report.success_rate_percentage,
            reconciliation.missing.len(),
            reconciliation.orphans.len() + reconciliation.conflicts.len(),
            reconciliation.suspicious.len()
        ));
        log.info(format!("Wrote {} row(s) to {:?}", rows.len(), output_file));

        let log_path = FileManager::sibling_path(output_file, ".log");
        log.write_to_file(&log_path, &format!("Job {}", job_id.as_deref().unwrap_or("local")))?;

        Ok(JobOutcome {
            job_id,
            output_path: output_file.to_path_buf(),
            report_path,
            log_path,
            report,
        })
    }

    /// Parse responses concurrently and return them in submission order
    async fn parse_responses(&self, plan: &BatchPlan, content: &str, log: &JobLog) -> Vec<ParsedBatch> {
        let responses = read_responses(content, log);
        let parser = ResponseParser::new();
        let concurrency = self.config.batching.parse_concurrency.max(1);

        let mut parsed: Vec<(usize, usize, ParsedBatch)> = stream::iter(responses.into_iter().enumerate())
            .map(|(idx, response)| async move {
                let position = plan
                    .batches
                    .iter()
                    .position(|b| b.batch_id == response.batch_id);
                let batch = position.map(|p| &plan.batches[p]);
                (position.unwrap_or(usize::MAX), idx, parser.parse(&response, batch))
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        parsed.sort_by_key(|(position, idx, _)| (*position, *idx));
        for (position, _, batch) in &parsed {
            if *position == usize::MAX {
                log.warn(format!("Response for unknown batch {}", batch.batch_id));
            }
        }
        parsed.into_iter().map(|(_, _, batch)| batch).collect()
    }

    fn flush_log(&self, log: &JobLog, output_file: &Path) {
        let log_path = FileManager::sibling_path(output_file, ".log");
        if let Err(e) = log.write_to_file(&log_path, "Job") {
            warn!("Failed to write job log to {:?}: {}", log_path, e);
        }
    }

    /// Output path for `input_file` inside `output_dir`
    pub fn output_path_for(&self, input_file: &Path, output_dir: &Path) -> PathBuf {
        let tag = language_utils::language_tag(&self.config.target_language);
        FileManager::generate_output_path(input_file, output_dir, &tag, "csv")
    }

    /// Translate every CSV in a folder, a bounded number at a time
    /// Files whose output already exists are skipped unless `force_overwrite` is set
    pub async fn translate_folder(&self, input_dir: &Path, output_dir: &Path, force_overwrite: bool) -> Result<FolderSummary> {
        let start_time = Instant::now();

        if !FileManager::dir_exists(input_dir) {
            return Err(anyhow!("Input directory does not exist: {:?}", input_dir));
        }
        FileManager::ensure_dir(output_dir)?;

        let tag = language_utils::language_tag(&self.config.target_language);
        let output_suffix = format!(".{}", tag);
        let input_files: Vec<PathBuf> = FileManager::find_files(input_dir, "csv")?
            .into_iter()
            .filter(|path| {
                let stem = path.file_stem().unwrap_or_default().to_string_lossy();
                !stem.ends_with(&output_suffix)
            })
            .collect();

        if input_files.is_empty() {
            return Err(anyhow!("No CSV files found in directory: {:?}", input_dir));
        }

        let folder_pb = if self.show_progress {
            let pb = ProgressBar::new(input_files.len() as u64);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb.set_message("Processing files");
            pb
        } else {
            ProgressBar::hidden()
        };

        let semaphore = Semaphore::new(self.config.max_concurrent_files.max(1));
        let mut summary = FolderSummary::default();

        let results = futures::future::join_all(input_files.iter().map(|input_file| {
            let semaphore = &semaphore;
            let folder_pb = &folder_pb;
            async move {
                let output_file = self.output_path_for(input_file, output_dir);
                if output_file.exists() && !force_overwrite {
                    warn!("Skipping {:?}, translation already exists (use -f to force overwrite)", input_file);
                    folder_pb.inc(1);
                    return (input_file, None);
                }

                let result = match semaphore.acquire().await {
                    Ok(_permit) => self.translate_file(input_file, &output_file).await,
                    Err(e) => Err(anyhow!("Folder processing stopped: {}", e)),
                };
                folder_pb.inc(1);
                (input_file, Some(result))
            }
        }))
        .await;

        for (input_file, result) in results {
            match result {
                None => summary.skipped += 1,
                Some(Ok(outcome)) => {
                    summary.processed += 1;
                    summary.outcomes.push(outcome);
                }
                Some(Err(e)) => {
                    error!("Error processing file {:?}: {:#}", input_file, e);
                    summary.failed += 1;
                }
            }
        }

        folder_pb.finish_with_message("Folder processing complete");

        let folder_log = JobLog::new(false);
        let summary_message = format!(
            "Folder processing completed: {} processed, {} skipped, {} errors in {:.1}s",
            summary.processed,
            summary.skipped,
            summary.failed,
            start_time.elapsed().as_secs_f64()
        );
        info!("{}", summary_message);
        folder_log.info(summary_message);
        for outcome in &summary.outcomes {
            folder_log.info(format!(
                "{:?}: {:.1}% successful batches",
                outcome.output_path, outcome.report.success_rate_percentage
            ));
        }

        let log_file_path = output_dir.join("batchlate.folder.log");
        let context = format!("Folder Processing: {}", input_dir.display());
        if let Err(e) = folder_log.write_to_file(&log_file_path, &context) {
            warn!("Failed to write folder logs to file: {}", e);
        }

        Ok(summary)
    }
}
