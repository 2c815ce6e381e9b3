// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};

use batchlate::app_config::{self, Config};
use batchlate::app_controller::{Controller, JobOutcome};
use batchlate::ledger::{BatchJobRecord, BatchLedger, BatchStatus};
use batchlate::logging::JobLog;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate one CSV file through the batch service
    Translate {
        /// Input CSV with description_id,english_sentence columns
        #[arg(value_name = "INPUT_CSV")]
        input: PathBuf,

        /// Target language code or name (e.g. 'hi', 'de', 'Brazilian Portuguese')
        #[arg(short, long)]
        target_language: Option<String>,

        /// Output CSV path (default: <input>.<lang>.csv next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Translate every CSV file in a directory
    TranslateFolder {
        /// Directory searched recursively for CSV files
        #[arg(value_name = "INPUT_DIR")]
        input_dir: PathBuf,

        /// Target language code or name
        #[arg(short, long)]
        target_language: Option<String>,

        /// Output directory (default: the input directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Force overwrite of existing output files
        #[arg(short, long)]
        force_overwrite: bool,
    },

    /// Rebuild the output CSV from an already downloaded response file
    Process {
        /// Input CSV the job was created from
        #[arg(value_name = "INPUT_CSV")]
        input: PathBuf,

        /// Batch response JSONL downloaded from the service
        #[arg(value_name = "OUTPUT_JSONL")]
        responses: PathBuf,

        /// Final translated CSV to write
        #[arg(value_name = "FINAL_CSV")]
        output: PathBuf,

        /// Target language code or name
        #[arg(short, long)]
        target_language: Option<String>,
    },

    /// Inspect the batch ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },

    /// Generate shell completions for batchlate
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum LedgerCommands {
    /// List every recorded batch
    List,

    /// List batches with a given status
    Status {
        /// Status such as submitted, in_progress, completed, failed, download_failed
        status: String,
    },

    /// Show the batches of one service job
    Details {
        /// Service job id
        job_id: String,
    },

    /// Show counts per status and language
    Summary,
}

/// batchlate - Batch translation with verified id reconciliation
///
/// Translates CSV files of short technical sentences through an asynchronous
/// batch translation service and rebuilds a verified one-to-one translation table.
#[derive(Parser, Debug)]
#[command(name = "batchlate")]
#[command(version)]
#[command(about = "Batch translation with verified id reconciliation")]
#[command(long_about = "batchlate submits CSV files of short sentences to a batch translation service, \
tracks every batch in a ledger and rebuilds a verified translation table from the responses.

EXAMPLES:
    batchlate translate codes.csv -t hi                 # Translate into Hindi
    batchlate translate codes.csv -t de -o out/de.csv   # Explicit output path
    batchlate translate-folder ./csv -t es -o ./out     # Translate a whole directory
    batchlate process codes.csv output.jsonl final.csv  # Rebuild from a downloaded response file
    batchlate ledger summary                            # Show ledger statistics
    batchlate completions bash > batchlate.bash         # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the config file doesn't
    exist, a default one will be created automatically. The API key is read from
    the environment variable named in the config (OPENAI_API_KEY by default) and
    may be placed in a .env file.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "conf.json", env = "BATCHLATE_CONFIG")]
    config: PathBuf,

    /// Set logging level
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger with the most verbose level; the effective level is set below
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "batchlate", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = Config::load_or_create(&cli.config)?;
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone().into();
    }
    log::set_max_level(config.log_level.to_level_filter());

    match cli.command {
        Commands::Translate {
            input,
            target_language,
            output,
        } => {
            apply_target_language(&mut config, target_language)?;
            let controller = Controller::with_config(config)?.with_progress(true);
            let output = output.unwrap_or_else(|| {
                controller.output_path_for(&input, input.parent().unwrap_or(Path::new(".")))
            });
            let outcome = controller.translate_file(&input, &output).await?;
            print_outcome(&outcome);
        }
        Commands::TranslateFolder {
            input_dir,
            target_language,
            output_dir,
            force_overwrite,
        } => {
            apply_target_language(&mut config, target_language)?;
            let controller = Controller::with_config(config)?.with_progress(true);
            let output_dir = output_dir.unwrap_or_else(|| input_dir.clone());
            let summary = controller
                .translate_folder(&input_dir, &output_dir, force_overwrite)
                .await?;
            if summary.failed > 0 {
                warn!("{} file(s) failed", summary.failed);
            }
        }
        Commands::Process {
            input,
            responses,
            output,
            target_language,
        } => {
            apply_target_language(&mut config, target_language)?;
            let controller = Controller::offline(config)?;
            let outcome = controller.process_output(&input, &responses, &output).await?;
            print_outcome(&outcome);
        }
        Commands::Ledger { command } => {
            config.validate().context("Configuration validation failed")?;
            let ledger = BatchLedger::open(&config.ledger.path, JobLog::new(true))
                .with_context(|| format!("Failed to open ledger: {}", config.ledger.path))?;
            run_ledger_command(&ledger, command)?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn apply_target_language(config: &mut Config, target_language: Option<String>) -> Result<()> {
    if let Some(target_language) = target_language {
        config.target_language = target_language;
    }
    config.validate().context("Configuration validation failed")
}

fn print_outcome(outcome: &JobOutcome) {
    let report = &outcome.report;
    info!(
        "Success: {:?} ({}/{} batches, {:.1}%)",
        outcome.output_path, report.successful_batches, report.total_batches, report.success_rate_percentage
    );
    for (category, count) in &report.counts {
        warn!("{}: {}", category, count);
    }
    info!("Report: {:?}", outcome.report_path);
    info!("Log: {:?}", outcome.log_path);
}

fn print_records(records: &[BatchJobRecord]) {
    if records.is_empty() {
        println!("No batches recorded");
        return;
    }
    println!(
        "{:<40} {:<16} {:<10} {:<20} {}",
        "BATCH", "STATUS", "LANGUAGE", "SUBMITTED", "INPUT"
    );
    for record in records {
        println!(
            "{:<40} {:<16} {:<10} {:<20} {}",
            record.batch_id,
            record.status.to_string(),
            record.target_language,
            record.formatted_time(),
            record.input_file
        );
    }
}

fn run_ledger_command(ledger: &BatchLedger, command: LedgerCommands) -> Result<()> {
    match command {
        LedgerCommands::List => print_records(&ledger.list(None)?),
        LedgerCommands::Status { status } => {
            let status = BatchStatus::parse_raw(&status);
            print_records(&ledger.list(Some(&status))?);
        }
        LedgerCommands::Details { job_id } => {
            let records = ledger.find_by_job(&job_id)?;
            if records.is_empty() {
                return Err(anyhow!("No batches recorded for job {}", job_id));
            }
            print_records(&records);
        }
        LedgerCommands::Summary => {
            let summary = ledger.summary()?;
            println!("Total batches: {}", summary.total);
            println!("\nBy status:");
            for (status, count) in &summary.by_status {
                println!("  {:<16} {}", status, count);
            }
            println!("\nBy language:");
            for (language, count) in &summary.by_language {
                println!("  {:<16} {}", language, count);
            }
            println!("\nRecent:");
            print_records(&summary.recent);
        }
    }
    Ok(())
}
