// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use storyguard::access::{Actor, Role};
use storyguard::app_config::{self, Config};
use storyguard::moderation::ReviewAction;
use storyguard::rules::RuleDefinition;
use storyguard::Controller;

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

/// CLI Wrapper for ReviewAction to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliReviewAction {
    Approve,
    Reject,
    Flag,
}

impl From<CliReviewAction> for ReviewAction {
    fn from(action: CliReviewAction) -> Self {
        match action {
            CliReviewAction::Approve => ReviewAction::Approve,
            CliReviewAction::Reject => ReviewAction::Reject,
            CliReviewAction::Flag => ReviewAction::Flag,
        }
    }
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// List every rule, active or not
    List,
    /// Create or update rules from a JSON array of definitions
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a text file without recording anything; prints the verdict as JSON
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Run originality checks as for a first chapter
        #[arg(long)]
        first_chapter: bool,

        /// Cover or illustration to check with the image-analysis service
        #[arg(long)]
        image_url: Option<String>,
    },

    /// Run one assessment batch
    ProcessBatch {
        /// Maximum number of jobs to process
        #[arg(short, long)]
        max: Option<usize>,

        /// Scheduler token, for triggers coming from outside this host
        #[arg(long, env = "STORYGUARD_SCHEDULER_TOKEN")]
        token: Option<String>,
    },

    /// Run the assessment scheduler until Ctrl-C
    Worker {
        /// Seconds between ticks, overrides the configuration
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Show the moderation queue in review order
    Queue {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Apply a moderator decision to a queue entry
    Review {
        entry_id: String,

        #[arg(value_enum)]
        action: CliReviewAction,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Manage validation rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },

    /// Print queue, job, rule cache and database counters
    Stats,

    /// Generate shell completions for storyguard
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// storyguard - content validation and moderation
///
/// Validates chapters against administrator-managed rules, works the
/// moderation queue and drains automated quality assessments.
#[derive(Parser, Debug)]
#[command(name = "storyguard")]
#[command(version)]
#[command(about = "Content validation and moderation pipeline")]
#[command(long_about = "storyguard validates chapters against administrator-managed rules, keeps the moderation queue and drains automated quality assessments.

EXAMPLES:
    storyguard validate chapter1.txt --first-chapter   # Dry-run validation, JSON verdict
    storyguard process-batch --max 25                   # Drain up to 25 assessment jobs
    storyguard worker                                   # Run the scheduler until Ctrl-C
    storyguard queue -n 10                              # Next ten entries to review
    storyguard review <ENTRY_ID> approve                # Approve an entry
    storyguard rules import rules.json                  # Create or update rules
    storyguard completions bash > storyguard.bash       # Generate bash completions

CONFIGURATION:
    Configuration is read from storyguard.json by default. You can specify a different
    file with --config-path. Without a file the defaults are used and the
    database lives in the user data directory.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "storyguard.json", global = true)]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
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
            // stdout carries command output, logs go to stderr
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// The local operator runs with full capabilities
fn local_operator() -> Actor {
    Actor::new("cli", Role::Admin)
}

fn load_config(options: &CommandLineOptions) -> Result<Config> {
    let path = Path::new(&options.config_path);
    if !path.exists() {
        warn!("Config file not found at '{}', using defaults", options.config_path);
    }
    let mut config = Config::load_or_default(path)?;

    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
    log::set_max_level(config.log_level.to_level_filter());
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "storyguard", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli)?;
    let controller = Controller::with_config(config)?;
    let operator = local_operator();

    match cli.command {
        Commands::Validate {
            file,
            first_chapter,
            image_url,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let result = controller.dry_run(&text, image_url, first_chapter).await?;
            print_json(&result)?;
        }
        Commands::ProcessBatch { max, token } => {
            let processor = controller.processor();
            let max = max.unwrap_or(processor.settings().batch_size);
            let outcome = match token {
                Some(token) => processor.process_batch_with_token(&token, max).await?,
                None => processor.process_batch(max).await?,
            };
            print_json(&outcome)?;
        }
        Commands::Worker { interval } => {
            let mut scheduler = controller.scheduler();
            if let Some(secs) = interval {
                scheduler = scheduler.with_interval(Duration::from_secs(secs.max(1)));
            }
            let ticks = scheduler
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                    info!("Shutdown requested");
                })
                .await;
            info!("Worker finished after {} ticks", ticks);
        }
        Commands::Queue { limit } => {
            let entries = controller.queue().list_queued(&operator, limit).await?;
            print_json(&entries)?;
        }
        Commands::Review {
            entry_id,
            action,
            notes,
        } => {
            let entry = controller
                .queue()
                .review_item(&operator, &entry_id, action.into(), notes)
                .await?;
            print_json(&entry)?;
        }
        Commands::Rules { command } => match command {
            RulesCommand::List => {
                let rules = controller.rule_admin().list_rules(&operator).await?;
                print_json(&rules)?;
            }
            RulesCommand::Import { file } => {
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let definitions: Vec<RuleDefinition> = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse rule definitions in {}", file.display()))?;
                let summary = controller.rule_admin().import_rules(&operator, definitions).await?;
                print_json(&summary)?;
            }
        },
        Commands::Stats => {
            let stats = controller.stats(&operator).await?;
            println!("{}", stats);
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
