//! Paged-Harvest main entry point
//!
//! This is the command-line interface for the Paged-Harvest listing collector.

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use paged_harvest::checkpoint::{CheckpointStore, JsonFileStore};
use paged_harvest::config::{load_config_with_hash, Config};
use paged_harvest::crawler::{
    build_controller, AnomalyDecision, AnomalyHandler, AnomalyPolicy, CrawlControl,
};
use paged_harvest::{ControllerState, ExecutionMode};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

/// Paged-Harvest: a resumable listing collector
///
/// Paged-Harvest walks a paginated listing, visits every item's detail page
/// and appends one record per item to the configured output. Progress is
/// checkpointed after every item, so an interrupted job picks up where it
/// left off.
#[derive(Parser, Debug)]
#[command(name = "paged-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable listing collector", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted job (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh job, discarding the previous checkpoint
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Show the checkpoint for this configuration and exit
    #[arg(long, conflicts_with_all = ["fresh", "resume"])]
    status: bool,

    /// Never prompt; retry automatically when a page is redirected
    #[arg(short, long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.status {
        handle_status(&config)
    } else {
        handle_harvest(&config, cli.fresh, cli.yes).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("paged_harvest=info,warn"),
            1 => EnvFilter::new("paged_harvest=debug,info"),
            2 => EnvFilter::new("paged_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --status mode: prints the checkpoint summary
fn handle_status(config: &Config) -> anyhow::Result<()> {
    let store = JsonFileStore::new(config.checkpoint_path());
    println!("Checkpoint: {}\n", store.path().display());

    let Some(state) = store.load()? else {
        println!("No job has been started for {}", config.job.target);
        return Ok(());
    };

    println!("Target:          {}", state.target);
    println!("Page cursor:     {}", state.page_cursor);
    println!("Items processed: {}", state.total_processed);
    if let Some(key) = &state.last_processed_key {
        println!("Last item:       {}", key);
    }
    println!("Started:         {}", state.started_at.to_rfc3339());
    println!("Updated:         {}", state.updated_at.to_rfc3339());
    println!(
        "Job parameters:  {} page(s), {}ms delay, {} mode",
        state.job_config.page_limit, state.job_config.delay_ms, state.job_config.mode
    );
    println!(
        "Status:          {}",
        if state.completed { "completed" } else { "resumable" }
    );

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: &Config, fresh: bool, yes: bool) -> anyhow::Result<()> {
    let control = CrawlControl::new();

    // The mode comes from the job being run, which on resume is the stored one
    let prompt_control = control.clone();
    let mut controller = build_controller(config, fresh, |mode| -> Box<dyn AnomalyHandler> {
        if yes || mode == ExecutionMode::Headless {
            Box::new(AnomalyPolicy::Retry)
        } else {
            Box::new(PromptHandler {
                control: prompt_control,
            })
        }
    })?
    .with_control(control.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after the current item");
            control.stop();
        }
    });

    let report = controller.run().await?;
    tracing::info!("{}", report);

    if report.outcome == ControllerState::Stopped {
        println!(
            "Stopped with {} item(s) processed; run again to resume",
            report.total_processed
        );
    }
    Ok(())
}

/// Asks the operator on stdin what to do with a redirected page
///
/// A stop while the question is open aborts the page.
struct PromptHandler {
    control: CrawlControl,
}

#[async_trait]
impl AnomalyHandler for PromptHandler {
    async fn handle(&self, requested: &str, resolved: &str) -> AnomalyDecision {
        let message = format!(
            "Expected {} but landed on {}.\nResolve it (e.g. in a browser), then type 'y' to retry or anything else to abort: ",
            requested, resolved
        );

        // A plain thread, so a read still pending at exit does not hold the runtime open
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let answer = (|| {
                let mut stderr = std::io::stderr();
                write!(stderr, "{}", message)?;
                stderr.flush()?;

                let mut line = String::new();
                std::io::stdin().read_line(&mut line)?;
                Ok::<_, std::io::Error>(line)
            })();
            let _ = tx.send(answer);
        });

        tokio::select! {
            answer = rx => match answer {
                Ok(Ok(line)) if line.trim().eq_ignore_ascii_case("y") => AnomalyDecision::Retry,
                _ => AnomalyDecision::Abort,
            },
            _ = self.control.stopped() => {
                eprintln!();
                AnomalyDecision::Abort
            }
        }
    }
}
