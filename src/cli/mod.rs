//! Command-line interface for empath.
//!
//! Provides commands for running the orchestrator, submitting text or audio
//! jobs, and inspecting the queue and configuration.

use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{load_config, ResolvedConfig, SinkKind};
use crate::core::Orchestrator;
use crate::domain::{JobOutcome, PollOutcome};
use crate::ingest::{transcribe_to_queue, JobQueue};

/// empath - Emotion-aware response pipeline over a directory queue
#[derive(Parser, Debug)]
#[command(name = "empath")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pending directory (overrides config and EMPATH_PENDING_DIR)
    #[arg(long, global = true)]
    pub pending_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the pending directory and process jobs until Ctrl+C
    Run {
        /// Process at most one job (or find none) and exit
        #[arg(long)]
        once: bool,

        /// Wake up on filesystem notifications instead of waiting out the poll interval
        #[arg(long)]
        watch: bool,

        /// Seconds between polls of an empty queue
        #[arg(long)]
        poll_interval_secs: Option<u64>,

        /// Seconds to pause after a failed job
        #[arg(long)]
        error_cooldown_secs: Option<u64>,

        /// Deadline for each collaborator call, in seconds
        #[arg(long)]
        stage_timeout_secs: Option<u64>,

        /// Dead-letter a job after this many consecutive failures (default: retry forever)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Where responses go
        #[arg(long, value_enum)]
        sink: Option<SinkKind>,
    },

    /// Add a text job to the pending directory
    Submit {
        /// Text to submit (reads --input or stdin if not provided)
        text: Option<String>,

        /// Read the text from a file
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Transcribe an audio file with Whisper and queue the transcript
    Transcribe {
        /// Audio file to transcribe
        audio: PathBuf,

        /// Whisper model name
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Show pending, archived and dead-lettered job counts
    Status,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let mut config = load_config()?;
        if let Some(dir) = self.pending_dir {
            config.set_pending_dir(dir);
        }

        match self.command {
            Commands::Run {
                once,
                watch,
                poll_interval_secs,
                error_cooldown_secs,
                stage_timeout_secs,
                max_attempts,
                sink,
            } => {
                let settings = &mut config.orchestrator;
                if let Some(secs) = poll_interval_secs {
                    settings.poll_interval = Duration::from_secs(secs);
                }
                if let Some(secs) = error_cooldown_secs {
                    settings.error_cooldown = Duration::from_secs(secs);
                }
                if let Some(secs) = stage_timeout_secs {
                    settings.stage_timeout = Duration::from_secs(secs);
                }
                if let Some(max) = max_attempts {
                    settings.max_attempts = Some(max).filter(|n| *n > 0);
                }
                if watch {
                    settings.watch = true;
                }
                if let Some(sink) = sink {
                    config.sink = sink;
                }

                run(&config, once).await
            }
            Commands::Submit { text, input } => submit(&config, text, input).await,
            Commands::Transcribe { audio, model } => transcribe(&mut config, audio, model).await,
            Commands::Status => show_status(&config).await,
            Commands::Config => show_config(&config),
        }
    }
}

/// Start the orchestrator
async fn run(config: &ResolvedConfig, once: bool) -> Result<()> {
    println!("--- Starting Pipeline Orchestrator ---");

    let mut orchestrator = Orchestrator::from_config(config).await?;

    // Held for the lifetime of the loop
    let lock = orchestrator
        .queue()
        .lock()
        .context("Another orchestrator is already consuming this queue")?;

    println!(
        "Watching for new files in: {}",
        orchestrator.queue().pending_dir().display()
    );
    println!("Queue lock: {}", lock.path().display());

    if once {
        return match orchestrator.poll_once().await {
            Ok(PollOutcome::Idle) => {
                println!("No pending files");
                Ok(())
            }
            Ok(PollOutcome::Finished { job, outcome }) => {
                println!("Processed {}: {}", job, outcome_label(&outcome));
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("Job failed; it stays pending")),
        };
    }

    let stats = orchestrator
        .run_until(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await;

    println!();
    println!("Stopped after {} polls", stats.polls);
    println!("  Archived:       {}", stats.archived);
    println!("  Empty skipped:  {}", stats.skipped_empty);
    println!("  Failures:       {}", stats.failed);
    if stats.dead_lettered > 0 {
        println!("  Dead-lettered:  {}", stats.dead_lettered);
    }

    Ok(())
}

fn outcome_label(outcome: &JobOutcome) -> &'static str {
    match outcome {
        JobOutcome::Archived(_) => "archived",
        JobOutcome::SkippedEmpty => "empty, archived",
        JobOutcome::DeadLettered { .. } => "dead-lettered",
    }
}

/// Queue a text job
async fn submit(config: &ResolvedConfig, text: Option<String>, input: Option<PathBuf>) -> Result<()> {
    let text = match (text, input) {
        (Some(text), _) => text,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read input file: {}", path.display()))?,
        (None, None) => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read from stdin")?;
            buffer
        }
    };

    let queue = JobQueue::from_config(config).await?;
    let path = queue.enqueue_text(&text).await?;

    println!("Queued {}", path.display());
    Ok(())
}

/// Transcribe audio into a new job
async fn transcribe(config: &mut ResolvedConfig, audio: PathBuf, model: Option<String>) -> Result<()> {
    if let Some(model) = model {
        config.transcriber.model = model;
    }

    let queue = JobQueue::from_config(config).await?;

    println!(
        "Transcribing {} (model: {})...",
        audio.display(),
        config.transcriber.model
    );

    let (transcript, path) = transcribe_to_queue(&audio, &config.transcriber, &queue).await?;

    println!(
        "File transcribed successfully ({:.0}s, {}).",
        transcript.duration_seconds, transcript.language
    );
    println!("Queued {}", path.display());
    Ok(())
}

/// Show queue status
async fn show_status(config: &ResolvedConfig) -> Result<()> {
    let queue = JobQueue::from_config(config).await?;
    let status = queue.status().await?;

    println!();
    println!("Job Queue Status");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!("Pending dir: {}", queue.pending_dir().display());
    println!("Archive dir: {}", queue.archive_dir().display());
    println!();
    println!("  Pending:        {}", status.pending.len());
    println!("  Archived:       {}", status.archived);
    println!("  Dead-lettered:  {}", status.dead_lettered);
    println!("  Total:          {}", status.total());

    if !status.pending.is_empty() {
        println!();
        println!("Next up:");
        for id in status.pending.iter().take(10) {
            println!("  {}", id);
        }
        if status.pending.len() > 10 {
            println!("  ... and {} more", status.pending.len() - 10);
        }
    }

    println!();
    Ok(())
}

/// Show resolved configuration
fn show_config(config: &ResolvedConfig) -> Result<()> {
    let settings = &config.orchestrator;

    println!("empath configuration");
    println!("====================");
    println!();
    match &config.config_file {
        Some(path) => println!("Config file:    {}", path.display()),
        None => println!("Config file:    (none, using defaults)"),
    }
    println!();
    println!("Queue:");
    println!("  Pending dir:   {}", config.pending_dir.display());
    println!("  Archive dir:   {}", config.archive_dir.display());
    println!("  Pattern:       {}", config.job_pattern);
    println!();
    println!("Orchestrator:");
    println!("  Poll interval: {:?}", settings.poll_interval);
    println!("  Cooldown:      {:?}", settings.error_cooldown);
    println!("  Stage timeout: {:?}", settings.stage_timeout);
    match settings.max_attempts {
        Some(max) => println!("  Max attempts:  {}", max),
        None => println!("  Max attempts:  unlimited"),
    }
    println!("  Watch:         {}", settings.watch);
    println!();
    println!("Collaborators:");
    println!("  Classifier:    {}", config.classifier_url);
    println!("  Retrieval:     {}", config.generator.retrieval_url);
    println!("  Collection:    {}", config.generator.collection);
    println!("  Model:         {}", config.generator.model);
    println!(
        "  API key:       {}",
        if config.generator.api_key.is_some() { "set" } else { "missing" }
    );
    println!();
    println!("Output:");
    match config.sink {
        SinkKind::Console => println!("  Sink:          console"),
        SinkKind::File => println!("  Sink:          file ({})", config.responses_log.display()),
    }

    Ok(())
}
