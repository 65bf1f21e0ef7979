//! Atelier CLI - autonomous multi-agent brief pipeline
//!
//! Usage:
//!   atelier init                    Write the default configuration
//!   atelier run                     Execute a full pipeline run
//!   atelier run --dry-run 3         Execute only the first 3 phases
//!   atelier run --no-publish        Run everything, skip publishing
//!   atelier retry-publish <trace>   Replay the publish step of a run
//!   atelier history                 List published topics

use anyhow::{Context, Result};
use atelier_agent::HttpEmbeddingBackend;
use atelier_core::{ArtifactHandle, PipelineConfig, PostCopy, TopicCandidate};
use atelier_dedup::{DedupGate, HistoryStore};
use atelier_orchestrator::{
    AgentRoster, JsonDeckRenderer, LocalPublisher, Orchestrator, PublishLog, PublishLogEntry,
    Publisher, RunOptions, RunReport,
};
use atelier_trace::Trace;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "atelier")]
#[command(author, version, about = "Autonomous multi-agent brief pipeline")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Base directory for configuration, history, and output
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration to .atelier/config.toml
    Init,

    /// Execute a pipeline run
    Run {
        /// Execute only the first N phases without publishing
        #[arg(long, value_name = "N")]
        dry_run: Option<u32>,

        /// Run all phases but skip the publish transition
        #[arg(long)]
        no_publish: bool,
    },

    /// Replay the publish step of a previously sealed trace
    RetryPublish {
        /// Path to the sealed trace JSON
        trace: PathBuf,
    },

    /// List published topics, newest last
    History,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    match cli.command {
        Commands::Init => cmd_init(&cli.base_dir),
        Commands::Run {
            dry_run,
            no_publish,
        } => cmd_run(&cli.base_dir, dry_run, no_publish).await,
        Commands::RetryPublish { trace } => cmd_retry_publish(&cli.base_dir, &trace).await,
        Commands::History => cmd_history(&cli.base_dir),
    }
}

fn cmd_init(base_dir: &Path) -> Result<()> {
    let path = PipelineConfig::write_default(base_dir)
        .context("failed to write default configuration")?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn cmd_run(base_dir: &Path, dry_run: Option<u32>, no_publish: bool) -> Result<()> {
    let config = PipelineConfig::load_or_default(base_dir).context("failed to load config")?;

    let dedup = Arc::new(
        DedupGate::load(
            Arc::new(HttpEmbeddingBackend::new(config.backends.embedding.clone())),
            config.dedup.similarity_threshold,
            base_dir.join(&config.storage.topic_history),
        )
        .context("failed to load topic history")?,
    );
    let backfilled = dedup.backfill().await?;
    if backfilled > 0 {
        info!(backfilled, "backfilled fingerprint embeddings");
    }

    let roster = AgentRoster::from_config(&config);
    let renderer = Arc::new(JsonDeckRenderer::new(base_dir.join(&config.storage.output_dir)));
    let publish_log = PublishLog::new(base_dir.join(&config.storage.publish_log));
    let traces_dir = base_dir.join(&config.storage.traces_dir);

    let options = RunOptions {
        dry_run_phases: dry_run,
        publish: !no_publish,
    };

    let orchestrator = Orchestrator::new(
        config,
        roster,
        dedup,
        renderer,
        Arc::new(LocalPublisher),
        publish_log,
        options,
    );

    let report = orchestrator.run(&traces_dir).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("Run:        {}", report.run.run_id);
    println!("Status:     {:?}", report.run.status);
    println!("Elapsed:    {:.1}s", report.run.elapsed_seconds);
    println!(
        "Calls:      {} agent calls, {} debates",
        report.trace.total_agent_calls, report.trace.total_debates
    );
    if let Some(headline) = report.trace.final_output["headline"].as_str() {
        println!("Topic:      {}", headline);
    }
    if let Some(artifact) = &report.artifact {
        println!("Artifact:   {}", artifact.path.display());
    }
    if let Some(receipt) = &report.receipt {
        println!("Published:  {} ({})", receipt.post_ref, receipt.url);
    }
    println!("Trace:      {}", report.trace_path.display());
}

async fn cmd_retry_publish(base_dir: &Path, trace_path: &Path) -> Result<()> {
    let config = PipelineConfig::load_or_default(base_dir).context("failed to load config")?;
    let trace = Trace::load(trace_path).context("failed to load trace")?;

    let final_output = &trace.final_output;
    let post: PostCopy = serde_json::from_value(final_output["post"].clone())
        .context("trace has no post copy; the run never reached the publish step")?;
    let topic: TopicCandidate = serde_json::from_value(final_output["topic"].clone())
        .context("trace has no topic")?;
    let artifact = ArtifactHandle {
        path: PathBuf::from(
            final_output["artifact_path"]
                .as_str()
                .context("trace has no artifact path")?,
        ),
    };

    info!(run_id = %trace.run_id, "replaying publish step");
    let receipt = LocalPublisher.publish(&artifact, &post).await?;

    let dedup = DedupGate::load(
        Arc::new(HttpEmbeddingBackend::new(config.backends.embedding.clone())),
        config.dedup.similarity_threshold,
        base_dir.join(&config.storage.topic_history),
    )?;
    dedup.record(&topic, &receipt.post_ref).await?;

    let publish_log = PublishLog::new(base_dir.join(&config.storage.publish_log));
    publish_log.append(PublishLogEntry {
        post_ref: receipt.post_ref.clone(),
        url: receipt.url.clone(),
        topic: topic.headline.clone(),
        brief_title: final_output["brief_title"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        document_title: post.document_title.clone(),
        content_type: final_output["content_type"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        design_name: final_output["design_name"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        world_mood: final_output["world_mood"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        run_id: trace.run_id.clone(),
        published_at: Utc::now(),
        status: "published_retry".to_string(),
    })?;

    println!("Published:  {} ({})", receipt.post_ref, receipt.url);
    Ok(())
}

fn cmd_history(base_dir: &Path) -> Result<()> {
    let config = PipelineConfig::load_or_default(base_dir).context("failed to load config")?;
    let fingerprints = HistoryStore::new(base_dir.join(&config.storage.topic_history)).load()?;

    if fingerprints.is_empty() {
        println!("No published topics yet.");
        return Ok(());
    }

    println!("{} published topic(s):", fingerprints.len());
    for fingerprint in fingerprints {
        println!(
            "  {}  {}",
            fingerprint.accepted_at.format("%Y-%m-%d %H:%M"),
            fingerprint.topic
        );
    }
    Ok(())
}
