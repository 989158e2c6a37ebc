//! Greenroom binary - composition root.
//!
//! Ties the engine crates into one executable:
//! 1. Load configuration from TOML
//! 2. Choose in-process or remote backends (embedding, vector index)
//! 3. Dispatch the requested subcommand

mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use uuid::Uuid;

use greenroom_chat::{InterviewOrchestrator, MockLlm, SessionSummary, TurnReply};
use greenroom_core::config::GreenroomConfig;
use greenroom_vector::{
    DynEmbeddingService, ExpiryReaper, HttpEmbedding, MemoryIndex, MockEmbedding, QdrantStore,
    ReapReport, VectorStore,
};

use cli::{CliArgs, Command};

/// Request timeout for the remote embedding endpoint.
const EMBED_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config before tracing: the default log level may come from it.
    let config_file = args.resolve_config_path();
    let config = GreenroomConfig::load_or_default(&config_file);

    // Tracing. Priority: --log-level flag > RUST_LOG > config.
    let filter = match args.log_level.as_deref() {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = if config.general.debug {
                "debug"
            } else {
                config.general.log_level.as_str()
            };
            tracing_subscriber::EnvFilter::new(level)
        }),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Greenroom v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Backends: remote endpoints in the config switch the real clients in.
    let embedding: Arc<dyn DynEmbeddingService> = if config.embedding.endpoint.is_empty() {
        Arc::new(MockEmbedding::new(config.embedding.dim))
    } else {
        Arc::new(HttpEmbedding::new(
            &config.embedding.endpoint,
            &config.embedding.model,
            config.embedding.dim,
            Duration::from_secs(EMBED_TIMEOUT_SECS),
        )?)
    };
    let index: Arc<dyn VectorStore> = if config.index.endpoint.is_empty() {
        Arc::new(MemoryIndex::new())
    } else {
        Arc::new(QdrantStore::from_config(&config.index)?)
    };

    let make_orchestrator = || {
        InterviewOrchestrator::new(
            &config,
            Arc::clone(&embedding),
            Arc::clone(&index),
            Arc::new(MockLlm),
        )
    };

    match args.command {
        Command::Ingest {
            file,
            label,
            interview,
        } => {
            let orchestrator = make_orchestrator();
            run_ingest(&orchestrator, &file, &label, interview).await?;
        }
        Command::Ask {
            session_id,
            message,
        } => {
            let orchestrator = make_orchestrator();
            let turn = orchestrator.interview_turn(session_id, &message).await?;
            print_turn(&turn);
        }
        Command::Sessions => {
            let orchestrator = make_orchestrator();
            print_sessions(&orchestrator.sessions());
        }
        Command::Reset { session_id } => {
            let orchestrator = make_orchestrator();
            orchestrator.reset(session_id)?;
            println!("Session {} reset.", session_id);
        }
        Command::Reap {
            max_age_mins,
            interval_mins,
        } => {
            if config.index.endpoint.is_empty() {
                tracing::warn!("no remote index configured; reaping an empty in-process index");
            }
            run_reap(index, &config, max_age_mins, interval_mins).await?;
        }
    }

    Ok(())
}

/// Read a document, start a session, and optionally run the interactive loop.
async fn run_ingest(
    orchestrator: &InterviewOrchestrator,
    file: &Path,
    label: &str,
    interview: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(file)?;
    let session_id = orchestrator.upload(&text, label).await?;
    println!("Session {} started for \"{}\".", session_id, label);

    if interview {
        run_interview_loop(orchestrator, session_id).await?;
    }
    Ok(())
}

/// Interactive loop: each stdin line is one turn, EOF ends with an evaluation.
async fn run_interview_loop(
    orchestrator: &InterviewOrchestrator,
    session_id: Uuid,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Interview started. Type your messages; end with Ctrl-D.");
    for line in std::io::stdin().lines() {
        let line = line?;
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        match orchestrator.interview_turn(session_id, message).await {
            Ok(turn) => println!("\nAI: {}\n", turn.reply),
            Err(e) => eprintln!("error: {}", e),
        }
    }

    let feedback = orchestrator.evaluate(session_id).await?;
    println!("\n--- Evaluation ---\n{}", feedback);
    Ok(())
}

fn print_turn(turn: &TurnReply) {
    let grounding = if turn.grounded {
        "retrieved chunks"
    } else {
        "source text fallback"
    };
    println!("--- Context ({}) ---\n{}\n", grounding, turn.context);
    println!("AI: {}", turn.reply);
}

fn print_sessions(sessions: &[SessionSummary]) {
    if sessions.is_empty() {
        println!("No active sessions.");
        return;
    }
    for s in sessions {
        println!(
            "{}  {:<24}  turns: {:<3}  last active: {}",
            s.session_id,
            s.context_label,
            s.turn_count,
            s.last_accessed.to_rfc3339()
        );
    }
}

/// One sweep, or a periodic loop when an interval is given.
async fn run_reap(
    index: Arc<dyn VectorStore>,
    config: &GreenroomConfig,
    max_age_mins: Option<u32>,
    interval_mins: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let reaper = ExpiryReaper::new(index, &config.index.collection);
    let max_age = chrono::Duration::minutes(i64::from(
        max_age_mins.unwrap_or(config.session.reap_after_minutes),
    ));

    match interval_mins {
        None => {
            let report = reaper.reap(max_age).await?;
            print_report(&report);
        }
        Some(mins) => {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(mins * 60));
            loop {
                interval.tick().await;
                match reaper.reap(max_age).await {
                    Ok(report) => print_report(&report),
                    Err(e) => tracing::warn!(error = %e, "Reap sweep failed"),
                }
            }
        }
    }
    Ok(())
}

fn print_report(report: &ReapReport) {
    println!(
        "Reap: scanned {} points, expired {} sessions ({} deleted, {} failed), {} malformed skipped.",
        report.points_scanned,
        report.sessions_expired,
        report.sessions_deleted,
        report.failed_sessions.len(),
        report.malformed_skipped
    );
}
