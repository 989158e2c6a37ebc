//! CLI argument definitions for the Greenroom binary.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// Greenroom — session-scoped retrieval engine for interview preparation.
#[derive(Parser, Debug)]
#[command(name = "greenroom", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest a document and start an interview session for it
    Ingest {
        /// Path to the document (plain text)
        file: PathBuf,
        /// Job description or role name for the session
        #[arg(short, long)]
        label: String,
        /// After ingesting, read interview messages from stdin until EOF,
        /// then print an evaluation
        #[arg(long)]
        interview: bool,
    },
    /// Run one interview turn against the mock LLM seam
    ///
    /// Sessions live in process memory, so this mainly serves scripts and
    /// tests embedding the library; for an end-to-end run from the shell use
    /// `ingest --interview`.
    Ask {
        /// Session to speak in
        session_id: Uuid,
        /// The candidate's message
        message: String,
    },
    /// List active sessions
    Sessions,
    /// Delete a session's conversational state
    Reset { session_id: Uuid },
    /// Purge sessions whose indexed chunks are older than the cutoff
    Reap {
        /// Override the configured chunk age cutoff, in minutes
        #[arg(long)]
        max_age_mins: Option<u32>,
        /// Re-run the sweep on this interval instead of exiting
        #[arg(long)]
        interval_mins: Option<u64>,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > GREENROOM_CONFIG env var > platform default
    /// (~/.greenroom/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("GREENROOM_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".greenroom").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".greenroom").join("config.toml");
    }
    PathBuf::from("config.toml")
}
