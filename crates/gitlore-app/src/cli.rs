//! CLI argument definitions for the `gitlore` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use gitlore_core::config::default_config_path;

/// gitlore - semantic questions over a repository's commit history.
#[derive(Parser, Debug)]
#[command(name = "gitlore", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the SQLite index.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Embed commits, changes and pull requests from a history export.
    Ingest {
        /// JSON file with `commits`, `changes` and `pull_requests` arrays.
        path: PathBuf,
    },
    /// Ask a natural-language question about the history.
    Ask {
        question: String,
        /// File the question is about.
        #[arg(long)]
        file: Option<String>,
        /// Commit the question is about.
        #[arg(long)]
        commit: Option<String>,
    },
    /// Entities most similar to a piece of text.
    Similar {
        text: String,
        /// Restrict to one kind: commit, change or pull_request.
        #[arg(long)]
        kind: Option<String>,
        #[arg(short = 'n', long = "top", default_value_t = 10)]
        top_k: usize,
    },
    /// Group recent commits into development themes.
    Clusters {
        /// Number of clusters (defaults to `analysis.default_clusters`).
        #[arg(short = 'k', long)]
        k: Option<usize>,
    },
    /// How far a file's code has moved from its first recorded version.
    Drift { path: String },
    /// Re-embed entities written under an older model or dimension.
    Reembed,
    /// Entity counts per index version.
    Stats,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > GITLORE_CONFIG env var > ~/.gitlore/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("GITLORE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// `None` when the config file value should be used.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}
