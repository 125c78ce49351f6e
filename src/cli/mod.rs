//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "paperfuse",
    version,
    about = "Hybrid dense + keyword retrieval over research-paper abstracts",
    long_about = "paperfuse indexes a corpus of abstracts into a dense vector store and a BM25 \
                  keyword index, then answers queries by ranking the whole corpus with each \
                  strategy and fusing the rankings with Reciprocal Rank Fusion."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/paperfuse/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a JSONL corpus into the dense and keyword indexes
    Index {
        /// Corpus file, one {"document_id"?, "text", "metadata"?} object per line
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,

        /// Drop existing collections before indexing
        #[arg(long)]
        rebuild: bool,
    },

    /// Retrieve documents for a query
    Query {
        /// Search query text
        query: String,

        /// Number of results to return
        #[arg(short, default_value = "10")]
        k: usize,

        /// Rank with one configured strategy only instead of fusing
        #[arg(short, long)]
        strategy: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Report where known relevant documents land for each strategy
    Evaluate {
        /// Query file, one {"query", "document_id"} object per line
        #[arg(short, long, value_name = "FILE")]
        queries: PathBuf,

        /// Show the report in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
