// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// fnseek - Semantic search over source-code functions
///
/// Extracts every function from a corpus of repository checkouts, embeds
/// each one, and answers free-text queries with the most similar functions.
#[derive(Parser, Debug)]
#[command(name = "fnseek")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Embedding provider override
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliProvider {
    /// Local ONNX model via fastembed
    Builtin,
    /// External embedding command
    Command,
    /// Deterministic feature hashing (offline, no model)
    Hashing,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract function units from repository checkouts
    ///
    /// Each `<repository>_<revision>` directory under the input becomes one
    /// `<repository>_<revision>.jsonl` file in the output directory.
    Extract {
        /// Corpus directory holding one checkout per repository revision
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the extracted unit files
        #[arg(short, long)]
        output: PathBuf,

        /// Exclude files matching pattern (can be repeated)
        #[arg(short, long = "exclude")]
        exclude_paths: Vec<String>,

        /// Skip files larger than this many bytes
        #[arg(long)]
        max_file_size: Option<u64>,
    },

    /// Embed extracted units and build an index
    Embed {
        /// Unit file, or directory of unit files
        #[arg(short, long)]
        input: PathBuf,

        /// Index directory to write
        #[arg(short, long)]
        output: PathBuf,

        /// Embedding provider (overrides config)
        #[arg(long, value_enum)]
        provider: Option<CliProvider>,

        /// Embedding model (overrides config)
        #[arg(long)]
        model: Option<String>,

        /// Texts per provider request
        #[arg(long)]
        batch_size: Option<usize>,

        /// Truncate unit text to this many characters (0 = no limit)
        #[arg(long)]
        max_chars: Option<usize>,

        /// Do not read or write the embedding cache
        #[arg(long)]
        no_cache: bool,

        /// Append to an existing index instead of replacing it
        #[arg(long)]
        append: bool,
    },

    /// Find the functions most similar to a free-text query
    Search {
        /// Query text (natural language or code)
        query: String,

        /// Index directory built by `embed`
        #[arg(long)]
        index: PathBuf,

        /// Number of results to return
        #[arg(short = 'k', long = "top-k")]
        k: Option<usize>,

        /// Repository owner used to build links
        #[arg(long)]
        owner: Option<String>,

        /// Embedding provider (must match the one that built the index)
        #[arg(long, value_enum)]
        provider: Option<CliProvider>,

        /// Embedding model (must match the one that built the index)
        #[arg(long)]
        model: Option<String>,
    },

    /// Show index statistics
    Stats {
        /// Index directory built by `embed`
        #[arg(long)]
        index: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from([
            "fnseek", "search", "open a socket", "--index", "idx", "-k", "3", "--format", "json",
        ]);
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Search { query, index, k, .. } => {
                assert_eq!(query, "open a socket");
                assert_eq!(index, PathBuf::from("idx"));
                assert_eq!(k, Some(3));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_extract_excludes() {
        let cli = Cli::parse_from([
            "fnseek", "extract", "-i", "corpus", "-o", "units", "-e", "vendor/**", "-e", "*.min.js",
        ]);
        match cli.command {
            Commands::Extract { exclude_paths, .. } => {
                assert_eq!(exclude_paths, vec!["vendor/**", "*.min.js"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
