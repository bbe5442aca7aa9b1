// SPDX-License-Identifier: MIT OR Apache-2.0

//! fnseek - Semantic search over source-code functions
//!
//! Extracts functions with tree-sitter, embeds them, and ranks them against
//! free-text queries by cosine similarity.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands, OutputFormat};
use fnseek::config::{Config, ConfigOutputFormat};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with FNSEEK_LOG env var (e.g., FNSEEK_LOG=debug fnseek embed ...)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("FNSEEK_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load();
    let format = cli.format.unwrap_or(match config.default_format {
        Some(ConfigOutputFormat::Json) => OutputFormat::Json,
        _ => OutputFormat::Text,
    });
    let ctx = commands::Context {
        config,
        format,
        compact: cli.compact,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Extract {
            input,
            output,
            exclude_paths,
            max_file_size,
        } => {
            commands::extract::run(&ctx, &input, &output, exclude_paths, max_file_size)?;
        }
        Commands::Embed {
            input,
            output,
            provider,
            model,
            batch_size,
            max_chars,
            no_cache,
            append,
        } => {
            let overrides = commands::EmbeddingOverrides {
                provider,
                model,
                batch_size,
                max_chars,
                no_cache,
            };
            commands::embed::run(&ctx, &input, &output, overrides, append)?;
        }
        Commands::Search {
            query,
            index,
            k,
            owner,
            provider,
            model,
        } => {
            let overrides = commands::EmbeddingOverrides {
                provider,
                model,
                ..Default::default()
            };
            commands::search::run(&ctx, &query, &index, k, owner.as_deref(), overrides)?;
        }
        Commands::Stats { index } => {
            commands::stats::run(&ctx, &index)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "fnseek", &mut std::io::stdout());
        }
    }

    Ok(())
}
