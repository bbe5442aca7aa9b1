// SPDX-License-Identifier: MIT OR Apache-2.0

//! Free-text search over a built index

use anyhow::{Context as _, Result};
use std::path::Path;
use std::sync::Arc;

use super::{build_batcher, Context, EmbeddingOverrides};
use crate::cli::OutputFormat;
use fnseek::index::IndexHandle;
use fnseek::output::{colorize_context, colorize_path, colorize_score, print_json};
use fnseek::query::QueryEngine;

/// Run the search command
pub fn run(
    ctx: &Context,
    query: &str,
    index: &Path,
    k: Option<usize>,
    owner: Option<&str>,
    overrides: EmbeddingOverrides,
) -> Result<()> {
    let handle = IndexHandle::open(index)
        .with_context(|| format!("Failed to load index {}", index.display()))?;

    let embedding_config = overrides.apply(ctx.config.embeddings());
    let batcher = build_batcher(&embedding_config)?;
    let mut engine = QueryEngine::new(batcher, Arc::new(handle))
        .with_owner(ctx.config.merge_owner(owner));

    let hits = engine.search_text(query, ctx.config.merge_k(k))?;

    match ctx.format {
        OutputFormat::Json => print_json(&hits, ctx.compact)?,
        OutputFormat::Text => {
            let color = ctx.use_color();
            if hits.is_empty() {
                println!("No results for: {}", query);
                return Ok(());
            }
            for hit in &hits {
                println!(
                    "{:>3}. {}  {}",
                    hit.rank,
                    colorize_score(hit.score, color),
                    colorize_path(&hit.link, color)
                );
                if let Some(url) = &hit.url {
                    println!("      {}", colorize_context(url, color));
                }
            }
        }
    }

    Ok(())
}
