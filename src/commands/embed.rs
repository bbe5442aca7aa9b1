// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embed extracted units into an index

use anyhow::{bail, Context as _, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::{build_batcher, Context, EmbeddingOverrides};
use crate::cli::OutputFormat;
use fnseek::cancel::CancelFlag;
use fnseek::corpus::{list_unit_files, read_units};
use fnseek::embedding::EmbeddingCache;
use fnseek::index::{index_exists, load_index, save_index, VectorCollection};
use fnseek::output::{colorize_ok, colorize_path, colorize_warn, print_json};
use fnseek::pipeline::{embed_units, progress_bar};
use fnseek::unit::UnitRef;

#[derive(Debug, Serialize)]
struct EmbedResult {
    index: String,
    model: String,
    dimension: Option<usize>,
    total: usize,
    added: usize,
    already_indexed: usize,
    cache_hits: usize,
    encoded: usize,
    failed: usize,
    failed_units: Vec<UnitRef>,
}

/// Run the embed command
pub fn run(
    ctx: &Context,
    input: &Path,
    output: &Path,
    overrides: EmbeddingOverrides,
    append: bool,
) -> Result<()> {
    let unit_files: Vec<PathBuf> = if input.is_dir() {
        list_unit_files(input)?
    } else {
        vec![input.to_path_buf()]
    };
    if unit_files.is_empty() {
        bail!("No unit files found in {}", input.display());
    }

    let mut units = Vec::new();
    for path in &unit_files {
        units.extend(read_units(path)?);
    }

    let embedding_config = overrides.apply(ctx.config.embeddings());
    let mut batcher = build_batcher(&embedding_config)?;

    let mut collection = if append && index_exists(output) {
        load_index(output)
            .with_context(|| format!("Failed to load index {}", output.display()))?
    } else {
        VectorCollection::new(batcher.model_id())
    };

    let mut cache = match embedding_config.cache_path() {
        Some(path) => match EmbeddingCache::open(&path) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!("Embedding cache unavailable at {}: {}", path.display(), e);
                None
            }
        },
        None => None,
    };

    let progress = progress_bar(units.len(), "units", ctx.show_progress());
    let report = embed_units(
        &units,
        &mut batcher,
        cache.as_mut(),
        &mut collection,
        &CancelFlag::new(),
        &progress,
    )?;
    progress.finish_and_clear();

    save_index(&collection, output)
        .with_context(|| format!("Failed to write index {}", output.display()))?;

    let result = EmbedResult {
        index: output.display().to_string(),
        model: collection.model_id().to_string(),
        dimension: collection.dimension(),
        total: collection.len(),
        added: report.appended.len(),
        already_indexed: report.already_indexed,
        cache_hits: report.cache_hits,
        encoded: report.encoded,
        failed: report.failed_units(),
        failed_units: report.failed_refs(&units),
    };

    match ctx.format {
        OutputFormat::Json => print_json(&result, ctx.compact)?,
        OutputFormat::Text => {
            let color = ctx.use_color();
            println!(
                "{} Indexed {} units into {} ({} total, model {}, dim {})",
                colorize_ok("✓", color),
                result.added,
                colorize_path(&result.index, color),
                result.total,
                result.model,
                result
                    .dimension
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!(
                "  {} from cache, {} encoded, {} already indexed",
                result.cache_hits, result.encoded, result.already_indexed
            );
            if result.failed > 0 {
                println!(
                    "{} {} units could not be embedded and were left out:",
                    colorize_warn("!", color),
                    result.failed
                );
                for unit_ref in &result.failed_units {
                    println!("    {}", colorize_path(&unit_ref.location(), color));
                }
            }
        }
    }

    Ok(())
}
