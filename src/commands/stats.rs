// SPDX-License-Identifier: MIT OR Apache-2.0

//! Index statistics

use anyhow::{Context as _, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::warn;

use super::Context;
use crate::cli::OutputFormat;
use fnseek::embedding::EmbeddingCache;
use fnseek::index::{load_index, read_manifest};
use fnseek::output::{colorize_name, colorize_path, print_json};

#[derive(Debug, Serialize)]
struct StatsResult {
    index: String,
    model: String,
    dimension: Option<usize>,
    format_version: Option<u32>,
    units: usize,
    files: usize,
    /// Units per `<repository>_<revision>`
    repositories: BTreeMap<String, usize>,
    cache: Option<CacheStats>,
}

#[derive(Debug, Serialize)]
struct CacheStats {
    path: String,
    /// Cached vectors for the index's model
    vectors: u64,
}

/// Cached vector count for `model_id`, if a cache database already exists.
fn cache_stats(ctx: &Context, model_id: &str) -> Option<CacheStats> {
    let path = ctx.config.embeddings().cache_path()?;
    if !path.is_file() {
        return None;
    }
    let cache = match EmbeddingCache::open(&path) {
        Ok(cache) => cache,
        Err(e) => {
            warn!("Embedding cache unavailable at {}: {}", path.display(), e);
            return None;
        }
    };
    let vectors = match cache.count(model_id) {
        Ok(vectors) => vectors,
        Err(e) => {
            warn!("Failed to count cached vectors: {}", e);
            return None;
        }
    };
    Some(CacheStats {
        path: cache
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        vectors,
    })
}

/// Run the stats command
pub fn run(ctx: &Context, index: &Path) -> Result<()> {
    let manifest = read_manifest(index)?;
    let collection = load_index(index)
        .with_context(|| format!("Failed to load index {}", index.display()))?;

    let mut repositories: BTreeMap<String, usize> = BTreeMap::new();
    let mut files = HashSet::new();
    for unit_ref in collection.metadata() {
        *repositories
            .entry(format!("{}_{}", unit_ref.repository_id, unit_ref.revision))
            .or_default() += 1;
        files.insert((
            &unit_ref.repository_id,
            &unit_ref.revision,
            &unit_ref.file_path,
        ));
    }

    let result = StatsResult {
        index: index.display().to_string(),
        model: collection.model_id().to_string(),
        dimension: collection.dimension(),
        format_version: manifest.map(|m| m.format_version),
        units: collection.len(),
        files: files.len(),
        repositories,
        cache: cache_stats(ctx, collection.model_id()),
    };

    match ctx.format {
        OutputFormat::Json => print_json(&result, ctx.compact)?,
        OutputFormat::Text => {
            let color = ctx.use_color();
            println!("Index:      {}", colorize_path(&result.index, color));
            println!("Model:      {}", result.model);
            println!(
                "Dimension:  {}",
                result
                    .dimension
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!("Units:      {}", result.units);
            println!("Files:      {}", result.files);
            println!("Checkouts:  {}", result.repositories.len());
            for (name, count) in &result.repositories {
                println!("  {:<40} {}", colorize_name(name, color), count);
            }
            if let Some(cache) = &result.cache {
                println!(
                    "Cache:      {} ({} vectors)",
                    colorize_path(&cache.path, color),
                    cache.vectors
                );
            }
        }
    }

    Ok(())
}
