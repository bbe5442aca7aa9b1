// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extract function units from a corpus of checkouts

use anyhow::{bail, Context as _, Result};
use serde::Serialize;
use std::path::Path;

use super::Context;
use crate::cli::OutputFormat;
use fnseek::cancel::CancelFlag;
use fnseek::corpus::{discover_checkouts, FileScanner};
use fnseek::output::{colorize_context, colorize_name, colorize_ok, colorize_path, print_json};
use fnseek::parser::UnitExtractor;
use fnseek::pipeline::extract_checkouts;

#[derive(Debug, Serialize)]
struct SkippedResult {
    path: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct CheckoutResult {
    repo_name: String,
    #[serde(rename = "ref")]
    revision: String,
    output: String,
    files: usize,
    units: usize,
    skipped: Vec<SkippedResult>,
}

/// Run the extract command
pub fn run(
    ctx: &Context,
    input: &Path,
    output: &Path,
    exclude_paths: Vec<String>,
    max_file_size: Option<u64>,
) -> Result<()> {
    let checkouts = discover_checkouts(input)
        .with_context(|| format!("Failed to read corpus directory {}", input.display()))?;
    if checkouts.is_empty() {
        bail!(
            "No checkouts found in {} (expected <repository>_<revision> directories)",
            input.display()
        );
    }

    // CLI excludes first, then config excludes
    let mut excludes = exclude_paths;
    excludes.extend(ctx.config.index().exclude_paths().iter().cloned());
    let scanner = FileScanner::new()
        .with_max_file_size(max_file_size.unwrap_or_else(|| ctx.config.index().max_file_size()))
        .with_excludes(excludes);

    let reports = extract_checkouts(
        &checkouts,
        &scanner,
        &UnitExtractor::new(),
        output,
        &CancelFlag::new(),
        ctx.show_progress(),
    )?;

    let results: Vec<CheckoutResult> = reports
        .into_iter()
        .map(|report| CheckoutResult {
            repo_name: report.checkout.repository_id,
            revision: report.checkout.revision,
            output: report.output.display().to_string(),
            files: report.files,
            units: report.units,
            skipped: report
                .skipped
                .into_iter()
                .map(|s| SkippedResult {
                    path: s.path,
                    reason: s.error.to_string(),
                })
                .collect(),
        })
        .collect();

    match ctx.format {
        OutputFormat::Json => print_json(&results, ctx.compact)?,
        OutputFormat::Text => {
            let color = ctx.use_color();
            let total_units: usize = results.iter().map(|r| r.units).sum();
            for result in &results {
                println!(
                    "{} {}_{}: {} units from {} files{}",
                    colorize_ok("✓", color),
                    colorize_name(&result.repo_name, color),
                    result.revision,
                    result.units,
                    result.files,
                    if result.skipped.is_empty() {
                        String::new()
                    } else {
                        colorize_context(&format!(" ({} skipped)", result.skipped.len()), color)
                    }
                );
            }
            println!(
                "\nExtracted {} units from {} checkouts into {}",
                total_units,
                results.len(),
                colorize_path(&output.display().to_string(), color)
            );
        }
    }

    Ok(())
}
