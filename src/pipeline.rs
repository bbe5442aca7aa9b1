// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch pipeline: corpus files to units, units to an index.
//!
//! Extraction runs in parallel across files and merges per-file results in
//! input order. Embedding goes through the [`EmbeddingBatcher`], consults the
//! optional [`EmbeddingCache`], and commits everything that succeeded in a
//! single all-or-nothing append.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::corpus::{write_units, Checkout, FileScanner};
use crate::embedding::{content_hash, BatchFailure, EmbeddingBatcher, EmbeddingCache};
use crate::errors::{Error, Result};
use crate::index::{EmbeddingRecord, VectorCollection};
use crate::parser::UnitExtractor;
use crate::unit::{CodeUnit, SourceFile, UnitRef};

/// Units handed to the batcher between cancellation and progress checks.
const EMBED_CHUNK: usize = 256;

/// Progress bar in the house style, hidden when `visible` is false.
pub fn progress_bar(total: usize, label: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    let template = format!("[{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} | {{msg}}", label);
    if let Ok(style) = ProgressStyle::default_bar().template(&template) {
        pb.set_style(style.progress_chars("##."));
    }
    pb
}

/// A file that produced no units, and why.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Units in file order, then pre-order within each file
    pub units: Vec<CodeUnit>,
    /// Leading files whose results are included
    pub files_processed: usize,
    pub skipped: Vec<SkippedFile>,
    pub cancelled: bool,
}

/// Extract units from `files` in parallel.
///
/// Results are merged in the order of `files`. When `cancel` fires, the
/// report keeps the longest prefix of files that completed.
pub fn extract_files(
    files: &[SourceFile],
    extractor: &UnitExtractor,
    cancel: &CancelFlag,
    progress: &ProgressBar,
) -> ExtractionReport {
    let results: Vec<Option<Result<Vec<CodeUnit>>>> = files
        .par_iter()
        .map(|file| {
            if cancel.is_cancelled() {
                return None;
            }
            progress.set_message(file.file_path.clone());
            let result = extractor.extract_file(file);
            progress.inc(1);
            Some(result)
        })
        .collect();

    let report = merge_extraction(files, results);
    if report.cancelled {
        info!(
            "Extraction cancelled after {} of {} files",
            report.files_processed,
            files.len()
        );
    }
    report
}

/// Merges per-file results in file order, stopping at the first file that
/// never ran.
fn merge_extraction(
    files: &[SourceFile],
    results: Vec<Option<Result<Vec<CodeUnit>>>>,
) -> ExtractionReport {
    let mut report = ExtractionReport::default();
    for (file, result) in files.iter().zip(results) {
        let Some(result) = result else {
            report.cancelled = true;
            break;
        };
        report.files_processed += 1;
        match result {
            Ok(units) => report.units.extend(units),
            Err(err) => {
                if err.is_recoverable() {
                    debug!("Skipped {}: {}", file.file_path, err);
                } else {
                    warn!("Extraction failed for {}: {}", file.file_path, err);
                }
                report.skipped.push(SkippedFile {
                    path: file.file_path.clone(),
                    error: err,
                });
            }
        }
    }
    report
}

/// Outcome of extracting one checkout into the unit store.
#[derive(Debug)]
pub struct CheckoutReport {
    pub checkout: Checkout,
    pub output: PathBuf,
    pub files: usize,
    pub units: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Scan, extract and store every checkout, one unit file per checkout.
///
/// Checkouts finished before cancellation keep their unit files; the one in
/// progress is not written.
pub fn extract_checkouts(
    checkouts: &[Checkout],
    scanner: &FileScanner,
    extractor: &UnitExtractor,
    output_dir: &Path,
    cancel: &CancelFlag,
    show_progress: bool,
) -> Result<Vec<CheckoutReport>> {
    std::fs::create_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;

    let mut reports = Vec::with_capacity(checkouts.len());
    for checkout in checkouts {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let files = scanner.scan(checkout)?;
        info!(
            "Extracting {} files from {}",
            files.len(),
            checkout.stem()
        );

        let progress = progress_bar(files.len(), "files", show_progress);
        let extraction = extract_files(&files, extractor, cancel, &progress);
        progress.finish_and_clear();
        if extraction.cancelled {
            return Err(Error::Cancelled);
        }

        let output = output_dir.join(format!(
            "{}.{}",
            checkout.stem(),
            crate::corpus::store::UNITS_EXTENSION
        ));
        write_units(&output, &extraction.units)?;

        reports.push(CheckoutReport {
            checkout: checkout.clone(),
            output,
            files: files.len(),
            units: extraction.units.len(),
            skipped: extraction.skipped,
        });
    }
    Ok(reports)
}

#[derive(Debug, Clone, Default)]
pub struct EmbedReport {
    /// Collection indices assigned to the new records
    pub appended: Range<usize>,
    /// Units already present in the collection (or repeated in the input)
    pub already_indexed: usize,
    pub cache_hits: usize,
    pub encoded: usize,
    /// Failed sub-batches; `inputs` index into the `units` slice
    pub failures: Vec<BatchFailure>,
    pub cancelled: bool,
}

impl EmbedReport {
    pub fn failed_units(&self) -> usize {
        self.failures.iter().map(|f| f.inputs.len()).sum()
    }

    /// References of every unit left out by a failed sub-batch, in input order.
    pub fn failed_refs(&self, units: &[CodeUnit]) -> Vec<UnitRef> {
        let mut inputs: Vec<usize> = self.failures.iter().flat_map(|f| f.inputs.clone()).collect();
        inputs.sort_unstable();
        inputs
            .into_iter()
            .filter_map(|i| units.get(i).map(CodeUnit::unit_ref))
            .collect()
    }
}

/// Embed `units` and append the results to `collection`.
///
/// Units whose reference is already in `collection` are skipped. Units whose
/// sub-batch failed are reported and left out; everything else is appended
/// in unit order. The append is all-or-nothing, so a fatal error leaves
/// `collection` untouched.
pub fn embed_units(
    units: &[CodeUnit],
    batcher: &mut EmbeddingBatcher,
    mut cache: Option<&mut EmbeddingCache>,
    collection: &mut VectorCollection,
    cancel: &CancelFlag,
    progress: &ProgressBar,
) -> Result<EmbedReport> {
    if collection.model_id() != batcher.model_id() {
        return Err(Error::EncoderMismatch {
            expected: collection.model_id().to_string(),
            actual: batcher.model_id().to_string(),
        });
    }
    let model_id = batcher.model_id().to_string();
    let mut report = EmbedReport::default();

    // Indices into `units` of the units that still need a record
    let mut seen: HashSet<UnitRef> = collection.metadata().iter().cloned().collect();
    let selected: Vec<usize> = (0..units.len())
        .filter(|&i| seen.insert(units[i].unit_ref()))
        .collect();
    report.already_indexed = units.len() - selected.len();
    if report.already_indexed > 0 {
        debug!("{} units already indexed", report.already_indexed);
    }
    progress.inc(report.already_indexed as u64);

    let hashes: Vec<String> = selected
        .iter()
        .map(|&i| content_hash(&batcher.prepare(&units[i].text)))
        .collect();
    let mut vectors: Vec<Option<Vec<f32>>> = vec![None; selected.len()];

    if let Some(cache) = cache.as_deref() {
        let cached = cache.get_many(&model_id, &hashes)?;
        for (slot, hash) in vectors.iter_mut().zip(&hashes) {
            if let Some(vector) = cached.get(hash) {
                *slot = Some(vector.clone());
                report.cache_hits += 1;
            }
        }
        debug!("{} of {} units served from cache", report.cache_hits, selected.len());
    }
    progress.inc(report.cache_hits as u64);

    let pending: Vec<usize> = (0..selected.len()).filter(|&i| vectors[i].is_none()).collect();
    for chunk in pending.chunks(EMBED_CHUNK) {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let texts: Vec<String> = chunk
            .iter()
            .map(|&i| units[selected[i]].text.clone())
            .collect();
        let outcome = batcher.embed_with_cancel(&texts, cancel);

        let mut fresh: Vec<(&str, Vec<f32>)> = Vec::new();
        for (offset, vector) in outcome.succeeded() {
            let slot = chunk[offset];
            fresh.push((hashes[slot].as_str(), vector.to_vec()));
            vectors[slot] = Some(vector.to_vec());
        }
        report.encoded += fresh.len();

        if let Some(cache) = cache.as_deref_mut() {
            let entries: Vec<(&str, &[f32])> =
                fresh.iter().map(|(h, v)| (*h, v.as_slice())).collect();
            cache.put_many(&model_id, &entries)?;
        }

        for failure in outcome.failures {
            report.failures.push(BatchFailure {
                inputs: failure
                    .inputs
                    .iter()
                    .map(|&offset| selected[chunk[offset]])
                    .collect(),
                reason: failure.reason,
            });
        }
        progress.inc(chunk.len() as u64);

        if outcome.cancelled {
            report.cancelled = true;
            break;
        }
    }

    let records: Vec<EmbeddingRecord> = selected
        .iter()
        .zip(vectors)
        .filter_map(|(&i, vector)| {
            vector.map(|vector| EmbeddingRecord {
                vector,
                unit_ref: units[i].unit_ref(),
            })
        })
        .collect();
    report.appended = collection.append_batch(records)?;

    if report.failed_units() > 0 {
        warn!(
            "{} units could not be embedded and were left out",
            report.failed_units()
        );
    }
    if report.cancelled {
        warn!("Embedding cancelled; kept {} finished units", report.appended.len());
    }
    info!(
        "Embedded {} units ({} cached, {} encoded, {} already indexed)",
        report.appended.len(),
        report.cache_hits,
        report.encoded,
        report.already_indexed
    );
    Ok(report)
}
