// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batched embedding with explicit partial-failure results.
//!
//! Inputs are truncated from the end (the signature at the start of a unit is
//! kept), sent to the provider in sub-batches, validated and L2-normalized.
//! A sub-batch fails as a whole; other sub-batches are unaffected and the
//! caller decides whether to retry the failed inputs.

use std::borrow::Cow;
use std::ops::Range;
use tracing::{debug, warn};

use crate::cancel::CancelFlag;
use crate::embedding::provider::EmbeddingProvider;
use crate::errors::{Error, Result};
use crate::vector::l2_normalize;

/// Default input budget, in characters.
pub const DEFAULT_MAX_CHARS: usize = 2000;

/// A sub-batch the provider could not embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Input indices covered by the failed sub-batch
    pub inputs: Vec<usize>,
    pub reason: String,
}

/// Result of [`EmbeddingBatcher::embed`]: one slot per input.
#[derive(Debug, Clone, Default)]
pub struct EmbedOutcome {
    /// `Some` for every input whose sub-batch succeeded
    pub vectors: Vec<Option<Vec<f32>>>,
    pub failures: Vec<BatchFailure>,
    /// Set when cancellation stopped the run before every sub-batch was sent
    pub cancelled: bool,
}

impl EmbedOutcome {
    pub fn is_complete(&self) -> bool {
        self.vectors.iter().all(Option::is_some)
    }

    /// Successful `(input index, vector)` pairs in input order.
    pub fn succeeded(&self) -> impl Iterator<Item = (usize, &[f32])> {
        self.vectors
            .iter()
            .enumerate()
            .filter_map(|(idx, v)| v.as_deref().map(|v| (idx, v)))
    }

    pub fn failed_inputs(&self) -> Vec<usize> {
        self.failures
            .iter()
            .flat_map(|f| f.inputs.iter().copied())
            .collect()
    }

    /// Inputs that were never attempted because of cancellation.
    pub fn pending_inputs(&self) -> Vec<usize> {
        let failed = self.failed_inputs();
        self.vectors
            .iter()
            .enumerate()
            .filter(|(idx, v)| v.is_none() && !failed.contains(idx))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// All vectors, or the first failure.
    pub fn into_vectors(self) -> Result<Vec<Vec<f32>>> {
        if let Some(first) = self.failures.first() {
            let inputs = self.failed_inputs();
            return Err(Error::EncoderUnavailable {
                inputs,
                reason: first.reason.clone(),
            });
        }
        if self.cancelled && !self.is_complete() {
            return Err(Error::Cancelled);
        }
        Ok(self.vectors.into_iter().flatten().collect())
    }
}

/// Drives an [`EmbeddingProvider`] under the vector contract.
pub struct EmbeddingBatcher {
    provider: Box<dyn EmbeddingProvider>,
    batch_size: usize,
    max_chars: usize,
    dimension: Option<usize>,
}

impl EmbeddingBatcher {
    pub fn new(provider: Box<dyn EmbeddingProvider>) -> Self {
        let batch_size = provider.batch_size().max(1);
        Self {
            provider,
            batch_size,
            max_chars: DEFAULT_MAX_CHARS,
            dimension: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Dimension seen so far, if any vector has been produced.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// The exact text the provider will see for `text`.
    pub fn prepare<'a>(&self, text: &'a str) -> Cow<'a, str> {
        truncate_to_chars(text, self.max_chars)
    }

    pub fn embed(&mut self, texts: &[String]) -> EmbedOutcome {
        self.embed_with_cancel(texts, &CancelFlag::new())
    }

    /// Embed `texts`, checking `cancel` before each sub-batch.
    pub fn embed_with_cancel(&mut self, texts: &[String], cancel: &CancelFlag) -> EmbedOutcome {
        let mut outcome = EmbedOutcome {
            vectors: vec![None; texts.len()],
            ..Default::default()
        };

        let mut start = 0;
        while start < texts.len() {
            if cancel.is_cancelled() {
                debug!("embedding cancelled at input {}", start);
                outcome.cancelled = true;
                break;
            }
            let range = start..(start + self.batch_size).min(texts.len());
            start = range.end;

            let prepared: Vec<String> = texts[range.clone()]
                .iter()
                .map(|t| self.prepare(t).into_owned())
                .collect();

            match self.embed_sub_batch(&prepared) {
                Ok(vectors) => {
                    for (slot, vector) in outcome.vectors[range].iter_mut().zip(vectors) {
                        *slot = Some(vector);
                    }
                }
                Err(reason) => {
                    warn!(
                        "embedding failed for inputs {}..{}: {}",
                        range.start, range.end, reason
                    );
                    outcome.failures.push(BatchFailure {
                        inputs: range_indices(range),
                        reason,
                    });
                }
            }
        }

        outcome
    }

    /// Embed a free-text query with the same truncation and normalization.
    pub fn embed_query(&mut self, query: &str) -> Result<Vec<f32>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidQuery("query text is empty".into()));
        }
        let prepared = vec![self.prepare(query).into_owned()];
        let mut vectors = self
            .embed_sub_batch(&prepared)
            .map_err(|reason| Error::EncoderUnavailable {
                inputs: vec![0],
                reason,
            })?;
        vectors
            .pop()
            .ok_or_else(|| Error::EncoderUnavailable {
                inputs: vec![0],
                reason: "no embedding returned".into(),
            })
    }

    /// Returns normalized vectors, or why the sub-batch as a whole failed.
    fn embed_sub_batch(&mut self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, String> {
        let mut vectors = self
            .provider
            .embed_texts(texts)
            .map_err(|e| format!("{:#}", e))?;

        if vectors.len() != texts.len() {
            return Err(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            ));
        }

        let expected = self.dimension.or_else(|| vectors.first().map(Vec::len));
        for (offset, vector) in vectors.iter_mut().enumerate() {
            if vector.is_empty() {
                return Err(format!("empty vector for input {}", offset));
            }
            if Some(vector.len()) != expected {
                return Err(format!(
                    "dimension {} differs from {}",
                    vector.len(),
                    expected.unwrap_or_default()
                ));
            }
            if !l2_normalize(vector) {
                return Err(format!("zero or non-finite vector for input {}", offset));
            }
        }

        if self.dimension.is_none() {
            self.dimension = expected;
        }
        Ok(vectors)
    }
}

fn range_indices(range: Range<usize>) -> Vec<usize> {
    range.collect()
}

/// Keep the first `max_chars` characters; `0` disables truncation.
pub fn truncate_to_chars(input: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 {
        return Cow::Borrowed(input);
    }

    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}
