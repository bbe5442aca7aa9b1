// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exhaustive cosine top-k over a [`VectorCollection`].

use rayon::prelude::*;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::collection::VectorCollection;
use crate::errors::{Error, Result};
use crate::unit::UnitRef;
use crate::vector::{dot, l2_normalize};

/// Collections smaller than this are scored on the calling thread.
const PARALLEL_THRESHOLD: usize = 4096;

/// One ranked match.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub score: f32,
    pub index: usize,
    pub unit_ref: UnitRef,
}

/// Scored row used for top-k selection. Greater means ranked earlier.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f32,
    index: usize,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Returns the `min(k, N)` records most similar to `query`, best first.
///
/// The query is normalized before scoring. Equal scores rank by ascending
/// insertion index. The collection is only read.
pub fn search(collection: &VectorCollection, query: &[f32], k: usize) -> Result<Vec<QueryResult>> {
    if k == 0 {
        return Err(Error::InvalidQuery("k must be at least 1".into()));
    }
    let query = normalized_query(collection, query)?;
    let Some(dimension) = collection.dimension() else {
        return Ok(Vec::new());
    };

    let vectors = collection.raw_vectors();
    let scores: Vec<f32> = if collection.len() >= PARALLEL_THRESHOLD {
        vectors
            .par_chunks_exact(dimension)
            .map(|row| canonical(dot(&query, row)))
            .collect()
    } else {
        vectors
            .chunks_exact(dimension)
            .map(|row| canonical(dot(&query, row)))
            .collect()
    };

    Ok(top_k(&scores, k)
        .into_iter()
        .filter_map(|c| {
            collection.unit_ref(c.index).map(|unit_ref| QueryResult {
                score: c.score,
                index: c.index,
                unit_ref: unit_ref.clone(),
            })
        })
        .collect())
}

fn normalized_query(collection: &VectorCollection, query: &[f32]) -> Result<Vec<f32>> {
    if query.is_empty() {
        return Err(Error::InvalidQuery("query vector is empty".into()));
    }
    if let Some(expected) = collection.dimension() {
        if query.len() != expected {
            return Err(Error::InvalidQuery(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                expected
            )));
        }
    }

    let mut query = query.to_vec();
    if !l2_normalize(&mut query) {
        return Err(Error::InvalidQuery(
            "query vector has zero or non-finite norm".into(),
        ));
    }
    Ok(query)
}

/// Folds `-0.0` into `0.0` so equal scores compare equal under `total_cmp`.
fn canonical(score: f32) -> f32 {
    if score == 0.0 {
        0.0
    } else {
        score
    }
}

fn top_k(scores: &[f32], k: usize) -> Vec<Candidate> {
    let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k.min(scores.len()) + 1);
    for (index, &score) in scores.iter().enumerate() {
        let candidate = Candidate { score, index };
        if heap.len() < k {
            heap.push(Reverse(candidate));
        } else if let Some(Reverse(worst)) = heap.peek() {
            if candidate > *worst {
                heap.pop();
                heap.push(Reverse(candidate));
            }
        }
    }
    heap.into_sorted_vec().into_iter().map(|Reverse(c)| c).collect()
}
