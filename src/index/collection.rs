// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only collection of embedding vectors and their unit references.
//!
//! Vectors live in one row-major `N x D` buffer; row `i` and `metadata[i]`
//! always describe the same unit. Rows are assigned densely in insertion
//! order and are never updated or removed.

use std::ops::Range;

use crate::errors::{Error, Result};
use crate::unit::UnitRef;

/// One vector plus the unit it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub vector: Vec<f32>,
    pub unit_ref: UnitRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorCollection {
    model_id: String,
    dimension: Option<usize>,
    vectors: Vec<f32>,
    metadata: Vec<UnitRef>,
}

impl VectorCollection {
    /// Empty collection for vectors produced by `model_id`.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            dimension: None,
            vectors: Vec::new(),
            metadata: Vec::new(),
        }
    }

    /// Empty collection with its dimension fixed up front.
    pub fn with_dimension(model_id: impl Into<String>, dimension: usize) -> Self {
        Self {
            dimension: (dimension > 0).then_some(dimension),
            ..Self::new(model_id)
        }
    }

    /// Rebuild a collection from its stored tables.
    pub fn from_parts(
        model_id: impl Into<String>,
        dimension: Option<usize>,
        vectors: Vec<f32>,
        metadata: Vec<UnitRef>,
    ) -> Result<Self> {
        let rows = match dimension {
            Some(0) => {
                return Err(Error::IndexConsistency("dimension must be positive".into()));
            }
            Some(d) if vectors.len() % d == 0 => vectors.len() / d,
            Some(d) => {
                return Err(Error::IndexConsistency(format!(
                    "{} values do not form rows of dimension {}",
                    vectors.len(),
                    d
                )));
            }
            None if vectors.is_empty() => 0,
            None => {
                return Err(Error::IndexConsistency(
                    "vectors present but dimension unknown".into(),
                ));
            }
        };
        if rows != metadata.len() {
            return Err(Error::IndexConsistency(format!(
                "{} vectors but {} metadata records",
                rows,
                metadata.len()
            )));
        }
        if vectors.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFiniteVector);
        }

        Ok(Self {
            model_id: model_id.into(),
            dimension,
            vectors,
            metadata,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Row-major vector buffer, `len() * dimension()` values.
    pub fn raw_vectors(&self) -> &[f32] {
        &self.vectors
    }

    pub fn metadata(&self) -> &[UnitRef] {
        &self.metadata
    }

    pub fn vector(&self, index: usize) -> Option<&[f32]> {
        let d = self.dimension?;
        self.vectors.get(index * d..(index + 1) * d)
    }

    pub fn unit_ref(&self, index: usize) -> Option<&UnitRef> {
        self.metadata.get(index)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[f32], &UnitRef)> {
        let d = self.dimension.unwrap_or(1);
        self.vectors
            .chunks_exact(d)
            .zip(&self.metadata)
            .enumerate()
            .map(|(idx, (vector, unit_ref))| (idx, vector, unit_ref))
    }

    /// Append one record and return its index.
    pub fn append(&mut self, vector: Vec<f32>, unit_ref: UnitRef) -> Result<usize> {
        let dimension = self.check_vector(&vector, self.dimension)?;
        self.dimension = Some(dimension);
        self.vectors.extend_from_slice(&vector);
        self.metadata.push(unit_ref);
        Ok(self.metadata.len() - 1)
    }

    /// Append records as one unit: if any record is rejected nothing is added.
    pub fn append_batch(&mut self, records: Vec<EmbeddingRecord>) -> Result<Range<usize>> {
        let mut dimension = self.dimension;
        for record in &records {
            dimension = Some(self.check_vector(&record.vector, dimension)?);
        }

        let start = self.len();
        self.vectors.reserve(records.len() * dimension.unwrap_or(0));
        self.metadata.reserve(records.len());
        for record in records {
            self.vectors.extend_from_slice(&record.vector);
            self.metadata.push(record.unit_ref);
        }
        if !self.is_empty() {
            self.dimension = dimension;
        }
        Ok(start..self.len())
    }

    /// Append every record of `other`, keeping its order.
    pub fn merge(&mut self, other: &VectorCollection) -> Result<Range<usize>> {
        if other.model_id != self.model_id {
            return Err(Error::EncoderMismatch {
                expected: self.model_id.clone(),
                actual: other.model_id.clone(),
            });
        }
        if let (Some(expected), Some(actual)) = (self.dimension, other.dimension) {
            if expected != actual {
                return Err(Error::DimensionMismatch { expected, actual });
            }
        }

        let start = self.len();
        self.vectors.extend_from_slice(&other.vectors);
        self.metadata.extend(other.metadata.iter().cloned());
        if self.dimension.is_none() {
            self.dimension = other.dimension;
        }
        Ok(start..self.len())
    }

    /// Validate `vector` against `dimension`, returning the dimension to use.
    fn check_vector(&self, vector: &[f32], dimension: Option<usize>) -> Result<usize> {
        match dimension {
            Some(expected) if vector.len() != expected => Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            }),
            None if vector.is_empty() => Err(Error::EmptyVector),
            _ if vector.iter().any(|v| !v.is_finite()) => Err(Error::NonFiniteVector),
            _ => Ok(vector.len()),
        }
    }
}
