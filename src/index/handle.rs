// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared, swappable reference to the live collection.
//!
//! Readers take a snapshot and search it without locking. A rebuild
//! publishes a whole new collection; searches already running keep the
//! snapshot they started with.

use arc_swap::ArcSwap;
use std::path::Path;
use std::sync::Arc;

use super::collection::VectorCollection;
use super::search::{search, QueryResult};
use super::storage::load_index;
use crate::errors::Result;

#[derive(Debug)]
pub struct IndexHandle {
    current: ArcSwap<VectorCollection>,
}

impl IndexHandle {
    pub fn new(collection: VectorCollection) -> Self {
        Self {
            current: ArcSwap::from_pointee(collection),
        }
    }

    /// Load the index stored in `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        Ok(Self::new(load_index(dir)?))
    }

    pub fn snapshot(&self) -> Arc<VectorCollection> {
        self.current.load_full()
    }

    /// Publish `collection` and return the one it replaced.
    pub fn replace(&self, collection: VectorCollection) -> Arc<VectorCollection> {
        self.current.swap(Arc::new(collection))
    }

    /// Reload from `dir`; the current collection stays live if loading fails.
    pub fn reload(&self, dir: &Path) -> Result<Arc<VectorCollection>> {
        let collection = load_index(dir)?;
        Ok(self.replace(collection))
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<QueryResult>> {
        let snapshot = self.current.load();
        search(&snapshot, query, k)
    }
}
