// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector collection, its on-disk form, and similarity search.

pub mod collection;
pub mod handle;
pub mod search;
pub mod storage;

pub use collection::{EmbeddingRecord, VectorCollection};
pub use handle::IndexHandle;
pub use search::{search, QueryResult};
pub use storage::{index_exists, load_index, read_manifest, save_index, IndexManifest};
