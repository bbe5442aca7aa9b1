// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - turns unit text and queries into unit-length vectors
//!
//! Providers wrap an external encoder, the batcher enforces truncation,
//! normalization and partial-failure reporting, and the cache avoids
//! re-encoding unchanged text across rebuilds.

pub mod batch;
pub mod cache;
pub mod provider;

pub use batch::{BatchFailure, EmbedOutcome, EmbeddingBatcher, DEFAULT_MAX_CHARS};
pub use cache::{content_hash, EmbeddingCache};
#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub use provider::{FastEmbedConfig, FastEmbedder};
pub use provider::{create_provider, CommandProvider, EmbeddingProvider, HashingProvider};
