// SPDX-License-Identifier: MIT OR Apache-2.0

//! fnseek - Semantic search over source-code functions
//!
//! Shared modules for the fnseek CLI tool: function extraction with
//! tree-sitter, batched embedding, an append-only vector index, and exact
//! cosine top-k search.

pub mod cancel;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod errors;
pub mod index;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod query;
pub mod unit;
pub mod vector;

pub use errors::{Error, Result};
