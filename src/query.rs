// SPDX-License-Identifier: MIT OR Apache-2.0

//! Free-text queries against the live index.

use serde::Serialize;
use std::sync::Arc;

use crate::embedding::EmbeddingBatcher;
use crate::errors::{Error, Result};
use crate::index::{IndexHandle, VectorCollection};
use crate::unit::UnitRef;

/// One ranked result, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// 1-based rank
    pub rank: usize,
    pub score: f32,
    #[serde(flatten)]
    pub unit_ref: UnitRef,
    /// `owner/repository/file#Lstart-Lend`, or without owner when none is set
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Embeds query text with the index's encoder and searches the current snapshot.
pub struct QueryEngine {
    batcher: EmbeddingBatcher,
    index: Arc<IndexHandle>,
    owner: Option<String>,
}

impl QueryEngine {
    pub fn new(batcher: EmbeddingBatcher, index: Arc<IndexHandle>) -> Self {
        Self {
            batcher,
            index,
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: Option<String>) -> Self {
        self.owner = owner;
        self
    }

    pub fn index(&self) -> &Arc<IndexHandle> {
        &self.index
    }

    /// Ranked hits for `query`, best first.
    pub fn search_text(&mut self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(Error::InvalidQuery("k must be at least 1".into()));
        }
        let snapshot = self.index.snapshot();
        check_encoder(&snapshot, self.batcher.model_id())?;

        let vector = self.batcher.embed_query(query)?;
        let results = crate::index::search(&snapshot, &vector, k)?;

        Ok(results
            .into_iter()
            .enumerate()
            .map(|(i, result)| {
                let (link, url) = match self.owner.as_deref() {
                    Some(owner) => (
                        result.unit_ref.display_link(owner),
                        Some(result.unit_ref.github_url(owner)),
                    ),
                    None => (result.unit_ref.location(), None),
                };
                SearchHit {
                    rank: i + 1,
                    score: result.score,
                    unit_ref: result.unit_ref,
                    link,
                    url,
                }
            })
            .collect())
    }
}

/// Indexes saved without a manifest accept any encoder.
fn check_encoder(collection: &VectorCollection, model_id: &str) -> Result<()> {
    let stored = collection.model_id();
    if stored != crate::index::storage::UNKNOWN_MODEL && stored != model_id {
        return Err(Error::EncoderMismatch {
            expected: stored.to_string(),
            actual: model_id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;
    use crate::unit::CodeUnit;

    fn unit(file: &str, line: u32, text: &str) -> CodeUnit {
        CodeUnit {
            repository_id: "toolkit".into(),
            revision: "v2".into(),
            file_path: file.into(),
            start_line: line,
            end_line: line + 1,
            text: text.into(),
        }
    }

    fn engine(owner: Option<&str>) -> QueryEngine {
        let units = [
            unit("net.py", 1, "def open_socket(host, port): connect socket host port"),
            unit("io.py", 4, "def read_config(path): parse toml config file"),
            unit("math.py", 9, "def add_numbers(a, b): return a plus b"),
        ];
        let mut batcher = EmbeddingBatcher::new(Box::new(HashingProvider::new(64)));
        let mut collection = VectorCollection::new(batcher.model_id());
        let texts: Vec<String> = units.iter().map(|u| u.text.clone()).collect();
        let vectors = batcher.embed(&texts).into_vectors().unwrap();
        for (unit, vector) in units.iter().zip(vectors) {
            collection.append(vector, unit.unit_ref()).unwrap();
        }
        QueryEngine::new(batcher, Arc::new(IndexHandle::new(collection)))
            .with_owner(owner.map(str::to_string))
    }

    #[test]
    fn test_exact_text_ranks_first() {
        let mut engine = engine(Some("acme"));
        let hits = engine
            .search_text("def read_config(path): parse toml config file", 2)
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[0].unit_ref.file_path, "io.py");
        assert!((hits[0].score - 1.0).abs() < 1e-4);
        assert_eq!(hits[0].link, "acme/toolkit/io.py#L4-L5");
        assert_eq!(
            hits[0].url.as_deref(),
            Some("https://github.com/acme/toolkit/blob/v2/io.py#L4-L5")
        );
    }

    #[test]
    fn test_link_without_owner() {
        let mut engine = engine(None);
        let hits = engine.search_text("add numbers", 10).unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.url.is_none()));
        assert!(hits.iter().any(|h| h.link == "toolkit/math.py#L9-L10"));
    }

    #[test]
    fn test_empty_query_and_zero_k_rejected() {
        let mut engine = engine(None);
        assert!(matches!(engine.search_text("", 3), Err(Error::InvalidQuery(_))));
        assert!(matches!(engine.search_text("socket", 0), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_other_encoder_rejected() {
        let batcher = EmbeddingBatcher::new(Box::new(HashingProvider::new(64)));
        let collection = VectorCollection::new("another-model");
        let mut engine = QueryEngine::new(batcher, Arc::new(IndexHandle::new(collection)));
        assert!(matches!(
            engine.search_text("socket", 3),
            Err(Error::EncoderMismatch { .. })
        ));
    }

    #[test]
    fn test_hit_serializes_flat() {
        let mut engine = engine(Some("acme"));
        let hits = engine.search_text("open socket", 1).unwrap();
        let json = serde_json::to_value(&hits[0]).unwrap();
        assert_eq!(json["rank"], 1);
        assert!(json["repo_name"].is_string());
        assert!(json["line"].is_number());
        assert!(json["link"].as_str().unwrap().starts_with("acme/toolkit/"));
    }
}
