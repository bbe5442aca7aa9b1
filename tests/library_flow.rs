// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use tempfile::TempDir;

use fnseek::cancel::CancelFlag;
use fnseek::embedding::{EmbeddingBatcher, EmbeddingCache, HashingProvider};
use fnseek::index::{load_index, save_index, IndexHandle, VectorCollection};
use fnseek::parser::UnitExtractor;
use fnseek::pipeline::{embed_units, extract_files};
use fnseek::query::QueryEngine;
use fnseek::unit::SourceFile;
use fnseek::vector::is_unit;
use indicatif::ProgressBar;

fn source(repo: &str, path: &str, content: &str) -> SourceFile {
    SourceFile {
        repository_id: repo.into(),
        revision: "main".into(),
        file_path: path.into(),
        content: content.into(),
    }
}

fn corpus() -> Vec<SourceFile> {
    vec![
        source(
            "netkit",
            "net/client.py",
            "def connect(host, port):\n    return open_socket(host, port)\n\n\ndef close(sock):\n    sock.close()\n",
        ),
        source(
            "netkit",
            "net/retry.go",
            "package net\n\nfunc Retry(attempts int, fn func() error) error {\n\tfor i := 0; i < attempts; i++ {\n\t\tif err := fn(); err == nil {\n\t\t\treturn nil\n\t\t}\n\t}\n\treturn fn()\n}\n",
        ),
        source(
            "mathlib",
            "src/stats.rs",
            "pub fn mean(values: &[f64]) -> f64 {\n    values.iter().sum::<f64>() / values.len() as f64\n}\n",
        ),
    ]
}

fn build(cache: Option<&mut EmbeddingCache>) -> VectorCollection {
    let report = extract_files(
        &corpus(),
        &UnitExtractor::new(),
        &CancelFlag::new(),
        &ProgressBar::hidden(),
    );
    assert!(report.skipped.is_empty());

    let mut batcher = EmbeddingBatcher::new(Box::new(HashingProvider::new(128)));
    let mut collection = VectorCollection::new(batcher.model_id());
    embed_units(
        &report.units,
        &mut batcher,
        cache,
        &mut collection,
        &CancelFlag::new(),
        &ProgressBar::hidden(),
    )
    .unwrap();
    collection
}

#[test]
fn every_function_becomes_one_indexed_unit() {
    let collection = build(None);
    let spans: Vec<(&str, u32, u32)> = collection
        .metadata()
        .iter()
        .map(|r| (r.file_path.as_str(), r.start_line, r.end_line))
        .collect();
    assert_eq!(
        spans,
        vec![
            ("net/client.py", 1, 2),
            ("net/client.py", 5, 6),
            ("net/retry.go", 3, 10),
            ("src/stats.rs", 1, 3),
        ]
    );
    for (_, vector, _) in collection.iter() {
        assert!(is_unit(vector));
    }
}

#[test]
fn saved_index_answers_like_the_original() {
    let dir = TempDir::new().unwrap();
    let collection = build(None);
    save_index(&collection, dir.path()).unwrap();
    let loaded = load_index(dir.path()).unwrap();
    assert_eq!(loaded, collection);

    let batcher = EmbeddingBatcher::new(Box::new(HashingProvider::new(128)));
    let mut engine = QueryEngine::new(batcher, Arc::new(IndexHandle::new(loaded)))
        .with_owner(Some("acme".into()));
    let hits = engine
        .search_text("pub fn mean(values: &[f64]) -> f64 {\n    values.iter().sum::<f64>() / values.len() as f64\n}", 3)
        .unwrap();

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].link, "acme/mathlib/src/stats.rs#L1-L3");
    assert!((hits[0].score - 1.0).abs() < 1e-4);
}

#[test]
fn cached_rebuild_matches_fresh_build() {
    let dir = TempDir::new().unwrap();
    let mut cache = EmbeddingCache::open(dir.path().join("cache.sqlite")).unwrap();
    let first = build(Some(&mut cache));
    let second = build(Some(&mut cache));
    assert_eq!(first, second);
    assert_eq!(cache.count(first.model_id()).unwrap(), 4);
}

#[test]
fn swapped_index_serves_new_results() {
    let handle = Arc::new(IndexHandle::new(VectorCollection::new("hashing-128")));
    let batcher = EmbeddingBatcher::new(Box::new(HashingProvider::new(128)));
    let mut engine = QueryEngine::new(batcher, Arc::clone(&handle));

    assert!(engine.search_text("connect to host", 5).unwrap().is_empty());

    handle.replace(build(None));
    let hits = engine.search_text("connect to host", 5).unwrap();
    assert_eq!(hits.len(), 4);
}
