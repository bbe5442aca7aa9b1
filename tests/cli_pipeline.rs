// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use assert_cmd::cargo::cargo_bin_cmd;
use fnseek::corpus::read_units;
use fnseek::index::load_index;
use predicates::prelude::*;

const MATH_PY: &str = "def add(a, b):\n    return a + b\n\n\ndef scale(values, factor):\n    def mul(v):\n        return v * factor\n    return [mul(v) for v in values]\n";

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn write_hashing_config(root: &Path) {
    fs::write(
        root.join(".fnseekrc.toml"),
        format!(
            r#"
[embeddings]
provider = "hashing"
dimension = 64
cache_path = "{}"

[search]
owner = "acme"
"#,
            root.join("cache.sqlite").display()
        ),
    )
    .unwrap();
}

/// Corpus with one archive-style checkout (single wrapper directory).
fn write_corpus(root: &Path) {
    let checkout = root.join("corpus").join("toolkit_v1").join("toolkit-v1");
    write_file(&checkout.join("pkg").join("math.py"), MATH_PY);
    write_file(&checkout.join("pkg").join("broken.py"), "def broken(:\n    pass\n");
    write_file(&checkout.join("README.md"), "# toolkit\n");
    write_file(
        &checkout.join("src").join("lib.rs"),
        "pub fn parse_header(line: &str) -> Option<&str> {\n    line.strip_prefix(\"# \")\n}\n",
    );
}

fn fnseek(root: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("fnseek");
    cmd.current_dir(root).env("NO_COLOR", "1");
    cmd
}

fn extract_and_embed(root: &Path) {
    fnseek(root)
        .args(["extract", "--input", "corpus", "--output", "units"])
        .assert()
        .success();
    fnseek(root)
        .args(["embed", "--input", "units", "--output", "index"])
        .assert()
        .success();
}

#[test]
fn extract_writes_one_unit_file_per_checkout() {
    let dir = TempDir::new().unwrap();
    write_hashing_config(dir.path());
    write_corpus(dir.path());

    fnseek(dir.path())
        .args(["extract", "--input", "corpus", "--output", "units"])
        .assert()
        .success()
        .stdout(predicate::str::contains("toolkit_v1: 4 units"));

    let units = read_units(dir.path().join("units").join("toolkit_v1.jsonl")).unwrap();
    let spans: Vec<(&str, u32, u32)> = units
        .iter()
        .map(|u| (u.file_path.as_str(), u.start_line, u.end_line))
        .collect();
    assert_eq!(
        spans,
        vec![
            ("pkg/math.py", 1, 2),
            ("pkg/math.py", 5, 8),
            ("pkg/math.py", 6, 7),
            ("src/lib.rs", 1, 3),
        ]
    );
    assert_eq!(units[0].text, "def add(a, b):\n    return a + b");
    assert!(units.iter().all(|u| u.repository_id == "toolkit" && u.revision == "v1"));
}

#[test]
fn extract_reports_skipped_files_as_json() {
    let dir = TempDir::new().unwrap();
    write_hashing_config(dir.path());
    write_corpus(dir.path());

    let output = fnseek(dir.path())
        .args(["--format", "json", "extract", "-i", "corpus", "-o", "units"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let checkout = &value[0];
    assert_eq!(checkout["repo_name"], "toolkit");
    assert_eq!(checkout["ref"], "v1");
    assert_eq!(checkout["units"], 4);
    let skipped: Vec<&str> = checkout["skipped"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["path"].as_str().unwrap())
        .collect();
    assert!(skipped.contains(&"pkg/broken.py"));
}

#[test]
fn extract_fails_without_checkouts() {
    let dir = TempDir::new().unwrap();
    write_hashing_config(dir.path());
    fs::create_dir_all(dir.path().join("empty")).unwrap();

    fnseek(dir.path())
        .args(["extract", "--input", "empty", "--output", "units"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No checkouts found"));
}

#[test]
fn embed_builds_index_matching_units() {
    let dir = TempDir::new().unwrap();
    write_hashing_config(dir.path());
    write_corpus(dir.path());
    extract_and_embed(dir.path());

    let index_dir = dir.path().join("index");
    assert!(index_dir.join("embeddings.npy").is_file());
    assert!(index_dir.join("meta_infos.json").is_file());
    assert!(index_dir.join("manifest.json").is_file());

    let collection = load_index(&index_dir).unwrap();
    assert_eq!(collection.len(), 4);
    assert_eq!(collection.dimension(), Some(64));
    assert_eq!(collection.model_id(), "hashing-64");
    assert_eq!(collection.unit_ref(1).unwrap().start_line, 5);
}

#[test]
fn embed_rebuild_hits_cache() {
    let dir = TempDir::new().unwrap();
    write_hashing_config(dir.path());
    write_corpus(dir.path());
    extract_and_embed(dir.path());

    let output = fnseek(dir.path())
        .args(["--format", "json", "embed", "-i", "units", "-o", "index"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["cache_hits"], 4);
    assert_eq!(value["encoded"], 0);
    assert_eq!(value["total"], 4);
}

#[test]
fn embed_append_skips_indexed_units() {
    let dir = TempDir::new().unwrap();
    write_hashing_config(dir.path());
    write_corpus(dir.path());
    extract_and_embed(dir.path());

    for _ in 0..2 {
        let output = fnseek(dir.path())
            .args(["--format", "json", "embed", "-i", "units", "-o", "index", "--append"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value["added"], 0);
        assert_eq!(value["already_indexed"], 4);
        assert_eq!(value["total"], 4);
        assert_eq!(value["failed_units"], serde_json::json!([]));
    }

    assert_eq!(load_index(&dir.path().join("index")).unwrap().len(), 4);
}

#[test]
fn search_finds_exact_function_first() {
    let dir = TempDir::new().unwrap();
    write_hashing_config(dir.path());
    write_corpus(dir.path());
    extract_and_embed(dir.path());

    let output = fnseek(dir.path())
        .args([
            "--format",
            "json",
            "search",
            "def add(a, b):\n    return a + b",
            "--index",
            "index",
            "-k",
            "2",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let hits: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["link"], "acme/toolkit/pkg/math.py#L1-L2");
    assert_eq!(
        hits[0]["url"],
        "https://github.com/acme/toolkit/blob/v1/pkg/math.py#L1-L2"
    );
    assert!((hits[0]["score"].as_f64().unwrap() - 1.0).abs() < 1e-4);
    assert!(hits[0]["score"].as_f64() >= hits[1]["score"].as_f64());
}

#[test]
fn search_clamps_k_to_index_size() {
    let dir = TempDir::new().unwrap();
    write_hashing_config(dir.path());
    write_corpus(dir.path());
    extract_and_embed(dir.path());

    let output = fnseek(dir.path())
        .args(["--format", "json", "search", "scale values", "--index", "index", "-k", "100"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let hits: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 4);
}

#[test]
fn search_text_output_uses_owner_flag() {
    let dir = TempDir::new().unwrap();
    write_hashing_config(dir.path());
    write_corpus(dir.path());
    extract_and_embed(dir.path());

    fnseek(dir.path())
        .args(["search", "parse header", "--index", "index", "--owner", "octo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("octo/toolkit/src/lib.rs#L1-L3"));
}

#[test]
fn search_rejects_zero_k() {
    let dir = TempDir::new().unwrap();
    write_hashing_config(dir.path());
    write_corpus(dir.path());
    extract_and_embed(dir.path());

    fnseek(dir.path())
        .args(["search", "add", "--index", "index", "-k", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid query"));
}

#[test]
fn search_missing_index_fails() {
    let dir = TempDir::new().unwrap();
    write_hashing_config(dir.path());

    fnseek(dir.path())
        .args(["search", "add", "--index", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load index"));
}

#[test]
fn stats_reports_counts() {
    let dir = TempDir::new().unwrap();
    write_hashing_config(dir.path());
    write_corpus(dir.path());
    extract_and_embed(dir.path());

    let output = fnseek(dir.path())
        .args(["--format", "json", "stats", "--index", "index"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["units"], 4);
    assert_eq!(stats["files"], 2);
    assert_eq!(stats["dimension"], 64);
    assert_eq!(stats["model"], "hashing-64");
    assert_eq!(stats["repositories"]["toolkit_v1"], 4);
    assert_eq!(stats["cache"]["vectors"], 4);
}

#[test]
fn completions_generate_for_bash() {
    let mut cmd = cargo_bin_cmd!("fnseek");
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fnseek"));
}
