// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk layout of a built index.
//!
//! An index directory holds three files:
//! - `embeddings.npy`: NumPy v1.0 array, little-endian `f32`, C order, shape `(N, D)`
//! - `meta_infos.json`: JSON array of `N` unit references, row order
//! - `manifest.json`: encoder id, dimension and record count
//!
//! Each file is written to a temporary sibling and renamed into place.
//! Indexes without a manifest still load; their encoder id is unknown.

use memmap2::Mmap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::collection::VectorCollection;
use crate::errors::{Error, Result};
use crate::unit::UnitRef;

pub const EMBEDDINGS_FILE: &str = "embeddings.npy";
pub const METADATA_FILE: &str = "meta_infos.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Current manifest layout.
pub const FORMAT_VERSION: u32 = 1;

/// Encoder id recorded for indexes that predate the manifest.
pub const UNKNOWN_MODEL: &str = "unknown";

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_ALIGN: usize = 64;

static DESCR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'descr'\s*:\s*'([^']*)'").expect("valid descr regex"));
static FORTRAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'fortran_order'\s*:\s*(True|False)").expect("valid order regex"));
static SHAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'shape'\s*:\s*\(([^)]*)\)").expect("valid shape regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub model_id: String,
    pub dimension: Option<usize>,
    pub count: usize,
}

impl IndexManifest {
    pub fn for_collection(collection: &VectorCollection) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            model_id: collection.model_id().to_string(),
            dimension: collection.dimension(),
            count: collection.len(),
        }
    }
}

/// Writes `collection` into `dir`, creating it if needed.
pub fn save_index(collection: &VectorCollection, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let rows = collection.len();
    let cols = collection.dimension().unwrap_or(0);

    let npy_path = dir.join(EMBEDDINGS_FILE);
    write_atomic(&npy_path, |w| write_npy(w, rows, cols, collection.raw_vectors()))?;

    let meta_path = dir.join(METADATA_FILE);
    write_atomic(&meta_path, |w| {
        serde_json::to_writer(&mut *w, collection.metadata()).map_err(std::io::Error::from)
    })?;

    let manifest = IndexManifest::for_collection(collection);
    let manifest_path = dir.join(MANIFEST_FILE);
    write_atomic(&manifest_path, |w| {
        serde_json::to_writer_pretty(&mut *w, &manifest).map_err(std::io::Error::from)
    })?;

    debug!(
        "Saved index with {} vectors (dim {}) to {}",
        rows,
        cols,
        dir.display()
    );
    Ok(())
}

/// Loads an index previously written by [`save_index`].
pub fn load_index(dir: &Path) -> Result<VectorCollection> {
    let manifest = read_manifest(dir)?;
    let (rows, cols, vectors) = read_npy(&dir.join(EMBEDDINGS_FILE))?;

    let meta_path = dir.join(METADATA_FILE);
    let file = File::open(&meta_path).map_err(|e| Error::io(&meta_path, e))?;
    let metadata: Vec<UnitRef> = serde_json::from_reader(std::io::BufReader::new(file))?;

    if rows != metadata.len() {
        return Err(Error::IndexConsistency(format!(
            "{} has {} rows but {} lists {} units",
            EMBEDDINGS_FILE,
            rows,
            METADATA_FILE,
            metadata.len()
        )));
    }

    let model_id = match &manifest {
        Some(manifest) => {
            if manifest.count != rows {
                return Err(Error::IndexConsistency(format!(
                    "manifest records {} units but {} has {} rows",
                    manifest.count, EMBEDDINGS_FILE, rows
                )));
            }
            if rows > 0 && manifest.dimension != Some(cols) {
                return Err(Error::IndexConsistency(format!(
                    "manifest dimension {:?} does not match stored dimension {}",
                    manifest.dimension, cols
                )));
            }
            manifest.model_id.clone()
        }
        None => {
            warn!(
                "No {} in {}; encoder id unknown",
                MANIFEST_FILE,
                dir.display()
            );
            UNKNOWN_MODEL.to_string()
        }
    };

    let dimension = if cols > 0 {
        Some(cols)
    } else {
        manifest.and_then(|m| m.dimension)
    };

    VectorCollection::from_parts(model_id, dimension, vectors, metadata)
}

/// Reads only the manifest, if present.
pub fn read_manifest(dir: &Path) -> Result<Option<IndexManifest>> {
    let path = dir.join(MANIFEST_FILE);
    match fs::read_to_string(&path) {
        Ok(text) => {
            let manifest: IndexManifest = serde_json::from_str(&text)?;
            if manifest.format_version > FORMAT_VERSION {
                return Err(Error::IndexConsistency(format!(
                    "unsupported index format version {}",
                    manifest.format_version
                )));
            }
            Ok(Some(manifest))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// True when `dir` looks like an index directory.
pub fn index_exists(dir: &Path) -> bool {
    dir.join(EMBEDDINGS_FILE).is_file() && dir.join(METADATA_FILE).is_file()
}

fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let tmp = tmp_path(path);
    let file = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
    let mut writer = BufWriter::new(file);
    let written = write(&mut writer)
        .and_then(|_| writer.flush())
        .and_then(|_| writer.get_ref().sync_all());
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(Error::io(&tmp, e));
    }
    drop(writer);
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_npy<W: Write>(w: &mut W, rows: usize, cols: usize, data: &[f32]) -> std::io::Result<()> {
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        rows, cols
    );
    // magic + version + u16 length + header + newline must be a multiple of 64
    let unpadded = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');

    let header_len = u16::try_from(header.len())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "npy header too long"))?;

    w.write_all(NPY_MAGIC)?;
    w.write_all(&[1, 0])?;
    w.write_all(&header_len.to_le_bytes())?;
    w.write_all(header.as_bytes())?;
    for value in data {
        w.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

fn read_npy(path: &Path) -> Result<(usize, usize, Vec<f32>)> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    // SAFETY: the file is opened read-only and the map is dropped before returning.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::io(path, e))?;
    parse_npy(&mmap)
}

fn parse_npy(bytes: &[u8]) -> Result<(usize, usize, Vec<f32>)> {
    let bad = |reason: &str| Error::IndexConsistency(format!("{}: {}", EMBEDDINGS_FILE, reason));

    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(bad("not a NumPy array file"));
    }
    let (header_start, header_len) = match bytes[6] {
        1 => (10, u16::from_le_bytes([bytes[8], bytes[9]]) as usize),
        2 | 3 if bytes.len() >= 12 => (
            12,
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
        ),
        _ => return Err(bad("unsupported format version")),
    };
    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err(bad("truncated header"));
    }
    let header = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|_| bad("header is not text"))?;

    let descr = DESCR_RE
        .captures(header)
        .map(|c| c[1].to_string())
        .ok_or_else(|| bad("missing descr"))?;
    if descr != "<f4" {
        return Err(bad(&format!("unsupported dtype {}", descr)));
    }
    if FORTRAN_RE.captures(header).map(|c| c[1].to_string()).as_deref() != Some("False") {
        return Err(bad("only C-order arrays are supported"));
    }
    let shape: Vec<usize> = SHAPE_RE
        .captures(header)
        .ok_or_else(|| bad("missing shape"))?[1]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| bad("invalid shape")))
        .collect::<Result<_>>()?;
    let [rows, cols] = shape[..] else {
        return Err(bad("expected a two-dimensional array"));
    };

    let data = &bytes[data_start..];
    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| bad("shape overflows"))?;
    if data.len() != expected {
        return Err(bad(&format!(
            "expected {} data bytes for shape ({}, {}), found {}",
            expected,
            rows,
            cols,
            data.len()
        )));
    }

    let values = data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((rows, cols, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn unit_ref(file: &str, line: u32) -> UnitRef {
        UnitRef {
            repository_id: "proj".into(),
            revision: "v1".into(),
            file_path: file.into(),
            start_line: line,
            end_line: line + 2,
        }
    }

    fn sample_collection() -> VectorCollection {
        let mut collection = VectorCollection::new("hashing-3");
        collection.append(vec![1.0, 0.0, 0.0], unit_ref("a.py", 1)).unwrap();
        collection.append(vec![0.0, 0.6, 0.8], unit_ref("b.py", 4)).unwrap();
        collection
            .append(vec![0.1, -0.2, 0.974_679_4], unit_ref("c/d.py", 10))
            .unwrap();
        collection
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let collection = sample_collection();

        save_index(&collection, dir.path()).unwrap();
        assert!(index_exists(dir.path()));

        let loaded = load_index(dir.path()).unwrap();
        assert_eq!(loaded, collection);
    }

    #[test]
    fn test_empty_collection_roundtrip() {
        let dir = tempdir().unwrap();
        let collection = VectorCollection::new("m");
        save_index(&collection, dir.path()).unwrap();

        let loaded = load_index(dir.path()).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dimension(), None);
        assert_eq!(loaded.model_id(), "m");
    }

    #[test]
    fn test_npy_header_is_aligned() {
        let mut buf = Vec::new();
        write_npy(&mut buf, 2, 3, &[0.0; 6]).unwrap();

        assert_eq!(&buf[..6], NPY_MAGIC);
        let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
        assert_eq!((10 + header_len) % NPY_ALIGN, 0);
        assert_eq!(buf[10 + header_len - 1], b'\n');
        assert_eq!(buf.len(), 10 + header_len + 6 * 4);

        let header = std::str::from_utf8(&buf[10..10 + header_len]).unwrap();
        assert!(header.contains("'shape': (2, 3)"));
    }

    #[test]
    fn test_metadata_uses_record_field_names() {
        let dir = tempdir().unwrap();
        save_index(&sample_collection(), dir.path()).unwrap();

        let text = fs::read_to_string(dir.path().join(METADATA_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let first = &value[0];
        assert_eq!(first["repo_name"], "proj");
        assert_eq!(first["ref"], "v1");
        assert_eq!(first["file"], "a.py");
        assert_eq!(first["line"], 1);
        assert_eq!(first["end_line"], 3);
    }

    #[test]
    fn test_count_mismatch_is_reported() {
        let dir = tempdir().unwrap();
        save_index(&sample_collection(), dir.path()).unwrap();

        let refs = vec![unit_ref("a.py", 1), unit_ref("b.py", 4)];
        fs::write(
            dir.path().join(METADATA_FILE),
            serde_json::to_string(&refs).unwrap(),
        )
        .unwrap();

        let err = load_index(dir.path()).unwrap_err();
        assert!(matches!(err, Error::IndexConsistency(_)));
    }

    #[test]
    fn test_load_without_manifest() {
        let dir = tempdir().unwrap();
        save_index(&sample_collection(), dir.path()).unwrap();
        fs::remove_file(dir.path().join(MANIFEST_FILE)).unwrap();

        let loaded = load_index(dir.path()).unwrap();
        assert_eq!(loaded.model_id(), UNKNOWN_MODEL);
        assert_eq!(loaded.len(), 3);
    }

    #[test]
    fn test_truncated_data_rejected() {
        let mut buf = Vec::new();
        write_npy(&mut buf, 2, 2, &[1.0, 0.0, 0.0, 1.0]).unwrap();
        buf.truncate(buf.len() - 4);
        assert!(matches!(parse_npy(&buf), Err(Error::IndexConsistency(_))));
        assert!(matches!(parse_npy(b"garbage"), Err(Error::IndexConsistency(_))));
    }

    #[test]
    fn test_no_tmp_files_left_behind() {
        let dir = tempdir().unwrap();
        save_index(&sample_collection(), dir.path()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
