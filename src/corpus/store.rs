// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON-lines storage for extracted units.
//!
//! One record per line, one file per checkout (`<repository>_<revision>.jsonl`).

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};
use crate::unit::CodeUnit;

pub const UNITS_EXTENSION: &str = "jsonl";

/// Write `units` to `path`, replacing any existing file.
pub fn write_units(path: impl AsRef<Path>, units: &[CodeUnit]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for unit in units {
        serde_json::to_writer(&mut writer, unit)?;
        writer.write_all(b"\n").map_err(|e| Error::io(path, e))?;
    }
    writer.flush().map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Read every unit from a JSON-lines file. Blank lines are ignored.
pub fn read_units(path: impl AsRef<Path>) -> Result<Vec<CodeUnit>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;

    let mut units = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| Error::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let unit = serde_json::from_str(&line).map_err(|e| Error::InvalidRecord {
            location: format!("{}:{}", path.display(), line_no + 1),
            reason: e.to_string(),
        })?;
        units.push(unit);
    }
    Ok(units)
}

/// Unit files in `dir`, sorted by name.
pub fn list_unit_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(UNITS_EXTENSION)
        })
        .collect();
    files.sort();
    Ok(files)
}
