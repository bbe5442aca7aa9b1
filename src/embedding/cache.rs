// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-based cache of computed embedding vectors.
//!
//! Vectors are keyed by encoder model and a blake3 hash of the exact text the
//! encoder saw, so a batch rebuild only re-encodes units whose text (or
//! truncation budget) changed.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};

const SCHEMA_VERSION: &str = "1";

/// Hash of the text handed to the encoder.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Persistent `(model, content hash) -> vector` cache.
pub struct EmbeddingCache {
    conn: Connection,
    path: Option<PathBuf>,
}

impl EmbeddingCache {
    /// Opens or creates a cache database at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let conn = Connection::open(&path)?;
        let cache = Self {
            conn,
            path: Some(path),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self> {
        let cache = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cached_embeddings (
                model_id TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (model_id, content_hash)
            );
            "#,
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Returns the path to the database file, if not in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Looks up many hashes at once; missing hashes are absent from the map.
    pub fn get_many(&self, model_id: &str, hashes: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT embedding FROM cached_embeddings WHERE model_id = ?1 AND content_hash = ?2",
        )?;

        let mut found = HashMap::new();
        for hash in hashes {
            if found.contains_key(hash) {
                continue;
            }
            let blob: Option<Vec<u8>> = stmt
                .query_row(params![model_id, hash], |row| row.get(0))
                .optional()?;
            if let Some(blob) = blob {
                found.insert(hash.clone(), blob_to_embedding(&blob));
            }
        }
        Ok(found)
    }

    /// Stores vectors in a single transaction.
    pub fn put_many(&mut self, model_id: &str, entries: &[(&str, &[f32])]) -> Result<()> {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO cached_embeddings (model_id, content_hash, dimension, embedding, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(model_id, content_hash) DO UPDATE SET
                    dimension = excluded.dimension,
                    embedding = excluded.embedding,
                    created_at = excluded.created_at
                "#,
            )?;
            for (hash, embedding) in entries {
                stmt.execute(params![
                    model_id,
                    hash,
                    embedding.len() as i64,
                    embedding_to_blob(embedding),
                    created_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Counts cached vectors for a model.
    pub fn count(&self, model_id: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cached_embeddings WHERE model_id = ?1",
            params![model_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Converts an embedding vector to a compact blob.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Converts a blob back to an embedding vector.
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cache_create_and_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("cache").join("embeddings.sqlite");

        let mut cache = EmbeddingCache::open(&db_path).unwrap();
        assert!(db_path.exists());
        let hash = content_hash("def a(): pass");
        cache
            .put_many("model", &[(hash.as_str(), &[0.6, 0.8][..])])
            .unwrap();
        drop(cache);

        let cache = EmbeddingCache::open(&db_path).unwrap();
        let found = cache.get_many("model", &[hash.clone()]).unwrap();
        assert_eq!(found[&hash], vec![0.6, 0.8]);
        assert_eq!(cache.path(), Some(db_path.as_path()));
    }

    #[test]
    fn test_cache_is_keyed_by_model() {
        let mut cache = EmbeddingCache::open_in_memory().unwrap();
        let hash = content_hash("text");
        cache.put_many("a", &[(hash.as_str(), &[1.0][..])]).unwrap();

        assert_eq!(cache.get_many("a", &[hash.clone()]).unwrap().len(), 1);
        assert!(cache.get_many("b", &[hash.clone()]).unwrap().is_empty());
        assert_eq!(cache.count("a").unwrap(), 1);
        assert_eq!(cache.count("b").unwrap(), 0);
    }

    #[test]
    fn test_get_many_and_overwrite() {
        let mut cache = EmbeddingCache::open_in_memory().unwrap();
        let h1 = content_hash("one");
        let h2 = content_hash("two");
        cache
            .put_many("m", &[(h1.as_str(), &[1.0, 0.0][..]), (h2.as_str(), &[0.0, 1.0][..])])
            .unwrap();
        cache.put_many("m", &[(h1.as_str(), &[-1.0, 0.0][..])]).unwrap();

        let found = cache
            .get_many("m", &[h1.clone(), h2.clone(), content_hash("three")])
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&h1], vec![-1.0, 0.0]);
        assert_eq!(found[&h2], vec![0.0, 1.0]);
        assert_eq!(cache.count("m").unwrap(), 2);
    }

    #[test]
    fn test_blob_roundtrip_is_bit_exact() {
        let values = vec![0.1f32, -3.25, f32::MIN_POSITIVE, 1.0e-7];
        assert_eq!(blob_to_embedding(&embedding_to_blob(&values)), values);
    }
}
