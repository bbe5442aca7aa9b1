// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Providers only turn text into raw vectors. Truncation, normalization and
//! batching are handled by [`EmbeddingBatcher`](super::batch::EmbeddingBatcher)
//! so every provider obeys the same contract.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};

use crate::config::{EmbeddingConfig, EmbeddingProviderType};

const DEFAULT_FASTEMBED_MODEL: &str = "minilm";
const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 256;
const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_COMMAND_BATCH_SIZE: usize = 64;
const DEFAULT_HASHING_BATCH_SIZE: usize = 512;

/// Default dimension of the hashing provider.
pub const DEFAULT_HASHING_DIM: usize = 256;

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send {
    /// Returns the model identifier recorded in the index.
    fn model_id(&self) -> &str;

    /// Returns the preferred number of texts per request.
    fn batch_size(&self) -> usize;

    /// Generates one raw embedding per text, in input order.
    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&mut self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()])?;
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

/// Builds the provider selected in the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider: Box<dyn EmbeddingProvider> = match config.provider() {
        EmbeddingProviderType::Builtin => {
            #[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
            {
                let mut fastembed_config = FastEmbedConfig::from_env()?;
                if let Some(model) = config.model.as_deref() {
                    if !FastEmbedConfig::has_env_overrides() {
                        fastembed_config.model = parse_fastembed_model(model)?;
                    }
                }
                if let Some(batch_size) = config.batch_size {
                    fastembed_config.batch_size = batch_size.clamp(1, MAX_FASTEMBED_BATCH_SIZE);
                }
                Box::new(FastEmbedder::new(fastembed_config)?)
            }
            #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
            {
                bail!("The builtin embedding provider is not available on this platform")
            }
        }
        EmbeddingProviderType::Command => {
            let mut provider = CommandProvider::new(
                config.command().to_string(),
                config.model().to_string(),
            );
            if let Some(batch_size) = config.batch_size {
                provider = provider.with_batch_size(batch_size);
            }
            Box::new(provider)
        }
        EmbeddingProviderType::Hashing => {
            Box::new(HashingProvider::new(config.dimension().unwrap_or(DEFAULT_HASHING_DIM)))
        }
    };
    Ok(provider)
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub use fastembed_provider::{FastEmbedConfig, FastEmbedder};

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
mod fastembed_provider {
    use super::*;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

    /// Configuration for the fastembed provider.
    #[derive(Debug, Clone)]
    pub struct FastEmbedConfig {
        pub model: EmbeddingModel,
        pub batch_size: usize,
    }

    impl FastEmbedConfig {
        pub fn from_env() -> Result<Self> {
            let raw = env::var("FASTEMBED_MODEL")
                .unwrap_or_else(|_| DEFAULT_FASTEMBED_MODEL.to_string());
            let model = parse_fastembed_model(&raw)?;

            let mut batch_size =
                parse_usize_env("FASTEMBED_BATCH_SIZE", DEFAULT_FASTEMBED_BATCH_SIZE)?;
            if batch_size == 0 {
                batch_size = DEFAULT_FASTEMBED_BATCH_SIZE;
            }
            if batch_size > MAX_FASTEMBED_BATCH_SIZE {
                tracing::warn!(
                    "FASTEMBED_BATCH_SIZE={} exceeds max {}; clamping.",
                    batch_size,
                    MAX_FASTEMBED_BATCH_SIZE
                );
                batch_size = MAX_FASTEMBED_BATCH_SIZE;
            }

            Ok(Self { model, batch_size })
        }

        pub fn has_env_overrides() -> bool {
            env::var_os("FASTEMBED_MODEL").is_some()
        }
    }

    impl Default for FastEmbedConfig {
        fn default() -> Self {
            Self {
                model: EmbeddingModel::AllMiniLML6V2,
                batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            }
        }
    }

    /// Local ONNX encoder via fastembed.
    pub struct FastEmbedder {
        embedder: TextEmbedding,
        config: FastEmbedConfig,
        model_id: String,
    }

    impl FastEmbedder {
        pub fn new(config: FastEmbedConfig) -> Result<Self> {
            let model = config.model.clone();
            let model_id = model.to_string();
            let init = InitOptions::new(model);
            let embedder =
                TextEmbedding::try_new(init).context("Failed to initialize fastembed model")?;

            Ok(Self {
                embedder,
                config,
                model_id,
            })
        }
    }

    impl EmbeddingProvider for FastEmbedder {
        fn model_id(&self) -> &str {
            &self.model_id
        }

        fn batch_size(&self) -> usize {
            self.config.batch_size
        }

        fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            self.embedder
                .embed(texts, Some(self.config.batch_size))
                .context("fastembed inference failed")
        }
    }

    pub(super) fn parse_fastembed_model(raw: &str) -> Result<EmbeddingModel> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(EmbeddingModel::AllMiniLML6V2);
        }

        match value.to_lowercase().as_str() {
            "minilm"
            | "all-minilm-l6-v2"
            | "sentence-transformers/all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "bge-small" | "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => {
                Ok(EmbeddingModel::BGESmallENV15)
            }
            "jina-code" | "jina-embeddings-v2-base-code" | "jinaai/jina-embeddings-v2-base-code" => {
                Ok(EmbeddingModel::JinaEmbeddingsV2BaseCode)
            }
            other => bail!(
                "Unsupported embedding model '{}'. Supported values: minilm, bge-small, jina-code",
                other
            ),
        }
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
use fastembed_provider::parse_fastembed_model;

/// Command provider that shells out to an external process.
///
/// The process receives `{"model": ..., "texts": [...]}` on stdin and prints a
/// JSON array of vectors (or an object with an `embeddings`, `vectors` or
/// `data` array).
pub struct CommandProvider {
    command: String,
    model: String,
    batch_size: usize,
}

impl CommandProvider {
    pub fn new(command: String, model: String) -> Self {
        Self {
            command,
            model,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn run_command(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": texts,
        });

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn embedding command: {}", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.to_string().as_bytes())
                .context("Failed to write embeddings payload to stdin")?;
        }

        let output = child
            .wait_with_output()
            .context("Failed to read embeddings command output")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Embedding command failed (status {}): {}",
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_command_output(stdout.trim())
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run_command(texts)
    }
}

fn parse_command_output(stdout: &str) -> Result<Vec<Vec<f32>>> {
    let parsed: Value = serde_json::from_str(stdout)
        .context("Failed to parse embeddings command output as JSON")?;

    let embeddings_value = match parsed {
        Value::Array(arr) => Value::Array(arr),
        Value::Object(ref obj) => ["embeddings", "vectors", "data"]
            .iter()
            .find_map(|key| obj.get(*key).cloned())
            .ok_or_else(|| anyhow::anyhow!("Embeddings command output missing 'embeddings' field"))?,
        _ => bail!("Embeddings command output must be JSON array or object"),
    };

    embeddings_value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Embeddings output must be a JSON array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| anyhow::anyhow!("Embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .ok_or_else(|| anyhow::anyhow!("Embedding value must be a number"))
                        .map(|v| v as f32)
                })
                .collect::<Result<Vec<f32>>>()
        })
        .collect()
}

/// Deterministic feature-hashing encoder.
///
/// Each lowercase identifier-like token is hashed into one of `dimension`
/// buckets with a hashed sign. Texts sharing vocabulary land close together,
/// which is enough for offline use and tests; the output does not depend on
/// batching.
pub struct HashingProvider {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            model: format!("hashing-{}", dimension),
            dimension,
            batch_size: DEFAULT_HASHING_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % self.dimension;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        // Token-free text still gets a usable direction.
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        vector
    }
}

impl EmbeddingProvider for HashingProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn parse_usize_env(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(default)
            } else {
                value
                    .parse::<usize>()
                    .with_context(|| format!("Invalid {} value: {}", name, value))
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_provider_is_deterministic() {
        let mut provider = HashingProvider::new(64);
        assert_eq!(provider.model_id(), "hashing-64");

        let texts = vec!["def add(a, b)".to_string(), "parse config file".to_string()];
        let first = provider.embed_texts(&texts).unwrap();
        let second = provider.embed_texts(&texts).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].len(), 64);
        assert_eq!(first, second);
    }

    #[test]
    fn test_hashing_provider_never_returns_zero_vector() {
        let mut provider = HashingProvider::new(8);
        let vector = provider.embed_one("  ()  ").unwrap();
        assert!(vector.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_hashing_provider_similar_texts_are_closer() {
        let mut provider = HashingProvider::new(256);
        let mut a = provider.embed_one("read json config from file").unwrap();
        let mut b = provider.embed_one("read the json config file").unwrap();
        let mut c = provider.embed_one("matrix multiply kernel gpu").unwrap();
        crate::vector::l2_normalize(&mut a);
        crate::vector::l2_normalize(&mut b);
        crate::vector::l2_normalize(&mut c);
        assert!(crate::vector::dot(&a, &b) > crate::vector::dot(&a, &c));
    }

    #[test]
    fn test_empty_embed() {
        let mut provider = HashingProvider::new(16);
        assert!(provider.embed_texts(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_command_output_shapes() {
        let plain = parse_command_output("[[1, 2], [3.5, 4]]").unwrap();
        assert_eq!(plain, vec![vec![1.0, 2.0], vec![3.5, 4.0]]);

        let wrapped = parse_command_output(r#"{"embeddings": [[0.5]]}"#).unwrap();
        assert_eq!(wrapped, vec![vec![0.5]]);

        assert!(parse_command_output(r#"{"other": []}"#).is_err());
        assert!(parse_command_output(r#"[["x"]]"#).is_err());
    }

    #[test]
    fn test_command_provider_roundtrip() {
        let mut provider = CommandProvider::new(
            "cat > /dev/null; echo '[[1, 0], [0, 1]]'".to_string(),
            "external".to_string(),
        );
        let vectors = provider
            .embed_texts(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(provider.model_id(), "external");
    }

    #[test]
    fn test_command_provider_failure() {
        let mut provider = CommandProvider::new("cat > /dev/null; exit 3".to_string(), "m".to_string());
        let err = provider.embed_texts(&["a".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Embedding command failed"));
    }
}
