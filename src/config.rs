// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for fnseek
//!
//! Loads configuration from .fnseekrc.toml in current directory or ~/.config/fnseek/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::corpus::scanner::DEFAULT_MAX_FILE_SIZE;
use crate::embedding::DEFAULT_MAX_CHARS;

/// Config file looked up in the current directory
pub const LOCAL_CONFIG_FILE: &str = ".fnseekrc.toml";

/// Output format for results (mirrored from cli for library use)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOutputFormat {
    #[default]
    Text,
    Json,
}

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Local ONNX model via fastembed
    #[default]
    Builtin,
    /// External process speaking JSON over stdin/stdout
    Command,
    /// Deterministic feature hashing, no model download
    #[serde(alias = "dummy")]
    Hashing,
}

/// Search configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of results returned when `-k` is not given
    pub default_k: Option<usize>,
    /// Owner (user or organization) used to build result links
    pub owner: Option<String>,
}

impl SearchConfig {
    /// Get default k (defaults to 10)
    pub fn k(&self) -> usize {
        self.default_k.filter(|&k| k > 0).unwrap_or(10)
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref().filter(|o| !o.is_empty())
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, hashing)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Texts per provider request
    pub batch_size: Option<usize>,
    /// Input budget in characters; 0 disables truncation
    pub max_chars: Option<usize>,
    /// Output dimension for the hashing provider
    pub dimension: Option<usize>,
    /// Whether to reuse previously computed vectors
    pub cache: Option<bool>,
    /// Location of the embedding cache database
    pub cache_path: Option<PathBuf>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "minilm")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("minilm")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension.filter(|&d| d > 0)
    }

    /// Get max chars (defaults to 2000)
    ///
    /// `FASTEMBED_MAX_CHARS` overrides the file for the builtin provider.
    pub fn max_chars(&self) -> usize {
        if self.provider() == EmbeddingProviderType::Builtin {
            if let Ok(raw) = std::env::var("FASTEMBED_MAX_CHARS") {
                match raw.trim().parse::<usize>() {
                    Ok(value) => return value,
                    Err(_) => warn!("Ignoring invalid FASTEMBED_MAX_CHARS={}", raw),
                }
            }
        }
        self.max_chars.unwrap_or(DEFAULT_MAX_CHARS)
    }

    /// Get cache enabled (defaults to true)
    pub fn cache_enabled(&self) -> bool {
        self.cache.unwrap_or(true)
    }

    /// Cache database path, or `None` when caching is off.
    ///
    /// Defaults to `<cache dir>/fnseek/embeddings.sqlite`.
    pub fn cache_path(&self) -> Option<PathBuf> {
        if !self.cache_enabled() {
            return None;
        }
        self.cache_path.clone().or_else(|| {
            dirs::cache_dir().map(|dir| dir.join("fnseek").join("embeddings.sqlite"))
        })
    }
}

/// Indexing configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Paths/patterns to exclude from extraction
    pub exclude_paths: Vec<String>,
    /// Maximum file size in bytes to extract (default: 1MB)
    pub max_file_size: Option<u64>,
}

impl IndexConfig {
    /// Get exclude paths
    pub fn exclude_paths(&self) -> &[String] {
        &self.exclude_paths
    }

    /// Get max file size (default: 1MB)
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE)
    }
}

/// Configuration loaded from .fnseekrc.toml or ~/.config/fnseek/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format (text or json)
    pub default_format: Option<ConfigOutputFormat>,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Index configuration
    #[serde(default)]
    pub index: IndexConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .fnseekrc.toml in current directory
    /// 2. ~/.config/fnseek/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(LOCAL_CONFIG_FILE)) {
            return config;
        }

        if let Some(path) = Self::user_config_path() {
            if let Some(config) = Self::load_from_path(&path) {
                return config;
            }
        }

        Self::default()
    }

    /// `~/.config/fnseek/config.toml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("fnseek").join("config.toml"))
    }

    pub fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match Self::parse(&content) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Merge CLI k with config (CLI wins)
    pub fn merge_k(&self, cli_value: Option<usize>) -> usize {
        cli_value.unwrap_or_else(|| self.search.k())
    }

    /// Merge CLI owner with config (CLI wins)
    pub fn merge_owner(&self, cli_value: Option<&str>) -> Option<String> {
        cli_value
            .filter(|o| !o.is_empty())
            .or_else(|| self.search.owner())
            .map(str::to_string)
    }

    /// Get the search configuration
    pub fn search(&self) -> &SearchConfig {
        &self.search
    }

    /// Get the embedding configuration
    pub fn embeddings(&self) -> &EmbeddingConfig {
        &self.embeddings
    }

    /// Get the index configuration
    pub fn index(&self) -> &IndexConfig {
        &self.index
    }
}
