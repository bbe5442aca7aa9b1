// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations for the fnseek CLI

pub mod embed;
pub mod extract;
pub mod search;
pub mod stats;

use anyhow::{Context as _, Result};
use std::io::IsTerminal;

use crate::cli::{CliProvider, OutputFormat};
use fnseek::config::{Config, EmbeddingConfig, EmbeddingProviderType};
use fnseek::embedding::{create_provider, EmbeddingBatcher};

/// Settings shared by every command
pub struct Context {
    pub config: Config,
    pub format: OutputFormat,
    pub compact: bool,
    pub quiet: bool,
}

impl Context {
    /// Progress bars only for interactive text output.
    pub fn show_progress(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text && std::io::stderr().is_terminal()
    }

    pub fn use_color(&self) -> bool {
        fnseek::output::use_colors() && std::io::stdout().is_terminal()
    }
}

/// Embedding flags that override the config file
#[derive(Debug, Default)]
pub struct EmbeddingOverrides {
    pub provider: Option<CliProvider>,
    pub model: Option<String>,
    pub batch_size: Option<usize>,
    pub max_chars: Option<usize>,
    pub no_cache: bool,
}

impl EmbeddingOverrides {
    /// Merge CLI flags with config (CLI wins)
    pub fn apply(self, base: &EmbeddingConfig) -> EmbeddingConfig {
        let mut config = base.clone();
        if let Some(provider) = self.provider {
            config.provider = Some(match provider {
                CliProvider::Builtin => EmbeddingProviderType::Builtin,
                CliProvider::Command => EmbeddingProviderType::Command,
                CliProvider::Hashing => EmbeddingProviderType::Hashing,
            });
        }
        if self.model.is_some() {
            config.model = self.model;
        }
        if self.batch_size.is_some() {
            config.batch_size = self.batch_size;
        }
        if self.max_chars.is_some() {
            config.max_chars = self.max_chars;
        }
        if self.no_cache {
            config.cache = Some(false);
        }
        config
    }
}

/// Build the configured provider wrapped in a batcher.
pub fn build_batcher(config: &EmbeddingConfig) -> Result<EmbeddingBatcher> {
    let provider = create_provider(config).context("Failed to initialize embedding provider")?;
    let mut batcher = EmbeddingBatcher::new(provider).with_max_chars(config.max_chars());
    if let Some(batch_size) = config.batch_size {
        batcher = batcher.with_batch_size(batch_size);
    }
    Ok(batcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win_over_config() {
        let base = Config::parse(
            "[embeddings]\nprovider = \"command\"\nmodel = \"m1\"\nmax_chars = 100\n",
        )
        .unwrap()
        .embeddings;

        let merged = EmbeddingOverrides {
            provider: Some(CliProvider::Hashing),
            max_chars: Some(0),
            no_cache: true,
            ..Default::default()
        }
        .apply(&base);

        assert_eq!(merged.provider(), EmbeddingProviderType::Hashing);
        assert_eq!(merged.model(), "m1");
        assert_eq!(merged.max_chars(), 0);
        assert!(!merged.cache_enabled());
    }
}
