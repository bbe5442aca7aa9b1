// SPDX-License-Identifier: MIT OR Apache-2.0

//! Language registry for tree-sitter parsers

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::{Language, Parser};

/// Grammars the unit extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    Python,
    Rust,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
    Java,
    C,
    Cpp,
    Ruby,
}

impl SourceLanguage {
    pub const ALL: [SourceLanguage; 10] = [
        SourceLanguage::Python,
        SourceLanguage::Rust,
        SourceLanguage::JavaScript,
        SourceLanguage::TypeScript,
        SourceLanguage::Tsx,
        SourceLanguage::Go,
        SourceLanguage::Java,
        SourceLanguage::C,
        SourceLanguage::Cpp,
        SourceLanguage::Ruby,
    ];

    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" | "pyi" => Some(Self::Python),
            "rs" => Some(Self::Rust),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "go" => Some(Self::Go),
            "java" => Some(Self::Java),
            "c" | "h" => Some(Self::C),
            "cpp" | "cc" | "cxx" | "hpp" | "hh" => Some(Self::Cpp),
            "rb" => Some(Self::Ruby),
            _ => None,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Rust => "rust",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Ruby => "ruby",
        }
    }
}

impl std::fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SourceLanguage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| lang.name() == lower)
            .or_else(|| match lower.as_str() {
                "py" => Some(Self::Python),
                "rs" => Some(Self::Rust),
                "js" => Some(Self::JavaScript),
                "ts" => Some(Self::TypeScript),
                "c++" => Some(Self::Cpp),
                "rb" => Some(Self::Ruby),
                _ => None,
            })
            .ok_or_else(|| format!("Unknown language: {}", s))
    }
}

/// Supported languages with their tree-sitter grammars
pub struct LanguageRegistry {
    languages: HashMap<SourceLanguage, Language>,
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut languages = HashMap::new();

        languages.insert(SourceLanguage::Python, tree_sitter_python::LANGUAGE.into());
        languages.insert(SourceLanguage::Rust, tree_sitter_rust::LANGUAGE.into());
        languages.insert(
            SourceLanguage::JavaScript,
            tree_sitter_javascript::LANGUAGE.into(),
        );
        languages.insert(
            SourceLanguage::TypeScript,
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        );
        languages.insert(
            SourceLanguage::Tsx,
            tree_sitter_typescript::LANGUAGE_TSX.into(),
        );
        languages.insert(SourceLanguage::Go, tree_sitter_go::LANGUAGE.into());
        languages.insert(SourceLanguage::Java, tree_sitter_java::LANGUAGE.into());
        languages.insert(SourceLanguage::C, tree_sitter_c::LANGUAGE.into());
        languages.insert(SourceLanguage::Cpp, tree_sitter_cpp::LANGUAGE.into());
        languages.insert(SourceLanguage::Ruby, tree_sitter_ruby::LANGUAGE.into());

        Self { languages }
    }

    pub fn get(&self, lang: SourceLanguage) -> Option<&Language> {
        self.languages.get(&lang)
    }

    /// Build a parser configured for `lang`
    pub fn parser(&self, lang: SourceLanguage) -> Option<Parser> {
        let grammar = self.get(lang)?;
        let mut parser = Parser::new();
        parser.set_language(grammar).ok()?;
        Some(parser)
    }
}

/// Global language registry
pub static LANGUAGES: Lazy<LanguageRegistry> = Lazy::new(LanguageRegistry::new);
