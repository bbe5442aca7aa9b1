// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core records passed between extraction, embedding and retrieval.

use serde::{Deserialize, Serialize};

/// One source file of the corpus, pinned to a repository revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub repository_id: String,
    pub revision: String,
    /// Path relative to the repository root, `/`-separated
    pub file_path: String,
    pub content: String,
}

/// One extracted function.
///
/// Serialized with the field names of the unit store (`repo_name`, `ref`,
/// `file`, `line`, `end_line`, `code`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUnit {
    #[serde(rename = "repo_name")]
    pub repository_id: String,
    #[serde(rename = "ref")]
    pub revision: String,
    #[serde(rename = "file")]
    pub file_path: String,
    /// First line (1-indexed)
    #[serde(rename = "line")]
    pub start_line: u32,
    /// Last line (1-indexed, inclusive)
    pub end_line: u32,
    /// Verbatim source of the function, signature included
    #[serde(rename = "code")]
    pub text: String,
}

impl CodeUnit {
    /// The identifying tuple of this unit, without its text.
    pub fn unit_ref(&self) -> UnitRef {
        UnitRef {
            repository_id: self.repository_id.clone(),
            revision: self.revision.clone(),
            file_path: self.file_path.clone(),
            start_line: self.start_line,
            end_line: self.end_line,
        }
    }
}

/// Reference to a [`CodeUnit`] stored next to its vector in the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitRef {
    #[serde(rename = "repo_name")]
    pub repository_id: String,
    #[serde(rename = "ref")]
    pub revision: String,
    #[serde(rename = "file")]
    pub file_path: String,
    #[serde(rename = "line")]
    pub start_line: u32,
    pub end_line: u32,
}

impl UnitRef {
    /// `repository/file#Lstart-Lend`
    pub fn location(&self) -> String {
        format!(
            "{}/{}#L{}-L{}",
            self.repository_id, self.file_path, self.start_line, self.end_line
        )
    }

    /// Short display link: `owner/repository/file#Lstart-Lend`.
    pub fn display_link(&self, owner: &str) -> String {
        format!("{}/{}", owner, self.location())
    }

    /// Browsable URL pinned to the unit's revision.
    pub fn github_url(&self, owner: &str) -> String {
        format!(
            "https://github.com/{}/{}/blob/{}/{}#L{}-L{}",
            owner,
            self.repository_id,
            self.revision,
            self.file_path,
            self.start_line,
            self.end_line
        )
    }
}
