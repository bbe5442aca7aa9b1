// SPDX-License-Identifier: MIT OR Apache-2.0

//! Function-level unit extraction from a tree-sitter syntax tree

use tracing::debug;
use tree_sitter::Node;

use crate::errors::{Error, Result};
use crate::parser::languages::{SourceLanguage, LANGUAGES};
use crate::unit::{CodeUnit, SourceFile};

/// Extracts one [`CodeUnit`] per named function definition.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitExtractor;

impl UnitExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract units from one file.
    ///
    /// A file that does not parse, or whose language is not supported, yields
    /// no units.
    pub fn extract(
        &self,
        file_text: &str,
        file_path: &str,
        repository_id: &str,
        revision: &str,
    ) -> Vec<CodeUnit> {
        match self.try_extract(file_text, file_path, repository_id, revision) {
            Ok(units) => units,
            Err(err) => {
                debug!("skipping {}: {}", file_path, err);
                Vec::new()
            }
        }
    }

    pub fn extract_file(&self, file: &SourceFile) -> Result<Vec<CodeUnit>> {
        self.try_extract(
            &file.content,
            &file.file_path,
            &file.repository_id,
            &file.revision,
        )
    }

    /// Like [`extract`](Self::extract) but reports why a file was skipped.
    pub fn try_extract(
        &self,
        file_text: &str,
        file_path: &str,
        repository_id: &str,
        revision: &str,
    ) -> Result<Vec<CodeUnit>> {
        let lang = SourceLanguage::from_path(file_path)
            .ok_or_else(|| Error::UnsupportedLanguage(file_path.to_string()))?;
        self.try_extract_as(lang, file_text, file_path, repository_id, revision)
    }

    /// Extract using an explicit grammar instead of the file extension.
    pub fn try_extract_as(
        &self,
        lang: SourceLanguage,
        file_text: &str,
        file_path: &str,
        repository_id: &str,
        revision: &str,
    ) -> Result<Vec<CodeUnit>> {
        let parse_error = |reason: &str| Error::Parse {
            path: file_path.to_string(),
            reason: reason.to_string(),
        };

        let mut parser = LANGUAGES
            .parser(lang)
            .ok_or_else(|| Error::UnsupportedLanguage(lang.to_string()))?;
        let tree = parser
            .parse(file_text, None)
            .ok_or_else(|| parse_error("parser returned no tree"))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(parse_error("syntax error"));
        }

        let mut units = Vec::new();
        let mut cursor = root.walk();
        // Pre-order walk: a parent is emitted before the functions nested in it.
        loop {
            let node = cursor.node();
            if is_function_node(lang, node) {
                let (text, start_line, end_line) = unit_span(node, file_text)
                    .ok_or_else(|| parse_error("function span is not on a char boundary"))?;
                units.push(CodeUnit {
                    repository_id: repository_id.to_string(),
                    revision: revision.to_string(),
                    file_path: file_path.to_string(),
                    start_line,
                    end_line,
                    text: text.to_string(),
                });
            }

            if cursor.goto_first_child() || cursor.goto_next_sibling() {
                continue;
            }
            loop {
                if !cursor.goto_parent() {
                    return Ok(units);
                }
                if cursor.goto_next_sibling() {
                    break;
                }
            }
        }
    }
}

/// Match named function definitions per grammar
fn is_function_node(lang: SourceLanguage, node: Node) -> bool {
    let name_field = match (lang, node.kind()) {
        (SourceLanguage::Python, "function_definition") => "name",
        (SourceLanguage::Rust, "function_item") => "name",
        (
            SourceLanguage::JavaScript | SourceLanguage::TypeScript | SourceLanguage::Tsx,
            "function_declaration" | "generator_function_declaration" | "method_definition",
        ) => "name",
        (SourceLanguage::Go, "function_declaration" | "method_declaration") => "name",
        (SourceLanguage::Java, "method_declaration" | "constructor_declaration") => "name",
        (SourceLanguage::C | SourceLanguage::Cpp, "function_definition") => "declarator",
        (SourceLanguage::Ruby, "method" | "singleton_method") => "name",
        _ => return false,
    };
    node.child_by_field_name(name_field).is_some()
}

/// Slice the node out of the original source and compute its 1-indexed lines.
///
/// The span ends at the last token of the definition; trailing comments that
/// the grammar folds into the body are left out. A span ending at column 0
/// stops at the previous line's terminator, which is excluded from the text.
fn unit_span<'a>(node: Node, source: &'a str) -> Option<(&'a str, u32, u32)> {
    let start = node.start_position();
    let last = last_code_token(node);
    let end = last.end_position();
    let mut text = source.get(node.start_byte()..last.end_byte())?;
    let mut end_row = end.row;

    if end.column == 0 && end.row > start.row {
        end_row -= 1;
        text = text.strip_suffix('\n').unwrap_or(text);
        text = text.strip_suffix('\r').unwrap_or(text);
    }

    Some((text, (start.row + 1) as u32, (end_row + 1) as u32))
}

/// Rightmost descendant of `node` that is not an extra (comment) node.
fn last_code_token(node: Node) -> Node {
    let mut current = node;
    loop {
        let mut cursor = current.walk();
        let last = current.children(&mut cursor).filter(|c| !c.is_extra()).last();
        match last {
            Some(child) => current = child,
            None => return current,
        }
    }
}
