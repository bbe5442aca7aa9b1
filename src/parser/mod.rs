// SPDX-License-Identifier: MIT OR Apache-2.0

//! Source parsing: grammar registry and function-unit extraction.

pub mod languages;
pub mod units;

pub use languages::{LanguageRegistry, SourceLanguage, LANGUAGES};
pub use units::UnitExtractor;
