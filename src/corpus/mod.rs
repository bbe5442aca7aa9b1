// SPDX-License-Identifier: MIT OR Apache-2.0

//! Corpus input: repository checkouts on disk and the extracted-unit store.

pub mod scanner;
pub mod store;

pub use scanner::{discover_checkouts, parse_checkout_name, Checkout, FileScanner};
pub use store::{list_unit_files, read_units, write_units};
