#![forbid(unsafe_code)]
//! Localization mapping toolkit for Rust.
//!
//! Parses Xcode `.strings` files with byte-exact round-trips, imports Android
//! `strings.xml` resources, and maintains a master entry table (the "loc
//! file", serialized as CSV) in which entries either carry per-language
//! values directly or compute them from other entries through key mappings
//! and value-transformer chains.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use locmapper::{FileFormat, LocFile, MergeStyle};
//!
//! let mut table = LocFile::read_from("Loc.csv")?;
//! table.merge_xcode_strings_files(
//!     "Xcode",
//!     &[("en.lproj/Localizable.strings", "English".to_string())],
//!     MergeStyle::Replace,
//! );
//! table.write_to("Loc.csv")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Pieces
//!
//! - **`formats::strings`**: component-preserving `.strings` parser, writes
//!   back byte-identical output for untouched input
//! - **`formats::android_strings`**: Android resource reader, flattens
//!   string arrays and plural groups into plain keys
//! - **`loc_file`**: the entry table and its merge/resolve operations
//! - **`mapping` / `transformers`**: computed entries and the value
//!   transformation chain (gender and plural variant picks, replacements)
//! - **`plurality`**: the numeric-zone grammar behind plural variant
//!   selection

pub mod error;
pub mod formats;
pub mod loc_file;
pub mod mapping;
pub mod plurality;
pub mod traits;
pub mod transformers;

// Re-export most used types for easy consumption
pub use crate::{
    error::{Error, ParseError, ResolveError},
    formats::{AndroidStringsFile, FormatType, StringsFile},
    loc_file::{ImportedEntry, LineKey, LineValue, LocFile, MergeReport, MergeStyle},
    mapping::{KeyMapping, MappingComponent},
    plurality::PluralityDefinition,
    traits::FileFormat,
    transformers::{Gender, LanguageGrammars, PluralityGrammar, UnicodePluralCategory, ValueTransformer},
};
