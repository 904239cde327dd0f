//! All error types for the locmapper crate.
//!
//! Parse failures are fatal for the file that produced them but recoverable
//! at the batch level; resolution failures are recoverable at display time
//! through per-kind sentinel strings (see [`crate::loc_file::LocFile::resolve_or_sentinel`]).

use thiserror::Error;

/// Fatal-per-file errors from the `.strings` character scanner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("cannot parse key at byte {offset}")]
    CannotParseKey { offset: usize },

    #[error("no value found for key `{key}` at byte {offset}")]
    ValueNotFound { key: String, offset: usize },

    #[error("unterminated {what} at byte {offset}")]
    UnterminatedToken { what: &'static str, offset: usize },
}

/// Errors raised while resolving an entry's value for a language.
///
/// Every variant has a matching display sentinel so a bad translation never
/// blocks export of the rest of the table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("key `{0}` not found in the entry table")]
    KeyNotFound(String),

    #[error("no value for language `{0}`")]
    NoValueForLanguage(String),

    #[error("mapping contains an invalid component")]
    InvalidMapping,

    #[error("mapping source key `{0}` holds a mapping itself")]
    MappedToMappedKey(String),

    #[error("no plurality grammar known for language `{0}`")]
    LanguageNotFound(String),

    #[error("invalid tokens in `{0}`")]
    InvalidTokens(String),
}

impl ResolveError {
    /// A distinct, easily greppable sentinel per failure class, substituted
    /// for the resolved value when callers ask for a non-throwing lookup.
    pub fn sentinel(&self) -> &'static str {
        match self {
            ResolveError::KeyNotFound(_) => "!¡!KEY_NOT_FOUND!¡!",
            ResolveError::NoValueForLanguage(_) => "!¡!TODOLOC!¡!",
            ResolveError::InvalidMapping => "!¡!INVALID_MAPPING!¡!",
            ResolveError::MappedToMappedKey(_) => "!¡!MAPPED_TO_MAPPED_KEY!¡!",
            ResolveError::LanguageNotFound(_) => "!¡!LANGUAGE_NOT_FOUND!¡!",
            ResolveError::InvalidTokens(_) => "!¡!INVALID_TOKENS!¡!",
        }
    }
}

/// Top-level error type wrapping I/O and format-level failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("strings parse error: {0}")]
    StringsParse(#[from] ParseError),

    #[error("resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::Error),

    #[error("CSV parse error: {0}")]
    CsvParse(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid data: {0}")]
    DataMismatch(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}
