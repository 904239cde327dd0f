//! Format adapters: each submodule reads one on-disk localization format
//! and converts it to [`ImportedEntry`](crate::loc_file::ImportedEntry)
//! batches for the table.

pub mod android_strings;
pub mod csv;
pub mod strings;

pub use android_strings::{AndroidResource, AndroidStringsFile, ResourceKind};
pub use strings::{Component, StringsFile};

use std::path::Path;

use crate::error::Error;

/// Supported on-disk formats, inferred from file extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatType {
    /// Xcode `.strings` (plist fragment).
    Strings,
    /// Android `strings.xml` resources.
    AndroidStrings,
    /// The master table itself.
    LocFile,
}

impl FormatType {
    pub fn infer_from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "strings" => Ok(FormatType::Strings),
            "xml" => Ok(FormatType::AndroidStrings),
            "csv" => Ok(FormatType::LocFile),
            other => Err(Error::UnsupportedFormat(format!(
                "cannot infer a format from `{}` (extension `{other}`)",
                path.display()
            ))),
        }
    }
}

impl std::fmt::Display for FormatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatType::Strings => write!(f, "strings"),
            FormatType::AndroidStrings => write!(f, "android-strings"),
            FormatType::LocFile => write!(f, "loc-file"),
        }
    }
}
