//! The canonical entry table ("loc file"): all localizable strings from all
//! source environments, keyed by [`LineKey`], with per-language values or a
//! computed [`KeyMapping`].

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, ResolveError},
    formats::{android_strings::AndroidStringsFile, strings::StringsFile},
    mapping::KeyMapping,
    traits::FileFormat,
};

/// Identity of one localizable string.
///
/// Equality, ordering and hashing only cover
/// `(logical_key, environment, origin_file, disambiguation_index)`; the
/// remaining fields are metadata reconciled during merges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineKey {
    pub logical_key: String,
    pub environment: String,
    pub origin_file: String,
    #[serde(default, skip_serializing_if = "index_is_zero")]
    pub disambiguation_index: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group_comment: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_comment: String,
}

fn index_is_zero(index: &usize) -> bool {
    *index == 0
}

impl LineKey {
    pub fn new(
        logical_key: impl Into<String>,
        environment: impl Into<String>,
        origin_file: impl Into<String>,
    ) -> Self {
        LineKey {
            logical_key: logical_key.into(),
            environment: environment.into(),
            origin_file: origin_file.into(),
            disambiguation_index: 0,
            comment: String::new(),
            attributes: BTreeMap::new(),
            group_comment: String::new(),
            user_comment: String::new(),
        }
    }

    fn identity(&self) -> (&str, &str, &str, usize) {
        (
            &self.logical_key,
            &self.environment,
            &self.origin_file,
            self.disambiguation_index,
        )
    }

    /// Same entry, ignoring the disambiguation index. Used to re-match keys
    /// across merges, where indices are assigned per import.
    fn same_line(&self, other: &LineKey) -> bool {
        self.logical_key == other.logical_key
            && self.environment == other.environment
            && self.origin_file == other.origin_file
    }
}

impl PartialEq for LineKey {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}
impl Eq for LineKey {}

impl PartialOrd for LineKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for LineKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.identity().cmp(&other.identity())
    }
}
impl Hash for LineKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

/// The value side of a table entry. Replaced wholesale on merge/import; no
/// in-place mutation through the table.
#[derive(Debug, Clone, PartialEq)]
pub enum LineValue {
    /// Direct per-language text.
    Entries(BTreeMap<String, String>),
    /// Computed from another entry through a mapping.
    Mapping(KeyMapping),
}

/// One entry freshly parsed by a format adapter, before it gets a
/// [`LineKey`] in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedEntry {
    pub logical_key: String,
    pub origin_file: String,
    pub comment: String,
    pub attributes: BTreeMap<String, String>,
    /// language -> value; usually a single language per source file.
    pub values: BTreeMap<String, String>,
}

/// Whether a merge drops keys that disappeared from the source
/// (`Replace`) or keeps them and reports them as stale (`Add`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStyle {
    Add,
    Replace,
}

/// Non-fatal outcome report of a merge.
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Keys of the merged environment that the import did not mention.
    /// Removed from the table under `Replace`, kept under `Add`.
    pub stale: Vec<LineKey>,
    /// Logical keys that appeared more than once in the import batch.
    pub duplicates: Vec<String>,
    /// Source files that failed to parse and were skipped.
    pub skipped_files: Vec<(String, Error)>,
}

/// The master entry table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocFile {
    entries: BTreeMap<LineKey, LineValue>,
    languages: Vec<String>,
}

impl LocFile {
    pub fn new() -> Self {
        LocFile::default()
    }

    /// Known languages, in first-seen order. Grown by merges, never shrunk.
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn add_language(&mut self, language: &str) {
        if !self.languages.iter().any(|l| l == language) {
            self.languages.push(language.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&LineKey, &LineValue)> {
        self.entries.iter()
    }

    /// Finds the stored key matching `key`: exact identity first, then the
    /// first entry on the same logical line (index ignored), so mappings
    /// survive re-imports that renumber disambiguation indices.
    pub fn find_key(&self, key: &LineKey) -> Option<&LineKey> {
        if let Some((stored, _)) = self.entries.get_key_value(key) {
            return Some(stored);
        }
        self.entries.keys().find(|k| k.same_line(key))
    }

    pub fn value_for_key(&self, key: &LineKey) -> Option<&LineValue> {
        if let Some(value) = self.entries.get(key) {
            return Some(value);
        }
        self.entries
            .iter()
            .find(|(k, _)| k.same_line(key))
            .map(|(_, v)| v)
    }

    /// Inserts or replaces an entry. When an equal key already exists, its
    /// metadata is replaced by the given key's.
    pub fn set_value(&mut self, key: LineKey, value: LineValue) {
        // BTreeMap keeps the original key on insert; drop it first so the
        // new metadata wins.
        self.entries.remove(&key);
        if let LineValue::Entries(values) = &value {
            let new_languages: Vec<String> = values.keys().cloned().collect();
            for language in new_languages {
                self.add_language(&language);
            }
        }
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: &LineKey) -> Option<LineValue> {
        self.entries.remove(key)
    }

    /// Resolves the value of `key` for `language`.
    pub fn resolve(&self, key: &LineKey, language: &str) -> Result<String, ResolveError> {
        let value = self
            .value_for_key(key)
            .ok_or_else(|| ResolveError::KeyNotFound(key.logical_key.clone()))?;
        match value {
            LineValue::Entries(map) => map
                .get(language)
                .cloned()
                .ok_or_else(|| ResolveError::NoValueForLanguage(language.to_string())),
            LineValue::Mapping(mapping) => mapping.apply(language, self),
        }
    }

    /// Like [`resolve`](Self::resolve), but substitutes a per-error-kind
    /// sentinel instead of failing, for UI and export use.
    pub fn resolve_or_sentinel(&self, key: &LineKey, language: &str) -> String {
        match self.resolve(key, language) {
            Ok(value) => value,
            Err(err) => {
                debug!(
                    "resolution of `{}` for {language} failed: {err}",
                    key.logical_key
                );
                err.sentinel().to_string()
            }
        }
    }

    /// Merges a batch of freshly parsed entries under one environment.
    ///
    /// Within-batch duplicates are merged first (non-empty comment wins when
    /// exactly one side is empty, first-seen otherwise); existing entries on
    /// the same line get their value replaced wholesale; keys of the
    /// environment that the batch did not mention are dropped (`Replace`) or
    /// reported stale (`Add`).
    pub fn merge_entries_from_environment(
        &mut self,
        environment: &str,
        imported: Vec<ImportedEntry>,
        style: MergeStyle,
    ) -> MergeReport {
        let mut report = MergeReport::default();
        let batch = dedupe_batch(imported, &mut report);

        let mut next_index = self
            .entries
            .keys()
            .filter(|k| k.environment == environment)
            .map(|k| k.disambiguation_index + 1)
            .max()
            .unwrap_or(0);

        let mut seen: BTreeSet<LineKey> = BTreeSet::new();

        for entry in batch {
            for language in entry.values.keys() {
                self.add_language(language);
            }

            let probe = LineKey {
                logical_key: entry.logical_key.clone(),
                environment: environment.to_string(),
                origin_file: entry.origin_file.clone(),
                ..LineKey::new("", "", "")
            };
            let existing = self.find_key(&probe).cloned();

            match existing {
                Some(existing_key) => {
                    let mut new_key = existing_key.clone();
                    reconcile_comment(&mut new_key.comment, &entry.comment, &entry.logical_key);
                    new_key.attributes.extend(entry.attributes.clone());

                    let new_value = match self.entries.get(&existing_key) {
                        // an explicit mapping is authoritative over imports
                        Some(LineValue::Mapping(mapping)) => {
                            debug!(
                                "keeping mapping for `{}` over imported value",
                                entry.logical_key
                            );
                            LineValue::Mapping(mapping.clone())
                        }
                        Some(LineValue::Entries(old)) => {
                            let mut merged = old.clone();
                            merged.extend(entry.values);
                            LineValue::Entries(merged)
                        }
                        None => LineValue::Entries(entry.values),
                    };
                    self.entries.remove(&existing_key);
                    seen.insert(new_key.clone());
                    self.entries.insert(new_key, new_value);
                }
                None => {
                    let key = LineKey {
                        logical_key: entry.logical_key,
                        environment: environment.to_string(),
                        origin_file: entry.origin_file,
                        disambiguation_index: next_index,
                        comment: entry.comment,
                        attributes: entry.attributes,
                        group_comment: String::new(),
                        user_comment: String::new(),
                    };
                    next_index += 1;
                    seen.insert(key.clone());
                    self.entries.insert(key, LineValue::Entries(entry.values));
                }
            }
        }

        // mapping entries are authored in the table, not derived from
        // sources; an import can never make them stale
        report.stale = self
            .entries
            .iter()
            .filter(|(k, v)| {
                k.environment == environment
                    && !seen.contains(k)
                    && !matches!(v, LineValue::Mapping(_))
            })
            .map(|(k, _)| k.clone())
            .collect();
        if style == MergeStyle::Replace {
            for key in &report.stale {
                self.entries.remove(key);
            }
        }
        report
    }

    /// Parses and merges a set of Xcode `.strings` files, each tagged with
    /// its language. Files failing to parse are skipped and reported; the
    /// rest of the batch proceeds. File order is the given order, which
    /// fixes the duplicate-key tie-break deterministically.
    ///
    /// Entries are keyed by the file *name*, not the full path: the per
    /// language copies of `Localizable.strings` under different `.lproj`
    /// directories all feed the same line.
    pub fn merge_xcode_strings_files<P: AsRef<Path>>(
        &mut self,
        environment: &str,
        files: &[(P, String)],
        style: MergeStyle,
    ) -> MergeReport {
        let mut imported = Vec::new();
        let mut skipped = Vec::new();
        for (path, language) in files {
            let display = path.as_ref().display().to_string();
            match StringsFile::read_from(path) {
                Ok(file) => {
                    imported.extend(file.to_imported_entries(&origin_name(path, &display), language));
                }
                Err(err) => {
                    warn!("skipping `{display}`: {err}");
                    skipped.push((display, err));
                }
            }
        }
        let mut report = self.merge_entries_from_environment(environment, imported, style);
        report.skipped_files = skipped;
        report
    }

    /// Android counterpart of
    /// [`merge_xcode_strings_files`](Self::merge_xcode_strings_files).
    pub fn merge_android_strings_files<P: AsRef<Path>>(
        &mut self,
        environment: &str,
        files: &[(P, String)],
        style: MergeStyle,
    ) -> MergeReport {
        let mut imported = Vec::new();
        let mut skipped = Vec::new();
        for (path, language) in files {
            let display = path.as_ref().display().to_string();
            match AndroidStringsFile::read_from(path) {
                Ok(file) => {
                    imported.extend(file.to_imported_entries(&origin_name(path, &display), language));
                }
                Err(err) => {
                    warn!("skipping `{display}`: {err}");
                    skipped.push((display, err));
                }
            }
        }
        let mut report = self.merge_entries_from_environment(environment, imported, style);
        report.skipped_files = skipped;
        report
    }
}

/// Language-independent origin for an imported file: its name, with the
/// full path as fallback for pathological paths.
fn origin_name<P: AsRef<Path>>(path: P, display: &str) -> String {
    path.as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| display.to_string())
}

/// Comment reconciliation: when the two differ and exactly one is empty,
/// the non-empty one wins; otherwise the first-seen stays and the conflict
/// is logged.
fn reconcile_comment(current: &mut String, incoming: &str, logical_key: &str) {
    if current == incoming {
        return;
    }
    if current.is_empty() {
        *current = incoming.to_string();
    } else if !incoming.is_empty() {
        warn!(
            "conflicting comments for `{logical_key}`; keeping first-seen ({current:?} over {incoming:?})"
        );
    }
}

/// Merges within-batch duplicates, preserving first-seen order.
fn dedupe_batch(imported: Vec<ImportedEntry>, report: &mut MergeReport) -> Vec<ImportedEntry> {
    let mut batch: Vec<ImportedEntry> = Vec::with_capacity(imported.len());
    let mut positions: BTreeMap<(String, String), usize> = BTreeMap::new();

    for entry in imported {
        let slot = (entry.origin_file.clone(), entry.logical_key.clone());
        match positions.get(&slot) {
            Some(&pos) => {
                report.duplicates.push(entry.logical_key.clone());
                let kept = &mut batch[pos];
                reconcile_comment(&mut kept.comment, &entry.comment, &entry.logical_key);
                for (attribute, value) in entry.attributes {
                    kept.attributes.entry(attribute).or_insert(value);
                }
                for (language, value) in entry.values {
                    if let Some(first) = kept.values.get(&language) {
                        if *first != value {
                            warn!(
                                "duplicate key `{}` with differing values for {language}; keeping first-seen",
                                entry.logical_key
                            );
                        }
                    } else {
                        kept.values.insert(language, value);
                    }
                }
            }
            None => {
                positions.insert(slot, batch.len());
                batch.push(entry);
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingComponent;
    use crate::transformers::ValueTransformer;

    fn entry(key: &str, file: &str, lang: &str, value: &str, comment: &str) -> ImportedEntry {
        ImportedEntry {
            logical_key: key.to_string(),
            origin_file: file.to_string(),
            comment: comment.to_string(),
            attributes: BTreeMap::new(),
            values: [(lang.to_string(), value.to_string())].into_iter().collect(),
        }
    }

    #[test]
    fn test_merge_assigns_increasing_indices() {
        let mut table = LocFile::new();
        table.merge_entries_from_environment(
            "Xcode",
            vec![
                entry("a", "f.strings", "English", "A", ""),
                entry("b", "f.strings", "English", "B", ""),
            ],
            MergeStyle::Replace,
        );
        let indices: Vec<usize> = table
            .entries()
            .map(|(k, _)| k.disambiguation_index)
            .collect();
        assert_eq!(indices.len(), 2);
        assert_ne!(indices[0], indices[1]);
    }

    #[test]
    fn test_merge_replace_is_idempotent() {
        let batch = || {
            vec![
                entry("a", "f.strings", "English", "A", "first"),
                entry("b", "f.strings", "English", "B", ""),
            ]
        };
        let mut once = LocFile::new();
        once.merge_entries_from_environment("Xcode", batch(), MergeStyle::Replace);
        let mut twice = once.clone();
        twice.merge_entries_from_environment("Xcode", batch(), MergeStyle::Replace);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_replace_drops_stale_add_keeps() {
        let mut table = LocFile::new();
        table.merge_entries_from_environment(
            "Xcode",
            vec![entry("old", "f.strings", "English", "O", "")],
            MergeStyle::Replace,
        );

        let mut added = table.clone();
        let report = added.merge_entries_from_environment(
            "Xcode",
            vec![entry("new", "f.strings", "English", "N", "")],
            MergeStyle::Add,
        );
        assert_eq!(report.stale.len(), 1);
        assert_eq!(added.len(), 2);

        let report = table.merge_entries_from_environment(
            "Xcode",
            vec![entry("new", "f.strings", "English", "N", "")],
            MergeStyle::Replace,
        );
        assert_eq!(report.stale.len(), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_merge_does_not_touch_other_environments() {
        let mut table = LocFile::new();
        table.merge_entries_from_environment(
            "Android",
            vec![entry("a", "strings.xml", "English", "A", "")],
            MergeStyle::Replace,
        );
        table.merge_entries_from_environment(
            "Xcode",
            vec![entry("b", "f.strings", "English", "B", "")],
            MergeStyle::Replace,
        );
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_duplicate_key_nonempty_comment_wins() {
        let mut table = LocFile::new();
        let report = table.merge_entries_from_environment(
            "Xcode",
            vec![
                entry("a", "f.strings", "English", "A", ""),
                entry("a", "f.strings", "English", "A", "useful comment"),
            ],
            MergeStyle::Replace,
        );
        assert_eq!(report.duplicates, vec!["a".to_string()]);
        let (key, _) = table.entries().next().unwrap();
        assert_eq!(key.comment, "useful comment");
    }

    #[test]
    fn test_duplicate_key_first_value_wins() {
        let mut table = LocFile::new();
        table.merge_entries_from_environment(
            "Xcode",
            vec![
                entry("a", "f.strings", "English", "first", ""),
                entry("a", "f.strings", "English", "second", ""),
            ],
            MergeStyle::Replace,
        );
        let probe = LineKey::new("a", "Xcode", "f.strings");
        assert_eq!(table.resolve(&probe, "English").unwrap(), "first");
    }

    #[test]
    fn test_languages_grow_monotonically() {
        let mut table = LocFile::new();
        table.merge_entries_from_environment(
            "Xcode",
            vec![entry("a", "f.strings", "English", "A", "")],
            MergeStyle::Replace,
        );
        table.merge_entries_from_environment(
            "Xcode",
            vec![entry("a", "f.strings", "French", "Ah", "")],
            MergeStyle::Replace,
        );
        assert_eq!(table.languages(), ["English", "French"]);
        // and the entry now carries both languages
        let probe = LineKey::new("a", "Xcode", "f.strings");
        assert_eq!(table.resolve(&probe, "English").unwrap(), "A");
        assert_eq!(table.resolve(&probe, "French").unwrap(), "Ah");
    }

    #[test]
    fn test_resolve_direct_and_missing_language() {
        let mut table = LocFile::new();
        table.merge_entries_from_environment(
            "Xcode",
            vec![entry("a", "f.strings", "English", "A", "")],
            MergeStyle::Replace,
        );
        let probe = LineKey::new("a", "Xcode", "f.strings");
        assert_eq!(table.resolve(&probe, "English").unwrap(), "A");
        assert_eq!(
            table.resolve(&probe, "French"),
            Err(ResolveError::NoValueForLanguage("French".to_string()))
        );
        assert_eq!(
            table.resolve(&LineKey::new("zz", "Xcode", "f.strings"), "English"),
            Err(ResolveError::KeyNotFound("zz".to_string()))
        );
    }

    #[test]
    fn test_resolve_mapping_to_mapping_fails() {
        let mut table = LocFile::new();
        table.merge_entries_from_environment(
            "Xcode",
            vec![entry("base", "f.strings", "English", "Base", "")],
            MergeStyle::Replace,
        );

        let first_hop = LineKey::new("hop1", "Xcode", "f.strings");
        table.set_value(
            first_hop.clone(),
            LineValue::Mapping(KeyMapping::transforms(
                LineKey::new("base", "Xcode", "f.strings"),
                vec![],
            )),
        );
        let second_hop = LineKey::new("hop2", "Xcode", "f.strings");
        table.set_value(
            second_hop.clone(),
            LineValue::Mapping(KeyMapping::transforms(first_hop.clone(), vec![])),
        );

        assert_eq!(table.resolve(&first_hop, "English").unwrap(), "Base");
        assert_eq!(
            table.resolve(&second_hop, "English"),
            Err(ResolveError::MappedToMappedKey("hop1".to_string()))
        );
    }

    #[test]
    fn test_resolve_mapping_with_transform() {
        let mut table = LocFile::new();
        table.merge_entries_from_environment(
            "Xcode",
            vec![entry("base", "f.strings", "English", "loud", "")],
            MergeStyle::Replace,
        );
        let derived = LineKey::new("derived", "Xcode", "f.strings");
        table.set_value(
            derived.clone(),
            LineValue::Mapping(KeyMapping::new(vec![
                MappingComponent::ValueTransforms {
                    source_key: LineKey::new("base", "Xcode", "f.strings"),
                    transformers: vec![ValueTransformer::ToUpper],
                },
                MappingComponent::ToConstant {
                    constant: "!".to_string(),
                },
            ])),
        );
        assert_eq!(table.resolve(&derived, "English").unwrap(), "LOUD!");
    }

    #[test]
    fn test_resolve_or_sentinel() {
        let table = LocFile::new();
        let missing = LineKey::new("nope", "Xcode", "f.strings");
        assert_eq!(
            table.resolve_or_sentinel(&missing, "English"),
            "!¡!KEY_NOT_FOUND!¡!"
        );
    }

    #[test]
    fn test_mapping_survives_reimport() {
        let mut table = LocFile::new();
        table.merge_entries_from_environment(
            "Xcode",
            vec![
                entry("base", "f.strings", "English", "Base", ""),
                entry("derived", "f.strings", "English", "stale import", ""),
            ],
            MergeStyle::Replace,
        );
        let derived = LineKey::new("derived", "Xcode", "f.strings");
        let stored = table.find_key(&derived).unwrap().clone();
        table.set_value(
            stored,
            LineValue::Mapping(KeyMapping::transforms(
                LineKey::new("base", "Xcode", "f.strings"),
                vec![],
            )),
        );

        table.merge_entries_from_environment(
            "Xcode",
            vec![
                entry("base", "f.strings", "English", "Base", ""),
                entry("derived", "f.strings", "English", "imported again", ""),
            ],
            MergeStyle::Replace,
        );
        assert_eq!(table.resolve(&derived, "English").unwrap(), "Base");
    }
}
