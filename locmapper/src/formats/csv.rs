//! The loc file on-disk form: a delimited master table with one row per
//! entry and one column per language.
//!
//! Header: `__Key, __Env, __Filename, __Comments, __Mappings, File,
//! Comments, <language>...`. A non-empty `__Mappings` cell holds the JSON
//! serialization of a [`KeyMapping`] and is authoritative over the language
//! cells. A row with an empty `__Env` is a group-comment row: its comment
//! text applies to the rows that follow it.

use std::io::{BufRead, Write};

use serde_json::{Value, json};

use crate::{
    error::Error,
    loc_file::{LineKey, LineValue, LocFile},
    mapping::KeyMapping,
    traits::FileFormat,
};

const KEY_HEADER: &str = "__Key";
const ENV_HEADER: &str = "__Env";
const FILENAME_HEADER: &str = "__Filename";
const COMMENTS_HEADER: &str = "__Comments";
const MAPPINGS_HEADER: &str = "__Mappings";
const FILENAME_DISPLAY_HEADER: &str = "File";
const COMMENTS_DISPLAY_HEADER: &str = "Comments";

const FIXED_COLUMNS: usize = 7;

impl FileFormat for LocFile {
    fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = rdr.records();
        let header = loop {
            match records.next() {
                Some(record) => {
                    let record = record?;
                    if record.iter().all(str::is_empty) {
                        continue;
                    }
                    break record;
                }
                None => return Ok(LocFile::new()),
            }
        };
        if header.get(0) != Some(KEY_HEADER) || header.get(1) != Some(ENV_HEADER) {
            return Err(Error::DataMismatch(format!(
                "not a loc file: first columns are {:?}, expected `{KEY_HEADER}`, `{ENV_HEADER}`",
                header.iter().take(2).collect::<Vec<_>>()
            )));
        }
        let languages: Vec<String> = header
            .iter()
            .skip(FIXED_COLUMNS)
            .map(str::to_string)
            .collect();

        let mut loc_file = LocFile::new();
        for language in &languages {
            loc_file.add_language(language);
        }

        let mut current_group = String::new();
        for record in records {
            let record = record?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            let cell = |i: usize| record.get(i).unwrap_or_default().to_string();

            if cell(1).is_empty() {
                // group-comment row: a section header for the rows below
                current_group = cell(3);
                continue;
            }

            let (logical_key, disambiguation_index) = parse_key_cell(&cell(0));
            let (comment, attributes, group_override) = parse_comments_cell(&cell(3));

            let key = LineKey {
                logical_key,
                environment: cell(1),
                origin_file: cell(2),
                disambiguation_index,
                comment,
                attributes,
                group_comment: group_override.unwrap_or_else(|| current_group.clone()),
                user_comment: cell(6),
            };

            let mappings_cell = cell(4);
            let value = if !mappings_cell.is_empty() {
                LineValue::Mapping(KeyMapping::from_json_str(&mappings_cell))
            } else {
                let values = languages
                    .iter()
                    .enumerate()
                    .filter_map(|(i, language)| {
                        let text = record.get(FIXED_COLUMNS + i).unwrap_or_default();
                        if text.is_empty() {
                            None
                        } else {
                            Some((language.clone(), text.to_string()))
                        }
                    })
                    .collect();
                LineValue::Entries(values)
            };
            loc_file.set_value(key, value);
        }
        Ok(loc_file)
    }

    fn to_writer<W: Write>(&self, writer: W) -> Result<(), Error> {
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);

        let mut header = vec![
            KEY_HEADER.to_string(),
            ENV_HEADER.to_string(),
            FILENAME_HEADER.to_string(),
            COMMENTS_HEADER.to_string(),
            MAPPINGS_HEADER.to_string(),
            FILENAME_DISPLAY_HEADER.to_string(),
            COMMENTS_DISPLAY_HEADER.to_string(),
        ];
        header.extend(self.languages().iter().cloned());
        wtr.write_record(&header)?;

        let mut keys: Vec<&LineKey> = self.entries().map(|(k, _)| k).collect();
        keys.sort_by(|a, b| {
            (&a.environment, &a.origin_file, a.disambiguation_index, &a.logical_key).cmp(&(
                &b.environment,
                &b.origin_file,
                b.disambiguation_index,
                &b.logical_key,
            ))
        });

        let mut current_group = String::new();
        for key in keys {
            if key.group_comment != current_group && !key.group_comment.is_empty() {
                current_group = key.group_comment.clone();
                let mut group_row = vec![String::new(); FIXED_COLUMNS + self.languages().len()];
                group_row[3] = current_group.clone();
                wtr.write_record(&group_row)?;
            }

            let Some(value) = self.value_for_key(key) else {
                continue;
            };
            let mut row = Vec::with_capacity(FIXED_COLUMNS + self.languages().len());
            row.push(write_key_cell(key));
            row.push(key.environment.clone());
            row.push(key.origin_file.clone());
            row.push(write_comments_cell(key, &current_group));
            row.push(match value {
                LineValue::Mapping(mapping) => mapping.to_json_string(),
                LineValue::Entries(_) => String::new(),
            });
            row.push(
                key.origin_file
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string(),
            );
            row.push(key.user_comment.clone());
            for language in self.languages() {
                row.push(match value {
                    LineValue::Entries(map) => map.get(language).cloned().unwrap_or_default(),
                    // convenience for human readers; ignored when loading
                    // because the mapping column is authoritative
                    LineValue::Mapping(_) => self.resolve_or_sentinel(key, language),
                });
            }
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn write_key_cell(key: &LineKey) -> String {
    if key.disambiguation_index == 0 {
        key.logical_key.clone()
    } else {
        format!("{}#{}", key.logical_key, key.disambiguation_index)
    }
}

fn parse_key_cell(cell: &str) -> (String, usize) {
    if let Some((logical, index)) = cell.rsplit_once('#') {
        if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) {
            return (logical.to_string(), index.parse().unwrap_or(0));
        }
    }
    (cell.to_string(), 0)
}

/// The `__Comments` cell is the plain comment text unless attributes or an
/// explicit group are attached, in which case it is a small JSON object.
fn write_comments_cell(key: &LineKey, current_group: &str) -> String {
    let needs_structure =
        !key.attributes.is_empty() || key.group_comment != current_group;
    if !needs_structure {
        return key.comment.clone();
    }
    let mut obj = serde_json::Map::new();
    if !key.comment.is_empty() {
        obj.insert("comment".to_string(), json!(key.comment));
    }
    if !key.attributes.is_empty() {
        obj.insert("attributes".to_string(), json!(key.attributes));
    }
    if key.group_comment != current_group {
        obj.insert("group".to_string(), json!(key.group_comment));
    }
    Value::Object(obj).to_string()
}

fn parse_comments_cell(
    cell: &str,
) -> (
    String,
    std::collections::BTreeMap<String, String>,
    Option<String>,
) {
    if cell.starts_with('{') {
        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(cell) {
            let known = obj.contains_key("comment")
                || obj.contains_key("attributes")
                || obj.contains_key("group");
            if known {
                let comment = obj
                    .get("comment")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let attributes = obj
                    .get("attributes")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let group = obj
                    .get("group")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return (comment, attributes, group);
            }
        }
    }
    (cell.to_string(), Default::default(), None)
}
