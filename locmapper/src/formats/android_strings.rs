//! Support for the Android `strings.xml` resource format.
//!
//! A structurally simple adapter next to the `.strings` scanner: `<string>`,
//! `<string-array>` items and `<plurals>` items are flattened to entries,
//! with the structural tags preserved in the entry attributes.

use quick_xml::{
    Reader, Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use std::{
    collections::BTreeMap,
    io::{BufRead, Write},
};

use crate::{error::Error, loc_file::ImportedEntry, traits::FileFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    String,
    ArrayItem { array: String, index: usize },
    PluralItem { plurals: String, quantity: String },
}

/// One flattened string resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidResource {
    /// The logical key: the `name` attribute, suffixed for array and plural
    /// items (`colors.2`, `apples:one`).
    pub key: String,
    pub value: String,
    pub translatable: Option<bool>,
    pub kind: ResourceKind,
}

/// A parsed Android `strings.xml` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidStringsFile {
    pub resources: Vec<AndroidResource>,
}

impl FileFormat for AndroidStringsFile {
    fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut xml_reader = Reader::from_reader(reader);
        xml_reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut resources = Vec::new();

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.name().as_ref() == b"string" => {
                    let (name, translatable) = read_name_and_translatable(e)?;
                    let value = read_text_until_end(&mut xml_reader)?;
                    resources.push(AndroidResource {
                        key: name,
                        value,
                        translatable,
                        kind: ResourceKind::String,
                    });
                }
                Ok(Event::Start(ref e)) if e.name().as_ref() == b"string-array" => {
                    let (name, translatable) = read_name_and_translatable(e)?;
                    for (index, (_, value)) in
                        read_items_until(&mut xml_reader, b"string-array")?.into_iter().enumerate()
                    {
                        resources.push(AndroidResource {
                            key: format!("{name}.{index}"),
                            value,
                            translatable,
                            kind: ResourceKind::ArrayItem {
                                array: name.clone(),
                                index,
                            },
                        });
                    }
                }
                Ok(Event::Start(ref e)) if e.name().as_ref() == b"plurals" => {
                    let (name, translatable) = read_name_and_translatable(e)?;
                    for (quantity, value) in read_items_until(&mut xml_reader, b"plurals")? {
                        resources.push(AndroidResource {
                            key: format!("{name}:{quantity}"),
                            value,
                            translatable,
                            kind: ResourceKind::PluralItem {
                                plurals: name.clone(),
                                quantity,
                            },
                        });
                    }
                }
                // self-closing <string name="…"/> has an empty value
                Ok(Event::Empty(ref e)) if e.name().as_ref() == b"string" => {
                    let (name, translatable) = read_name_and_translatable(e)?;
                    resources.push(AndroidResource {
                        key: name,
                        value: String::new(),
                        translatable,
                        kind: ResourceKind::String,
                    });
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(Error::XmlParse(e)),
            }
            buf.clear();
        }
        Ok(AndroidStringsFile { resources })
    }

    fn to_writer<W: Write>(&self, mut writer: W) -> Result<(), Error> {
        let mut xml_writer = Writer::new(&mut writer);

        xml_writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        xml_writer.write_event(Event::Text(BytesText::new("\n")))?;

        xml_writer.write_event(Event::Start(BytesStart::new("resources")))?;
        xml_writer.write_event(Event::Text(BytesText::new("\n")))?;

        // Flattened resources write back as plain strings; the grouped forms
        // are regenerated from the attributes by the exporting toolchain.
        for resource in &self.resources {
            let mut elem = BytesStart::new("string");
            elem.push_attribute(("name", resource.key.as_str()));
            if let Some(translatable) = resource.translatable {
                elem.push_attribute(("translatable", if translatable { "true" } else { "false" }));
            }
            xml_writer.write_event(Event::Start(elem))?;
            xml_writer.write_event(Event::Text(BytesText::new(&resource.value)))?;
            xml_writer.write_event(Event::End(BytesEnd::new("string")))?;
            xml_writer.write_event(Event::Text(BytesText::new("\n")))?;
        }

        xml_writer.write_event(Event::End(BytesEnd::new("resources")))?;
        xml_writer.write_event(Event::Text(BytesText::new("\n")))?;
        Ok(())
    }
}

impl AndroidStringsFile {
    /// Converts the parse into merge-ready entries for `language`, folding
    /// the structural tags into entry attributes.
    pub fn to_imported_entries(&self, origin_file: &str, language: &str) -> Vec<ImportedEntry> {
        self.resources
            .iter()
            .map(|resource| {
                let mut attributes = BTreeMap::new();
                match &resource.kind {
                    ResourceKind::String => {}
                    ResourceKind::ArrayItem { array, index } => {
                        attributes.insert("array_name".to_string(), array.clone());
                        attributes.insert("array_index".to_string(), index.to_string());
                    }
                    ResourceKind::PluralItem { plurals, quantity } => {
                        attributes.insert("plurals_name".to_string(), plurals.clone());
                        attributes.insert("quantity".to_string(), quantity.clone());
                    }
                }
                if resource.translatable == Some(false) {
                    attributes.insert("translatable".to_string(), "false".to_string());
                }
                ImportedEntry {
                    logical_key: resource.key.clone(),
                    origin_file: origin_file.to_string(),
                    comment: String::new(),
                    attributes,
                    values: [(language.to_string(), resource.value.clone())]
                        .into_iter()
                        .collect(),
                }
            })
            .collect()
    }
}

fn read_name_and_translatable(e: &BytesStart) -> Result<(String, Option<bool>), Error> {
    let mut name = None;
    let mut translatable = None;

    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|e| Error::DataMismatch(e.to_string()))?;
        match attr.key.as_ref() {
            b"name" => name = Some(attr.unescape_value()?.to_string()),
            b"translatable" => {
                let v = attr.unescape_value()?.to_string();
                translatable = Some(v == "true");
            }
            _ => {}
        }
    }
    let name = name.ok_or_else(|| Error::DataMismatch("tag missing 'name'".to_string()))?;
    Ok((name, translatable))
}

/// Reads the text content of the current element, up to its end tag.
fn read_text_until_end<R: BufRead>(xml_reader: &mut Reader<R>) -> Result<String, Error> {
    let mut buf = Vec::new();
    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Text(e)) => {
                return Ok(e.unescape().map_err(Error::XmlParse)?.to_string());
            }
            Ok(Event::End(_)) => return Ok(String::new()),
            Ok(Event::Eof) => return Err(Error::DataMismatch("unexpected EOF".to_string())),
            Ok(_) => (),
            Err(e) => return Err(Error::XmlParse(e)),
        }
        buf.clear();
    }
}

/// Reads `<item>` children until the named group closes. Returns
/// `(quantity-or-empty, text)` per item.
fn read_items_until<R: BufRead>(
    xml_reader: &mut Reader<R>,
    group: &[u8],
) -> Result<Vec<(String, String)>, Error> {
    let mut buf = Vec::new();
    let mut items = Vec::new();
    let mut pending_quantity: Option<String> = None;
    let mut pending_text = String::new();

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"item" => {
                let mut quantity = String::new();
                for attr in e.attributes().with_checks(false) {
                    let attr = attr.map_err(|e| Error::DataMismatch(e.to_string()))?;
                    if attr.key.as_ref() == b"quantity" {
                        quantity = attr.unescape_value()?.to_string();
                    }
                }
                pending_quantity = Some(quantity);
                pending_text.clear();
            }
            Ok(Event::Text(e)) if pending_quantity.is_some() => {
                pending_text = e.unescape().map_err(Error::XmlParse)?.to_string();
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"item" => {
                if let Some(quantity) = pending_quantity.take() {
                    items.push((quantity, std::mem::take(&mut pending_text)));
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == group => return Ok(items),
            Ok(Event::Eof) => return Err(Error::DataMismatch("unexpected EOF".to_string())),
            Ok(_) => (),
            Err(e) => return Err(Error::XmlParse(e)),
        }
        buf.clear();
    }
}
