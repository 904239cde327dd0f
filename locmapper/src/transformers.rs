//! Value transformers: the tokenized-text transformation pipeline applied by
//! mapping components.
//!
//! A transformer consumes a source string and a language and produces a
//! transformed string. Transformers are chained left to right; the first
//! failure aborts resolution of the enclosing mapping component.
//!
//! Every transformer serializes to a JSON object tagged with `__type`.
//! Records that cannot be understood degrade to [`ValueTransformer::Invalid`],
//! which keeps the raw payload and serializes back to it byte-compatibly.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    error::ResolveError,
    plurality::{PluralValue, PluralityDefinition},
};

/// Marker substituted for a plural variant that has no representative value
/// in the simplified grammar (e.g. `many` in English).
pub const NO_VALUE_MARKER: &str = "---";

pub const DEFAULT_GENDER_OPEN: char = '`';
pub const DEFAULT_GENDER_MIDDLE: char = '¦';
pub const DEFAULT_GENDER_CLOSE: char = '´';
pub const DEFAULT_NUMBER_DELIM: char = '#';
pub const DEFAULT_PLURAL_OPEN: char = '<';
pub const DEFAULT_PLURAL_MIDDLE: char = ':';
pub const DEFAULT_PLURAL_CLOSE: char = '>';
pub const DEFAULT_SIMPLE_DELIM: char = '|';
pub const DEFAULT_REGION_OPEN: char = '{';
pub const DEFAULT_REGION_CLOSE: char = '}';
pub const DEFAULT_ESCAPE_TOKEN: &str = "~";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Other,
}

/// The Unicode CLDR plural categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnicodePluralCategory {
    Zero,
    One,
    Two,
    Few,
    Many,
    Other,
}

impl UnicodePluralCategory {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "zero" => Some(Self::Zero),
            "one" => Some(Self::One),
            "two" => Some(Self::Two),
            "few" => Some(Self::Few),
            "many" => Some(Self::Many),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::One => "one",
            Self::Two => "two",
            Self::Few => "few",
            Self::Many => "many",
            Self::Other => "other",
        }
    }
}

/// One plurality grammar: a plurality definition plus, per plural category,
/// the representative integer fed into it. Categories without a
/// representative resolve to [`NO_VALUE_MARKER`].
#[derive(Debug, Clone)]
pub struct PluralityGrammar {
    pub definition: PluralityDefinition,
    pub representatives: BTreeMap<UnicodePluralCategory, i64>,
}

impl PluralityGrammar {
    pub fn representative(&self, category: UnicodePluralCategory) -> Option<i64> {
        self.representatives.get(&category).copied()
    }
}

/// Language-name to grammar table.
///
/// Matching is a case-insensitive substring test against the configured
/// names ("english" matches "British English"). This is a known
/// simplification; the table is configuration data, so callers needing a
/// language family outside [`LanguageGrammars::standard`] build their own
/// with [`LanguageGrammars::insert`] and pass it through
/// [`ValueTransformer::apply_with_grammars`].
#[derive(Debug, Clone, Default)]
pub struct LanguageGrammars {
    entries: Vec<(Vec<String>, PluralityGrammar)>,
}

impl LanguageGrammars {
    /// An empty table; languages match nothing until inserted.
    pub fn new() -> LanguageGrammars {
        LanguageGrammars::default()
    }

    /// The stock table: English-like, Polish and Russian-like families.
    pub fn standard() -> &'static LanguageGrammars {
        &STANDARD_GRAMMARS
    }

    /// Registers `grammar` under every name in `names`. Earlier entries win
    /// when several names match a language.
    pub fn insert<I, S>(&mut self, names: I, grammar: PluralityGrammar)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(|n| n.into().to_lowercase()).collect();
        self.entries.push((names, grammar));
    }

    pub fn grammar_for(&self, language: &str) -> Option<&PluralityGrammar> {
        let lowered = language.to_lowercase();
        self.entries
            .iter()
            .find(|(names, _)| names.iter().any(|n| lowered.contains(n.as_str())))
            .map(|(_, grammar)| grammar)
    }
}

lazy_static! {
    static ref STANDARD_GRAMMARS: LanguageGrammars = {
        use UnicodePluralCategory::*;
        let english_like = PluralityGrammar {
            definition: PluralityDefinition::parse("(1)(*)"),
            representatives: [(One, 1), (Other, 2)].into_iter().collect(),
        };
        let polish = PluralityGrammar {
            definition: PluralityDefinition::parse("(1)(2→4)(*)"),
            representatives: [(One, 1), (Few, 2), (Many, 5)].into_iter().collect(),
        };
        let russian_like = PluralityGrammar {
            // trailing-digit zones: 21 is "one", 23 is "few"; teens (11–14)
            // fall into the digit zones rather than the wildcard
            definition: PluralityDefinition::parse("(*1)(*2,*3,*4)(*)"),
            representatives: [(One, 1), (Few, 2), (Many, 5)].into_iter().collect(),
        };
        let mut table = LanguageGrammars::new();
        table.insert(
            ["english", "french", "german", "spanish", "italian", "portuguese", "dutch"],
            english_like,
        );
        table.insert(["polish"], polish);
        table.insert(["russian", "ukrainian"], russian_like);
        table
    };
}

/// A single text-to-text transformation step.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueTransformer {
    /// Locale-naive uppercase of the full string.
    ToUpper,

    /// Replaces delimited blocks whose content appears in `replacements`;
    /// blocks with unknown content are kept verbatim.
    SimpleStringReplacement {
        open_delim: char,
        close_delim: char,
        escape_token: Option<String>,
        replacements: BTreeMap<String, String>,
    },

    /// Picks the first (male) or second (other) branch of every
    /// open/middle/close delimited block.
    GenderVariantPick {
        gender: Gender,
        open_delim: char,
        middle_delim: char,
        close_delim: char,
        escape_token: Option<String>,
    },

    /// Selects one branch of every `<a:b:…>` block according to the
    /// language's plurality grammar, and substitutes numbered placeholders
    /// for `#…#` number blocks.
    PluralVariantPick {
        category: UnicodePluralCategory,
        number_open_delim: char,
        number_close_delim: char,
        plural_open_delim: char,
        plural_middle_delim: char,
        plural_close_delim: char,
        escape_token: Option<String>,
    },

    /// Replaces every delimited region, delimiters included, with a literal.
    RegionDelimitersReplacement {
        open_delim: char,
        close_delim: char,
        replacement: String,
    },

    /// A record that could not be deserialized. Preserved verbatim so a
    /// round trip does not lose information; applying it is an error.
    Invalid(Value),
}

impl ValueTransformer {
    pub fn is_valid(&self) -> bool {
        !matches!(self, ValueTransformer::Invalid(_))
    }

    /// Applies the transformer to `text` for `language`, resolving plural
    /// grammars from the stock table.
    pub fn apply(&self, text: &str, language: &str) -> Result<String, ResolveError> {
        self.apply_with_grammars(text, language, LanguageGrammars::standard())
    }

    /// Like [`apply`](Self::apply), but resolving plural grammars from a
    /// caller-supplied table.
    pub fn apply_with_grammars(
        &self,
        text: &str,
        language: &str,
        grammars: &LanguageGrammars,
    ) -> Result<String, ResolveError> {
        match self {
            ValueTransformer::ToUpper => Ok(text.to_uppercase()),

            ValueTransformer::SimpleStringReplacement {
                open_delim,
                close_delim,
                escape_token,
                replacements,
            } => scan_blocks(text, *open_delim, *close_delim, escape_token.as_deref(), |inner| {
                let stripped = strip_escapes(inner, escape_token.as_deref());
                Ok(match replacements.get(&stripped) {
                    Some(replacement) => replacement.clone(),
                    None => format!("{open_delim}{inner}{close_delim}"),
                })
            }),

            ValueTransformer::GenderVariantPick {
                gender,
                open_delim,
                middle_delim,
                close_delim,
                escape_token,
            } => scan_blocks(text, *open_delim, *close_delim, escape_token.as_deref(), |inner| {
                let parts = split_escaped(inner, *middle_delim, escape_token.as_deref());
                if parts.len() != 2 {
                    return Err(ResolveError::InvalidTokens(inner.to_string()));
                }
                let picked = match gender {
                    Gender::Male => &parts[0],
                    Gender::Other => &parts[1],
                };
                Ok(strip_escapes(picked, escape_token.as_deref()))
            }),

            ValueTransformer::PluralVariantPick {
                category,
                number_open_delim,
                number_close_delim,
                plural_open_delim,
                plural_middle_delim,
                plural_close_delim,
                escape_token,
            } => {
                let grammar = grammars
                    .grammar_for(language)
                    .ok_or_else(|| ResolveError::LanguageNotFound(language.to_string()))?;
                let Some(representative) = grammar.representative(*category) else {
                    return Ok(NO_VALUE_MARKER.to_string());
                };

                let picked = scan_blocks(
                    text,
                    *plural_open_delim,
                    *plural_close_delim,
                    escape_token.as_deref(),
                    |inner| {
                        let branches =
                            split_escaped(inner, *plural_middle_delim, escape_token.as_deref());
                        if branches.is_empty() {
                            return Err(ResolveError::InvalidTokens(inner.to_string()));
                        }
                        let idx = grammar.definition.index_of_version_to_use(
                            PluralValue::Int(representative),
                            branches.len(),
                        );
                        Ok(strip_escapes(&branches[idx], escape_token.as_deref()))
                    },
                )?;

                let mut argument_number = 0usize;
                scan_blocks(
                    &picked,
                    *number_open_delim,
                    *number_close_delim,
                    escape_token.as_deref(),
                    |_inner| {
                        argument_number += 1;
                        Ok(format!("%{argument_number}$d"))
                    },
                )
            }

            ValueTransformer::RegionDelimitersReplacement {
                open_delim,
                close_delim,
                replacement,
            } => scan_blocks(text, *open_delim, *close_delim, None, |_inner| {
                Ok(replacement.clone())
            }),

            ValueTransformer::Invalid(_) => Err(ResolveError::InvalidMapping),
        }
    }

    /// Serializes to the tagged JSON record. Delimiters equal to the
    /// documented defaults are omitted.
    pub fn to_json(&self) -> Value {
        fn set_char(obj: &mut serde_json::Map<String, Value>, key: &str, c: char, default: char) {
            if c != default {
                obj.insert(key.to_string(), Value::String(c.to_string()));
            }
        }
        fn set_escape(obj: &mut serde_json::Map<String, Value>, escape: &Option<String>) {
            match escape {
                Some(token) if token != DEFAULT_ESCAPE_TOKEN => {
                    obj.insert("escape_token".to_string(), Value::String(token.clone()));
                }
                None => {
                    obj.insert("escape_token".to_string(), Value::Null);
                }
                _ => {}
            }
        }

        match self {
            ValueTransformer::ToUpper => json!({ "__type": "to_upper" }),

            ValueTransformer::SimpleStringReplacement {
                open_delim,
                close_delim,
                escape_token,
                replacements,
            } => {
                let mut obj = serde_json::Map::new();
                obj.insert("__type".into(), "simple_string_replacement".into());
                set_char(&mut obj, "open_delim", *open_delim, DEFAULT_SIMPLE_DELIM);
                set_char(&mut obj, "close_delim", *close_delim, DEFAULT_SIMPLE_DELIM);
                set_escape(&mut obj, escape_token);
                obj.insert(
                    "replacements".into(),
                    serde_json::to_value(replacements).unwrap_or(Value::Null),
                );
                Value::Object(obj)
            }

            ValueTransformer::GenderVariantPick {
                gender,
                open_delim,
                middle_delim,
                close_delim,
                escape_token,
            } => {
                let mut obj = serde_json::Map::new();
                obj.insert("__type".into(), "gender_variant_pick".into());
                obj.insert(
                    "gender".into(),
                    match gender {
                        Gender::Male => "male".into(),
                        Gender::Other => "other".into(),
                    },
                );
                set_char(&mut obj, "open_delim", *open_delim, DEFAULT_GENDER_OPEN);
                set_char(&mut obj, "middle_delim", *middle_delim, DEFAULT_GENDER_MIDDLE);
                set_char(&mut obj, "close_delim", *close_delim, DEFAULT_GENDER_CLOSE);
                set_escape(&mut obj, escape_token);
                Value::Object(obj)
            }

            ValueTransformer::PluralVariantPick {
                category,
                number_open_delim,
                number_close_delim,
                plural_open_delim,
                plural_middle_delim,
                plural_close_delim,
                escape_token,
            } => {
                let mut obj = serde_json::Map::new();
                obj.insert("__type".into(), "plural_variant_pick".into());
                obj.insert("category".into(), category.name().into());
                set_char(&mut obj, "number_open_delim", *number_open_delim, DEFAULT_NUMBER_DELIM);
                set_char(&mut obj, "number_close_delim", *number_close_delim, DEFAULT_NUMBER_DELIM);
                set_char(&mut obj, "plural_open_delim", *plural_open_delim, DEFAULT_PLURAL_OPEN);
                set_char(&mut obj, "plural_middle_delim", *plural_middle_delim, DEFAULT_PLURAL_MIDDLE);
                set_char(&mut obj, "plural_close_delim", *plural_close_delim, DEFAULT_PLURAL_CLOSE);
                set_escape(&mut obj, escape_token);
                Value::Object(obj)
            }

            ValueTransformer::RegionDelimitersReplacement {
                open_delim,
                close_delim,
                replacement,
            } => {
                let mut obj = serde_json::Map::new();
                obj.insert("__type".into(), "region_delimiters_replacement".into());
                set_char(&mut obj, "open_delim", *open_delim, DEFAULT_REGION_OPEN);
                set_char(&mut obj, "close_delim", *close_delim, DEFAULT_REGION_CLOSE);
                obj.insert("replacement".into(), Value::String(replacement.clone()));
                Value::Object(obj)
            }

            ValueTransformer::Invalid(raw) => raw.clone(),
        }
    }

    /// Deserializes from the tagged JSON record. Never fails: anything that
    /// cannot be understood becomes [`ValueTransformer::Invalid`] carrying
    /// the raw payload.
    pub fn from_json(value: &Value) -> ValueTransformer {
        let invalid = || ValueTransformer::Invalid(value.clone());
        let Some(obj) = value.as_object() else {
            return invalid();
        };
        let Some(type_tag) = obj.get("__type").and_then(Value::as_str) else {
            return invalid();
        };

        // `Some(c)` on success, `None` when the field is present but not a
        // single-character string.
        fn opt_char(
            obj: &serde_json::Map<String, Value>,
            key: &str,
            default: char,
        ) -> Option<char> {
            match obj.get(key) {
                None => Some(default),
                Some(Value::String(s)) => {
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Some(c),
                        _ => None,
                    }
                }
                Some(_) => None,
            }
        }
        fn opt_escape(obj: &serde_json::Map<String, Value>) -> Option<Option<String>> {
            match obj.get("escape_token") {
                None => Some(Some(DEFAULT_ESCAPE_TOKEN.to_string())),
                Some(Value::Null) => Some(None),
                Some(Value::String(s)) if !s.is_empty() => Some(Some(s.clone())),
                Some(_) => None,
            }
        }

        let transformer = match type_tag {
            "to_upper" => Some(ValueTransformer::ToUpper),

            "simple_string_replacement" => (|| {
                let replacements: BTreeMap<String, String> =
                    serde_json::from_value(obj.get("replacements")?.clone()).ok()?;
                Some(ValueTransformer::SimpleStringReplacement {
                    open_delim: opt_char(obj, "open_delim", DEFAULT_SIMPLE_DELIM)?,
                    close_delim: opt_char(obj, "close_delim", DEFAULT_SIMPLE_DELIM)?,
                    escape_token: opt_escape(obj)?,
                    replacements,
                })
            })(),

            "gender_variant_pick" => (|| {
                let gender = match obj.get("gender")?.as_str()? {
                    "male" => Gender::Male,
                    "other" => Gender::Other,
                    _ => return None,
                };
                Some(ValueTransformer::GenderVariantPick {
                    gender,
                    open_delim: opt_char(obj, "open_delim", DEFAULT_GENDER_OPEN)?,
                    middle_delim: opt_char(obj, "middle_delim", DEFAULT_GENDER_MIDDLE)?,
                    close_delim: opt_char(obj, "close_delim", DEFAULT_GENDER_CLOSE)?,
                    escape_token: opt_escape(obj)?,
                })
            })(),

            "plural_variant_pick" => (|| {
                let category = UnicodePluralCategory::from_name(obj.get("category")?.as_str()?)?;
                Some(ValueTransformer::PluralVariantPick {
                    category,
                    number_open_delim: opt_char(obj, "number_open_delim", DEFAULT_NUMBER_DELIM)?,
                    number_close_delim: opt_char(obj, "number_close_delim", DEFAULT_NUMBER_DELIM)?,
                    plural_open_delim: opt_char(obj, "plural_open_delim", DEFAULT_PLURAL_OPEN)?,
                    plural_middle_delim: opt_char(obj, "plural_middle_delim", DEFAULT_PLURAL_MIDDLE)?,
                    plural_close_delim: opt_char(obj, "plural_close_delim", DEFAULT_PLURAL_CLOSE)?,
                    escape_token: opt_escape(obj)?,
                })
            })(),

            "region_delimiters_replacement" => (|| {
                let replacement = obj.get("replacement")?.as_str()?.to_string();
                Some(ValueTransformer::RegionDelimitersReplacement {
                    open_delim: opt_char(obj, "open_delim", DEFAULT_REGION_OPEN)?,
                    close_delim: opt_char(obj, "close_delim", DEFAULT_REGION_CLOSE)?,
                    replacement,
                })
            })(),

            _ => None,
        };

        transformer.unwrap_or_else(invalid)
    }
}

/// Applies a transformer chain as a strict left-to-right fold, resolving
/// plural grammars from the stock table.
pub fn apply_chain(
    transformers: &[ValueTransformer],
    text: &str,
    language: &str,
) -> Result<String, ResolveError> {
    apply_chain_with_grammars(transformers, text, language, LanguageGrammars::standard())
}

/// [`apply_chain`] with a caller-supplied grammar table.
pub fn apply_chain_with_grammars(
    transformers: &[ValueTransformer],
    text: &str,
    language: &str,
    grammars: &LanguageGrammars,
) -> Result<String, ResolveError> {
    let mut current = text.to_string();
    for transformer in transformers {
        current = transformer.apply_with_grammars(&current, language, grammars)?;
    }
    Ok(current)
}

/// Walks `text` replacing every `open…close` block with the closure's
/// output. The escape token makes the following character literal, both
/// outside and inside blocks; outside blocks it is removed from the output.
fn scan_blocks(
    text: &str,
    open: char,
    close: char,
    escape: Option<&str>,
    mut replace: impl FnMut(&str) -> Result<String, ResolveError>,
) -> Result<String, ResolveError> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        if let Some(len) = escape_at(&chars, i, escape) {
            // escaped char is literal output; the token itself is dropped
            if let Some(&escaped) = chars.get(i + len) {
                out.push(escaped);
                i += len + 1;
            } else {
                i += len;
            }
            continue;
        }
        if chars[i] == open {
            let mut j = i + 1;
            let mut inner = String::new();
            let mut closed = false;
            while j < chars.len() {
                if let Some(len) = escape_at(&chars, j, escape) {
                    // keep the escape token raw inside the block; the
                    // replacement closure strips it
                    for k in 0..len {
                        inner.push(chars[j + k]);
                    }
                    if let Some(&escaped) = chars.get(j + len) {
                        inner.push(escaped);
                        j += len + 1;
                    } else {
                        j += len;
                    }
                    continue;
                }
                if chars[j] == close {
                    closed = true;
                    break;
                }
                inner.push(chars[j]);
                j += 1;
            }
            if !closed {
                return Err(ResolveError::InvalidTokens(text.to_string()));
            }
            out.push_str(&replace(&inner)?);
            i = j + 1;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    Ok(out)
}

/// True when the escape token starts at `chars[i]`; returns its length.
fn escape_at(chars: &[char], i: usize, escape: Option<&str>) -> Option<usize> {
    let escape = escape?;
    let escape_chars: Vec<char> = escape.chars().collect();
    if escape_chars.is_empty() || i + escape_chars.len() > chars.len() {
        return None;
    }
    if chars[i..i + escape_chars.len()] == escape_chars[..] {
        Some(escape_chars.len())
    } else {
        None
    }
}

/// Splits raw block content on `separator`, honoring the escape token.
fn split_escaped(inner: &str, separator: char, escape: Option<&str>) -> Vec<String> {
    let chars: Vec<char> = inner.chars().collect();
    let mut parts = vec![String::new()];
    let mut i = 0;
    while i < chars.len() {
        if let Some(len) = escape_at(&chars, i, escape) {
            for k in 0..len {
                parts.last_mut().unwrap().push(chars[i + k]);
            }
            if let Some(&escaped) = chars.get(i + len) {
                parts.last_mut().unwrap().push(escaped);
                i += len + 1;
            } else {
                i += len;
            }
            continue;
        }
        if chars[i] == separator {
            parts.push(String::new());
        } else {
            parts.last_mut().unwrap().push(chars[i]);
        }
        i += 1;
    }
    parts
}

/// Removes escape tokens, keeping the escaped characters.
fn strip_escapes(s: &str, escape: Option<&str>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        if let Some(len) = escape_at(&chars, i, escape) {
            if let Some(&escaped) = chars.get(i + len) {
                out.push(escaped);
                i += len + 1;
            } else {
                i += len;
            }
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// A gender pick with all-default delimiters.
pub fn gender_variant_pick(gender: Gender) -> ValueTransformer {
    ValueTransformer::GenderVariantPick {
        gender,
        open_delim: DEFAULT_GENDER_OPEN,
        middle_delim: DEFAULT_GENDER_MIDDLE,
        close_delim: DEFAULT_GENDER_CLOSE,
        escape_token: Some(DEFAULT_ESCAPE_TOKEN.to_string()),
    }
}

/// A plural pick with all-default delimiters.
pub fn plural_variant_pick(category: UnicodePluralCategory) -> ValueTransformer {
    ValueTransformer::PluralVariantPick {
        category,
        number_open_delim: DEFAULT_NUMBER_DELIM,
        number_close_delim: DEFAULT_NUMBER_DELIM,
        plural_open_delim: DEFAULT_PLURAL_OPEN,
        plural_middle_delim: DEFAULT_PLURAL_MIDDLE,
        plural_close_delim: DEFAULT_PLURAL_CLOSE,
        escape_token: Some(DEFAULT_ESCAPE_TOKEN.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_upper() {
        let t = ValueTransformer::ToUpper;
        assert_eq!(t.apply("héllo", "English").unwrap(), "HÉLLO");
    }

    #[test]
    fn test_gender_pick_male_and_other() {
        let text = "`He¦She´ left";
        assert_eq!(
            gender_variant_pick(Gender::Male).apply(text, "English").unwrap(),
            "He left"
        );
        assert_eq!(
            gender_variant_pick(Gender::Other).apply(text, "English").unwrap(),
            "She left"
        );
    }

    #[test]
    fn test_gender_pick_bad_block() {
        let t = gender_variant_pick(Gender::Male);
        assert!(matches!(
            t.apply("`only one branch´", "English"),
            Err(ResolveError::InvalidTokens(_))
        ));
        assert!(matches!(
            t.apply("`unclosed", "English"),
            Err(ResolveError::InvalidTokens(_))
        ));
    }

    #[test]
    fn test_gender_pick_escaped_middle_delimiter() {
        let t = gender_variant_pick(Gender::Male);
        // the escaped ¦ belongs to the male branch
        assert_eq!(t.apply("`a~¦b¦c´", "English").unwrap(), "a¦b");
    }

    #[test]
    fn test_plural_pick_english() {
        let one = plural_variant_pick(UnicodePluralCategory::One);
        let other = plural_variant_pick(UnicodePluralCategory::Other);
        let text = "#n# <apple:apples>";
        assert_eq!(one.apply(text, "English").unwrap(), "%1$d apple");
        assert_eq!(other.apply(text, "British English").unwrap(), "%1$d apples");
    }

    #[test]
    fn test_plural_pick_polish_three_way() {
        let text = "<jabłko:jabłka:jabłek>";
        let one = plural_variant_pick(UnicodePluralCategory::One);
        let few = plural_variant_pick(UnicodePluralCategory::Few);
        let many = plural_variant_pick(UnicodePluralCategory::Many);
        assert_eq!(one.apply(text, "Polish").unwrap(), "jabłko");
        assert_eq!(few.apply(text, "Polish").unwrap(), "jabłka");
        assert_eq!(many.apply(text, "Polish").unwrap(), "jabłek");
    }

    #[test]
    fn test_plural_pick_russian_trailing_digits() {
        let grammar = LanguageGrammars::standard().grammar_for("Russian").unwrap();
        // 21 takes the "one" branch, 23 "few", 25 the wildcard
        assert_eq!(grammar.definition.index_of_version_to_use(PluralValue::Int(21), 3), 0);
        assert_eq!(grammar.definition.index_of_version_to_use(PluralValue::Int(23), 3), 1);
        assert_eq!(grammar.definition.index_of_version_to_use(PluralValue::Int(25), 3), 2);

        let text = "<рубль:рубля:рублей>";
        let many = plural_variant_pick(UnicodePluralCategory::Many);
        assert_eq!(many.apply(text, "Russian").unwrap(), "рублей");
    }

    #[test]
    fn test_custom_grammar_table() {
        let mut grammars = LanguageGrammars::new();
        grammars.insert(
            ["klingon"],
            PluralityGrammar {
                definition: PluralityDefinition::parse("(1)(*)"),
                representatives: [
                    (UnicodePluralCategory::One, 1),
                    (UnicodePluralCategory::Other, 2),
                ]
                .into_iter()
                .collect(),
            },
        );
        let t = plural_variant_pick(UnicodePluralCategory::One);
        assert_eq!(t.apply_with_grammars("<a:b>", "Klingon", &grammars).unwrap(), "a");
        assert_eq!(
            apply_chain_with_grammars(&[t.clone()], "<a:b>", "Klingon", &grammars).unwrap(),
            "a"
        );
        // the stock table still rejects the language
        assert!(matches!(
            t.apply("<a:b>", "Klingon"),
            Err(ResolveError::LanguageNotFound(_))
        ));
    }

    #[test]
    fn test_plural_pick_unknown_language() {
        let t = plural_variant_pick(UnicodePluralCategory::One);
        assert!(matches!(
            t.apply("<a:b>", "Klingon"),
            Err(ResolveError::LanguageNotFound(_))
        ));
    }

    #[test]
    fn test_plural_pick_category_without_representative() {
        // English has no 'many'; the whole value becomes the skip marker.
        let t = plural_variant_pick(UnicodePluralCategory::Many);
        assert_eq!(t.apply("<a:b>", "English").unwrap(), NO_VALUE_MARKER);
    }

    #[test]
    fn test_simple_string_replacement() {
        let t = ValueTransformer::SimpleStringReplacement {
            open_delim: '|',
            close_delim: '|',
            escape_token: Some("~".to_string()),
            replacements: [("name".to_string(), "%@".to_string())].into_iter().collect(),
        };
        assert_eq!(t.apply("Hi |name|!", "English").unwrap(), "Hi %@!");
        // unknown content is kept verbatim, delimiters included
        assert_eq!(t.apply("Hi |nope|!", "English").unwrap(), "Hi |nope|!");
        // escaped delimiter is literal
        assert_eq!(t.apply("a ~| b", "English").unwrap(), "a | b");
    }

    #[test]
    fn test_region_delimiters_replacement() {
        let t = ValueTransformer::RegionDelimitersReplacement {
            open_delim: '{',
            close_delim: '}',
            replacement: "%@".to_string(),
        };
        assert_eq!(t.apply("Hello {username}!", "English").unwrap(), "Hello %@!");
    }

    #[test]
    fn test_chain_order_matters() {
        // Uppercasing before the replacement leaves the substituted text
        // lowercase; after, it is uppercased too.
        let replace = ValueTransformer::SimpleStringReplacement {
            open_delim: '|',
            close_delim: '|',
            escape_token: None,
            replacements: [("WHO".to_string(), "world".to_string())].into_iter().collect(),
        };
        let upper_first =
            apply_chain(&[ValueTransformer::ToUpper, replace.clone()], "hi |who|", "English")
                .unwrap();
        let replace_first =
            apply_chain(&[replace, ValueTransformer::ToUpper], "hi |who|", "English");
        assert_eq!(upper_first, "HI world");
        // lowercase 'who' is not in the map once the text was uppercased the
        // other way around, so the block stays; the fold then uppercases it
        assert_eq!(replace_first.unwrap(), "HI |WHO|");
        assert_ne!(upper_first, "HI |WHO|");
    }

    #[test]
    fn test_invalid_transformer_fails_to_apply() {
        let t = ValueTransformer::Invalid(json!({"__type": "frobnicate"}));
        assert!(matches!(
            t.apply("x", "English"),
            Err(ResolveError::InvalidMapping)
        ));
    }

    #[test]
    fn test_serialization_omits_default_delimiters() {
        let t = gender_variant_pick(Gender::Male);
        let v = t.to_json();
        assert_eq!(v["__type"], "gender_variant_pick");
        assert_eq!(v["gender"], "male");
        assert!(v.get("open_delim").is_none());
        assert!(v.get("escape_token").is_none());
    }

    #[test]
    fn test_serialization_roundtrip_custom_delimiters() {
        let t = ValueTransformer::GenderVariantPick {
            gender: Gender::Other,
            open_delim: '[',
            middle_delim: '/',
            close_delim: ']',
            escape_token: None,
        };
        let v = t.to_json();
        assert_eq!(v["open_delim"], "[");
        assert_eq!(v["escape_token"], Value::Null);
        assert_eq!(ValueTransformer::from_json(&v), t);
    }

    #[test]
    fn test_deserialization_defaults_missing_optionals() {
        let v = json!({"__type": "plural_variant_pick", "category": "few"});
        match ValueTransformer::from_json(&v) {
            ValueTransformer::PluralVariantPick {
                category,
                plural_open_delim,
                escape_token,
                ..
            } => {
                assert_eq!(category, UnicodePluralCategory::Few);
                assert_eq!(plural_open_delim, DEFAULT_PLURAL_OPEN);
                assert_eq!(escape_token.as_deref(), Some(DEFAULT_ESCAPE_TOKEN));
            }
            other => panic!("expected plural pick, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_degrades_to_invalid_and_roundtrips_verbatim() {
        let raw = json!({"__type": "hologram", "power": 9001});
        let t = ValueTransformer::from_json(&raw);
        assert!(!t.is_valid());
        assert_eq!(t.to_json(), raw);
    }

    #[test]
    fn test_missing_required_field_degrades_to_invalid() {
        let raw = json!({"__type": "gender_variant_pick"});
        assert!(!ValueTransformer::from_json(&raw).is_valid());
        let raw = json!({"__type": "region_delimiters_replacement", "open_delim": "("});
        assert!(!ValueTransformer::from_json(&raw).is_valid());
        let raw = json!({"__type": "gender_variant_pick", "gender": "male", "open_delim": "ab"});
        assert!(!ValueTransformer::from_json(&raw).is_valid());
    }
}
