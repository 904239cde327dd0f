//! The plurality-rule grammar: a compact textual description of which plural
//! variant applies to which numeric values.
//!
//! A definition string is a sequence of parenthesized zones, e.g. `(1)(*)` or
//! `(1)(2→4)(*)`. Inside a zone, comma-separated predicates match exact
//! numbers (`1`, `1.5`), intervals (`2→4`, `→4`, `2→`, with `]` / `[`
//! marking an open endpoint as in `]2→4[`), the wildcard `*`, the
//! float-only wildcard `*.`, or a digit pattern (`?` one digit, `*` any run
//! of digits) matched against the decimal string form of the number.
//!
//! After the closing paren, each `?` marker raises the zone's optionality
//! level and each `↓` marker lowers its priority.

use std::cmp::Reverse;

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

lazy_static! {
    static ref PATTERN_CHARS: Regex = Regex::new(r"^[0-9?*.]+$").unwrap();
}

/// The numeric value a plural variant is being chosen for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PluralValue {
    Int(i64),
    Float { value: f64, precision: f64 },
}

/// One predicate inside a zone.
#[derive(Debug, Clone)]
pub enum ZoneValue {
    Int(i64),
    Float(f64),
    IntRange {
        start: Option<i64>,
        end: Option<i64>,
        start_open: bool,
        end_open: bool,
    },
    FloatRange {
        start: Option<f64>,
        end: Option<f64>,
        start_open: bool,
        end_open: bool,
    },
    /// `*`: matches any value.
    AnyNumber,
    /// `*.`: matches values with a fractional part (beyond the precision).
    AnyFloat,
    /// Restricted digit pattern, compiled over the decimal string form.
    Pattern(Regex),
}

impl ZoneValue {
    /// Parses a single predicate; `None` when the text fits no predicate
    /// form.
    pub fn parse(text: &str) -> Option<ZoneValue> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if text == "*" {
            return Some(ZoneValue::AnyNumber);
        }
        if text == "*." {
            return Some(ZoneValue::AnyFloat);
        }
        if let Some(range) = Self::parse_range(text) {
            return Some(range);
        }
        if let Ok(i) = text.parse::<i64>() {
            return Some(ZoneValue::Int(i));
        }
        if let Ok(f) = text.parse::<f64>() {
            return Some(ZoneValue::Float(f));
        }
        Self::parse_pattern(text)
    }

    fn parse_range(text: &str) -> Option<ZoneValue> {
        let (low, high) = text.split_once('→').or_else(|| text.split_once("->"))?;

        let (low, start_open) = match low.strip_prefix(']') {
            Some(rest) => (rest, true),
            None => (low, false),
        };
        let (high, end_open) = match high.strip_suffix('[') {
            Some(rest) => (rest, true),
            None => (high, false),
        };
        let low = low.trim();
        let high = high.trim();

        let int_endpoints = (
            if low.is_empty() {
                Some(None)
            } else {
                low.parse::<i64>().ok().map(Some)
            },
            if high.is_empty() {
                Some(None)
            } else {
                high.parse::<i64>().ok().map(Some)
            },
        );
        if let (Some(start), Some(end)) = int_endpoints {
            return Some(ZoneValue::IntRange {
                start,
                end,
                start_open,
                end_open,
            });
        }

        let start = if low.is_empty() {
            Some(None)
        } else {
            low.parse::<f64>().ok().map(Some)
        };
        let end = if high.is_empty() {
            Some(None)
        } else {
            high.parse::<f64>().ok().map(Some)
        };
        match (start, end) {
            (Some(start), Some(end)) => Some(ZoneValue::FloatRange {
                start,
                end,
                start_open,
                end_open,
            }),
            _ => None,
        }
    }

    fn parse_pattern(text: &str) -> Option<ZoneValue> {
        if !PATTERN_CHARS.is_match(text) {
            return None;
        }
        let mut regex = String::from("^");
        for c in text.chars() {
            match c {
                '*' => regex.push_str("[0-9]*"),
                '?' => regex.push_str("[0-9]"),
                '.' => regex.push_str("\\."),
                digit => regex.push(digit),
            }
        }
        regex.push('$');
        Regex::new(&regex).ok().map(ZoneValue::Pattern)
    }

    pub fn matches_int(&self, value: i64) -> bool {
        match self {
            ZoneValue::Int(i) => *i == value,
            ZoneValue::Float(f) => *f == value as f64,
            ZoneValue::IntRange {
                start,
                end,
                start_open,
                end_open,
            } => {
                let lo_ok = match start {
                    Some(s) if *start_open => value > *s,
                    Some(s) => value >= *s,
                    None => true,
                };
                let hi_ok = match end {
                    Some(e) if *end_open => value < *e,
                    Some(e) => value <= *e,
                    None => true,
                };
                lo_ok && hi_ok
            }
            ZoneValue::FloatRange { .. } => self.matches_float(value as f64, 0.0),
            ZoneValue::AnyNumber => true,
            ZoneValue::AnyFloat => false,
            ZoneValue::Pattern(re) => re.is_match(&value.to_string()),
        }
    }

    pub fn matches_float(&self, value: f64, precision: f64) -> bool {
        match self {
            ZoneValue::Int(i) => (value - *i as f64).abs() <= precision,
            ZoneValue::Float(f) => (value - *f).abs() <= precision,
            ZoneValue::IntRange {
                start,
                end,
                start_open,
                end_open,
            } => {
                let lo_ok = match start {
                    Some(s) if *start_open => value > *s as f64,
                    Some(s) => value >= *s as f64 - precision,
                    None => true,
                };
                let hi_ok = match end {
                    Some(e) if *end_open => value < *e as f64,
                    Some(e) => value <= *e as f64 + precision,
                    None => true,
                };
                lo_ok && hi_ok
            }
            ZoneValue::FloatRange {
                start,
                end,
                start_open,
                end_open,
            } => {
                let lo_ok = match start {
                    Some(s) if *start_open => value > *s,
                    Some(s) => value >= *s - precision,
                    None => true,
                };
                let hi_ok = match end {
                    Some(e) if *end_open => value < *e,
                    Some(e) => value <= *e + precision,
                    None => true,
                };
                lo_ok && hi_ok
            }
            ZoneValue::AnyNumber => true,
            ZoneValue::AnyFloat => (value - value.round()).abs() > precision,
            ZoneValue::Pattern(re) => re.is_match(&format_decimal(value)),
        }
    }

    fn matches(&self, value: PluralValue) -> bool {
        match value {
            PluralValue::Int(i) => self.matches_int(i),
            PluralValue::Float { value, precision } => self.matches_float(value, precision),
        }
    }
}

fn format_decimal(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// One zone of a plurality definition, in declaration order.
#[derive(Debug, Clone)]
pub struct PluralityZone {
    pub values: Vec<ZoneValue>,
    /// Declaration index among the well-formed zones.
    pub index: usize,
    /// 0 means mandatory; higher levels get discarded first when fewer
    /// variant slots than zones are available.
    pub optionality_level: usize,
    /// 0 is highest priority among matching zones.
    pub priority_decrease_level: usize,
}

impl PluralityZone {
    fn matches(&self, value: PluralValue) -> bool {
        self.values.iter().any(|v| v.matches(value))
    }
}

/// An ordered set of zones, sorted at construction so the most optional
/// zones come first (reverse declaration order between equals) and can be
/// discarded from the front.
#[derive(Debug, Clone, Default)]
pub struct PluralityDefinition {
    zones: Vec<PluralityZone>,
}

impl PluralityDefinition {
    /// Parses a definition string. Never fails: malformed zones are dropped
    /// with a diagnostic and parsing continues.
    pub fn parse(definition: &str) -> PluralityDefinition {
        let mut zones = Vec::new();
        let mut rest = definition.trim();
        let mut index = 0;

        while !rest.is_empty() {
            let Some(open) = rest.find('(') else {
                if !rest.trim().is_empty() {
                    warn!("ignoring trailing garbage in plurality definition: {rest:?}");
                }
                break;
            };
            if !rest[..open].trim().is_empty() {
                warn!(
                    "ignoring garbage before zone in plurality definition: {:?}",
                    &rest[..open]
                );
            }
            let Some(close_rel) = rest[open..].find(')') else {
                warn!("unclosed zone in plurality definition: {rest:?}");
                break;
            };
            let close = open + close_rel;
            let body = &rest[open + 1..close];

            rest = &rest[close + 1..];
            let mut optionality_level = 0;
            let mut priority_decrease_level = 0;
            loop {
                if let Some(r) = rest.strip_prefix('?') {
                    optionality_level += 1;
                    rest = r;
                } else if let Some(r) = rest.strip_prefix('↓') {
                    priority_decrease_level += 1;
                    rest = r;
                } else {
                    break;
                }
            }

            let values: Vec<ZoneValue> = body
                .split(',')
                .filter_map(|part| {
                    let parsed = ZoneValue::parse(part);
                    if parsed.is_none() {
                        warn!("dropping unparsable zone value {part:?}");
                    }
                    parsed
                })
                .collect();
            if values.is_empty() {
                warn!("dropping empty zone ({body:?}) in plurality definition");
            } else {
                zones.push(PluralityZone {
                    values,
                    index,
                    optionality_level,
                    priority_decrease_level,
                });
                // dropped zones consume no index, so surviving indices stay
                // dense and always map into the variant space
                index += 1;
            }
        }

        // Most optional first; among equals, reverse declaration order.
        zones.reverse();
        zones.sort_by_key(|z| Reverse(z.optionality_level));
        PluralityDefinition { zones }
    }

    /// Number of declared (well-formed) zones.
    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    /// Picks the variant index to use for `value` out of
    /// `number_of_variants` available variants.
    pub fn index_of_version_to_use(
        &self,
        value: PluralValue,
        number_of_variants: usize,
    ) -> usize {
        assert!(number_of_variants > 0, "at least one variant is required");

        let to_discard = self.zones.len().saturating_sub(number_of_variants);
        let (discarded, kept) = self.zones.split_at(to_discard);
        if let Some(mandatory) = discarded.iter().find(|z| z.optionality_level == 0) {
            warn!(
                "not enough variants ({number_of_variants}) for {} zones; \
                 discarding mandatory zone #{}",
                self.zones.len(),
                mandatory.index
            );
        }

        let winner = kept
            .iter()
            .filter(|z| z.matches(value))
            .min_by_key(|z| (z.priority_decrease_level, z.index));
        let Some(winner) = winner else {
            return number_of_variants - 1;
        };

        // Re-map the declaration index into the compacted space left after
        // the discards.
        let discarded_below = discarded.iter().filter(|z| z.index < winner.index).count();
        winner.index - discarded_below
    }
}
