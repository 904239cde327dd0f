//! Key mappings: rules computing one entry's value from another's.
//!
//! A mapping is an ordered list of components; each component is either a
//! constant or "resolve another key and run its value through a transformer
//! chain". Components that fail to deserialize are preserved verbatim as
//! [`MappingComponent::Invalid`] so round trips never lose information.

use serde_json::{Value, json};

use crate::{
    error::ResolveError,
    loc_file::{LineKey, LineValue, LocFile},
    transformers::{self, ValueTransformer},
};

/// One step of a mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingComponent {
    /// Always resolves to the given text.
    ToConstant { constant: String },

    /// Resolves `source_key` in the entry table and threads its value for
    /// the requested language through the transformer chain, left to right.
    ValueTransforms {
        source_key: LineKey,
        transformers: Vec<ValueTransformer>,
    },

    /// A component that could not be deserialized; kept verbatim.
    Invalid(Value),
}

impl MappingComponent {
    pub fn is_valid(&self) -> bool {
        match self {
            MappingComponent::ToConstant { .. } => true,
            MappingComponent::ValueTransforms { transformers, .. } => {
                transformers.iter().all(ValueTransformer::is_valid)
            }
            MappingComponent::Invalid(_) => false,
        }
    }

    /// Resolves this component against the entry table.
    ///
    /// A source key whose value is itself a mapping fails with
    /// [`ResolveError::MappedToMappedKey`]: one level of indirection only,
    /// which rules out cycles without a cycle detector.
    pub fn apply(&self, language: &str, table: &LocFile) -> Result<String, ResolveError> {
        match self {
            MappingComponent::ToConstant { constant } => Ok(constant.clone()),

            MappingComponent::ValueTransforms {
                source_key,
                transformers: chain,
            } => {
                let value = table
                    .value_for_key(source_key)
                    .ok_or_else(|| ResolveError::KeyNotFound(source_key.logical_key.clone()))?;
                let entries = match value {
                    LineValue::Entries(map) => map,
                    LineValue::Mapping(_) => {
                        return Err(ResolveError::MappedToMappedKey(
                            source_key.logical_key.clone(),
                        ));
                    }
                };
                let base = entries
                    .get(language)
                    .ok_or_else(|| ResolveError::NoValueForLanguage(language.to_string()))?;
                transformers::apply_chain(chain, base, language)
            }

            MappingComponent::Invalid(_) => Err(ResolveError::InvalidMapping),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            MappingComponent::ToConstant { constant } => {
                json!({ "__type": "to_constant", "constant": constant })
            }
            MappingComponent::ValueTransforms {
                source_key,
                transformers: chain,
            } => {
                let chain: Vec<Value> = chain.iter().map(ValueTransformer::to_json).collect();
                json!({
                    "__type": "value_transforms",
                    "source_key": serde_json::to_value(source_key).unwrap_or(Value::Null),
                    "transformers": chain,
                })
            }
            MappingComponent::Invalid(raw) => raw.clone(),
        }
    }

    /// Never fails; unknown or ill-shaped records become `Invalid`.
    pub fn from_json(value: &Value) -> MappingComponent {
        let invalid = || MappingComponent::Invalid(value.clone());
        let Some(obj) = value.as_object() else {
            return invalid();
        };
        match obj.get("__type").and_then(Value::as_str) {
            Some("to_constant") => match obj.get("constant").and_then(Value::as_str) {
                Some(constant) => MappingComponent::ToConstant {
                    constant: constant.to_string(),
                },
                None => invalid(),
            },
            Some("value_transforms") => {
                let source_key = obj
                    .get("source_key")
                    .and_then(|v| serde_json::from_value::<LineKey>(v.clone()).ok());
                let transformers = obj.get("transformers").and_then(Value::as_array);
                match (source_key, transformers) {
                    (Some(source_key), Some(transformers)) => MappingComponent::ValueTransforms {
                        source_key,
                        transformers: transformers
                            .iter()
                            .map(ValueTransformer::from_json)
                            .collect(),
                    },
                    _ => invalid(),
                }
            }
            _ => invalid(),
        }
    }
}

/// An ordered sequence of mapping components; resolution concatenates the
/// components' outputs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyMapping {
    pub components: Vec<MappingComponent>,
}

impl KeyMapping {
    pub fn new(components: Vec<MappingComponent>) -> Self {
        KeyMapping { components }
    }

    /// A one-component mapping applying `chain` to `source_key`.
    pub fn transforms(source_key: LineKey, chain: Vec<ValueTransformer>) -> Self {
        KeyMapping {
            components: vec![MappingComponent::ValueTransforms {
                source_key,
                transformers: chain,
            }],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.components.iter().all(MappingComponent::is_valid)
    }

    /// Resolves the whole mapping: every component must be valid, and the
    /// components' outputs are concatenated in order.
    pub fn apply(&self, language: &str, table: &LocFile) -> Result<String, ResolveError> {
        if !self.is_valid() {
            return Err(ResolveError::InvalidMapping);
        }
        let mut out = String::new();
        for component in &self.components {
            out.push_str(&component.apply(language, table)?);
        }
        Ok(out)
    }

    pub fn to_json(&self) -> Value {
        let components: Vec<Value> = self.components.iter().map(MappingComponent::to_json).collect();
        json!({ "components": components })
    }

    /// Accepts both `{"components": [...]}` and a bare component array.
    /// Anything else becomes a single preserved-verbatim invalid component.
    pub fn from_json(value: &Value) -> KeyMapping {
        let components = match value {
            Value::Array(items) => items,
            Value::Object(obj) => match obj.get("components").and_then(Value::as_array) {
                Some(items) => items,
                None => return KeyMapping::new(vec![MappingComponent::Invalid(value.clone())]),
            },
            _ => return KeyMapping::new(vec![MappingComponent::Invalid(value.clone())]),
        };
        KeyMapping::new(components.iter().map(MappingComponent::from_json).collect())
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    /// Parses the JSON cell form used by the loc file serialization.
    pub fn from_json_str(text: &str) -> KeyMapping {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => KeyMapping::from_json(&value),
            Err(_) => KeyMapping::new(vec![MappingComponent::Invalid(Value::String(
                text.to_string(),
            ))]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::{Gender, gender_variant_pick};

    fn key(logical: &str) -> LineKey {
        LineKey::new(logical, "Xcode", "en.lproj/Localizable.strings")
    }

    #[test]
    fn test_constant_component() {
        let table = LocFile::new();
        let c = MappingComponent::ToConstant {
            constant: "fixed".to_string(),
        };
        assert_eq!(c.apply("English", &table).unwrap(), "fixed");
    }

    #[test]
    fn test_component_json_roundtrip() {
        let component = MappingComponent::ValueTransforms {
            source_key: key("greeting"),
            transformers: vec![gender_variant_pick(Gender::Male)],
        };
        let json = component.to_json();
        assert_eq!(MappingComponent::from_json(&json), component);
    }

    #[test]
    fn test_invalid_component_preserved_verbatim() {
        let raw = serde_json::json!({"__type": "teleport", "target": "moon"});
        let component = MappingComponent::from_json(&raw);
        assert!(!component.is_valid());
        assert_eq!(component.to_json(), raw);
    }

    #[test]
    fn test_mapping_with_invalid_component_fails_but_roundtrips() {
        let raw = serde_json::json!({
            "components": [
                {"__type": "to_constant", "constant": "a"},
                {"__type": "unknown_future_component", "x": 1},
            ]
        });
        let mapping = KeyMapping::from_json(&raw);
        assert!(!mapping.is_valid());
        assert_eq!(mapping.to_json(), raw);

        let table = LocFile::new();
        assert_eq!(
            mapping.apply("English", &table),
            Err(ResolveError::InvalidMapping)
        );
    }

    #[test]
    fn test_bare_array_accepted() {
        let raw = serde_json::json!([{"__type": "to_constant", "constant": "x"}]);
        let mapping = KeyMapping::from_json(&raw);
        assert!(mapping.is_valid());
        assert_eq!(mapping.components.len(), 1);
    }

    #[test]
    fn test_malformed_json_string_degrades() {
        let mapping = KeyMapping::from_json_str("{not json at all");
        assert!(!mapping.is_valid());
    }
}
