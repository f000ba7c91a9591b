//! Structured filter produced from a free-text query

use crate::dataset::{DatasetSchema, FieldKind, ValueType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Scalar filter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl FilterValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FilterValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FilterValue::Integer(i) => Some(*i),
            FilterValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            FilterValue::Integer(_) => ValueType::Integer,
            FilterValue::Number(_) => ValueType::Number,
            FilterValue::Text(_) => ValueType::Text,
        }
    }

    /// Convert a JSON scalar into the value type a field expects.
    ///
    /// Returns `None` for nulls, empty strings and values that cannot be
    /// represented as `expected`.
    pub fn coerce(value: &Value, expected: ValueType) -> Option<Self> {
        match (expected, value) {
            (_, Value::Null) => None,
            (ValueType::Text, Value::String(s)) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| FilterValue::Text(trimmed.to_string()))
            }
            (ValueType::Text, Value::Number(n)) => Some(FilterValue::Text(n.to_string())),
            (ValueType::Integer, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(FilterValue::Integer),
            (ValueType::Integer, Value::String(s)) => {
                s.trim().parse::<i64>().ok().map(FilterValue::Integer)
            }
            (ValueType::Number, Value::Number(n)) => n.as_f64().map(FilterValue::Number),
            (ValueType::Number, Value::String(s)) => {
                s.trim().parse::<f64>().ok().map(FilterValue::Number)
            }
            _ => None,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Integer(i) => write!(f, "{}", i),
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        FilterValue::Integer(i)
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        FilterValue::Number(n)
    }
}

/// Normalized, schema-bound representation of a query's intent.
///
/// Every field is optional. A missing field means "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredFilter {
    fields: BTreeMap<String, FilterValue>,
}

impl StructuredFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FilterValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<FilterValue> {
        self.fields.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FilterValue> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FilterValue::as_text)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// True when the field is missing or holds an empty string
    pub fn is_blank(&self, name: &str) -> bool {
        match self.get(name) {
            None => true,
            Some(FilterValue::Text(s)) => s.trim().is_empty(),
            Some(_) => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Build a filter from an arbitrary JSON object, keeping only fields the
    /// schema declares and values that fit their declared type.
    pub fn from_json(object: &serde_json::Map<String, Value>, schema: &DatasetSchema) -> Self {
        let mut filter = StructuredFilter::new();
        for (key, value) in object {
            let Some(spec) = schema.field(key) else {
                tracing::debug!("Dropping unknown field '{}' from extraction", key);
                continue;
            };
            match FilterValue::coerce(value, spec.value_type) {
                Some(v) => filter.set(spec.name, v),
                None if !value.is_null() => {
                    tracing::debug!("Dropping field '{}': cannot coerce {}", key, value);
                }
                None => {}
            }
        }
        filter.normalize(schema);
        filter
    }

    /// Lower-case enumerated values and drop those outside the allowed set
    pub fn normalize(&mut self, schema: &DatasetSchema) {
        let mut rejected = Vec::new();
        for (name, value) in self.fields.iter_mut() {
            let Some(spec) = schema.field(name) else {
                continue;
            };
            match (spec.kind, &value) {
                (FieldKind::Category { allowed, .. }, FilterValue::Text(s)) => {
                    let lower = s.to_lowercase();
                    if allowed.contains(&lower.as_str()) {
                        *value = FilterValue::Text(lower);
                    } else {
                        rejected.push(name.clone());
                    }
                }
                (FieldKind::Sentiment { .. }, FilterValue::Text(s)) => {
                    let lower = s.to_lowercase();
                    if matches!(lower.as_str(), "positive" | "negative" | "neutral") {
                        *value = FilterValue::Text(lower);
                    } else {
                        rejected.push(name.clone());
                    }
                }
                _ => {}
            }
        }
        for name in rejected {
            tracing::debug!("Dropping '{}': value outside the allowed set", name);
            self.fields.remove(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetKind;
    use serde_json::json;

    #[test]
    fn test_from_json_drops_unknown_keys() {
        let schema = DatasetKind::Reviews.schema();
        let object = json!({
            "keyword": "chocolate",
            "min_score": 5,
            "max_score": "5",
            "flavour": "dark",
            "product": null
        });
        let filter = StructuredFilter::from_json(object.as_object().unwrap(), schema);

        assert_eq!(filter.len(), 3);
        assert_eq!(filter.text("keyword"), Some("chocolate"));
        assert_eq!(filter.get("max_score"), Some(&FilterValue::Integer(5)));
        assert!(!filter.contains("flavour"));
        assert!(!filter.contains("product"));
    }

    #[test]
    fn test_from_json_normalizes_category() {
        let schema = DatasetKind::News.schema();
        let object = json!({"category": "Tech", "keyword": ""});
        let filter = StructuredFilter::from_json(object.as_object().unwrap(), schema);
        assert_eq!(filter.text("category"), Some("tech"));
        assert!(filter.is_blank("keyword"));

        let object = json!({"category": "weather"});
        let filter = StructuredFilter::from_json(object.as_object().unwrap(), schema);
        assert!(filter.is_empty());
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            FilterValue::coerce(&json!("7.5"), ValueType::Number),
            Some(FilterValue::Number(7.5))
        );
        assert_eq!(FilterValue::coerce(&json!(4.5), ValueType::Integer), None);
        assert_eq!(FilterValue::coerce(&json!("  "), ValueType::Text), None);
        assert_eq!(
            FilterValue::coerce(&json!(2010), ValueType::Text),
            Some(FilterValue::Text("2010".to_string()))
        );
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let filter = StructuredFilter::new()
            .with("keyword", "chocolate")
            .with("min_score", 5i64);
        let value = serde_json::to_value(&filter).unwrap();
        assert_eq!(value, json!({"keyword": "chocolate", "min_score": 5}));
    }
}
