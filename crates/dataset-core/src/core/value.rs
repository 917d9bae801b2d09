// crates/dataset-core/src/core/value.rs
// ============================================================================
// Module: Record Values
// Description: Tagged-union values produced by source file readers.
// Purpose: Keep field mapping and content coercion explicit and lossless.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Readers produce [`Record`] maps of [`RecordValue`]. Integers are kept as
//! `i64` end to end so a JSONL `9007199254740993` never folds into a float.
//! [`RecordValue::to_content_string`] renders a value into item text content.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Number;
use serde_json::Value;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One record read from a source file, keyed by column name.
pub type Record = BTreeMap<String, RecordValue>;

/// Dynamically typed source value.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// Missing or null value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list.
    List(Vec<RecordValue>),
    /// Nested map.
    Map(BTreeMap<String, RecordValue>),
}

impl RecordValue {
    /// Renders the value as item text content.
    ///
    /// Strings are returned verbatim; lists and maps are rendered as JSON.
    #[must_use]
    pub fn to_content_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::String(value) => value.clone(),
            Self::Float(_) | Self::List(_) | Self::Map(_) => self.to_json().to_string(),
        }
    }

    /// Converts the value into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(value) => Value::Bool(*value),
            Self::Int(value) => Value::Number(Number::from(*value)),
            Self::Float(value) => Number::from_f64(*value).map_or(Value::Null, Value::Number),
            Self::String(value) => Value::String(value.clone()),
            Self::List(values) => Value::Array(values.iter().map(Self::to_json).collect()),
            Self::Map(values) => Value::Object(
                values.iter().map(|(key, value)| (key.clone(), value.to_json())).collect(),
            ),
        }
    }

    /// Returns true for null values.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Value> for RecordValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(value) => Self::Bool(value),
            Value::Number(number) => number.as_i64().map_or_else(
                || {
                    number.as_u64().map_or_else(
                        || Self::Float(number.as_f64().unwrap_or(f64::NAN)),
                        |value| Self::String(value.to_string()),
                    )
                },
                Self::Int,
            ),
            Value::String(value) => Self::String(value),
            Value::Array(values) => Self::List(values.into_iter().map(Self::from).collect()),
            Value::Object(values) => {
                Self::Map(values.into_iter().map(|(key, value)| (key, Self::from(value))).collect())
            }
        }
    }
}

impl From<&str> for RecordValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for RecordValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for RecordValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
