use std::collections::BTreeMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

/// Type alias for a map of attribute names to attribute values.
///
/// Uses an ordered map so that serialization is stable regardless of insertion order.
///
/// # Examples
/// ```
/// # use hyphen_toggle::{Attributes, AttributeValue};
/// let attributes = [
///     ("age".to_owned(), 30.into()),
///     ("is_premium_member".to_owned(), true.into()),
///     ("username".to_owned(), "john_doe".into()),
/// ].into_iter().collect::<Attributes>();
/// ```
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A targeting attribute value: a scalar, a list or a nested map.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `i64`, `f64`, `bool`, lists
/// and nested [`Attributes`].
///
/// Examples:
/// ```
/// # use hyphen_toggle::AttributeValue;
/// let string_attr: AttributeValue = "example".into();
/// let int_attr: AttributeValue = 42.into();
/// let float_attr: AttributeValue = 4.2.into();
/// let bool_attr: AttributeValue = true.into();
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A null value or absence of value.
    Null,
    /// A boolean value.
    Boolean(bool),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// A string value.
    String(String),
    /// A list of values.
    List(Vec<AttributeValue>),
    /// A nested map of values.
    Map(Attributes),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl AttributeValue {
    /// Returns the string value if this is a [`AttributeValue::String`].
    pub fn as_str(&self) -> Option<&str> {
        if let AttributeValue::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    /// Returns the nested map if this is a [`AttributeValue::Map`].
    pub fn as_map(&self) -> Option<&Attributes> {
        if let AttributeValue::Map(m) = self {
            Some(m)
        } else {
            None
        }
    }

    /// Returns `true` for [`AttributeValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Human-readable name of the value kind, used in error messages.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Null => "null",
            AttributeValue::Boolean(_) => "boolean",
            AttributeValue::Integer(_) => "integer",
            AttributeValue::Float(_) => "float",
            AttributeValue::String(_) => "string",
            AttributeValue::List(_) => "list",
            AttributeValue::Map(_) => "map",
        }
    }

    /// Convert an arbitrary JSON value into an attribute value.
    ///
    /// Numbers that fit into `i64` become [`AttributeValue::Integer`], all other numbers become
    /// [`AttributeValue::Float`].
    pub fn from_json(value: serde_json::Value) -> AttributeValue {
        match value {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Integer(i),
                // as_f64() only fails with arbitrary_precision, which we don't enable.
                None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => AttributeValue::String(s),
            serde_json::Value::Array(items) => {
                AttributeValue::List(items.into_iter().map(AttributeValue::from_json).collect())
            }
            serde_json::Value::Object(map) => AttributeValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, AttributeValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into a plain JSON value tree.
    ///
    /// `path` names this value in error messages. Fails on non-finite floats, which have no JSON
    /// representation.
    pub fn to_json(&self, path: &str) -> Result<serde_json::Value, ConversionError> {
        let value = match self {
            AttributeValue::Null => serde_json::Value::Null,
            AttributeValue::Boolean(b) => serde_json::Value::Bool(*b),
            AttributeValue::Integer(i) => serde_json::Value::Number((*i).into()),
            AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| {
                    ConversionError::new(path, format!("non-finite number {f} is not supported"))
                })?,
            AttributeValue::String(s) => serde_json::Value::String(s.clone()),
            AttributeValue::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| item.to_json(&format!("{path}[{i}]")))
                    .collect::<Result<_, _>>()?,
            ),
            AttributeValue::Map(map) => serde_json::Value::Object(attributes_to_json(map, path)?),
        };
        Ok(value)
    }
}

/// Convert a whole attribute map into a JSON object, recursing into nested values.
pub(crate) fn attributes_to_json(
    attributes: &Attributes,
    path: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, ConversionError> {
    attributes
        .iter()
        .map(|(key, value)| Ok((key.clone(), value.to_json(&format!("{path}.{key}"))?)))
        .collect()
}
