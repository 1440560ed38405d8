//! Value types, typed values and string to value conversion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The type an option or argument value is converted to.
///
/// This stands in for the bound type of an accessor: an option declared on
/// a derived command may narrow the type its parent declared (see
/// [`ValueType::is_narrowing_of`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Boolean flag; the default arity is 0
    Boolean,
    /// Signed 8-bit integer
    Byte,
    /// Signed 16-bit integer
    Short,
    /// Signed 32-bit integer
    Integer,
    /// Signed 64-bit integer
    Long,
    /// 32-bit floating point
    Float,
    /// 64-bit floating point
    Double,
    /// Any string value
    #[default]
    String,
    /// A file system path
    Path,
    /// One of a fixed set of string constants
    Enum(Vec<String>),
}

impl ValueType {
    /// Arity used when an option leaves its arity unset.
    pub fn default_arity(&self) -> usize {
        if self.is_boolean() {
            0
        } else {
            1
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, ValueType::Boolean)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueType::Byte
                | ValueType::Short
                | ValueType::Integer
                | ValueType::Long
                | ValueType::Float
                | ValueType::Double
        )
    }

    /// Whether a value of `self` can always be stored where `parent` is expected.
    ///
    /// Integer widths narrow towards `Long`, `Float` narrows `Double`, and
    /// both `Path` and `Enum` narrow `String`. An `Enum` narrows another
    /// `Enum` when its constants are a subset of the parent's.
    pub fn is_narrowing_of(&self, parent: &ValueType) -> bool {
        use ValueType::*;

        if self == parent {
            return true;
        }
        match (self, parent) {
            (Byte, Short | Integer | Long) => true,
            (Short, Integer | Long) => true,
            (Integer, Long) => true,
            (Float, Double) => true,
            (Path, String) => true,
            (Enum(_), String) => true,
            (Enum(child), Enum(parent)) => child.iter().all(|c| parent.contains(c)),
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Boolean => f.write_str("boolean"),
            ValueType::Byte => f.write_str("byte"),
            ValueType::Short => f.write_str("short"),
            ValueType::Integer => f.write_str("integer"),
            ValueType::Long => f.write_str("long"),
            ValueType::Float => f.write_str("float"),
            ValueType::Double => f.write_str("double"),
            ValueType::String => f.write_str("string"),
            ValueType::Path => f.write_str("path"),
            ValueType::Enum(values) => write!(f, "enum({})", values.join("|")),
        }
    }
}

/// A converted option or argument value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Path(PathBuf),
    /// Values of one occurrence of an option with arity > 1, or all
    /// occurrences bound to a multi-valued accessor
    List(Vec<Value>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view used by range restrictions.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Token form of the value, as it would be typed on a command line.
    ///
    /// Lists expand to one token per element.
    pub fn to_tokens(&self) -> Vec<String> {
        match self {
            Value::List(items) => items.iter().flat_map(Value::to_tokens).collect(),
            other => vec![other.to_string()],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::Path(p) => write!(f, "{}", p.display()),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}

/// A string could not be converted to the requested type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{raw}' is not a valid {expected}")]
pub struct ConversionError {
    pub raw: String,
    pub expected: String,
}

impl ConversionError {
    fn new(raw: &str, expected: &ValueType) -> Self {
        Self {
            raw: raw.to_string(),
            expected: expected.to_string(),
        }
    }
}

/// Pluggable string to typed value conversion.
pub trait TypeConverter: Send + Sync + fmt::Debug {
    /// Convert one raw token to a value of `value_type`.
    fn convert(&self, value_type: &ValueType, raw: &str) -> Result<Value, ConversionError>;
}

/// Converter for the built-in [`ValueType`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTypeConverter;

impl DefaultTypeConverter {
    fn integer<T>(value_type: &ValueType, raw: &str) -> Result<Value, ConversionError>
    where
        T: std::str::FromStr + Into<i64>,
    {
        raw.trim()
            .parse::<T>()
            .map(|v| Value::Int(v.into()))
            .map_err(|_| ConversionError::new(raw, value_type))
    }
}

impl TypeConverter for DefaultTypeConverter {
    fn convert(&self, value_type: &ValueType, raw: &str) -> Result<Value, ConversionError> {
        match value_type {
            ValueType::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(ConversionError::new(raw, value_type)),
            },
            ValueType::Byte => Self::integer::<i8>(value_type, raw),
            ValueType::Short => Self::integer::<i16>(value_type, raw),
            ValueType::Integer => Self::integer::<i32>(value_type, raw),
            ValueType::Long => Self::integer::<i64>(value_type, raw),
            ValueType::Float => raw
                .trim()
                .parse::<f32>()
                .map(|v| Value::Float(f64::from(v)))
                .map_err(|_| ConversionError::new(raw, value_type)),
            ValueType::Double => raw
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| ConversionError::new(raw, value_type)),
            ValueType::String => Ok(Value::Str(raw.to_string())),
            ValueType::Path => Ok(Value::Path(PathBuf::from(raw))),
            ValueType::Enum(constants) => constants
                .iter()
                .find(|c| c.as_str() == raw)
                .map(|c| Value::Str(c.clone()))
                .ok_or_else(|| ConversionError::new(raw, value_type)),
        }
    }
}
