use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::object::Object;
use crate::rank::Rank;

/// Host type of an atom class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    Int,
    Real,
    Time,
    String,
}

impl BaseType {
    pub const fn as_str(self) -> &'static str {
        match self {
            BaseType::Int => "Int",
            BaseType::Real => "Real",
            BaseType::Time => "Time",
            BaseType::String => "String",
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Int" => Ok(BaseType::Int),
            "Real" => Ok(BaseType::Real),
            "Time" => Ok(BaseType::Time),
            "String" => Ok(BaseType::String),
            other => Err(TypeError::UnknownBaseType(other.to_string())),
        }
    }
}

/// Caller-facing attribute value.
///
/// References to records are carried as [`Object`]s; multi-valued attributes
/// read and write [`Value::List`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Real(f64),
    Time(DateTime<Utc>),
    Str(String),
    Object(Object),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Object(o) => o.is_null(),
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the value's variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Real(_) => "real",
            Value::Time(_) => "time",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::List(_) => "list",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// A value as persisted in the backing store.
///
/// Absence (NULL) is represented by the store having no entry, so there is no
/// null variant. References are reduced to the referenced [`Rank`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StoredValue {
    Int(i64),
    Real(f64),
    Time(DateTime<Utc>),
    Str(String),
    Rank(Rank),
    List(Vec<StoredValue>),
}

impl StoredValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            StoredValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoredValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_rank(&self) -> Option<Rank> {
        match self {
            StoredValue::Rank(r) => Some(*r),
            _ => None,
        }
    }

    /// Every rank referenced by this value, in stored order.
    pub fn ranks(&self) -> Vec<Rank> {
        match self {
            StoredValue::Rank(r) => vec![*r],
            StoredValue::List(items) => items.iter().flat_map(StoredValue::ranks).collect(),
            _ => Vec::new(),
        }
    }

    /// Returns `true` if this value equals `needle` or is a sequence holding it.
    pub fn contains(&self, needle: &StoredValue) -> bool {
        match self {
            StoredValue::List(items) if !matches!(needle, StoredValue::List(_)) => {
                items.iter().any(|item| item == needle)
            }
            other => other == needle,
        }
    }
}

impl fmt::Display for StoredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredValue::Int(v) => write!(f, "{v}"),
            StoredValue::Real(v) => write!(f, "{v}"),
            StoredValue::Time(v) => write!(f, "{}", v.to_rfc3339()),
            StoredValue::Str(v) => write!(f, "{v:?}"),
            StoredValue::Rank(r) => write!(f, "#{r}"),
            StoredValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}
