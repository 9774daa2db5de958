//! Attribute keys and values attached to spans, events, links, and resources.
//!
//! The value space is closed: booleans, 64-bit integers, 64-bit floats,
//! strings, and homogeneous arrays of those. Anything else must be converted
//! by the caller before it enters the pipeline.

use std::borrow::Cow;
use std::fmt;

/// Key used to index attribute maps.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Cow<'static, str>);

impl Key {
    /// Create a new `Key`.
    pub fn new(value: impl Into<Cow<'static, str>>) -> Self {
        Key(value.into())
    }

    /// Create a new const `Key`.
    pub const fn from_static_str(value: &'static str) -> Self {
        Key(Cow::Borrowed(value))
    }

    /// Returns a reference to the underlying key name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Key {
    fn from(key: &'static str) -> Self {
        Key(Cow::Borrowed(key))
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key(Cow::Owned(key))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Array of homogeneous attribute values.
#[derive(Clone, Debug, PartialEq)]
pub enum Array {
    /// Array of bools
    Bool(Vec<bool>),
    /// Array of integers
    I64(Vec<i64>),
    /// Array of floats
    F64(Vec<f64>),
    /// Array of strings
    String(Vec<Cow<'static, str>>),
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Array::Bool(values) => display_comma_separated(values, f),
            Array::I64(values) => display_comma_separated(values, f),
            Array::F64(values) => display_comma_separated(values, f),
            Array::String(values) => {
                write!(f, "[")?;
                for (i, t) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{:?}", t)?;
                }
                write!(f, "]")
            }
        }
    }
}

fn display_comma_separated<T: fmt::Display>(
    slice: &[T],
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    write!(f, "[")?;
    for (i, t) in slice.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write!(f, "{}", t)?;
    }
    write!(f, "]")
}

macro_rules! into_array {
    ($(($t:ty, $val:expr),)+) => {
        $(
            impl From<$t> for Array {
                fn from(t: $t) -> Self {
                    $val(t)
                }
            }
        )+
    }
}

into_array!(
    (Vec<bool>, Array::Bool),
    (Vec<i64>, Array::I64),
    (Vec<f64>, Array::F64),
    (Vec<Cow<'static, str>>, Array::String),
);

/// The value part of attribute key-value pairs.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// bool values
    Bool(bool),
    /// i64 values
    I64(i64),
    /// f64 values
    F64(f64),
    /// String values
    String(Cow<'static, str>),
    /// Array of homogeneous values
    Array(Array),
}

impl Value {
    /// String representation of the `Value`.
    ///
    /// This will allocate if the underlying value is not a `String`.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Value::Bool(v) => format!("{}", v).into(),
            Value::I64(v) => format!("{}", v).into(),
            Value::F64(v) => format!("{}", v).into(),
            Value::String(v) => Cow::Borrowed(v.as_ref()),
            Value::Array(v) => format!("{}", v).into(),
        }
    }

    /// Truncates string payloads to at most `max_len` bytes, respecting char
    /// boundaries. Scalar values pass through untouched.
    pub(crate) fn truncate(&mut self, max_len: usize) {
        match self {
            Value::String(s) => truncate_cow(s, max_len),
            Value::Array(Array::String(values)) => {
                for s in values.iter_mut() {
                    truncate_cow(s, max_len);
                }
            }
            _ => {}
        }
    }
}

fn truncate_cow(s: &mut Cow<'static, str>, max_len: usize) {
    if s.len() <= max_len {
        return;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.to_mut().truncate(end);
}

macro_rules! from_values {
   (
        $(
            ($t:ty, $val:expr);
        )+
    ) => {
        $(
            impl From<$t> for Value {
                fn from(t: $t) -> Self {
                    $val(t)
                }
            }
        )+
    }
}

from_values!(
    (bool, Value::Bool);
    (i64, Value::I64);
    (f64, Value::F64);
    (Cow<'static, str>, Value::String);
    (Array, Value::Array);
);

impl From<i32> for Value {
    fn from(t: i32) -> Self {
        Value::I64(t.into())
    }
}

impl From<&'static str> for Value {
    fn from(t: &'static str) -> Self {
        Value::String(Cow::Borrowed(t))
    }
}

impl From<String> for Value {
    fn from(t: String) -> Self {
        Value::String(Cow::Owned(t))
    }
}

impl From<Vec<bool>> for Value {
    fn from(t: Vec<bool>) -> Self {
        Value::Array(t.into())
    }
}

impl From<Vec<i64>> for Value {
    fn from(t: Vec<i64>) -> Self {
        Value::Array(t.into())
    }
}

impl From<Vec<f64>> for Value {
    fn from(t: Vec<f64>) -> Self {
        Value::Array(t.into())
    }
}

impl From<Vec<Cow<'static, str>>> for Value {
    fn from(t: Vec<Cow<'static, str>>) -> Self {
        Value::Array(t.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => v.fmt(f),
            Value::I64(v) => v.fmt(f),
            Value::F64(v) => v.fmt(f),
            Value::String(v) => f.write_str(v.as_ref()),
            Value::Array(v) => v.fmt(f),
        }
    }
}

/// A key-value pair describing an aspect of a span, event, link, or resource.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue {
    /// The attribute name
    pub key: Key,
    /// The attribute value
    pub value: Value,
}

impl KeyValue {
    /// Create a new `KeyValue` pair.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_conversions() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i64), Value::I64(42));
        assert_eq!(Value::from(7i32), Value::I64(7));
        assert_eq!(Value::from(1.5f64), Value::F64(1.5));
        assert_eq!(Value::from("static"), Value::String(Cow::Borrowed("static")));
        assert_eq!(
            Value::from(vec![1i64, 2, 3]),
            Value::Array(Array::I64(vec![1, 2, 3]))
        );
    }

    #[test]
    fn value_display() {
        assert_eq!(Value::from(vec![1i64, 2]).to_string(), "[1,2]");
        assert_eq!(Value::from(false).to_string(), "false");
        assert_eq!(Value::from("x").to_string(), "x");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let mut value = Value::from("héllo".to_string());
        // byte 2 splits the two-byte 'é'
        value.truncate(2);
        assert_eq!(value, Value::from("h".to_string()));

        let mut unchanged = Value::from("ok");
        unchanged.truncate(16);
        assert_eq!(unchanged, Value::from("ok"));
    }

    #[test]
    fn keyvalue_new() {
        let kv = KeyValue::new("http.status_code", 200);
        assert_eq!(kv.key.as_str(), "http.status_code");
        assert_eq!(kv.value, Value::I64(200));
    }
}
