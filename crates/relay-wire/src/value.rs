//! Schema-flexible document values.
//!
//! [`Value`] is the unit of data carried in request params and response
//! results: nested maps, sequences, and primitives. Maps preserve insertion
//! order because the wire format round-trips key order verbatim.

/// A document value: the schema-flexible payload type of the wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value. Stripped from top-level maps on encode.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// IEEE-754 double.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Ordered sequence of values.
    List(Vec<Value>),
    /// Insertion-ordered map of string keys to values.
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Builds an empty map value.
    #[must_use]
    pub fn map() -> Self {
        Self::Map(Vec::new())
    }

    /// Appends a key/value pair, consuming and returning the map.
    ///
    /// Intended for literal-style construction:
    /// `Value::map().with("name", "echo")`. Has no effect on non-map values.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Self::Map(entries) = &mut self {
            entries.push((key.into(), value.into()));
        }
        self
    }

    /// Looks up a key in a map value.
    ///
    /// Returns `None` for non-map values and missing keys. First match wins
    /// when a key is duplicated.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(entries) => entries
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Returns the string contents when the value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the integer contents when the value is an integer.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(number) => Some(*number),
            _ => None,
        }
    }

    /// Reports whether the value is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::List(values)
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(value: Option<V>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
