//! Typed wire values

/// A decoded protocol value.
///
/// A closed set of variants keeps handling exhaustive at every call site.
/// Structs are ordered name/value lists, not hash maps, so an encoded
/// value decodes back to a structurally equal one. `Fault` only ever
/// appears on the decode side.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed integer (`<int>`/`<i4>`)
    Int(i64),
    /// Floating point (`<double>`)
    Double(f64),
    /// Boolean encoded as 0/1
    Bool(bool),
    /// Entity-escaped string
    Str(String),
    /// Ordered list of values
    Array(Vec<Value>),
    /// Ordered list of named members
    Struct(Vec<(String, Value)>),
    /// Remote-reported fault with its message
    Fault(String),
}

impl Value {
    /// Build a string value.
    pub fn string(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Integer content, if this is an `Int`.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Boolean content, if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String content, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Array items, if this is an `Array`.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a struct member by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Self> {
        match self {
            Self::Struct(members) => members
                .iter()
                .find(|(member, _)| member == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Convert a JSON value into a wire value.
    ///
    /// `null` maps to boolean-false: the protocol has no null and the
    /// remote system itself uses `false` for absent fields.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Bool(false),
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n.as_i64().map_or_else(
                || Self::Double(n.as_f64().unwrap_or(0.0)),
                Self::Int,
            ),
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Self::Array(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Struct(
                map.iter()
                    .map(|(key, value)| (key.clone(), Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Convert a wire value into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Double(d) => serde_json::Number::from_f64(*d)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Struct(members) => serde_json::Value::Object(
                members
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
            Self::Fault(message) => serde_json::json!({ "fault": message }),
        }
    }

    /// First string found by depth-first search; faults carry their
    /// message this way.
    #[must_use]
    pub fn first_string(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Array(items) => items.iter().find_map(Self::first_string),
            Self::Struct(members) => members.iter().find_map(|(_, value)| value.first_string()),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}
