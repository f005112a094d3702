//! Common types used throughout StorageKit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Backend connection options, keyed by option name.
///
/// A `BTreeMap` so iteration is always in sorted key order.
pub type OptionMap = BTreeMap<String, OptionValue>;

/// An opaque backend option value.
///
/// Mirrors the value shapes a config document can carry after environment
/// substitution: scalars, sequences and nested mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Explicit null.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Text value.
    String(String),
    /// Ordered list of values.
    Sequence(Vec<OptionValue>),
    /// Nested mapping.
    Mapping(BTreeMap<String, OptionValue>),
}

impl OptionValue {
    /// Borrow the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Whether this is a scalar (not a sequence or mapping).
    pub fn is_scalar(&self) -> bool {
        !matches!(self, OptionValue::Sequence(_) | OptionValue::Mapping(_))
    }

    /// Render the value for backends that only accept string options.
    ///
    /// Strings are returned verbatim; everything else uses the canonical form.
    pub fn to_plain_string(&self) -> String {
        match self {
            OptionValue::String(s) => s.clone(),
            other => other.canonical(),
        }
    }

    /// Canonical, type-preserving text form.
    ///
    /// Equal values always produce equal text, and values of different types
    /// never collide (`"true"` vs `true`). Used to build cache keys.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Null => write!(f, "null"),
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Integer(i) => write!(f, "{}", i),
            // Debug keeps a trailing ".0" so 1.0 never renders like the integer 1
            OptionValue::Float(x) => write!(f, "{:?}", x),
            OptionValue::String(s) => write!(f, "{:?}", s),
            OptionValue::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            OptionValue::Mapping(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{:?}:{}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::String(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Integer(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_canonical_distinguishes_types() {
        assert_ne!(
            OptionValue::from("true").canonical(),
            OptionValue::from(true).canonical()
        );
        assert_ne!(
            OptionValue::from(1i64).canonical(),
            OptionValue::from(1.0).canonical()
        );
    }

    #[test]
    fn test_canonical_nested_mapping_is_sorted() {
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), OptionValue::from(2i64));
        a.insert("a".to_string(), OptionValue::from("x"));

        let value = OptionValue::Mapping(a);
        assert_eq!(value.canonical(), r#"{"a":"x","b":2}"#);
    }

    #[test]
    fn test_plain_string() {
        assert_eq!(OptionValue::from("eu-west-1").to_plain_string(), "eu-west-1");
        assert_eq!(OptionValue::from(false).to_plain_string(), "false");
        assert_eq!(OptionValue::from(30i64).to_plain_string(), "30");
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let yaml = "timeout: 30\nanon: true\nregion: us-east-1\nratio: 0.5\nhosts: [a, b]\nnested:\n  key: value\nempty: null\n";
        let map: OptionMap = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(map["timeout"], OptionValue::Integer(30));
        assert_eq!(map["anon"], OptionValue::Bool(true));
        assert_eq!(map["region"].as_str(), Some("us-east-1"));
        assert_eq!(map["ratio"], OptionValue::Float(0.5));
        assert!(matches!(map["hosts"], OptionValue::Sequence(ref v) if v.len() == 2));
        assert!(matches!(map["nested"], OptionValue::Mapping(_)));
        assert_eq!(map["empty"], OptionValue::Null);
    }

    #[test]
    fn test_deserialize_from_json() {
        let json = r#"{"port":22,"anon":true,"ratio":0.25,"hosts":["a"],"key":null}"#;
        let map: OptionMap = serde_json::from_str(json).unwrap();

        assert_eq!(map["port"], OptionValue::Integer(22));
        assert_eq!(map["anon"], OptionValue::Bool(true));
        assert_eq!(map["ratio"], OptionValue::Float(0.25));
        assert_eq!(map["hosts"], OptionValue::Sequence(vec!["a".into()]));
        assert_eq!(map["key"], OptionValue::Null);
        assert_eq!(serde_json::to_string(&map["hosts"]).unwrap(), r#"["a"]"#);
    }

    proptest! {
        #[test]
        fn prop_canonical_strings_never_collide(a in ".*", b in ".*", n in any::<i64>()) {
            let ca = OptionValue::from(a.as_str()).canonical();
            let cb = OptionValue::from(b.as_str()).canonical();
            prop_assert_eq!(a == b, ca == cb);
            prop_assert_ne!(ca, OptionValue::from(n).canonical());
        }
    }
}
