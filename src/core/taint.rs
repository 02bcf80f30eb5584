//! Taint tracking for untrusted input.
//!
//! A [`TaintedString`] behaves as its underlying string for all observation
//! (equality, hashing, length, content) while carrying an immutable set of
//! origin tags. Every derivation that produces a new `TaintedString` unions
//! the operand tag sets. There is no untainting operation.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Deref};

/// A string carrying taint tags (e.g. `{"untrusted", "http"}`).
#[derive(Debug, Clone, Serialize)]
pub struct TaintedString {
    value: String,
    tags: BTreeSet<String>,
}

impl TaintedString {
    pub fn new<T, I>(value: impl Into<String>, tags: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = T>,
    {
        Self {
            value: value.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// A tainted string with no tags. Useful as a plain operand in
    /// concatenations.
    pub fn untagged(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            tags: BTreeSet::new(),
        }
    }

    pub fn taint_tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Union additional tags into this value.
    pub fn with_tags<T, I>(mut self, tags: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = T>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }

    /// Interpolate `{name}` placeholders from `args`.
    ///
    /// The result carries the union of the template's tags and the tags of
    /// every supplied argument, whether or not its placeholder occurs in the
    /// template.
    pub fn format<'a, I>(&self, args: I) -> TaintedString
    where
        I: IntoIterator<Item = (&'a str, &'a TaintedString)>,
    {
        let mut value = self.value.clone();
        let mut tags = self.tags.clone();
        for (name, arg) in args {
            value = value.replace(&format!("{{{name}}}"), arg.as_str());
            tags.extend(arg.tags.iter().cloned());
        }
        TaintedString { value, tags }
    }
}

impl Deref for TaintedString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for TaintedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

// Observation sees only the string content; tags never participate in
// equality or hashing.
impl PartialEq for TaintedString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for TaintedString {}

impl Hash for TaintedString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl PartialEq<str> for TaintedString {
    fn eq(&self, other: &str) -> bool {
        self.value == other
    }
}

impl PartialEq<&str> for TaintedString {
    fn eq(&self, other: &&str) -> bool {
        self.value == *other
    }
}

impl PartialEq<String> for TaintedString {
    fn eq(&self, other: &String) -> bool {
        &self.value == other
    }
}

impl From<&str> for TaintedString {
    fn from(value: &str) -> Self {
        Self::untagged(value)
    }
}

impl From<String> for TaintedString {
    fn from(value: String) -> Self {
        Self::untagged(value)
    }
}

impl Add<&TaintedString> for &TaintedString {
    type Output = TaintedString;

    fn add(self, rhs: &TaintedString) -> TaintedString {
        let mut tags = self.tags.clone();
        tags.extend(rhs.tags.iter().cloned());
        TaintedString {
            value: format!("{}{}", self.value, rhs.value),
            tags,
        }
    }
}

impl Add<&str> for &TaintedString {
    type Output = TaintedString;

    // A plain operand contributes the empty tag set.
    fn add(self, rhs: &str) -> TaintedString {
        TaintedString {
            value: format!("{}{}", self.value, rhs),
            tags: self.tags.clone(),
        }
    }
}

/// A JSON-shaped tree whose string leaves carry taint tags. Produced by
/// [`taint_recursive`]; mapping keys are never tainted.
#[derive(Debug, Clone, PartialEq)]
pub enum TaintedValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(TaintedString),
    Array(Vec<TaintedValue>),
    Object(BTreeMap<String, TaintedValue>),
}

impl TaintedValue {
    pub fn get(&self, key: &str) -> Option<&TaintedValue> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_tainted(&self) -> Option<&TaintedString> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Untainted JSON view of the tree.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.as_str().to_string()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }
}

/// Walk `value` and replace every string leaf with a [`TaintedString`]
/// carrying `tags`. Non-string leaves are carried over unchanged.
pub fn taint_recursive(value: &Value, tags: &[&str]) -> TaintedValue {
    match value {
        Value::Null => TaintedValue::Null,
        Value::Bool(b) => TaintedValue::Bool(*b),
        Value::Number(n) => TaintedValue::Number(n.clone()),
        Value::String(s) => TaintedValue::String(TaintedString::new(s.clone(), tags.iter().copied())),
        Value::Array(items) => {
            TaintedValue::Array(items.iter().map(|v| taint_recursive(v, tags)).collect())
        }
        Value::Object(map) => TaintedValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), taint_recursive(v, tags)))
                .collect(),
        ),
    }
}

/// True iff `value` is a tainted string leaf.
pub fn is_tainted(value: &TaintedValue) -> bool {
    matches!(value, TaintedValue::String(_))
}
