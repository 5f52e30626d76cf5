// crates/resilience/src/message.rs
//! Dotted-path access to request and response fields

use serde_json::{Map, Value};
use std::fmt;

/// Dot-separated path to a possibly nested field, e.g. `"message.topic"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses a dot-separated path; empty segments are ignored
    pub fn new(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Returns the path segments in traversal order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        Self::new(&path)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// A request or response whose fields can be read and written by path
///
/// Bundling uses this to compute batch keys, to concatenate the bundled
/// field of many requests, and to slice a subresponse field back apart.
pub trait Message: Clone + Send + Sync + 'static {
    /// Element type of repeated fields
    type Element: Clone + Send + Sync + 'static;

    /// Stringified value of a scalar field, `None` when absent
    fn key_value(&self, path: &FieldPath) -> Option<String>;

    /// Elements of a repeated field, `None` when absent
    fn elements(&self, path: &FieldPath) -> Option<Vec<Self::Element>>;

    /// Replaces a repeated field, creating intermediate fields as needed
    fn set_elements(&mut self, path: &FieldPath, elements: Vec<Self::Element>);

    /// Size in bytes used for the byte threshold
    fn element_size(element: &Self::Element) -> usize;
}

impl Message for Value {
    type Element = Value;

    fn key_value(&self, path: &FieldPath) -> Option<String> {
        match lookup(self, path)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn elements(&self, path: &FieldPath) -> Option<Vec<Value>> {
        match lookup(self, path)? {
            Value::Array(items) => Some(items.clone()),
            Value::Null => None,
            single => Some(vec![single.clone()]),
        }
    }

    fn set_elements(&mut self, path: &FieldPath, elements: Vec<Value>) {
        if !path.segments().is_empty() {
            assign(self, path.segments(), elements);
        }
    }

    fn element_size(element: &Value) -> usize {
        match element {
            Value::String(s) => s.len(),
            other => other.to_string().len(),
        }
    }
}

fn lookup<'a>(value: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(value, |current, segment| current.get(segment.as_str()))
}

/// Writes `elements` at `segments`, replacing non-object parents
fn assign(value: &mut Value, segments: &[String], elements: Vec<Value>) {
    let Some((first, rest)) = segments.split_first() else {
        *value = Value::Array(elements);
        return;
    };
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    if let Value::Object(map) = value {
        let child = map.entry(first.clone()).or_insert(Value::Null);
        assign(child, rest, elements);
    }
}
