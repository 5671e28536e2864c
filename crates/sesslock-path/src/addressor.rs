//! Path addressing over `serde_json::Value` trees
//!
//! A path such as `profile.addresses.0.city` walks mapping keys and list
//! positions alike. Mappings accept every segment (indices are looked up by
//! their decimal form), lists accept only index segments.

use serde_json::{Map, Value};

use sesslock_common::{Result, SessionError};

use crate::segment::Segment;

/// Default segment delimiter
pub const DEFAULT_DELIMITER: char = '.';

/// Stateless path operations sharing one delimiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathAddressor {
    delimiter: char,
}

impl Default for PathAddressor {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl PathAddressor {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Split a path into normalized segments; the empty path has none.
    pub fn segments(&self, path: &str) -> Vec<Segment> {
        if path.is_empty() {
            return Vec::new();
        }
        path.split(self.delimiter).map(Segment::parse).collect()
    }

    /// First segment of a path, naming the top-level field.
    pub fn basename(&self, path: &str) -> Result<String> {
        match path.split(self.delimiter).next() {
            Some(first) if !first.is_empty() => Ok(first.to_string()),
            _ => Err(SessionError::InvalidPath(path.to_string())),
        }
    }

    /// Remainder of a path below its basename, empty for a bare field name.
    pub fn subpath<'p>(&self, path: &'p str) -> &'p str {
        path.split_once(self.delimiter)
            .map(|(_, rest)| rest)
            .unwrap_or("")
    }

    /// Value at `path`, or `None` when any step is missing.
    pub fn lookup<'a>(&self, tree: &'a Value, path: &str) -> Option<&'a Value> {
        self.segments(path)
            .iter()
            .try_fold(tree, |node, segment| child(node, segment))
    }

    /// Value at `path`, or `default` when any step is missing.
    pub fn extract<'a>(&self, tree: &'a Value, path: &str, default: &'a Value) -> &'a Value {
        self.lookup(tree, path).unwrap_or(default)
    }

    /// Set `value` at `path`, creating intermediate mappings on the way.
    ///
    /// Scalars found where a container is needed are replaced by an empty
    /// mapping. A list addressed past its end, or by a string key, becomes a
    /// mapping keyed by the stringified positions. The empty path replaces the
    /// whole tree.
    pub fn insert<'a>(&self, tree: &'a mut Value, path: &str, value: Value) -> &'a mut Value {
        let segments = self.segments(path);
        let mut node: &mut Value = &mut *tree;
        for segment in &segments {
            node = slot(node, segment);
        }
        *node = value;
        tree
    }

    /// Remove the entry at `path`. Missing intermediates and the empty path are no-ops.
    ///
    /// Returns the removed value.
    pub fn delete(&self, tree: &mut Value, path: &str) -> Option<Value> {
        let segments = self.segments(path);
        let (last, parents) = segments.split_last()?;

        let mut node = tree;
        for segment in parents {
            node = child_mut(node, segment)?;
        }

        match node {
            Value::Object(map) => map.remove(last.key().as_ref()),
            Value::Array(items) => match last.index() {
                Some(i) if i < items.len() => Some(items.remove(i)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether `path` resolves; the empty path always does.
    pub fn check(&self, tree: &Value, path: &str) -> bool {
        self.lookup(tree, path).is_some()
    }
}

/// Whether a field value carries no data and should not be stored
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn child<'a>(node: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment.key().as_ref()),
        Value::Array(items) => segment.index().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &Segment) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => map.get_mut(segment.key().as_ref()),
        Value::Array(items) => segment.index().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}

fn accepts(node: &Value, segment: &Segment) -> bool {
    match node {
        Value::Object(_) => true,
        Value::Array(items) => segment.index().is_some_and(|i| i <= items.len()),
        _ => false,
    }
}

fn promote(node: &mut Value) {
    let map: Map<String, Value> = match std::mem::take(node) {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Map::new(),
    };
    *node = Value::Object(map);
}

/// Child slot for `segment`, created as null when absent.
fn slot<'a>(node: &'a mut Value, segment: &Segment) -> &'a mut Value {
    if !accepts(node, segment) {
        promote(node);
    }
    match node {
        Value::Object(map) => map.entry(segment.key().into_owned()).or_insert(Value::Null),
        Value::Array(items) => {
            let index = segment.index().unwrap_or(items.len());
            if index == items.len() {
                items.push(Value::Null);
            }
            &mut items[index]
        }
        other => {
            *other = Value::Object(Map::new());
            slot(other, segment)
        }
    }
}
