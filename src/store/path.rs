use anyhow::{bail, Result};
use serde_json::{Map, Value};
use std::fmt;

/// Characters the realtime database refuses inside a key.
const FORBIDDEN_KEY_CHARS: &[char] = &['.', '$', '#', '[', ']', '/'];

/// Slash-separated location inside the store tree (e.g. `devices/lamp1/status`).
///
/// The root path has no segments. Every segment is a validated key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path, ignoring leading, trailing and repeated slashes.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for segment in raw.split('/').filter(|s| !s.is_empty()) {
            validate_key(segment)?;
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Build a path from segments known to be valid keys.
    pub(crate) fn from_trusted(segments: &[&str]) -> Self {
        Self {
            segments: segments.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn child(&self, key: &str) -> Result<Self> {
        validate_key(key)?;
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Ok(Self { segments })
    }

    pub fn join(&self, other: &StorePath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &StorePath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Remainder of this path below `base`, if `base` is an ancestor or self.
    pub fn relative_to(&self, base: &StorePath) -> Option<StorePath> {
        self.segments
            .strip_prefix(base.segments.as_slice())
            .map(|rest| StorePath {
                segments: rest.to_vec(),
            })
    }

    /// True when a write at one path can change the value at the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// Path without the leading slash, as used in REST URLs.
    pub fn to_key(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        bail!("Path segment must not be empty");
    }
    if let Some(c) = key
        .chars()
        .find(|c| FORBIDDEN_KEY_CHARS.contains(c) || c.is_control())
    {
        bail!("Invalid character {:?} in key '{}'", c, key);
    }
    Ok(())
}

/// Value stored at `path`, treating `null` as absent.
pub fn value_at<'a>(tree: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut node = tree;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    if node.is_null() {
        None
    } else {
        Some(node)
    }
}

/// Replace the value at `path`. Writing `null` deletes, and objects left
/// empty by a delete disappear.
pub fn set_at(tree: &mut Value, path: &StorePath, value: Value) {
    set_in(tree, path.segments(), prune(value));
}

/// Merge `fields` into the object at `path`, one child write per key.
///
/// Keys may be relative multi-segment paths (`"lamp1/status"`). All keys are
/// validated before anything is written.
pub fn update_at(tree: &mut Value, path: &StorePath, fields: &Map<String, Value>) -> Result<()> {
    let mut writes = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        let relative = StorePath::parse(key)?;
        if relative.is_root() {
            bail!("Update key must name a child path");
        }
        writes.push((path.join(&relative), value.clone()));
    }
    for (target, value) in writes {
        set_at(tree, &target, value);
    }
    Ok(())
}

fn set_in(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }

    if let Value::Object(map) = node {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        set_in(child, rest, value);
        if is_empty_node(child) {
            map.remove(head);
        }
    }

    if is_empty_node(node) {
        *node = Value::Null;
    }
}

/// Drop `null` children and empty objects, the way the store never keeps them.
fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !is_empty_node(v))
                .collect();
            if pruned.is_empty() {
                Value::Null
            } else {
                Value::Object(pruned)
            }
        }
        other => other,
    }
}

fn is_empty_node(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
