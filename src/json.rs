//! Null-safe traversal of decoded JSON responses.
//!
//! The browse API changes shape often. Every lookup goes through [`get`],
//! which turns a missing key, an out-of-range index or a type mismatch into
//! `None` instead of an error.

use std::fmt;

pub use serde_json::Value;

/// One step of a path through a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for Segment<'a> {
    fn from(key: &'a str) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment<'_> {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

impl fmt::Display for Segment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "{}", key),
            Segment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Builds a `[Segment]` array from a mix of string keys and indices.
///
/// ```rust
/// use ytlive_rs::{json, path};
///
/// let value = serde_json::json!({"title": {"runs": [{"text": "Hello"}]}});
/// let text = json::get(Some(&value), &path!["title", "runs", 0, "text"]);
/// assert_eq!(text.and_then(|t| t.as_str()), Some("Hello"));
/// ```
#[macro_export]
macro_rules! path {
    ($($segment:expr),* $(,)?) => {
        [$($crate::json::Segment::from($segment)),*]
    };
}

/// Walks `path` from `root`, returning the value at the end if every step
/// resolves.
pub fn get<'v>(root: Option<&'v Value>, path: &[Segment]) -> Option<&'v Value> {
    path.iter().try_fold(root?, |current, segment| match (current, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get(*key),
        (Value::Array(list), Segment::Index(index)) => list.get(*index),
        _ => None,
    })
}

/// Like [`get`], but reports how far the walk got. On failure returns the
/// path prefix up to and including the first segment that did not resolve.
pub fn resolve<'v>(root: &'v Value, path: &[Segment]) -> Result<&'v Value, String> {
    let mut current = root;
    for (depth, segment) in path.iter().enumerate() {
        current = get(Some(current), std::slice::from_ref(segment))
            .ok_or_else(|| format_path(&path[..=depth]))?;
    }
    Ok(current)
}

/// Shortcut for a string leaf.
pub fn get_str<'v>(root: Option<&'v Value>, path: &[Segment]) -> Option<&'v str> {
    get(root, path)?.as_str()
}

pub fn format_path(path: &[Segment]) -> String {
    path.iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(".")
}
