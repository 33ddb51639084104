//! Values handling: application order, canonical YAML, flattening

use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

/// Ordered value files for a Helm invocation
///
/// Files apply in insertion order (earlier = lower precedence); the inline
/// values file, when present, is always emitted last and therefore wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValuesPlan {
    files: Vec<PathBuf>,
    inline: Option<PathBuf>,
}

impl ValuesPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value file after the ones already planned
    pub fn push_file(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    /// Set the materialized inline values file
    pub fn set_inline(&mut self, path: impl Into<PathBuf>) {
        self.inline = Some(path.into());
    }

    pub fn inline(&self) -> Option<&Path> {
        self.inline.as_deref()
    }

    /// All paths, in application order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files
            .iter()
            .map(PathBuf::as_path)
            .chain(self.inline.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.inline.is_none()
    }

    pub fn len(&self) -> usize {
        self.files.len() + usize::from(self.inline.is_some())
    }
}

/// Normalize a values YAML document for state storage.
///
/// Blank input and an explicit `null` document become the empty string.
/// Otherwise the document is parsed, mapping keys are sorted recursively and
/// the result is re-serialized, so `sanitize_yaml(sanitize_yaml(y)) ==
/// sanitize_yaml(y)`.
pub fn sanitize_yaml(yaml: &str) -> Result<String> {
    if yaml.trim().is_empty() {
        return Ok(String::new());
    }

    let parsed: YamlValue = serde_yaml::from_str(yaml)?;
    if parsed.is_null() {
        return Ok(String::new());
    }

    Ok(serde_yaml::to_string(&canonicalize(parsed))?)
}

fn canonicalize(value: YamlValue) -> YamlValue {
    match value {
        YamlValue::Mapping(map) => {
            let mut entries: Vec<(YamlValue, YamlValue)> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            entries.sort_by_cached_key(|(k, _)| key_text(k));

            let mut sorted = Mapping::new();
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            YamlValue::Mapping(sorted)
        }
        YamlValue::Sequence(seq) => {
            YamlValue::Sequence(seq.into_iter().map(canonicalize).collect())
        }
        YamlValue::Tagged(mut tagged) => {
            tagged.value = canonicalize(tagged.value);
            YamlValue::Tagged(tagged)
        }
        other => other,
    }
}

fn key_text(key: &YamlValue) -> String {
    match key {
        YamlValue::String(s) => s.clone(),
        other => serde_yaml::to_string(other).unwrap_or_default(),
    }
}

/// Flatten a resolved values document into dotted keys.
///
/// Nested objects become `parent.child` keys. Strings are kept verbatim,
/// numbers and booleans use their textual form, and arrays and `null` are
/// rendered as compact JSON (`[1,"a"]`, `null`). Empty objects contribute
/// no key. A `null` document flattens to an empty map.
pub fn flatten_values(values: &JsonValue) -> Result<BTreeMap<String, String>> {
    let mut flat = BTreeMap::new();
    match values {
        JsonValue::Object(map) => {
            for (key, value) in map {
                flatten_into(&mut flat, key.clone(), value);
            }
        }
        JsonValue::Null => {}
        other => {
            return Err(CoreError::ValuesShape {
                message: format!("expected an object at the top level, got {}", kind(other)),
            });
        }
    }
    Ok(flat)
}

fn flatten_into(flat: &mut BTreeMap<String, String>, key: String, value: &JsonValue) {
    match value {
        JsonValue::Object(map) => {
            for (child, nested) in map {
                flatten_into(flat, format!("{}.{}", key, child), nested);
            }
        }
        JsonValue::String(s) => {
            flat.insert(key, s.clone());
        }
        other => {
            flat.insert(key, other.to_string());
        }
    }
}

fn kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
