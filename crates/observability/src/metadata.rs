//! Parsing of the free-form trace metadata entered on a node.

use serde_json::{Map, Value};

/// Split a comma-separated tag list.
///
/// Blank input, or input made only of separators, yields `None` rather than
/// an empty list so callers can omit the field entirely.
pub fn parse_tags(raw: Option<&str>) -> Option<Vec<String>> {
    let tags: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    (!tags.is_empty()).then_some(tags)
}

/// Turn the "custom metadata" parameter into a JSON object. Never fails.
///
/// - an object is used as-is
/// - a blank string (or nothing) is an empty map
/// - a string holding a JSON object is parsed
/// - anything else is kept verbatim under `_raw`
pub fn parse_custom_metadata(value: Option<&Value>) -> Map<String, Value> {
    match value {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) if s.trim().is_empty() => Map::new(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map,
            _ => raw(Value::String(s.clone())),
        },
        Some(other) => raw(other.clone()),
    }
}

fn raw(value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("_raw".into(), value);
    map
}

/// A non-blank string field of an options object.
pub(crate) fn opt_string(options: &Value, key: &str) -> Option<String> {
    options
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
