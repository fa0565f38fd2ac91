// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shape coercion for loosely-typed YAML.
//!
//! Only the manifest parser uses these helpers; everything past the parse
//! step works on typed structs.

use serde_yaml::Value;

/// Method assumed for routes that do not declare one.
pub const DEFAULT_ROUTE_METHOD: &str = "GET";

/// Strip any number of YAML tags (`!Ref`, `!Sub`, ...) from a value.
pub fn untag(value: &Value) -> &Value {
    let mut current = value;
    while let Value::Tagged(tagged) = current {
        current = &tagged.value;
    }
    current
}

/// View a value as a string-keyed mapping, in document order.
///
/// Entries whose keys are not strings are dropped. Anything that is not a
/// mapping yields an empty list.
pub fn as_map(value: &Value) -> Vec<(String, &Value)> {
    match untag(value) {
        Value::Mapping(mapping) => mapping
            .iter()
            .filter_map(|(key, value)| match untag(key) {
                Value::String(key) => Some((key.clone(), value)),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Look up a string key in a mapping value.
pub fn get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match untag(value) {
        Value::Mapping(mapping) => mapping.iter().find_map(|(k, v)| match untag(k) {
            Value::String(k) if k == key => Some(v),
            _ => None,
        }),
        _ => None,
    }
}

/// View a value as a list. Scalars and null yield an empty list.
pub fn as_slice(value: &Value) -> Vec<&Value> {
    match untag(value) {
        Value::Sequence(items) => items.iter().collect(),
        _ => Vec::new(),
    }
}

/// Render a scalar as a string. Mappings, sequences and null yield `None`.
pub fn as_string(value: &Value) -> Option<String> {
    match untag(value) {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read an unsigned integer, accepting numeric strings.
pub fn as_u64(value: &Value) -> Option<u64> {
    match untag(value) {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Route identifier `"<path>:<method>"` for an API route mapping.
///
/// The method defaults to `GET`; a route without a path has an empty key.
pub fn route_key(route: &Value) -> String {
    let path = get(route, "path")
        .and_then(as_string)
        .map(|p| p.trim().to_string())
        .unwrap_or_default();
    if path.is_empty() {
        return String::new();
    }

    let method = get(route, "method")
        .and_then(as_string)
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_ROUTE_METHOD.to_string());

    format!("{}:{}", path, method)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(src: &str) -> Value {
        serde_yaml::from_str(src).unwrap()
    }

    #[test]
    fn test_as_map_drops_non_string_keys() {
        let value = yaml("a: 1\nb: x\n123: ignored\n");
        let map = as_map(&value);
        let keys: Vec<_> = map.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(as_string(map[1].1).as_deref(), Some("x"));
    }

    #[test]
    fn test_as_map_non_mapping_is_empty() {
        assert!(as_map(&Value::Null).is_empty());
        assert!(as_map(&yaml("not a map")).is_empty());
    }

    #[test]
    fn test_as_slice() {
        let value = yaml("- a\n- 1\n");
        let items = as_slice(&value);
        assert_eq!(items.len(), 2);
        assert_eq!(as_string(items[0]).as_deref(), Some("a"));
        assert_eq!(as_string(items[1]).as_deref(), Some("1"));

        assert!(as_slice(&yaml("scalar")).is_empty());
        assert!(as_slice(&Value::Null).is_empty());
    }

    #[test]
    fn test_untag_reaches_inner_value() {
        let value = yaml("!Ref CommonLayer");
        assert_eq!(as_string(&value).as_deref(), Some("CommonLayer"));
    }

    #[test]
    fn test_route_key() {
        assert_eq!(route_key(&yaml("path: /v1/ping")), "/v1/ping:GET");
        assert_eq!(
            route_key(&yaml("path: /v1/ping\nmethod: POST")),
            "/v1/ping:POST"
        );
        assert_eq!(route_key(&yaml("method: GET")), "");
    }

    #[test]
    fn test_as_u64_accepts_strings() {
        assert_eq!(as_u64(&yaml("30")), Some(30));
        assert_eq!(as_u64(&yaml("'45'")), Some(45));
        assert_eq!(as_u64(&yaml("abc")), None);
    }
}
