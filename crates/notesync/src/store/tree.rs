//! JSON tree operations with realtime-store semantics:
//! - writing `null` (or an object that normalizes to nothing) removes the node
//! - empty objects never persist: removing the last child removes the parent
//! - writing below a scalar replaces the scalar with an object

use crate::path::StorePath;
use serde_json::{Map, Value};

pub fn empty_root() -> Value {
    Value::Object(Map::new())
}

pub fn get<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    if is_empty_object(node) && !path.is_root() {
        return None;
    }
    Some(node)
}

/// Direct child keys at `path`, sorted.
pub fn child_keys(root: &Value, path: &StorePath) -> Vec<String> {
    match get(root, path).and_then(Value::as_object) {
        Some(map) => {
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();
            keys
        }
        None => Vec::new(),
    }
}

pub fn set(root: &mut Value, path: &StorePath, value: Value) {
    match normalize(value) {
        Some(value) => insert(root, path.segments(), value),
        None => {
            remove(root, path.segments());
        }
    }
}

/// Applies each field as a write relative to `path`. Field keys may contain
/// `/` to address deeper children.
pub fn update(root: &mut Value, path: &StorePath, fields: Map<String, Value>) {
    for (key, value) in fields {
        let mut target = path.clone();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            target = target.child(segment);
        }
        set(root, &target, value);
    }
}

/// Strips nulls and empty objects. `None` when nothing is left.
pub fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k, v)))
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Object(cleaned))
            }
        }
        other => Some(other),
    }
}

fn insert(node: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = empty_root();
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.clone()).or_insert(Value::Null);
        insert(child, rest, value);
    }
}

/// Returns true when `node` is left empty and should itself be pruned.
fn remove(node: &mut Value, segments: &[String]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        *node = empty_root();
        return true;
    };
    let Value::Object(map) = node else {
        return false;
    };
    let prune_child = match map.get_mut(first) {
        Some(child) => rest.is_empty() || remove(child, rest),
        None => false,
    };
    if prune_child {
        map.remove(first);
    }
    map.is_empty()
}

fn is_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}
