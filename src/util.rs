use std::collections::HashSet;
use std::hash::Hash;

use serde_json::Value;

const MAX_SEARCH_DEPTH: usize = 32;

/// Collect every node in `root` matching `pred`. Matching nodes are not
/// descended into, so a hit cannot also yield its own children as hits.
pub fn deep_find_all<'a>(root: &'a Value, pred: &dyn Fn(&Value) -> bool) -> Vec<&'a Value> {
    let mut out = Vec::new();
    walk(root, pred, 0, &mut out);
    out
}

/// First match in document order, if any.
pub fn deep_find_first<'a>(root: &'a Value, pred: &dyn Fn(&Value) -> bool) -> Option<&'a Value> {
    deep_find_all(root, pred).into_iter().next()
}

fn walk<'a>(
    node: &'a Value,
    pred: &dyn Fn(&Value) -> bool,
    depth: usize,
    out: &mut Vec<&'a Value>,
) {
    if depth > MAX_SEARCH_DEPTH {
        return;
    }
    if pred(node) {
        out.push(node);
        return;
    }
    match node {
        Value::Object(map) => {
            for child in map.values() {
                walk(child, pred, depth + 1, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                walk(child, pred, depth + 1, out);
            }
        }
        _ => {}
    }
}

/// Stable first-occurrence dedup: later items with an already-seen key are
/// dropped, earlier items keep their order.
pub fn dedup_by_key<T, K, F>(items: Vec<T>, mut key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

/// Shorten a string for diagnostics without splitting a UTF-8 character.
pub fn truncate_for_log(raw: &str, max_chars: usize) -> String {
    if raw.chars().count() <= max_chars {
        return raw.to_string();
    }
    let cut: String = raw.chars().take(max_chars).collect();
    format!("{cut}...")
}
