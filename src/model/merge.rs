//! Recursive merge of default-state fragments.
//!
//! Fragments are folded nearest layer first, so a value already present in the
//! accumulator always wins a leaf conflict. Containers combine: objects key by
//! key, arrays index by index.

use serde_json::Value;

/// Merges `source` into `target`, keeping every leaf `target` already holds.
pub fn merge_keep_first(target: &mut Value, source: &Value) {
    match (target, source) {
        (_, Value::Null) => {}
        (target, source) if target.is_null() => *target = source.clone(),
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(key) {
                    Some(existing) => merge_keep_first(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(source)) => {
            for (index, value) in source.iter().enumerate() {
                match target.get_mut(index) {
                    Some(existing) => merge_keep_first(existing, value),
                    None => target.push(value.clone()),
                }
            }
        }
        // Leaf or shape conflict: first seen wins.
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nearest_leaf_wins() {
        let mut acc = json!({"count": 5, "meta": {"label": "child"}});
        merge_keep_first(&mut acc, &json!({"count": 0, "step": 1, "meta": {"label": "base", "color": "red"}}));
        assert_eq!(acc, json!({"count": 5, "step": 1, "meta": {"label": "child", "color": "red"}}));
    }

    #[test]
    fn test_arrays_merge_by_index() {
        let mut acc = json!({"items": [{"id": 1}]});
        merge_keep_first(&mut acc, &json!({"items": [{"id": 9, "done": false}, {"id": 2}]}));
        assert_eq!(acc, json!({"items": [{"id": 1, "done": false}, {"id": 2}]}));
    }

    #[test]
    fn test_shape_conflict_keeps_first() {
        let mut acc = json!({"filter": "all"});
        merge_keep_first(&mut acc, &json!({"filter": {"kind": "done"}}));
        assert_eq!(acc, json!({"filter": "all"}));

        let mut empty = Value::Null;
        merge_keep_first(&mut empty, &json!({"a": 1}));
        assert_eq!(empty, json!({"a": 1}));
    }
}
