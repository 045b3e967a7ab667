//! Reference-preserving merge.
//!
//! Brings a live node in line with a freshly fetched value while mutating
//! composites in place, so every handle the application holds into the old
//! tree stays attached and sees the update.
//!
//! - both objects: drop fields missing from `incoming`, recurse into shared
//!   fields, adopt new fields
//! - both arrays: same, index-wise (truncate, recurse, append)
//! - anything else: the node's contents are replaced, the handle survives

use serde_json::Value;

use crate::cache::node::{Node, Slot};

pub fn merge(target: &Node, incoming: &Value) {
    let mut slot = target.slot().write();
    match (&mut *slot, incoming) {
        (Slot::Object(children), Value::Object(fields)) => {
            children.retain(|k, _| fields.contains_key(k));
            for (k, v) in fields {
                match children.get(k) {
                    Some(child) => merge(child, v),
                    None => {
                        children.insert(k.clone(), Node::new(v.clone()));
                    }
                }
            }
        }
        (Slot::Array(items), Value::Array(values)) => {
            items.truncate(values.len());
            for (i, v) in values.iter().enumerate() {
                match items.get(i) {
                    Some(child) => merge(child, v),
                    None => items.push(Node::new(v.clone())),
                }
            }
        }
        (Slot::Leaf(current), v) if !v.is_object() && !v.is_array() => {
            if current != v {
                *current = v.clone();
            }
        }
        (slot, v) => *slot = Slot::from_value(v.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_leaf_change_keeps_identity() {
        let root = Node::new(json!({"a": {"x": 1, "y": 2}, "b": {"z": 3}}));
        let a = root.get("a").unwrap();
        let b = root.get("b").unwrap();

        merge(&root, &json!({"a": {"x": 1, "y": 5}, "b": {"z": 3}}));

        assert!(root.get("a").unwrap().ptr_eq(&a));
        assert!(root.get("b").unwrap().ptr_eq(&b));
        assert_eq!(a.to_value(), json!({"x": 1, "y": 5}));
    }

    #[test]
    fn test_missing_fields_are_deleted() {
        let root = Node::new(json!({"keep": 1, "drop": {"deep": true}}));

        merge(&root, &json!({"keep": 1}));

        assert_eq!(root.to_value(), json!({"keep": 1}));
    }

    #[test]
    fn test_new_branches_are_adopted() {
        let root = Node::new(json!({"2023": {"1": {"starts": [1]}}}));
        let year = root.get("2023").unwrap();

        merge(
            &root,
            &json!({"2023": {"1": {"starts": [1]}, "2": {"starts": [5]}}}),
        );

        assert!(root.get("2023").unwrap().ptr_eq(&year));
        assert_eq!(year.path(&["2", "starts", "0"]).unwrap().as_i64(), Some(5));
    }

    #[test]
    fn test_arrays_merge_index_wise() {
        let root = Node::new(json!({"starts": [{"t": 1}, {"t": 2}, {"t": 3}]}));
        let starts = root.get("starts").unwrap();
        let first = starts.at(0).unwrap();

        merge(&root, &json!({"starts": [{"t": 10}, {"t": 2}]}));

        assert!(starts.at(0).unwrap().ptr_eq(&first));
        assert_eq!(first.to_value(), json!({"t": 10}));
        assert_eq!(starts.len(), 2);

        merge(&root, &json!({"starts": [{"t": 10}, {"t": 2}, {"t": 4}, {"t": 5}]}));
        assert!(starts.at(0).unwrap().ptr_eq(&first));
        assert_eq!(starts.len(), 4);
    }

    #[test]
    fn test_type_mismatch_replaces_contents_in_place() {
        let root = Node::new(json!({"a": {"x": 1}}));
        let a = root.get("a").unwrap();

        merge(&root, &json!({"a": [1, 2]}));
        assert!(root.get("a").unwrap().ptr_eq(&a));
        assert_eq!(a.to_value(), json!([1, 2]));

        merge(&root, &json!({"a": "flat"}));
        assert_eq!(a.leaf(), Some(json!("flat")));

        merge(&root, &json!(7));
        assert_eq!(root.to_value(), json!(7));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let incoming = json!({"a": {"b": [1, {"c": null}]}, "d": "e"});
        let root = Node::new(json!({}));
        merge(&root, &incoming);
        let b = root.path(&["a", "b"]).unwrap();

        merge(&root, &incoming);

        assert!(root.path(&["a", "b"]).unwrap().ptr_eq(&b));
        assert_eq!(root.to_value(), incoming);
    }
}
