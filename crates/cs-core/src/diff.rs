//! Identity-keyed set diff.
//!
//! Classifies a `modified` collection against an `original` one into
//! creates, updates, and deletes. Items are matched by id only; content
//! equality is decided on the serialized form.
//!
//! Items without an id can never be matched across revisions: an anonymous
//! item in `modified` is always a create, and one in `original` is always a
//! delete, even when the two are structurally equal.

use crate::model::NodeDefinition;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Anything that may carry a stable identity.
pub trait Identified {
    fn identity(&self) -> Option<&str>;
}

impl Identified for NodeDefinition {
    fn identity(&self) -> Option<&str> {
        Some(self.id.as_str())
    }
}

/// JSON objects are identified by a string `"id"` field.
impl Identified for Value {
    fn identity(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffResult<T> {
    pub creates: Vec<T>,
    pub updates: Vec<T>,
    pub deletes: Vec<T>,
}

impl<T> DiffResult<T> {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Map key: a real id, or a per-call synthetic key that matches nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key<'a> {
    Id(&'a str),
    Anonymous(usize),
}

fn index<'a, T: Identified>(items: &'a [T], next_anon: &mut usize) -> HashMap<Key<'a>, usize> {
    let mut map = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let key = match item.identity() {
            Some(id) => Key::Id(id),
            None => {
                *next_anon += 1;
                Key::Anonymous(*next_anon)
            }
        };
        // Later duplicates win, like an insertion-ordered map.
        map.insert(key, i);
    }
    map
}

fn serialized<T: Serialize>(item: &T) -> Option<Value> {
    serde_json::to_value(item).ok()
}

/// Diff two identity-keyed collections.
pub fn diff<T>(original: &[T], modified: &[T]) -> DiffResult<T>
where
    T: Identified + Serialize + Clone,
{
    let mut next_anon = 0usize;
    let original_index = index(original, &mut next_anon);
    let modified_index = index(modified, &mut next_anon);

    let mut result = DiffResult {
        creates: Vec::new(),
        updates: Vec::new(),
        deletes: Vec::new(),
    };

    for item in modified {
        match item.identity().and_then(|id| original_index.get(&Key::Id(id))) {
            None => result.creates.push(item.clone()),
            Some(&orig) => {
                if serialized(&original[orig]) != serialized(item) {
                    result.updates.push(item.clone());
                }
            }
        }
    }

    for item in original {
        let matched = item
            .identity()
            .is_some_and(|id| modified_index.contains_key(&Key::Id(id)));
        if !matched {
            result.deletes.push(item.clone());
        }
    }

    log::debug!(
        "diff: {} creates, {} updates, {} deletes",
        result.creates.len(),
        result.updates.len(),
        result.deletes.len()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn classifies_creates_updates_deletes() {
        let original = vec![
            json!({"id": "a", "v": 1}),
            json!({"id": "b", "v": 2}),
            json!({"id": "c", "v": 3}),
        ];
        let modified = vec![
            json!({"id": "a", "v": 1}),
            json!({"id": "b", "v": 20}),
            json!({"id": "d", "v": 4}),
        ];
        let d = diff(&original, &modified);
        assert_eq!(d.creates, vec![json!({"id": "d", "v": 4})]);
        assert_eq!(d.updates, vec![json!({"id": "b", "v": 20})]);
        assert_eq!(d.deletes, vec![json!({"id": "c", "v": 3})]);
    }

    #[test]
    fn identityless_items_never_update() {
        let original = vec![json!({"val": 1})];
        let modified = vec![json!({"val": 1})];
        let d = diff(&original, &modified);
        assert!(d.updates.is_empty());
        assert_eq!(d.creates, modified);
        assert_eq!(d.deletes, original);
    }

    #[test]
    fn unchanged_items_appear_nowhere() {
        let items = vec![json!({"id": "a", "nested": {"k": [1, 2]}})];
        assert!(diff(&items, &items.clone()).is_empty());
    }

    #[test]
    fn equality_is_structural_not_key_order() {
        let original = vec![json!({"id": "a", "x": 1, "y": 2})];
        let modified = vec![json!({"y": 2, "id": "a", "x": 1})];
        assert!(diff(&original, &modified).updates.is_empty());
    }

    #[test]
    fn creates_and_deletes_are_disjoint() {
        let original = vec![json!({"id": "a"}), json!({"v": 0}), json!({"id": "b"})];
        let modified = vec![json!({"id": "b"}), json!({"v": 0}), json!({"id": "c"})];
        let d = diff(&original, &modified);
        for c in &d.creates {
            if let Some(id) = c.identity() {
                assert!(d.deletes.iter().all(|x| x.identity() != Some(id)));
            }
        }
        assert_eq!(d.creates.len(), 2);
        assert_eq!(d.deletes.len(), 2);
    }

    #[test]
    fn node_definitions_diff_on_label() {
        let before = vec![NodeDefinition::new("n1", "Alpha", "Rectangle")];
        let after = vec![NodeDefinition::new("n1", "Alpha v2", "Rectangle")];
        let d = diff(&before, &after);
        assert_eq!(d.updates.len(), 1);
        assert!(d.creates.is_empty() && d.deletes.is_empty());
    }
}
