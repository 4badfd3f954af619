//! JSON document tree addressed by `StorePath`.
//!
//! The tree never holds `null` or empty objects: writing `null` removes a
//! node, and parents left empty by a removal are pruned.

use serde_json::{Map, Value, json};

use crate::domain::{StorePath, is_server_timestamp};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentTree {
    root: Map<String, Value>,
}

impl DocumentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored at `path`, `None` when the node does not exist
    pub fn get(&self, path: &StorePath) -> Option<Value> {
        let Some((first, rest)) = path.segments().split_first() else {
            return (!self.root.is_empty()).then(|| Value::Object(self.root.clone()));
        };

        let mut node = self.root.get(first)?;
        for segment in rest {
            node = node.as_object()?.get(segment)?;
        }
        Some(node.clone())
    }

    /// Replace the node at `path`. `null` (or a value that normalizes to it)
    /// removes the node.
    pub fn set(&mut self, path: &StorePath, value: Value) {
        let value = normalize(value);

        if path.is_root() {
            self.root = match value {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            return;
        }

        if value.is_null() {
            remove_in(&mut self.root, path.segments());
        } else {
            set_in(&mut self.root, path.segments(), value);
        }
    }
}

fn set_in(map: &mut Map<String, Value>, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert(first.clone(), value);
        return;
    }

    let child = map
        .entry(first.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    if let Value::Object(child_map) = child {
        set_in(child_map, rest, value);
    }
}

fn remove_in(map: &mut Map<String, Value>, segments: &[String]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.remove(first);
        return;
    }

    if let Some(Value::Object(child)) = map.get_mut(first) {
        remove_in(child, rest);
        if child.is_empty() {
            map.remove(first);
        }
    }
}

/// Drop `null` members and collapse empty objects to `null`
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(key, value)| (key, normalize(value)))
                .filter(|(_, value)| !value.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

/// Replace every server timestamp sentinel inside `value` with `now_millis`
pub fn resolve_server_values(value: Value, now_millis: i64) -> Value {
    if is_server_timestamp(&value) {
        return json!(now_millis);
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, resolve_server_values(value, now_millis)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| resolve_server_values(item, now_millis))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::server_timestamp;

    fn path(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    #[test]
    fn test_set_creates_intermediate_nodes() {
        // テスト項目: 深いパスへの書き込みで途中のノードが作られる
        // given (前提条件):
        let mut tree = DocumentTree::new();

        // when (操作):
        tree.set(&path("rooms/r1/users/u1/vote"), json!(5));

        // then (期待する結果):
        assert_eq!(tree.get(&path("rooms/r1/users/u1/vote")), Some(json!(5)));
        assert_eq!(
            tree.get(&path("rooms/r1")),
            Some(json!({ "users": { "u1": { "vote": 5 } } }))
        );
        assert_eq!(tree.get(&path("rooms/r2")), None);
    }

    #[test]
    fn test_null_removes_and_prunes_empty_parents() {
        // テスト項目: null の書き込みはノードを削除し、空になった親も消える
        // given (前提条件):
        let mut tree = DocumentTree::new();
        tree.set(&path("rooms/r1/confetti/c1"), json!({ "angle": 10 }));
        tree.set(&path("rooms/r1/show"), json!(false));

        // when (操作):
        tree.set(&path("rooms/r1/confetti/c1"), Value::Null);

        // then (期待する結果):
        assert_eq!(tree.get(&path("rooms/r1/confetti")), None);
        assert_eq!(tree.get(&path("rooms/r1")), Some(json!({ "show": false })));
    }

    #[test]
    fn test_nulls_inside_values_are_dropped() {
        // テスト項目: 値の中の null メンバーは保存されない
        // given (前提条件):
        let mut tree = DocumentTree::new();

        // when (操作):
        tree.set(
            &path("rooms/r1/users/u1"),
            json!({ "id": "u1", "vote": null, "extra": {} }),
        );

        // then (期待する結果):
        assert_eq!(
            tree.get(&path("rooms/r1/users/u1")),
            Some(json!({ "id": "u1" }))
        );
    }

    #[test]
    fn test_remove_missing_path_is_noop() {
        // テスト項目: 存在しないパスの削除は何も変えない
        // given (前提条件):
        let mut tree = DocumentTree::new();
        tree.set(&path("rooms/r1/show"), json!(true));
        let before = tree.clone();

        // when (操作):
        tree.set(&path("rooms/r9/users/u1"), Value::Null);
        tree.set(&path("rooms/r1/show/deeper"), Value::Null);

        // then (期待する結果):
        assert_eq!(tree, before);
    }

    #[test]
    fn test_resolve_server_values() {
        // テスト項目: サーバータイムスタンプの番兵値がストアの時刻に置き換えられる
        // given (前提条件):
        let value = json!({ "id": "g1", "timestamp": server_timestamp(), "nested": [server_timestamp()] });

        // when (操作):
        let resolved = resolve_server_values(value, 1234);

        // then (期待する結果):
        assert_eq!(
            resolved,
            json!({ "id": "g1", "timestamp": 1234, "nested": [1234] })
        );
    }
}
