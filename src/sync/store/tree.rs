//! JSON tree operations shared by the store adapters.

use serde_json::{Map, Value};

use super::{StoreEvent, StorePath};

/// Drops `null` leaves and empty objects the way the remote store does; absence is `None`.
pub fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .filter_map(|(key, child)| normalize(child).map(|child| (key, child)))
                .collect();
            (!cleaned.is_empty()).then_some(Value::Object(cleaned))
        }
        Value::Array(items) => {
            let cleaned: Vec<Value> = items.into_iter().filter_map(normalize).collect();
            (!cleaned.is_empty()).then_some(Value::Array(cleaned))
        }
        other => Some(other),
    }
}

pub fn get<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    path.segments().try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    })
}

/// Writes `value` at `path`, pruning parents that become empty when writing absence.
pub fn set(root: &mut Value, path: &StorePath, value: Option<Value>) {
    let segments: Vec<&str> = path.segments().collect();
    match value.and_then(normalize) {
        Some(value) => insert(root, &segments, value),
        None if segments.is_empty() => *root = Value::Object(Map::new()),
        None => remove(root, &segments),
    }
}

fn insert(node: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        insert(child, rest, value);
    }
}

fn remove(node: &mut Value, segments: &[&str]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    let Value::Object(map) = node else {
        return;
    };
    if rest.is_empty() {
        map.remove(*first);
        return;
    }
    let now_empty = match map.get_mut(*first) {
        Some(child) => {
            remove(child, rest);
            child.as_object().is_some_and(Map::is_empty)
        }
        None => false,
    };
    if now_empty {
        map.remove(*first);
    }
}

fn children(value: Option<&Value>) -> Vec<(String, &Value)> {
    match value {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, v)| (idx.to_string(), v))
            .collect(),
        _ => vec![],
    }
}

/// Child-level events turning `before` into `after`. Changed children are not reported.
pub fn child_events(before: Option<&Value>, after: Option<&Value>) -> Vec<StoreEvent> {
    let cleared = before.is_some() && after.is_none();
    let before = children(before);
    let after = children(after);
    let mut events: Vec<StoreEvent> = before
        .iter()
        .filter(|(key, _)| !after.iter().any(|(it, _)| it == key))
        .map(|(key, _)| StoreEvent::Removed { key: key.clone() })
        .collect();
    events.extend(
        after
            .iter()
            .filter(|(key, _)| !before.iter().any(|(it, _)| it == key))
            .map(|(key, value)| StoreEvent::Added {
                key: key.clone(),
                value: (*value).clone(),
            }),
    );
    if cleared {
        events.push(StoreEvent::Cleared);
    }
    events
}

/// Replay of an existing collection: every child as `Added`.
pub fn replay(current: Option<&Value>) -> Vec<StoreEvent> {
    child_events(None, current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn path(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    #[test]
    fn test_set_creates_parents() {
        let mut root = json!({});
        set(&mut root, &path("activeBowls/B1"), Some(json!({"dish": "A"})));
        assert_eq!(root, json!({"activeBowls": {"B1": {"dish": "A"}}}));
        assert_eq!(get(&root, &path("activeBowls/B1/dish")), Some(&json!("A")));
    }

    #[test]
    fn test_absence_prunes_empty_parents() {
        let mut root = json!({"activeBowls": {"B1": {"dish": "A"}}, "lastSync": "x"});
        set(&mut root, &path("activeBowls/B1"), None);
        assert_eq!(root, json!({"lastSync": "x"}));

        set(&mut root, &path("lastSync"), Some(Value::Null));
        assert_eq!(root, json!({}));
    }

    #[test]
    fn test_normalize_drops_nulls() {
        assert_eq!(normalize(json!({"a": null, "b": {"c": null}})), None);
        assert_eq!(normalize(json!({"a": 1, "b": null})), Some(json!({"a": 1})));
    }

    #[test]
    fn test_child_events() {
        let before = json!({"a": 1, "b": 2});
        let after = json!({"b": 3, "c": 4});
        assert_eq!(
            child_events(Some(&before), Some(&after)),
            vec![
                StoreEvent::Removed { key: "a".into() },
                StoreEvent::Added {
                    key: "c".into(),
                    value: json!(4)
                },
            ]
        );
    }

    #[test]
    fn test_child_events_report_cleared_collection() {
        let before = json!({"a": 1});
        assert_eq!(
            child_events(Some(&before), None),
            vec![StoreEvent::Removed { key: "a".into() }, StoreEvent::Cleared]
        );
        assert!(child_events(None, None).is_empty());
        assert!(replay(None).is_empty());
    }
}
