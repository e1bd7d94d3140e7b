//! Dotted field paths for partial document updates.
//!
//! The store boundary addresses fields the way document databases do:
//! `players.joiner2.isReady` names the `isReady` flag of the `joiner2`
//! player. A [`FieldPath`] keeps the segments split so that a top-level
//! key containing a dot (possible in caller-supplied initial fields) is
//! still addressed as one segment.
//!
//! The `get`/`set`/`remove` helpers apply a path to a `serde_json::Value`,
//! so any store adapter that keeps JSON documents can implement partial
//! updates and conditional writes without knowing the session schema.

use std::fmt;

use serde_json::{Map, Value};

use crate::{ProtocolError, SlotKey};

/// A path from the document root to one field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses a dotted path such as `players.creator.name`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidPath`] if the path is empty or has
    /// an empty segment (`a..b`, `.a`, `a.`).
    pub fn parse(dotted: &str) -> Result<Self, ProtocolError> {
        let segments: Vec<String> = dotted.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(ProtocolError::InvalidPath(dotted.to_string()));
        }
        Ok(Self { segments })
    }

    /// A single top-level field. The name is used verbatim, dots included.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// The session `status` field.
    pub fn status() -> Self {
        Self::field("status")
    }

    /// The `playerCount` allocator field.
    pub fn player_count() -> Self {
        Self::field("playerCount")
    }

    /// The `metadata` map.
    pub fn metadata() -> Self {
        Self::field("metadata")
    }

    /// The whole `players` map.
    pub fn players() -> Self {
        Self::field("players")
    }

    /// The record of one player: `players.<slot>`.
    pub fn player(slot: &SlotKey) -> Self {
        Self {
            segments: vec!["players".to_string(), slot.as_str().to_string()],
        }
    }

    /// A player's ready flag: `players.<slot>.isReady`.
    pub fn player_ready(slot: &SlotKey) -> Self {
        Self::player(slot).child("isReady")
    }

    /// Extends the path by one segment.
    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// The individual segments, root first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Looks up the value at this path, if every segment exists.
    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| node.as_object()?.get(segment))
    }

    /// Writes `value` at this path, creating intermediate objects.
    ///
    /// A missing or `null` intermediate becomes an empty object; any other
    /// non-object intermediate is a conflict and nothing is written.
    ///
    /// # Errors
    /// Returns [`ProtocolError::PathConflict`] if the path crosses a
    /// string, number, bool or array.
    pub fn set(&self, root: &mut Value, value: Value) -> Result<(), ProtocolError> {
        let conflict = || ProtocolError::PathConflict(self.to_string());
        let Some((last, parents)) = self.segments.split_last() else {
            return Err(ProtocolError::InvalidPath(String::new()));
        };

        let mut node = root;
        for segment in parents {
            let map = as_object_mut(node).ok_or_else(conflict)?;
            node = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let map = as_object_mut(node).ok_or_else(conflict)?;
        map.insert(last.clone(), value);
        Ok(())
    }

    /// Deletes the field at this path and returns what was there.
    ///
    /// A path that doesn't resolve (a missing parent, or a parent that
    /// isn't an object) removes nothing.
    pub fn remove(&self, root: &mut Value) -> Option<Value> {
        let (last, parents) = self.segments.split_last()?;
        let mut node = root;
        for segment in parents {
            node = node.as_object_mut()?.get_mut(segment)?;
        }
        node.as_object_mut()?.remove(last)
    }
}

/// Returns the node as a mutable object, turning `null` into `{}` first.
fn as_object_mut(node: &mut Value) -> Option<&mut Map<String, Value>> {
    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    node.as_object_mut()
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// What a [`FieldUpdate`] does to the field it addresses.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    /// Replace whatever is there.
    Set(Value),
    /// Delete the field. Deleting a field that isn't there is a no-op.
    Remove,
}

/// One field change in a partial update.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    /// Where to write.
    pub path: FieldPath,
    pub change: FieldChange,
}

impl FieldUpdate {
    pub fn new(path: FieldPath, value: impl Into<Value>) -> Self {
        Self {
            path,
            change: FieldChange::Set(value.into()),
        }
    }

    /// An update that deletes the field at `path`.
    pub fn remove(path: FieldPath) -> Self {
        Self {
            path,
            change: FieldChange::Remove,
        }
    }

    /// The value written, or `None` for a removal.
    pub fn value(&self) -> Option<&Value> {
        match &self.change {
            FieldChange::Set(value) => Some(value),
            FieldChange::Remove => None,
        }
    }

    /// Applies this update to a JSON document in place.
    pub fn apply(&self, root: &mut Value) -> Result<(), ProtocolError> {
        match &self.change {
            FieldChange::Set(value) => self.path.set(root, value.clone()),
            FieldChange::Remove => {
                self.path.remove(root);
                Ok(())
            }
        }
    }
}

/// A precondition for a conditional write: the value at `path` must
/// equal `expected`. A missing field never matches.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub path: FieldPath,
    pub expected: Value,
}

impl FieldCondition {
    pub fn new(path: FieldPath, expected: impl Into<Value>) -> Self {
        Self {
            path,
            expected: expected.into(),
        }
    }

    /// Returns `true` if `root` satisfies this condition.
    pub fn holds(&self, root: &Value) -> bool {
        self.path.get(root) == Some(&self.expected)
    }
}

impl fmt::Display for FieldCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} == {}", self.path, self.expected)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_splits_segments() {
        let path = FieldPath::parse("players.joiner2.isReady").unwrap();
        assert_eq!(path.segments(), ["players", "joiner2", "isReady"]);
        assert_eq!(path.to_string(), "players.joiner2.isReady");
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        for bad in ["", ".a", "a.", "a..b"] {
            assert!(
                matches!(FieldPath::parse(bad), Err(ProtocolError::InvalidPath(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_player_ready_path() {
        let path = FieldPath::player_ready(&SlotKey::joiner(2));
        assert_eq!(path.to_string(), "players.joiner2.isReady");
    }

    #[test]
    fn test_get_walks_nested_objects() {
        let doc = json!({"players": {"creator": {"name": "Alice"}}});
        let path = FieldPath::parse("players.creator.name").unwrap();
        assert_eq!(path.get(&doc), Some(&json!("Alice")));
        assert_eq!(FieldPath::parse("players.joiner1").unwrap().get(&doc), None);
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut doc = json!({"status": "notStarted"});
        FieldPath::player_ready(&SlotKey::joiner(1))
            .set(&mut doc, json!(true))
            .unwrap();
        assert_eq!(doc["players"]["joiner1"]["isReady"], json!(true));
        assert_eq!(doc["status"], json!("notStarted"));
    }

    #[test]
    fn test_set_replaces_only_the_addressed_field() {
        let mut doc = json!({"players": {"creator": {"name": "Alice", "isReady": true}}});
        FieldPath::parse("players.creator.name")
            .unwrap()
            .set(&mut doc, json!("Alicia"))
            .unwrap();
        assert_eq!(doc["players"]["creator"], json!({"name": "Alicia", "isReady": true}));
    }

    #[test]
    fn test_set_through_scalar_is_conflict() {
        let mut doc = json!({"status": "notStarted"});
        let result = FieldPath::parse("status.inner").unwrap().set(&mut doc, json!(1));
        assert!(matches!(result, Err(ProtocolError::PathConflict(_))));
        assert_eq!(doc, json!({"status": "notStarted"}), "document must be untouched");
    }

    #[test]
    fn test_field_keeps_dots_in_one_segment() {
        let mut doc = json!({});
        FieldPath::field("a.b").set(&mut doc, json!(1)).unwrap();
        assert_eq!(doc, json!({"a.b": 1}));
    }

    #[test]
    fn test_remove_deletes_only_the_addressed_field() {
        let mut doc = json!({"round": 2, "players": {"joiner1": {"name": "Bob"}, "creator": {"name": "Ada"}}});
        let removed = FieldPath::player(&SlotKey::joiner(1)).remove(&mut doc);
        assert_eq!(removed, Some(json!({"name": "Bob"})));
        assert_eq!(doc, json!({"round": 2, "players": {"creator": {"name": "Ada"}}}));
    }

    #[test]
    fn test_remove_missing_or_blocked_path_is_noop() {
        let mut doc = json!({"status": "notStarted"});
        assert_eq!(FieldPath::parse("players.joiner3").unwrap().remove(&mut doc), None);
        assert_eq!(FieldPath::parse("status.inner").unwrap().remove(&mut doc), None);
        assert_eq!(doc, json!({"status": "notStarted"}));
    }

    #[test]
    fn test_remove_update_applies_and_has_no_value() {
        let mut doc = json!({"round": 2, "deck": "red"});
        let update = FieldUpdate::remove(FieldPath::field("round"));
        assert_eq!(update.value(), None);
        update.apply(&mut doc).unwrap();
        assert_eq!(doc, json!({"deck": "red"}));
    }

    #[test]
    fn test_condition_requires_present_equal_value() {
        let doc = json!({"status": "notStarted"});
        assert!(FieldCondition::new(FieldPath::status(), "notStarted").holds(&doc));
        assert!(!FieldCondition::new(FieldPath::status(), "finished").holds(&doc));
        assert!(!FieldCondition::new(FieldPath::player_count(), Value::Null).holds(&doc));
        assert_eq!(
            FieldCondition::new(FieldPath::status(), "finished").to_string(),
            "status == \"finished\""
        );
    }
}
