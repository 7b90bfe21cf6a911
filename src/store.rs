use crate::codec::Value;
use std::collections::BTreeMap;

/// Last known value of every register read so far.
///
/// Values accumulate across updates. An update only ever overwrites the registers it has read.
#[derive(Debug, Default, Clone)]
pub struct ValueStore {
    values: BTreeMap<&'static str, Value>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly read value.
    ///
    /// Returns `true` if the value has changed.
    pub fn insert(&mut self, name: &'static str, value: Value) -> bool {
        self.values.insert(name, value) != Some(value)
    }

    /// Record a batch of newly read values, returning how many of them changed.
    pub fn merge(&mut self, partial: impl IntoIterator<Item = (&'static str, Value)>) -> usize {
        partial.into_iter().filter(|&(name, value)| self.insert(name, value)).count()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.values.clone())
    }
}

/// An immutable copy of a [`ValueStore`].
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<&'static str, Value>);

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Value)> + '_ {
        self.0.iter().map(|(&name, &value)| (name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_and_keeps_the_rest() {
        let mut store = ValueStore::new();
        assert!(store.is_empty());
        assert_eq!(store.merge([("a", Value::Integer(1)), ("b", Value::Bool(true))]), 2);
        assert_eq!(store.merge([("a", Value::Integer(2)), ("b", Value::Bool(true))]), 1);
        assert_eq!(store.get("a"), Some(Value::Integer(2)));
        assert_eq!(store.get("b"), Some(Value::Bool(true)));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("c"), None);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut store = ValueStore::new();
        store.insert("a", Value::Number(1.5));
        let snapshot = store.snapshot();
        store.insert("a", Value::Number(2.5));
        store.insert("b", Value::Integer(0));
        assert_eq!(snapshot.get("a"), Some(Value::Number(1.5)));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.iter().collect::<Vec<_>>(), [("a", Value::Number(1.5))]);
    }

    #[test]
    fn snapshot_serializes_as_map() {
        let mut store = ValueStore::new();
        store.merge([("x", Value::Number(21.5)), ("y", Value::Bool(false))]);
        let json = serde_json::to_string(&store.snapshot()).unwrap();
        assert_eq!(json, r#"{"x":21.5,"y":false}"#);
    }
}
