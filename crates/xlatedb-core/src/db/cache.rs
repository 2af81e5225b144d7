use crate::db::Value;
use std::collections::{BTreeMap, BTreeSet};

///
/// ReadCache
///
/// Per-connection read cache for registered tables. Stores and returns
/// independent copies.
///

#[derive(Debug, Default)]
pub(crate) struct ReadCache {
    tables: BTreeSet<String>,
    entries: BTreeMap<String, BTreeMap<String, Value>>,
}

impl ReadCache {
    pub(crate) fn register(&mut self, table: &str) {
        self.tables.insert(table.to_string());
    }

    pub(crate) fn is_cached(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    pub(crate) fn get(&self, table: &str, physical: &str) -> Option<Value> {
        self.entries.get(table)?.get(physical).cloned()
    }

    pub(crate) fn put(&mut self, table: &str, physical: &str, value: &Value) {
        self.entries
            .entry(table.to_string())
            .or_default()
            .insert(physical.to_string(), value.clone());
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }
}
