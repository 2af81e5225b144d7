use derive_more::{Deref, DerefMut};
use serde::Serialize;
use std::{collections::BTreeMap, fmt};

/// Suffix marking a list-valued field.
pub const LIST_SUFFIX: char = '@';

///
/// TableSpec
///
/// `comp_count > 0` bounds how many key components a physical key splits
/// into, so the last component may itself contain the key separator.
///

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct TableSpec {
    pub name: String,
    pub comp_count: usize,
    pub no_delete: bool,
}

impl TableSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comp_count: 0,
            no_delete: false,
        }
    }

    #[must_use]
    pub const fn with_comp_count(mut self, count: usize) -> Self {
        self.comp_count = count;
        self
    }

    #[must_use]
    pub const fn with_no_delete(mut self) -> Self {
        self.no_delete = true;
        self
    }

    /// Convenience for building specs from plain table names.
    #[must_use]
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Vec<Self> {
        names.iter().map(|n| Self::new(n.as_ref())).collect()
    }
}

impl fmt::Display for TableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

///
/// Key
///

#[derive(Clone, Debug, Default, Deref, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Key {
    #[deref]
    comps: Vec<String>,
}

impl Key {
    #[must_use]
    pub fn new<I, S>(comps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            comps: comps.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn single(comp: impl Into<String>) -> Self {
        Self {
            comps: vec![comp.into()],
        }
    }

    /// Wildcard key matching every row.
    #[must_use]
    pub fn any() -> Self {
        Self::single("*")
    }

    #[must_use]
    pub fn comps(&self) -> &[String] {
        &self.comps
    }

    #[must_use]
    pub fn join(&self, sep: &str) -> String {
        self.comps.join(sep)
    }

    #[must_use]
    pub fn is_pattern(&self) -> bool {
        self.comps.iter().any(|c| super::glob::is_pattern(c))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.comps)
    }
}

///
/// Value
///
/// A row's field map. A value with no fields stands for an absent row.
///

#[derive(Clone, Debug, Default, Deref, DerefMut, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Value {
    fields: BTreeMap<String, String>,
}

impl Value {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn from_map(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    /// Build from `(field, value)` pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, String> {
        self.fields
    }

    #[must_use]
    pub fn is_populated(&self) -> bool {
        !self.fields.is_empty()
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field value, empty when absent; use [`Self::has`] to distinguish.
    #[must_use]
    pub fn get(&self, name: &str) -> &str {
        self.fields.get(name).map_or("", String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    /// Integer field, `0` when absent.
    pub fn get_int(&self, name: &str) -> Result<i64, std::num::ParseIntError> {
        self.fields.get(name).map_or(Ok(0), |v| v.parse())
    }

    pub fn set_int(&mut self, name: impl Into<String>, value: i64) {
        self.set(name, value.to_string());
    }

    /// List field; the `@` suffix is appended when missing.
    #[must_use]
    pub fn get_list(&self, name: &str) -> Vec<String> {
        let data = self.get(&list_field(name));
        if data.is_empty() {
            return Vec::new();
        }

        data.split(',').map(ToString::to_string).collect()
    }

    /// Set a list field; an empty list removes the field.
    pub fn set_list<S: AsRef<str>>(&mut self, name: &str, items: &[S]) {
        let name = list_field(name);
        if items.is_empty() {
            self.fields.remove(&name);
        } else {
            let joined = items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");
            self.fields.insert(name, joined);
        }
    }

    /// Fields of `self` missing from `other`, each mapped to "".
    #[must_use]
    pub fn complement(&self, other: &Self) -> Self {
        Self::from_pairs(
            self.fields
                .keys()
                .filter(|k| !other.has(k))
                .map(|k| (k.clone(), String::new())),
        )
    }

    /// Merge `other` into `self`, overwriting shared fields.
    pub fn merge(&mut self, other: &Self) {
        for (k, v) in &other.fields {
            self.fields.insert(k.clone(), v.clone());
        }
    }
}

/// Normalise a field name to its list form (`name@`).
#[must_use]
pub fn list_field(name: &str) -> String {
    if name.ends_with(LIST_SUFFIX) {
        name.to_string()
    } else {
        format!("{name}{LIST_SUFFIX}")
    }
}

///
/// KeyCodec
///
/// Physical-key encoding: `<table><table_sep><c1><key_sep><c2>...`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyCodec {
    pub table_separator: String,
    pub key_separator: String,
}

impl KeyCodec {
    #[must_use]
    pub fn new(table_separator: impl Into<String>, key_separator: impl Into<String>) -> Self {
        Self {
            table_separator: table_separator.into(),
            key_separator: key_separator.into(),
        }
    }

    #[must_use]
    pub fn encode(&self, ts: &TableSpec, key: &Key) -> String {
        format!(
            "{}{}{}",
            ts.name,
            self.table_separator,
            key.join(&self.key_separator)
        )
    }

    /// Decode a physical key; keys without a table prefix decode whole.
    #[must_use]
    pub fn decode(&self, ts: &TableSpec, raw: &str) -> Key {
        let local = raw
            .split_once(self.table_separator.as_str())
            .map_or(raw, |(_, rest)| rest);

        if ts.comp_count > 0 {
            Key::new(local.splitn(ts.comp_count, self.key_separator.as_str()))
        } else {
            Key::new(local.split(self.key_separator.as_str()))
        }
    }

    /// Table-local key string, as used in translation maps.
    #[must_use]
    pub fn local(&self, key: &Key) -> String {
        key.join(&self.key_separator)
    }

    /// Split a table-local key string back into components.
    #[must_use]
    pub fn split_local(&self, ts: &TableSpec, local: &str) -> Key {
        if ts.comp_count > 0 {
            Key::new(local.splitn(ts.comp_count, self.key_separator.as_str()))
        } else {
            Key::new(local.split(self.key_separator.as_str()))
        }
    }
}

///
/// Table
///
/// Snapshot of every row of one table, keyed by physical key.
///

#[derive(Clone, Debug)]
pub struct Table {
    ts: TableSpec,
    codec: KeyCodec,
    entries: BTreeMap<String, Value>,
}

impl Table {
    pub(crate) const fn new(ts: TableSpec, codec: KeyCodec) -> Self {
        Self {
            ts,
            codec,
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, key: &Key, value: Value) {
        self.entries.insert(self.codec.encode(&self.ts, key), value);
    }

    #[must_use]
    pub const fn spec(&self) -> &TableSpec {
        &self.ts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.entries
            .keys()
            .map(|raw| self.codec.decode(&self.ts, raw))
            .collect()
    }

    #[must_use]
    pub fn entry(&self, key: &Key) -> Option<&Value> {
        self.entries.get(&self.codec.encode(&self.ts, key))
    }
}

///
/// WatchKeys
///
/// One watched row; wildcard keys are expanded when the watch is issued.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WatchKeys {
    pub ts: TableSpec,
    pub key: Key,
}

impl WatchKeys {
    #[must_use]
    pub const fn new(ts: TableSpec, key: Key) -> Self {
        Self { ts, key }
    }
}
