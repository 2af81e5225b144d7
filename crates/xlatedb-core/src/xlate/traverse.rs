use super::{KeySpecNode, KeySpecTree, Translator, context::contained};
use crate::{
    config::DbNum,
    db::{DbSet, Key, Value},
    error::Error,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Rows read, per database and table.
pub type DbData = BTreeMap<DbNum, BTreeMap<String, BTreeMap<Key, Value>>>;

/// Rows a read asked for, found or not.
pub type Queried = BTreeMap<DbNum, BTreeMap<String, BTreeSet<Key>>>;

pub(crate) fn queried_contains(queried: &Queried, db: DbNum, table: &str, key: &Key) -> bool {
    queried
        .get(&db)
        .and_then(|t| t.get(table))
        .is_some_and(|keys| keys.contains(key))
}

///
/// TraverseResult
///

#[derive(Clone, Debug, Default)]
pub struct TraverseResult {
    pub data: DbData,
    pub queried: Queried,
}

impl TraverseResult {
    #[must_use]
    pub fn rows(&self, db: DbNum, table: &str) -> Option<&BTreeMap<Key, Value>> {
        self.data.get(&db)?.get(table)
    }

    #[must_use]
    pub fn row(&self, db: DbNum, table: &str, key: &Key) -> Option<&Value> {
        self.rows(db, table)?.get(key)
    }

    /// True when the row was fetched, whether or not it existed.
    #[must_use]
    pub fn was_queried(&self, db: DbNum, table: &str, key: &Key) -> bool {
        queried_contains(&self.queried, db, table, key)
    }

    fn mark(&mut self, db: DbNum, table: &str, key: &Key) {
        self.queried
            .entry(db)
            .or_default()
            .entry(table.to_string())
            .or_default()
            .insert(key.clone());
    }

    fn insert(&mut self, db: DbNum, table: &str, key: &Key, value: Value) {
        self.data
            .entry(db)
            .or_default()
            .entry(table.to_string())
            .or_default()
            .insert(key.clone(), value);
    }
}

impl Translator {
    /// Read every row `tree` names.
    pub fn traverse(&self, dbs: &DbSet, tree: &KeySpecTree) -> Result<TraverseResult, Error> {
        run(dbs, tree)
    }
}

/// Worklist traversal. A failing branch below a root yields no data; a
/// failing root fails the read.
pub(crate) fn run(dbs: &DbSet, tree: &KeySpecTree) -> Result<TraverseResult, Error> {
    let mut result = TraverseResult::default();
    let mut work: Vec<(usize, Option<Key>, bool)> = tree
        .roots()
        .iter()
        .rev()
        .filter_map(|&idx| tree.node(idx).map(|n| (idx, n.parent_key.clone(), true)))
        .collect();

    while let Some((idx, parent_key, is_root)) = work.pop() {
        let Some(node) = tree.node(idx) else {
            continue;
        };

        if node.is_virtual {
            for &child in node.children.iter().rev() {
                work.push((child, parent_key.clone(), false));
            }
            continue;
        }

        let keys = match fetch(dbs, node, parent_key.as_ref(), &mut result) {
            Ok(keys) => keys,
            Err(err) if is_root => return Err(err),
            Err(err) if err.is_not_found() => {
                debug!(table = %node.ts, path = %node.path, "branch row absent");
                continue;
            }
            Err(err) => {
                warn!(table = %node.ts, path = %node.path, error = %err, "branch read failed, skipped");
                continue;
            }
        };

        for key in keys {
            for &child in node.children.iter().rev() {
                work.push((child, Some(key.clone()), false));
            }
        }
    }

    Ok(result)
}

fn fetch(
    dbs: &DbSet,
    node: &KeySpecNode,
    parent_key: Option<&Key>,
    result: &mut TraverseResult,
) -> Result<Vec<Key>, Error> {
    let db = dbs.get(node.db)?;
    let table = node.ts.name.as_str();

    if let Some(key) = &node.key {
        result.mark(node.db, table, key);
        let value = db.get_entry(&node.ts, key)?;
        result.insert(node.db, table, key, value);

        return Ok(vec![key.clone()]);
    }

    let codec = db.codec();
    let parent_local = parent_key
        .filter(|_| !node.ignore_parent_key)
        .map(|k| codec.local(k));

    let mut found = Vec::new();
    for key in db.get_keys(&node.ts)? {
        if !contained(parent_local.as_deref(), &codec.local(&key)) {
            continue;
        }
        if node.arity.is_some_and(|n| key.len() != n) {
            continue;
        }

        result.mark(node.db, table, &key);
        match db.get_entry(&node.ts, &key) {
            Ok(value) => {
                result.insert(node.db, table, &key, value);
                found.push(key);
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
    }
    debug!(table, rows = found.len(), "table enumerated");

    Ok(found)
}
