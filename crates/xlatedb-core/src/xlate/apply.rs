use super::{MutationPlan, Oper, Translator, WritePlan};
use crate::{
    config::DbNum,
    db::{Db, DbSet, Key, TableSpec, Value, WatchKeys},
    error::Error,
    spec::SpecSnapshot,
};
use serde_json::Value as JsonValue;
use std::{cmp::Reverse, collections::BTreeSet};
use tracing::{debug, info, warn};

/// Order in which mutation kinds reach the store.
const APPLY_ORDER: [Oper; 4] = [Oper::Delete, Oper::Create, Oper::Replace, Oper::Update];

impl Translator {
    /// Translate a write and commit it, one transaction per database.
    pub fn commit_write(
        &self,
        dbs: &mut DbSet,
        oper: Oper,
        path: &str,
        payload: Option<&JsonValue>,
    ) -> Result<WritePlan, Error> {
        let plan = self.translate_write(dbs, oper, path, payload)?;
        self.commit_plan(dbs, &plan)?;

        Ok(plan)
    }

    /// Stage `plan` on every database it touches, then commit them in
    /// database order. Nothing is committed when staging fails anywhere;
    /// a failed commit aborts the databases not yet committed.
    pub fn commit_plan(&self, dbs: &mut DbSet, plan: &WritePlan) -> Result<(), Error> {
        let targets: Vec<DbNum> = plan
            .plan
            .values()
            .flat_map(|m| m.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // Phase 1: stage
        let mut staged = Vec::with_capacity(targets.len());
        for &num in &targets {
            let db = dbs.get_mut(num)?;
            if let Err(err) = self.stage(db, plan) {
                warn!(db = %num, error = %err, "staging failed, aborting");
                abort_all(dbs, &staged);
                return Err(err);
            }
            staged.push(num);
        }

        // Phase 2: commit
        for (i, &num) in staged.iter().enumerate() {
            if let Err(err) = dbs.get_mut(num).and_then(Db::commit_tx) {
                warn!(db = %num, error = %err, "commit failed, aborting the rest");
                abort_all(dbs, &staged[i + 1..]);
                return Err(err);
            }
        }
        info!(dbs = staged.len(), "write committed");

        Ok(())
    }

    fn stage(&self, db: &mut Db, plan: &WritePlan) -> Result<(), Error> {
        let num = db.db_num();
        let watch: Vec<WatchKeys> = plan
            .plan
            .values()
            .filter_map(|m| m.get(&num))
            .flat_map(|tables| {
                tables.iter().flat_map(|(table, rows)| {
                    rows.keys()
                        .map(|key| WatchKeys::new(TableSpec::new(table.as_str()), key.clone()))
                })
            })
            .collect();

        db.start_tx(&watch, &TableSpec::from_names(&plan.tables_to_watch))?;
        if let Err(err) = self.apply_plan(db, &plan.plan) {
            if let Err(abort) = db.abort_tx() {
                debug!(error = %abort, "abort after failed apply");
            }
            return Err(err);
        }

        Ok(())
    }

    /// Apply the part of `plan` that targets `db`: deletes first, children
    /// before parents, then creates, replaces and updates, parents first.
    pub fn apply_plan(&self, db: &mut Db, plan: &MutationPlan) -> Result<(), Error> {
        let snap = self.spec.load();
        let num = db.db_num();

        for oper in APPLY_ORDER {
            let Some(tables) = plan.get(&oper).and_then(|m| m.get(&num)) else {
                continue;
            };
            let deleting = oper == Oper::Delete;

            for table in order_tables(&snap, tables.keys(), !deleting) {
                let Some(rows) = tables.get(&table) else {
                    continue;
                };
                let ts = TableSpec::new(table.as_str());
                let mut keys: Vec<Key> = rows.keys().cloned().collect();
                order_keys(&snap, &table, &mut keys, deleting);

                for key in keys {
                    let Some(value) = rows.get(&key) else {
                        continue;
                    };
                    apply_row(db, oper, &ts, &key, value)?;
                }
            }
        }

        Ok(())
    }

    /// Delete order of a multi-shape table's keys: longest keys first,
    /// otherwise as given.
    pub fn sort_table_keys(&self, table: &str, keys: &mut [Key]) {
        order_keys(&self.spec.load(), table, keys, true);
    }
}

// rows of nested shapes in one table: shorter keys are the parents
fn order_keys(snap: &SpecSnapshot, table: &str, keys: &mut [Key], deleting: bool) {
    if !snap.db_info(table).is_some_and(|i| i.is_multi_shape()) {
        return;
    }
    if deleting {
        keys.sort_by_key(|k| Reverse(k.len()));
    } else {
        keys.sort_by_key(|k| k.len());
    }
}

fn apply_row(db: &mut Db, oper: Oper, ts: &TableSpec, key: &Key, value: &Value) -> Result<(), Error> {
    debug!(%oper, table = %ts, %key, "applying row");

    match oper {
        Oper::Delete if value.is_populated() => db.delete_entry_fields(ts, key, value),
        Oper::Delete => db.delete_entry(ts, key),
        Oper::Create => match db.get_entry(ts, key) {
            Ok(_) => db.mod_entry(ts, key, value),
            Err(err) if err.is_not_found() => db.create_entry(ts, key, value),
            Err(err) => Err(err),
        },
        Oper::Replace => db.set_entry(ts, key, value),
        Oper::Update => db.mod_entry(ts, key, value),
        Oper::Get => Ok(()),
    }
}

fn abort_all(dbs: &mut DbSet, nums: &[DbNum]) {
    for &num in nums {
        if let Err(err) = dbs.get_mut(num).and_then(Db::abort_tx) {
            warn!(db = %num, error = %err, "abort failed");
        }
    }
}

/// Tables in application order. Owners come first for writes and last for
/// deletes; tables outside any ordering go last, by name.
fn order_tables<'t>(
    snap: &SpecSnapshot,
    tables: impl Iterator<Item = &'t String>,
    owners_first: bool,
) -> Vec<String> {
    let mut ranked: Vec<(Option<(String, usize)>, String)> = tables
        .map(|table| {
            let rank = snap.table_module(table).and_then(|module| {
                let ordered = &snap.table_seq(module)?.ordered;
                let pos = ordered.iter().position(|t| t == table)?;
                let pos = if owners_first { ordered.len() - pos } else { pos };
                Some((module.to_string(), pos))
            });
            (rank, table.clone())
        })
        .collect();

    ranked.sort_by(|(a, at), (b, bt)| match (a, b) {
        (Some(a), Some(b)) => a.cmp(b).then_with(|| at.cmp(bt)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => at.cmp(bt),
    });

    ranked.into_iter().map(|(_, t)| t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_order_starts_with_deletes() {
        assert_eq!(APPLY_ORDER[0], Oper::Delete);
        assert!(!APPLY_ORDER.contains(&Oper::Get));
    }

    #[test]
    fn unranked_tables_sort_last_by_name() {
        let snap = SpecSnapshot::default();
        let tables = ["B".to_string(), "A".to_string()];

        assert_eq!(order_tables(&snap, tables.iter(), true), vec!["A", "B"]);
    }
}
