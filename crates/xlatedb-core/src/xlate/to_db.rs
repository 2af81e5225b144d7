use super::{
    DbMutations, MutationPlan, Oper, Translator, WritePlan, XlateError,
    context::{Cx, Row, key_prefixed, member_name, scalar},
    merge_mutations, merge_row, sonic,
};
use crate::{
    config::DbNum,
    db::{DbSet, TableSpec, Value, list_field},
    error::Error,
    path::{ModelPath, PathElem},
    registry::{Xfmr, XfmrKind, to_db_name},
    spec::YangXpathInfo,
};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use tracing::{debug, info};
use xlatedb_schema::{PATH_SEPARATOR, node::NodeKind};

/// Field written into rows that would otherwise carry no field.
pub const NULL_FIELD: &str = "NULL";

impl Translator {
    /// Translate a write at `path` into a mutation plan.
    ///
    /// `payload` has the shape a read of `path` returns; deletes take none.
    pub fn translate_write(
        &self,
        dbs: &DbSet,
        oper: Oper,
        path: &str,
        payload: Option<&JsonValue>,
    ) -> Result<WritePlan, Error> {
        if !oper.is_write() {
            return Err(XlateError::Unsupported {
                oper,
                path: path.to_string(),
            }
            .into());
        }

        let snap = self.spec.load();
        let uri = ModelPath::parse(path)?;
        let cx = Cx {
            snap: &snap,
            dbs,
            registry: &self.registry,
            oper,
            uri: &uri,
        };
        let hooks = snap.module_hooks(&uri.schema_path()).cloned().unwrap_or_default();
        let mut plan = MutationPlan::new();

        // Phase 1: module pre-transformer
        if let Some(name) = &hooks.pre {
            run_hook(&cx, name, XfmrKind::PreXfmr, &mut plan)?;
        }

        // Phase 2: the request itself
        if let Some(target) = sonic::target(&snap, &uri)? {
            sonic::write(&cx, &target, payload, &mut plan)?;
        } else {
            let mut writer = Writer {
                cx: &cx,
                plan: &mut plan,
            };
            if oper == Oper::Delete {
                writer.delete_target()?;
            } else {
                writer.write_target(payload)?;
            }
        }

        // Phase 3: module post-transformer
        if let Some(name) = &hooks.post {
            run_hook(&cx, name, XfmrKind::PostXfmr, &mut plan)?;
        }

        fill_placeholders(&mut plan);

        let tables: Vec<String> = plan
            .values()
            .flat_map(DbMutations::values)
            .flat_map(|t| t.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let tables_to_watch = snap.tables_to_watch(&tables);
        info!(%oper, path, tables = tables.len(), "write translated");

        Ok(WritePlan {
            plan,
            tables_to_watch,
        })
    }
}

fn run_hook(cx: &Cx<'_>, name: &str, kind: XfmrKind, plan: &mut MutationPlan) -> Result<(), Error> {
    let f = match cx.registry.lookup(name, kind)? {
        Some(Xfmr::PreXfmr(f) | Xfmr::PostXfmr(f)) => f,
        _ => return Ok(()),
    };
    let root = cx.uri.prefix(1);

    f(&cx.params(&root, DbNum::ConfigDb, None, None), plan)
}

// rows left without fields still have to exist
fn fill_placeholders(plan: &mut MutationPlan) {
    for (oper, dbs) in plan.iter_mut() {
        if *oper == Oper::Delete {
            continue;
        }
        for rows in dbs.values_mut().flat_map(|t| t.values_mut()) {
            for value in rows.values_mut() {
                if !value.is_populated() {
                    value.set(NULL_FIELD, NULL_FIELD);
                }
            }
        }
    }
}

///
/// Writer
///

struct Writer<'w, 'a> {
    cx: &'w Cx<'a>,
    plan: &'w mut MutationPlan,
}

impl Writer<'_, '_> {
    fn put(&mut self, oper: Oper, row: &Row, value: &Value) {
        let rows = self
            .plan
            .entry(oper)
            .or_default()
            .entry(row.db)
            .or_default()
            .entry(row.table.clone())
            .or_default();
        merge_row(rows, oper, row.key.clone(), value);
    }

    fn subtree(
        &mut self,
        info: &YangXpathInfo,
        uri: &ModelPath,
        parent_row: Option<&Row>,
        payload: Option<&JsonValue>,
    ) -> Result<(), Error> {
        let Some(name) = &info.xfmr_subtree else {
            return Ok(());
        };
        let Some(Xfmr::SubtreeToDb(f)) =
            self.cx.registry.lookup(&to_db_name(name), XfmrKind::SubtreeToDb)?
        else {
            return Ok(());
        };
        let muts = f(&self.cx.params(uri, info.db, parent_row, payload))?;
        merge_mutations(self.plan, self.cx.oper, muts);

        Ok(())
    }

    fn handled_by_subtree(&self, info: &YangXpathInfo, is_target: bool) -> bool {
        info.xfmr_subtree.is_some() && (is_target || self.cx.owns_subtree(info))
    }

    //
    // create / update / replace
    //

    fn write_target(&mut self, payload: Option<&JsonValue>) -> Result<(), Error> {
        let uri = self.cx.uri;
        let payload = payload.ok_or_else(|| XlateError::payload(uri, "payload required"))?;
        let schema = uri.schema_path();
        let info = self.cx.info(&schema)?;
        let value = member(payload, &info.name)
            .ok_or_else(|| XlateError::payload(uri, format!("missing member '{}'", info.name)))?;
        let parent_row = self.cx.row_at(&uri.prefix(uri.len().saturating_sub(1)))?;

        self.write_node(&schema, info, uri, value, parent_row.as_ref(), true)
    }

    fn write_node(
        &mut self,
        path: &str,
        info: &YangXpathInfo,
        uri: &ModelPath,
        value: &JsonValue,
        parent_row: Option<&Row>,
        is_target: bool,
    ) -> Result<(), Error> {
        if self.handled_by_subtree(info, is_target) {
            return self.subtree(info, uri, parent_row, Some(value));
        }
        if info.read_only && !is_target {
            debug!(path, "read-only node in payload ignored");
            return Ok(());
        }

        match info.kind {
            NodeKind::Leaf | NodeKind::LeafList => self.write_terminal(info, uri, value, parent_row),
            NodeKind::Container => {
                let obj = object(uri, value)?;
                let row = self.cx.node_row(info, uri, parent_row)?;
                self.write_members(path, info, uri, obj, row.as_ref(), is_target)
            }
            NodeKind::List => self.write_list(path, info, uri, value, parent_row),
            NodeKind::Case | NodeKind::Choice | NodeKind::Rpc => {
                Err(XlateError::payload(uri, format!("{} is not writable", info.kind)).into())
            }
        }
    }

    fn write_list(
        &mut self,
        path: &str,
        info: &YangXpathInfo,
        uri: &ModelPath,
        value: &JsonValue,
        parent_row: Option<&Row>,
    ) -> Result<(), Error> {
        let items: Vec<&JsonValue> = match value {
            JsonValue::Array(items) => items.iter().collect(),
            JsonValue::Object(_) => vec![value],
            _ => return Err(XlateError::payload(uri, "expected list instances").into()),
        };

        for item in items {
            let obj = object(uri, item)?;
            let mut keys = Vec::with_capacity(info.keys.len());
            for k in &info.keys {
                let v = obj
                    .iter()
                    .find(|(m, _)| member_name(m) == k)
                    .and_then(|(_, v)| scalar(v))
                    .or_else(|| uri.last().and_then(|e| e.key(k)).map(ToString::to_string))
                    .ok_or_else(|| XlateError::payload(uri, format!("missing key '{k}'")))?;
                keys.push((k.clone(), v));
            }

            let inst = uri.with_last_keys(keys);
            let row = self.cx.node_row(info, &inst, parent_row)?;
            self.write_members(path, info, &inst, obj, row.as_ref(), true)?;
        }

        Ok(())
    }

    // members of a container or list instance; `row` is the node's own row
    fn write_members(
        &mut self,
        path: &str,
        info: &YangXpathInfo,
        uri: &ModelPath,
        obj: &Map<String, JsonValue>,
        row: Option<&Row>,
        fill: bool,
    ) -> Result<(), Error> {
        let oper = self.cx.oper;
        let owner = self.cx.is_row_owner(info);
        if owner && let Some(row) = row {
            self.put(oper, row, &Value::new());
        }

        for (m, v) in obj {
            let name = member_name(m);
            let child = format!("{path}{PATH_SEPARATOR}{name}");
            let child_info = self
                .cx
                .snap
                .yang_info(&child)
                .ok_or_else(|| XlateError::payload(uri, format!("unknown member '{m}'")))?;
            self.write_node(&child, child_info, &uri.child(PathElem::new(name)), v, row, false)?;
        }

        if oper.fills_defaults()
            && (owner || fill)
            && let Some(row) = row
        {
            self.fill_defaults(path, row);
        }

        Ok(())
    }

    fn write_terminal(
        &mut self,
        info: &YangXpathInfo,
        uri: &ModelPath,
        value: &JsonValue,
        parent_row: Option<&Row>,
    ) -> Result<(), Error> {
        if info.is_key {
            return Ok(());
        }
        let Some(row) = self.cx.node_row(info, uri, parent_row)? else {
            debug!(path = %uri, "leaf outside any row ignored");
            return Ok(());
        };

        let mut out = Value::new();
        if let Some(xfmr) = &info.xfmr_field {
            let Some(Xfmr::FieldToDb(f)) =
                self.cx.registry.lookup(&to_db_name(xfmr), XfmrKind::FieldToDb)?
            else {
                return Ok(());
            };
            out = Value::from_map(f(&self.cx.params(uri, row.db, Some(&row), Some(value)), value)?);
        } else if let Some(field) = &info.field {
            if info.kind == NodeKind::LeafList {
                let raw: Vec<&JsonValue> = match value {
                    JsonValue::Array(items) => items.iter().collect(),
                    other => vec![other],
                };
                let mut items = Vec::with_capacity(raw.len());
                for item in raw {
                    let text = scalar(item)
                        .ok_or_else(|| XlateError::payload(uri, "expected scalar items"))?;
                    items.push(self.cx.value_xfmr(&row.table, field, true, &text)?);
                }
                out.set_list(field, &items);
            } else {
                let text = scalar(value).ok_or_else(|| XlateError::payload(uri, "expected scalar"))?;
                out.set(field.as_str(), self.cx.value_xfmr(&row.table, field, true, &text)?);
            }
        } else {
            debug!(path = %uri, "leaf has no field mapping");
            return Ok(());
        }

        self.put(self.cx.oper, &row, &out);
        Ok(())
    }

    /// Defaults of omitted leaves stored in the same row as `path`.
    fn fill_defaults(&mut self, path: &str, row: &Row) {
        let mut defaults = Vec::new();
        let mut stack = vec![path.to_string()];

        while let Some(p) = stack.pop() {
            let Some(info) = self.cx.snap.yang_info(&p) else {
                continue;
            };
            for child in &info.children {
                let Some(c) = self.cx.snap.yang_info(child) else {
                    continue;
                };
                if c.read_only || self.cx.owns_subtree(c) || self.cx.is_row_owner(c) {
                    continue;
                }
                if c.kind == NodeKind::Leaf {
                    if let (Some(field), Some(default), false) = (&c.field, &c.default, c.is_key) {
                        defaults.push((field.clone(), default.clone()));
                    }
                } else if c.kind.is_interior() {
                    stack.push(child.clone());
                }
            }
        }

        let Some(value) = self
            .plan
            .get_mut(&self.cx.oper)
            .and_then(|m| m.get_mut(&row.db))
            .and_then(|t| t.get_mut(&row.table))
            .and_then(|r| r.get_mut(&row.key))
        else {
            return;
        };
        for (field, default) in defaults {
            if !value.has(&field) {
                value.set(field, default);
            }
        }
    }

    //
    // delete
    //

    fn delete_target(&mut self) -> Result<(), Error> {
        let uri = self.cx.uri;
        let schema = uri.schema_path();
        let info = self.cx.info(&schema)?;
        let parent_row = self.cx.row_at(&uri.prefix(uri.len().saturating_sub(1)))?;

        self.delete_node(&schema, info, uri, parent_row.as_ref(), true)
    }

    fn delete_node(
        &mut self,
        path: &str,
        info: &YangXpathInfo,
        uri: &ModelPath,
        parent_row: Option<&Row>,
        is_target: bool,
    ) -> Result<(), Error> {
        if self.handled_by_subtree(info, is_target) {
            return self.subtree(info, uri, parent_row, None);
        }

        match info.kind {
            NodeKind::Leaf | NodeKind::LeafList => self.delete_field(info, uri, parent_row),
            NodeKind::Container | NodeKind::List if !self.cx.is_row_owner(info) => {
                let row = self.cx.node_row(info, uri, parent_row)?;
                self.delete_children(path, info, uri, row.as_ref())
            }
            NodeKind::List if !uri.last().is_some_and(PathElem::is_keyed) => {
                for (inst, row) in self.stored_instances(info, uri, parent_row)? {
                    self.delete_row_tree(path, info, &inst, &row)?;
                }
                Ok(())
            }
            NodeKind::Container | NodeKind::List => match self.cx.node_row(info, uri, parent_row)? {
                Some(row) => self.delete_row_tree(path, info, uri, &row),
                None => self.delete_children(path, info, uri, None),
            },
            NodeKind::Case | NodeKind::Choice | NodeKind::Rpc => Ok(()),
        }
    }

    // fields of this node's terminals, rows of the owners below it
    fn delete_children(
        &mut self,
        path: &str,
        info: &YangXpathInfo,
        uri: &ModelPath,
        row: Option<&Row>,
    ) -> Result<(), Error> {
        for child in &info.children {
            let child_info = self.cx.info(child)?;
            if child_info.is_key || child_info.read_only {
                continue;
            }
            let child_uri = uri.child(PathElem::new(child_info.name.as_str()));
            self.delete_node(child, child_info, &child_uri, row, false)?;
        }
        debug!(path, "children deleted");

        Ok(())
    }

    /// Delete a row after every row below it and, with cascade-delete, the
    /// rows of dependent tables that extend its key.
    fn delete_row_tree(
        &mut self,
        path: &str,
        info: &YangXpathInfo,
        uri: &ModelPath,
        row: &Row,
    ) -> Result<(), Error> {
        let mut stack = vec![path.to_string()];
        while let Some(p) = stack.pop() {
            let below = self.cx.info(&p)?;
            for child in &below.children {
                let c = self.cx.info(child)?;
                if c.read_only {
                    continue;
                }
                if self.cx.owns_subtree(c) {
                    let child_uri = descendant_uri(uri, path, child)?;
                    self.subtree(c, &child_uri, Some(row), None)?;
                } else if self.cx.is_row_owner(c) || c.is_virtual() {
                    if Cx::ignores_parent_key(c) {
                        debug!(path = %child, "rows not keyed by parent, left in place");
                        continue;
                    }
                    let child_uri = descendant_uri(uri, path, child)?;
                    self.delete_node(child, c, &child_uri, Some(row), false)?;
                } else if c.kind.is_interior() {
                    stack.push(child.clone());
                }
            }
        }

        if info.cascade_delete {
            self.cascade(row)?;
        }
        self.put(Oper::Delete, row, &Value::new());

        Ok(())
    }

    fn cascade(&mut self, row: &Row) -> Result<(), Error> {
        let prefix = self.cx.local(row.db, &row.key)?;
        let sep = self.cx.dbs.get(row.db)?.codec().key_separator.clone();

        for dep in self.cx.snap.ordered_dep_tables(&row.table) {
            let db = self.cx.snap.db_info(&dep).map_or(row.db, |i| i.db);
            let conn = self.cx.dbs.get(db)?;
            let keys = conn.get_keys(&TableSpec::new(dep.as_str()))?;
            for key in keys {
                let local = conn.codec().local(&key);
                if key_prefixed(Some(prefix.as_str()), &local, &sep) {
                    let dep_row = Row {
                        db,
                        table: dep.clone(),
                        key,
                    };
                    self.put(Oper::Delete, &dep_row, &Value::new());
                }
            }
        }

        Ok(())
    }

    fn delete_field(
        &mut self,
        info: &YangXpathInfo,
        uri: &ModelPath,
        parent_row: Option<&Row>,
    ) -> Result<(), Error> {
        if info.is_key {
            debug!(path = %uri, "key leaf delete ignored");
            return Ok(());
        }
        let Some(row) = self.cx.node_row(info, uri, parent_row)? else {
            return Ok(());
        };

        let fields = if let Some(xfmr) = &info.xfmr_field {
            let Some(Xfmr::FieldToDb(f)) =
                self.cx.registry.lookup(&to_db_name(xfmr), XfmrKind::FieldToDb)?
            else {
                return Ok(());
            };
            f(&self.cx.params(uri, row.db, Some(&row), None), &JsonValue::Null)?
                .into_keys()
                .collect()
        } else if let Some(field) = &info.field {
            match info.kind {
                NodeKind::LeafList => vec![list_field(field)],
                _ => vec![field.clone()],
            }
        } else {
            Vec::new()
        };

        if !fields.is_empty() {
            let value = Value::from_pairs(fields.into_iter().map(|f| (f, String::new())));
            self.put(Oper::Delete, &row, &value);
        }

        Ok(())
    }

    // stored rows of an unkeyed list below `parent_row`
    fn stored_instances(
        &self,
        info: &YangXpathInfo,
        uri: &ModelPath,
        parent_row: Option<&Row>,
    ) -> Result<Vec<(ModelPath, Row)>, Error> {
        let Some(table) = self.cx.node_table(info, uri)? else {
            return Ok(Vec::new());
        };
        let conn = self.cx.dbs.get(info.db)?;
        let parent_local = match parent_row {
            Some(r) if !Cx::ignores_parent_key(info) => Some(conn.codec().local(&r.key)),
            _ => None,
        };
        let sep = conn.codec().key_separator.as_str();
        let arity = self.cx.arity(info, &table);

        let mut out = Vec::new();
        for key in conn.get_keys(&TableSpec::new(table.as_str()))? {
            if !key_prefixed(parent_local.as_deref(), &conn.codec().local(&key), sep)
                || arity.is_some_and(|n| key.len() != n)
            {
                continue;
            }
            let row = Row {
                db: info.db,
                table: table.clone(),
                key,
            };
            let keys = self.cx.instance_keys(info, uri, &row)?;
            out.push((uri.with_last_keys(keys), row));
        }

        Ok(out)
    }
}

/// Member of a payload object by plain name, module prefix ignored.
pub(crate) fn member<'p>(payload: &'p JsonValue, name: &str) -> Option<&'p JsonValue> {
    payload
        .as_object()?
        .iter()
        .find(|(m, _)| member_name(m) == name)
        .map(|(_, v)| v)
}

fn object<'p>(uri: &ModelPath, value: &'p JsonValue) -> Result<&'p Map<String, JsonValue>, Error> {
    value
        .as_object()
        .ok_or_else(|| XlateError::payload(uri, "expected an object").into())
}

// instance path of a descendant schema path below `uri`
fn descendant_uri(uri: &ModelPath, path: &str, descendant: &str) -> Result<ModelPath, Error> {
    let rest = descendant
        .strip_prefix(path)
        .ok_or_else(|| XlateError::UnknownPath(descendant.to_string()))?;

    Ok(rest
        .split(PATH_SEPARATOR)
        .filter(|s| !s.is_empty())
        .fold(uri.clone(), |acc, name| acc.child(PathElem::new(name))))
}
