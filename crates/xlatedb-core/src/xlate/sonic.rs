//! Store-schema paths.
//!
//! A path rooted at a store module (`/sonic-port:sonic-port/PORT/PORT_LIST`)
//! addresses tables directly: the second element names a table, the third
//! one of its row shapes, the fourth a field.

use super::{
    GetResponse, KeySpecNode, KeySpecTree, MutationPlan, Oper, XlateError,
    context::{Cx, member_name, scalar},
    merge_row, to_db, traverse,
};
use crate::{
    config::DbNum,
    db::{Key, TableSpec, Value, list_field},
    error::Error,
    path::ModelPath,
    spec::{DbInfo, SpecSnapshot},
};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use tracing::debug;
use xlatedb_schema::{MODULE_SEPARATOR, PATH_SEPARATOR, node::NodeKind};

/// Field separator of list fields in their stored form.
const LIST_ITEM_SEPARATOR: char = ',';

///
/// SonicTarget
///

#[derive(Clone, Debug)]
pub(crate) struct SonicTarget {
    pub module: String,
    pub root: String,
    pub table: Option<String>,
    pub shape: Option<String>,
    pub key: Option<Key>,
    pub field: Option<String>,
    pub db: DbNum,
}

impl SonicTarget {
    fn root_name(&self) -> &str {
        self.root
            .rsplit(MODULE_SEPARATOR)
            .next()
            .unwrap_or(self.root.as_str())
    }

    fn tables<'s>(&'s self, snap: &'s SpecSnapshot) -> Vec<&'s str> {
        match &self.table {
            Some(table) => vec![table.as_str()],
            None => snap.store_tables(&self.module),
        }
    }
}

/// Resolve `uri` as a store path; `None` when it is a model path.
pub(crate) fn target(snap: &SpecSnapshot, uri: &ModelPath) -> Result<Option<SonicTarget>, Error> {
    let elems = uri.elems();
    let Some(first) = elems.first() else {
        return Ok(None);
    };
    let Some(module) = first.module.as_deref() else {
        return Ok(None);
    };
    let root = format!("{PATH_SEPARATOR}{module}{MODULE_SEPARATOR}{}", first.name);
    if snap.yang_info(&root).is_some()
        || !snap
            .db_info(&root)
            .is_some_and(|i| i.kind == NodeKind::Container && i.module == module)
    {
        return Ok(None);
    }
    if elems.len() > 4 {
        return Err(XlateError::UnknownPath(uri.to_string()).into());
    }

    let mut target = SonicTarget {
        module: module.to_string(),
        root,
        table: None,
        shape: None,
        key: None,
        field: None,
        db: DbNum::ConfigDb,
    };

    if let Some(elem) = elems.get(1) {
        let info = snap
            .db_info(&elem.name)
            .filter(|i| i.kind == NodeKind::Container && i.module == module)
            .ok_or_else(|| XlateError::UnknownPath(uri.to_string()))?;
        target.db = info.db;
        target.table = Some(elem.name.clone());
    }

    if let (Some(elem), Some(table)) = (elems.get(2), &target.table) {
        let shape = snap
            .db_info(&format!("{table}{PATH_SEPARATOR}{}", elem.name))
            .filter(|i| i.kind.is_interior())
            .ok_or_else(|| XlateError::UnknownPath(uri.to_string()))?;

        if let Some(name) = &shape.key_name {
            target.key = Some(Key::single(name.as_str()));
        } else if elem.is_keyed() {
            let values: Option<Vec<&str>> = shape.keys.iter().map(|k| elem.key(k)).collect();
            target.key = values.map(Key::new);
        }
        target.shape = Some(elem.name.clone());
    }

    if let Some(elem) = elems.get(3) {
        if target.key.is_none() {
            return Err(XlateError::payload(uri, "field access needs a keyed row").into());
        }
        target.field = Some(elem.name.clone());
    }

    Ok(Some(target))
}

/// One root per addressed table; rows are never correlated to a parent.
pub(crate) fn key_specs(cx: &Cx<'_>, target: &SonicTarget) -> Result<KeySpecTree, Error> {
    let mut tree = KeySpecTree::default();

    for table in target.tables(cx.snap) {
        let info = cx.snap.db_info(table);
        let arity = match (&target.shape, &target.key) {
            (Some(shape), None) => shape_arity(cx.snap, table, shape),
            _ => None,
        };

        tree.add_root(KeySpecNode {
            db: info.map_or(target.db, |i| i.db),
            ts: TableSpec::new(table),
            key: target.key.clone(),
            children: Vec::new(),
            ignore_parent_key: true,
            is_virtual: false,
            path: format!("{}{PATH_SEPARATOR}{table}", target.root),
            arity,
            parent_key: None,
        });
    }

    Ok(tree)
}

// key count of a list shape sharing its table with other shapes
fn shape_arity(snap: &SpecSnapshot, table: &str, shape: &str) -> Option<usize> {
    if !snap.db_info(table).is_some_and(DbInfo::is_multi_shape) {
        return None;
    }
    let info = snap.db_info(&format!("{table}{PATH_SEPARATOR}{shape}"))?;

    info.key_name.is_none().then_some(info.keys.len())
}

/// Shape a stored row belongs to.
fn shape_of<'s>(shapes: &[(&'s str, &DbInfo)], multi: bool, key: &Key) -> Option<&'s str> {
    let singleton = shapes.iter().find(|(_, i)| {
        i.key_name
            .as_deref()
            .is_some_and(|n| key.len() == 1 && key.first().is_some_and(|c| c == n))
    });
    if let Some((name, _)) = singleton {
        return Some(name);
    }

    shapes
        .iter()
        .filter(|(_, i)| i.kind == NodeKind::List && i.key_name.is_none())
        .find(|(_, i)| !multi || i.keys.len() == key.len())
        .map(|(name, _)| *name)
}

//
// read
//

pub(crate) fn get(cx: &Cx<'_>, target: &SonicTarget) -> Result<GetResponse, Error> {
    let tree = key_specs(cx, target)?;
    let result = traverse::run(cx.dbs, &tree)?;

    let mut tables = Map::new();
    for table in target.tables(cx.snap) {
        let Some(rows) = result.rows(cx.snap.db_info(table).map_or(target.db, |i| i.db), table) else {
            continue;
        };
        let shapes = table_json(cx, table, target.shape.as_deref(), rows)?;
        if !shapes.is_empty() {
            tables.insert(table.to_string(), JsonValue::Object(shapes));
        }
    }

    let tree = match (&target.table, &target.shape, &target.field) {
        (None, _, _) if tables.is_empty() => JsonValue::Object(Map::new()),
        (None, _, _) => single(target.root_name(), JsonValue::Object(tables)),
        (Some(_), None, _) => JsonValue::Object(tables),
        (Some(table), Some(shape), field) => {
            let found = tables
                .remove(table)
                .and_then(|mut t| t.as_object_mut().and_then(|s| s.remove(shape)));
            match (found, field) {
                (None, _) if target.key.is_some() => {
                    return Err(XlateError::NotFound(cx.uri.to_string()).into());
                }
                (None, _) => JsonValue::Object(Map::new()),
                (Some(rows), None) => single(shape, rows),
                (Some(rows), Some(field)) => {
                    let value = first_row(rows)
                        .and_then(|mut row| row.remove(field))
                        .ok_or_else(|| XlateError::NotFound(cx.uri.to_string()))?;
                    single(field, value)
                }
            }
        }
    };
    debug!(path = %cx.uri, "store path read");

    Ok(GetResponse {
        tree,
        queried: result.queried,
    })
}

fn single(name: &str, value: JsonValue) -> JsonValue {
    let mut out = Map::new();
    out.insert(name.to_string(), value);

    JsonValue::Object(out)
}

fn first_row(rows: JsonValue) -> Option<Map<String, JsonValue>> {
    match rows {
        JsonValue::Object(row) => Some(row),
        JsonValue::Array(items) => items.into_iter().find_map(|i| match i {
            JsonValue::Object(row) => Some(row),
            _ => None,
        }),
        _ => None,
    }
}

// rows of one table grouped by shape
fn table_json(
    cx: &Cx<'_>,
    table: &str,
    only: Option<&str>,
    rows: &BTreeMap<Key, Value>,
) -> Result<Map<String, JsonValue>, Error> {
    let shapes = cx.snap.table_shapes(table);
    let multi = cx.snap.db_info(table).is_some_and(DbInfo::is_multi_shape);
    let mut grouped: BTreeMap<&str, Vec<JsonValue>> = BTreeMap::new();

    for (key, value) in rows {
        let Some(shape) = shape_of(&shapes, multi, key) else {
            debug!(table, %key, "row matches no shape");
            continue;
        };
        if only.is_some_and(|s| s != shape) {
            continue;
        }
        let Some((_, info)) = shapes.iter().find(|(n, _)| *n == shape) else {
            continue;
        };
        let row = row_json(cx, table, info, key, value)?;
        grouped.entry(shape).or_default().push(JsonValue::Object(row));
    }

    let mut out = Map::new();
    for (shape, mut rows) in grouped {
        let singleton = shapes
            .iter()
            .any(|(n, i)| *n == shape && i.key_name.is_some());
        let value = match rows.pop() {
            Some(row) if singleton => row,
            Some(row) => {
                rows.push(row);
                JsonValue::Array(rows)
            }
            None => continue,
        };
        out.insert(shape.to_string(), value);
    }

    Ok(out)
}

fn row_json(
    cx: &Cx<'_>,
    table: &str,
    shape: &DbInfo,
    key: &Key,
    value: &Value,
) -> Result<Map<String, JsonValue>, Error> {
    let mut row = Map::new();

    if shape.key_name.is_none() {
        for (leaf, comp) in shape.keys.iter().zip(key.iter()) {
            let text = cx.value_xfmr(table, leaf, false, comp)?;
            row.insert(leaf.clone(), JsonValue::String(text));
        }
    }

    for (field, stored) in value.iter() {
        if field == to_db::NULL_FIELD {
            continue;
        }
        if let Some(name) = field.strip_suffix(crate::db::LIST_SUFFIX) {
            let mut items = Vec::new();
            for item in stored.split(LIST_ITEM_SEPARATOR).filter(|i| !i.is_empty()) {
                items.push(JsonValue::String(cx.value_xfmr(table, name, false, item)?));
            }
            row.insert(name.to_string(), JsonValue::Array(items));
        } else {
            let text = cx.value_xfmr(table, field, false, stored)?;
            row.insert(field.clone(), JsonValue::String(text));
        }
    }

    Ok(row)
}

//
// write
//

pub(crate) fn write(
    cx: &Cx<'_>,
    target: &SonicTarget,
    payload: Option<&JsonValue>,
    plan: &mut MutationPlan,
) -> Result<(), Error> {
    if cx.oper == Oper::Delete {
        return delete(cx, target, plan);
    }
    let payload = payload.ok_or_else(|| XlateError::payload(cx.uri, "payload required"))?;
    let mut writer = StoreWriter { cx, plan };

    match (&target.table, &target.shape, &target.field) {
        (None, _, _) => {
            let body = writer.member(payload, target.root_name())?;
            for (name, tables) in object(cx.uri, body)? {
                let table = member_name(name);
                if !target.tables(cx.snap).contains(&table) {
                    return Err(XlateError::payload(cx.uri, format!("unknown table '{name}'")).into());
                }
                writer.table(table, tables)?;
            }
        }
        (Some(table), None, _) => {
            let body = writer.member(payload, table)?;
            writer.table(table, body)?;
        }
        (Some(table), Some(shape), None) => {
            let body = writer.member(payload, shape)?;
            writer.shape(table, shape, body, target.key.as_ref())?;
        }
        (Some(table), Some(shape), Some(field)) => {
            let body = writer.member(payload, field)?;
            let info = writer.shape_info(table, shape)?;
            let mut obj = Map::new();
            obj.insert(field.clone(), body.clone());
            let value = writer.row_value(table, info, &obj)?;
            if let Some(key) = &target.key {
                writer.put(table, key.clone(), &value);
            }
        }
    }

    Ok(())
}

///
/// StoreWriter
///

struct StoreWriter<'w, 'a> {
    cx: &'w Cx<'a>,
    plan: &'w mut MutationPlan,
}

impl<'a> StoreWriter<'_, 'a> {
    fn member<'p>(&self, payload: &'p JsonValue, name: &str) -> Result<&'p JsonValue, Error> {
        to_db::member(payload, name)
            .ok_or_else(|| XlateError::payload(self.cx.uri, format!("missing member '{name}'")).into())
    }

    fn shape_info(&self, table: &str, shape: &str) -> Result<&'a DbInfo, Error> {
        self.cx
            .snap
            .db_info(&format!("{table}{PATH_SEPARATOR}{shape}"))
            .filter(|i| i.kind.is_interior())
            .ok_or_else(|| XlateError::payload(self.cx.uri, format!("unknown shape '{shape}'")).into())
    }

    fn put(&mut self, table: &str, key: Key, value: &Value) {
        let db = self.cx.snap.db_info(table).map_or(DbNum::ConfigDb, |i| i.db);
        let rows = self
            .plan
            .entry(self.cx.oper)
            .or_default()
            .entry(db)
            .or_default()
            .entry(table.to_string())
            .or_default();
        merge_row(rows, self.cx.oper, key, value);
    }

    fn table(&mut self, table: &str, body: &JsonValue) -> Result<(), Error> {
        for (name, rows) in object(self.cx.uri, body)? {
            self.shape(table, member_name(name), rows, None)?;
        }

        Ok(())
    }

    fn shape(&mut self, table: &str, shape: &str, body: &JsonValue, key: Option<&Key>) -> Result<(), Error> {
        let info = self.shape_info(table, shape)?;

        if let Some(name) = &info.key_name {
            let value = self.row_value(table, info, object(self.cx.uri, body)?)?;
            self.put_with_defaults(table, info, Key::single(name.as_str()), value);
            return Ok(());
        }

        let items: Vec<&JsonValue> = match body {
            JsonValue::Array(items) => items.iter().collect(),
            JsonValue::Object(_) => vec![body],
            _ => return Err(XlateError::payload(self.cx.uri, "expected rows").into()),
        };
        for item in items {
            let obj = object(self.cx.uri, item)?;
            let row_key = match key {
                Some(key) => key.clone(),
                None => {
                    let mut comps = Vec::with_capacity(info.keys.len());
                    for leaf in &info.keys {
                        let v = obj
                            .iter()
                            .find(|(m, _)| member_name(m) == leaf)
                            .and_then(|(_, v)| scalar(v))
                            .ok_or_else(|| XlateError::payload(self.cx.uri, format!("missing key '{leaf}'")))?;
                        comps.push(self.cx.value_xfmr(table, leaf, true, &v)?);
                    }
                    Key::new(comps)
                }
            };
            let value = self.row_value(table, info, obj)?;
            self.put_with_defaults(table, info, row_key, value);
        }

        Ok(())
    }

    fn put_with_defaults(&mut self, table: &str, info: &DbInfo, key: Key, mut value: Value) {
        if self.cx.oper.fills_defaults() {
            for field in &info.fields {
                let Some(field_info) = self.cx.snap.db_info(&format!("{table}{PATH_SEPARATOR}{field}")) else {
                    continue;
                };
                if let Some(default) = &field_info.default
                    && field_info.kind == NodeKind::Leaf
                    && !value.has(field)
                {
                    value.set(field.as_str(), default.as_str());
                }
            }
        }
        self.put(table, key, &value);
    }

    fn row_value(&self, table: &str, info: &DbInfo, obj: &Map<String, JsonValue>) -> Result<Value, Error> {
        let mut value = Value::new();

        for (m, v) in obj {
            let name = member_name(m);
            if info.keys.iter().any(|k| k == name) {
                continue;
            }
            if !info.fields.iter().any(|f| f == name) {
                return Err(XlateError::payload(self.cx.uri, format!("unknown field '{m}'")).into());
            }

            if let JsonValue::Array(items) = v {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let text = scalar(item).ok_or_else(|| XlateError::payload(self.cx.uri, "expected scalar items"))?;
                    out.push(self.cx.value_xfmr(table, name, true, &text)?);
                }
                value.set_list(name, &out);
            } else {
                let text = scalar(v).ok_or_else(|| XlateError::payload(self.cx.uri, "expected scalar"))?;
                value.set(name, self.cx.value_xfmr(table, name, true, &text)?);
            }
        }

        Ok(value)
    }
}

fn object<'p>(uri: &ModelPath, value: &'p JsonValue) -> Result<&'p Map<String, JsonValue>, Error> {
    value
        .as_object()
        .ok_or_else(|| XlateError::payload(uri, "expected an object").into())
}

//
// delete
//

fn delete(cx: &Cx<'_>, target: &SonicTarget, plan: &mut MutationPlan) -> Result<(), Error> {
    let mut writer = StoreWriter { cx, plan };

    if let (Some(table), Some(shape), Some(key)) = (&target.table, &target.shape, &target.key) {
        let value = match &target.field {
            Some(field) => {
                let info = cx.snap.db_info(&format!("{table}{PATH_SEPARATOR}{field}"));
                let name = match info.map(|i| i.kind) {
                    Some(NodeKind::LeafList) => list_field(field),
                    Some(_) => field.clone(),
                    None => {
                        return Err(XlateError::UnknownPath(format!("{table}{PATH_SEPARATOR}{field}")).into());
                    }
                };
                Value::from_pairs([(name, String::new())])
            }
            None => Value::new(),
        };
        debug!(table, shape, %key, "store row delete planned");
        writer.put(table, key.clone(), &value);

        return Ok(());
    }

    for table in target.tables(cx.snap) {
        let db = cx.snap.db_info(table).map_or(target.db, |i| i.db);
        let conn = cx.dbs.get(db)?;
        let shapes = cx.snap.table_shapes(table);
        let multi = cx.snap.db_info(table).is_some_and(DbInfo::is_multi_shape);

        for key in conn.get_keys(&TableSpec::new(table))? {
            if let Some(only) = &target.shape
                && shape_of(&shapes, multi, &key) != Some(only.as_str())
            {
                continue;
            }
            writer.put(table, key, &Value::new());
        }
    }

    Ok(())
}
