use super::{
    Content, DbData, GetResponse, Oper, QueryParams, Translator, XlateError,
    context::{Cx, Row, contained},
    keyspec, sonic, traverse,
};
use crate::{
    db::{DbSet, Value},
    error::Error,
    path::{ModelPath, PathElem},
    registry::{Xfmr, XfmrKind, from_db_name},
    spec::YangXpathInfo,
};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;
use xlatedb_schema::node::NodeKind;

impl Translator {
    /// Read the data tree at `path`.
    ///
    /// The response wraps the target in an object keyed by its name. An
    /// explicitly keyed instance or a leaf with no data is `NotFound`; an
    /// empty container or list reads as `{}`.
    pub fn get(&self, dbs: &DbSet, path: &str, params: &QueryParams) -> Result<GetResponse, Error> {
        let snap = self.spec.load();
        let uri = ModelPath::parse(path)?;
        let cx = Cx {
            snap: &snap,
            dbs,
            registry: &self.registry,
            oper: Oper::Get,
            uri: &uri,
        };

        if let Some(target) = sonic::target(&snap, &uri)? {
            return sonic::get(&cx, &target);
        }

        let tree = keyspec::build(&cx)?;
        let result = traverse::run(dbs, &tree)?;

        let schema = uri.schema_path();
        let info = cx.info(&schema)?;
        let parent_row = cx.row_at(&uri.prefix(uri.len().saturating_sub(1)))?;
        let reader = Reader {
            cx: &cx,
            data: &result.data,
            params,
            target: &schema,
        };

        let tree = match reader.node(&schema, info, &uri, parent_row.as_ref(), 1)? {
            Some(value) => {
                let mut out = Map::new();
                out.insert(info.name.clone(), value);
                JsonValue::Object(out)
            }
            None if info.is_terminal() || uri.last().is_some_and(PathElem::is_keyed) => {
                return Err(XlateError::NotFound(path.to_string()).into());
            }
            None => JsonValue::Object(Map::new()),
        };
        debug!(path, tables = result.data.values().map(|t| t.len()).sum::<usize>(), "read translated");

        Ok(GetResponse {
            tree,
            queried: result.queried,
        })
    }
}

///
/// Reader
///
/// Rebuilds the model tree below a target from traversed rows.
///

struct Reader<'r, 'a> {
    cx: &'r Cx<'a>,
    data: &'r DbData,
    params: &'r QueryParams,
    target: &'r str,
}

impl Reader<'_, '_> {
    fn node(
        &self,
        path: &str,
        info: &YangXpathInfo,
        uri: &ModelPath,
        parent_row: Option<&Row>,
        level: usize,
    ) -> Result<Option<JsonValue>, Error> {
        if self.params.depth.is_some_and(|d| level > d) || !self.content_allows(path, info) {
            return Ok(None);
        }
        if !self.cx.validate(info, uri, parent_row)? {
            debug!(path, "validate transformer skipped node");
            return Ok(None);
        }
        if info.xfmr_subtree.is_some() && (self.cx.owns_subtree(info) || path == self.target) {
            return self.subtree(info, uri, parent_row);
        }

        match info.kind {
            NodeKind::Leaf | NodeKind::LeafList => self.terminal(info, uri, parent_row),
            NodeKind::Container => self.container(info, uri, parent_row, level),
            NodeKind::List => self.list(info, uri, parent_row, level),
            NodeKind::Case | NodeKind::Choice | NodeKind::Rpc => Ok(None),
        }
    }

    fn content_allows(&self, path: &str, info: &YangXpathInfo) -> bool {
        match self.params.content {
            Content::All => true,
            Content::Config => !info.read_only,
            Content::NonConfig => !info.is_terminal() || info.read_only,
            Content::Operational => !info.is_terminal() || self.cx.snap.is_operational(path),
        }
    }

    fn row(&self, row: &Row) -> Option<&Value> {
        self.data.get(&row.db)?.get(&row.table)?.get(&row.key)
    }

    fn subtree(
        &self,
        info: &YangXpathInfo,
        uri: &ModelPath,
        parent_row: Option<&Row>,
    ) -> Result<Option<JsonValue>, Error> {
        let Some(name) = &info.xfmr_subtree else {
            return Ok(None);
        };
        let Some(Xfmr::SubtreeFromDb(f)) =
            self.cx.registry.lookup(&from_db_name(name), XfmrKind::SubtreeFromDb)?
        else {
            return Ok(None);
        };
        let value = f(&self.cx.params(uri, info.db, parent_row, None))?;

        Ok((!value.is_null()).then_some(value))
    }

    fn terminal(
        &self,
        info: &YangXpathInfo,
        uri: &ModelPath,
        parent_row: Option<&Row>,
    ) -> Result<Option<JsonValue>, Error> {
        // key leaves read back from the instance predicates
        if info.is_key {
            let elems = uri.elems();
            let list = elems.len().checked_sub(2).and_then(|i| elems.get(i));

            return Ok(list
                .and_then(|e| e.key(&info.name))
                .map(|v| JsonValue::String(v.to_string())));
        }

        let Some(row) = self.cx.node_row(info, uri, parent_row)? else {
            return Ok(None);
        };
        let Some(value) = self.row(&row) else {
            return Ok(None);
        };

        if let Some(xfmr) = &info.xfmr_field {
            let Some(Xfmr::FieldFromDb(f)) =
                self.cx.registry.lookup(&from_db_name(xfmr), XfmrKind::FieldFromDb)?
            else {
                return Ok(None);
            };
            let mut out = f(&self.cx.params(uri, row.db, Some(&row), None), value)?;

            return Ok(out.remove(&info.name));
        }

        let Some(field) = &info.field else {
            return Ok(None);
        };

        if info.kind == NodeKind::LeafList {
            let items = value.get_list(field);
            if items.is_empty() {
                return Ok(None);
            }
            let items = items
                .iter()
                .map(|v| {
                    self.cx
                        .value_xfmr(&row.table, field, false, v)
                        .map(JsonValue::String)
                })
                .collect::<Result<Vec<_>, Error>>()?;

            return Ok(Some(JsonValue::Array(items)));
        }

        if !value.has(field) {
            return Ok(None);
        }
        let text = self.cx.value_xfmr(&row.table, field, false, value.get(field))?;

        Ok(Some(JsonValue::String(text)))
    }

    fn container(
        &self,
        info: &YangXpathInfo,
        uri: &ModelPath,
        parent_row: Option<&Row>,
        level: usize,
    ) -> Result<Option<JsonValue>, Error> {
        let row = self.cx.node_row(info, uri, parent_row)?;
        let obj = self.children(info, uri, row.as_ref(), level)?;

        Ok((!obj.is_empty()).then_some(JsonValue::Object(obj)))
    }

    fn list(
        &self,
        info: &YangXpathInfo,
        uri: &ModelPath,
        parent_row: Option<&Row>,
        level: usize,
    ) -> Result<Option<JsonValue>, Error> {
        let mut instances = Vec::new();

        if uri.last().is_some_and(PathElem::is_keyed) {
            if let Some(row) = self.cx.node_row(info, uri, parent_row)?
                && self.row(&row).is_some()
            {
                instances.push((uri.clone(), row));
            }
        } else if let Some(table) = self.cx.node_table(info, uri)?
            && let Some(rows) = self.data.get(&info.db).and_then(|t| t.get(&table))
        {
            let parent_local = match parent_row {
                Some(r) if !Cx::ignores_parent_key(info) => Some(self.cx.local(info.db, &r.key)?),
                _ => None,
            };
            let arity = self.cx.arity(info, &table);

            for key in rows.keys() {
                let local = self.cx.local(info.db, key)?;
                if !contained(parent_local.as_deref(), &local) || arity.is_some_and(|n| key.len() != n) {
                    continue;
                }
                let row = Row {
                    db: info.db,
                    table: table.clone(),
                    key: key.clone(),
                };
                let keys = self.cx.instance_keys(info, uri, &row)?;
                instances.push((uri.with_last_keys(keys), row));
            }
        }

        let mut out = Vec::with_capacity(instances.len());
        for (inst, row) in instances {
            let obj = self.children(info, &inst, Some(&row), level)?;
            if !obj.is_empty() {
                out.push(JsonValue::Object(obj));
            }
        }

        Ok((!out.is_empty()).then_some(JsonValue::Array(out)))
    }

    fn children(
        &self,
        info: &YangXpathInfo,
        uri: &ModelPath,
        row: Option<&Row>,
        level: usize,
    ) -> Result<Map<String, JsonValue>, Error> {
        let mut obj = Map::new();
        for child in &info.children {
            let child_info = self.cx.info(child)?;
            let child_uri = uri.child(PathElem::new(child_info.name.as_str()));
            if let Some(v) = self.node(child, child_info, &child_uri, row, level + 1)? {
                obj.insert(child_info.name.clone(), v);
            }
        }

        Ok(obj)
    }
}
