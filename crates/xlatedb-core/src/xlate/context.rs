use super::{Oper, XlateError};
use crate::{
    config::DbNum,
    db::{DbSet, Key, LIST_SUFFIX, TableSpec},
    error::Error,
    path::{ModelPath, PathElem, parent_path},
    registry::{ValueXfmrParams, Xfmr, XfmrKind, XfmrParams, XfmrRegistry, from_db_name, to_db_name},
    spec::{SpecSnapshot, YangXpathInfo},
};
use serde_json::Value as JsonValue;
use xlatedb_schema::PATH_SEPARATOR;

///
/// Row
///
/// One store row a model node maps onto.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Row {
    pub db: DbNum,
    pub table: String,
    pub key: Key,
}

impl Row {
    pub fn ts(&self) -> TableSpec {
        TableSpec::new(self.table.as_str())
    }
}

///
/// Cx
///
/// Per-request translation state shared by reads and writes.
///

pub(crate) struct Cx<'a> {
    pub snap: &'a SpecSnapshot,
    pub dbs: &'a DbSet,
    pub registry: &'a XfmrRegistry,
    pub oper: Oper,
    pub uri: &'a ModelPath,
}

impl<'a> Cx<'a> {
    pub fn info(&self, path: &str) -> Result<&'a YangXpathInfo, Error> {
        self.snap
            .yang_info(path)
            .ok_or_else(|| XlateError::UnknownPath(path.to_string()).into())
    }

    pub fn params<'p>(
        &'p self,
        path: &'p ModelPath,
        db: DbNum,
        row: Option<&'p Row>,
        payload: Option<&'p JsonValue>,
    ) -> XfmrParams<'p> {
        XfmrParams {
            oper: self.oper,
            uri: self.uri,
            path,
            db,
            dbs: self.dbs,
            table: row.map(|r| r.table.as_str()),
            key: row.map(|r| &r.key),
            payload,
        }
    }

    /// True when the node starts a new row: its own table, a keyed list,
    /// or a database switch.
    pub fn is_row_owner(&self, info: &YangXpathInfo) -> bool {
        if info.table_boundary {
            return true;
        }
        if info.is_list()
            && !info.keys.is_empty()
            && (info.table.is_some() || info.xfmr_table.is_some())
        {
            return true;
        }

        info.parent
            .as_deref()
            .and_then(|p| self.snap.yang_info(p))
            .is_some_and(|p| p.db != info.db && (info.table.is_some() || info.xfmr_table.is_some()))
    }

    /// The node declares the subtree transformer it carries.
    pub fn owns_subtree(&self, info: &YangXpathInfo) -> bool {
        let Some(name) = &info.xfmr_subtree else {
            return false;
        };

        info.parent
            .as_deref()
            .and_then(|p| self.snap.yang_info(p))
            .is_none_or(|p| p.xfmr_subtree.as_ref() != Some(name))
    }

    /// Table bound to the node, `None` when virtual or unbound.
    pub fn node_table(&self, info: &YangXpathInfo, path: &ModelPath) -> Result<Option<String>, Error> {
        if info.is_virtual() {
            return Ok(None);
        }
        if let Some(table) = &info.table {
            return Ok(Some(table.clone()));
        }
        let Some(name) = &info.xfmr_table else {
            return Ok(None);
        };
        let Some(Xfmr::Table(f)) = self.registry.lookup(name, XfmrKind::Table)? else {
            return Ok(None);
        };

        Ok(f(&self.params(path, info.db, None, None))?.into_iter().next())
    }

    /// Store key of the row a node maps onto at instance path `path`.
    /// `None` when the path does not carry enough keys to name one row.
    pub fn derive_key(
        &self,
        info: &YangXpathInfo,
        path: &ModelPath,
        table: &str,
    ) -> Result<Option<Key>, Error> {
        if let Some(name) = &info.key_name {
            return Ok(Some(Key::single(name.as_str())));
        }

        if let Some(xfmr) = &info.xfmr_key {
            if info.is_list() && !path.last().is_some_and(PathElem::is_keyed) {
                return Ok(None);
            }
            let Some(Xfmr::KeyToDb(f)) = self.registry.lookup(&to_db_name(xfmr), XfmrKind::KeyToDb)?
            else {
                return Ok(None);
            };
            let local = f(&self.params(path, info.db, None, None))?;
            if local.is_empty() {
                return Ok(None);
            }
            let codec = self.dbs.get(info.db)?.codec();

            return Ok(Some(codec.split_local(&TableSpec::new(table), &local)));
        }

        if info.key_levels.is_empty() {
            return Ok(None);
        }
        let mut values = Vec::new();
        for leaf in info.key_levels.iter().flatten() {
            match key_value(path, leaf) {
                Some(v) => values.push(v.to_string()),
                None => return Ok(None),
            }
        }

        Ok(Some(match &info.delim {
            Some(delim) => Key::single(values.join(delim)),
            None => Key::new(values),
        }))
    }

    pub fn node_row(
        &self,
        info: &YangXpathInfo,
        path: &ModelPath,
        parent: Option<&Row>,
    ) -> Result<Option<Row>, Error> {
        if info.is_virtual() {
            return Ok(None);
        }
        if !self.is_row_owner(info) {
            return Ok(parent.cloned());
        }
        let Some(table) = self.node_table(info, path)? else {
            return Ok(None);
        };

        Ok(self.derive_key(info, path, &table)?.map(|key| Row {
            db: info.db,
            table,
            key,
        }))
    }

    /// Row of the last node of `uri`, resolved from the top down.
    pub fn row_at(&self, uri: &ModelPath) -> Result<Option<Row>, Error> {
        let mut row = None;
        for len in 1..=uri.len() {
            let prefix = uri.prefix(len);
            let info = self.info(&prefix.schema_path())?;
            row = self.node_row(info, &prefix, row.as_ref())?;
        }

        Ok(row)
    }

    /// Key predicates of a list instance stored under `key`.
    pub fn instance_keys(
        &self,
        info: &YangXpathInfo,
        path: &ModelPath,
        row: &Row,
    ) -> Result<Vec<(String, String)>, Error> {
        if let Some(xfmr) = &info.xfmr_key {
            let Some(Xfmr::KeyFromDb(f)) =
                self.registry.lookup(&from_db_name(xfmr), XfmrKind::KeyFromDb)?
            else {
                return Ok(Vec::new());
            };
            let mut map = f(&self.params(path, row.db, Some(row), None), &row.key)?;

            return Ok(info
                .keys
                .iter()
                .filter_map(|k| map.remove(k).map(|v| (k.clone(), v)))
                .collect());
        }

        let comps: Vec<&str> = match &info.delim {
            Some(delim) => row.key.iter().flat_map(|c| c.split(delim.as_str())).collect(),
            None => row.key.iter().map(String::as_str).collect(),
        };
        let skip = comps.len().saturating_sub(info.keys.len());

        Ok(info
            .keys
            .iter()
            .zip(comps.into_iter().skip(skip))
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect())
    }

    /// Children of a row skip the parent-key containment check when they
    /// do not derive their key by extending the parent's.
    pub fn ignores_parent_key(info: &YangXpathInfo) -> bool {
        info.xfmr_key.is_some()
            || info.key_name.is_some()
            || (info.is_list() && info.key_levels.len() == 1 && info.key_level > 0)
    }

    /// Key component count of the node's rows when its table hosts more
    /// than one row shape.
    pub fn arity(&self, info: &YangXpathInfo, table: &str) -> Option<usize> {
        if !self.snap.db_info(table).is_some_and(|t| t.is_multi_shape()) {
            return None;
        }
        if info.db_key_count > 0 {
            return Some(info.db_key_count);
        }
        if info.xfmr_key.is_some() || info.key_levels.is_empty() {
            return None;
        }
        if info.delim.is_some() {
            return Some(1);
        }

        Some(info.key_levels.iter().map(Vec::len).sum())
    }

    pub fn local(&self, db: DbNum, key: &Key) -> Result<String, Error> {
        Ok(self.dbs.get(db)?.codec().local(key))
    }

    /// Apply the value transformer bound to `table/field`, if any.
    pub fn value_xfmr(
        &self,
        table: &str,
        field: &str,
        to_db: bool,
        value: &str,
    ) -> Result<String, Error> {
        let base = field.trim_end_matches(LIST_SUFFIX);
        let Some(info) = self.snap.db_info(&format!("{table}{PATH_SEPARATOR}{base}")) else {
            return Ok(value.to_string());
        };
        let Some(name) = &info.value_xfmr else {
            return Ok(value.to_string());
        };
        let Some(Xfmr::Value(f)) = self.registry.lookup(name, XfmrKind::Value)? else {
            return Ok(value.to_string());
        };
        let params = ValueXfmrParams {
            to_db,
            table,
            field: base,
            is_key: info.is_key,
        };

        f(&params, value)
    }

    /// Run the validate transformer of a node; nodes without one pass.
    pub fn validate(&self, info: &YangXpathInfo, path: &ModelPath, row: Option<&Row>) -> Result<bool, Error> {
        let Some(name) = &info.validate else {
            return Ok(true);
        };
        let Some(Xfmr::Validate(f)) = self.registry.lookup(name, XfmrKind::Validate)? else {
            return Ok(true);
        };

        Ok(f(&self.params(path, info.db, row, None)))
    }
}

/// Containment filter: a child row belongs to its parent when the parent's
/// table-local key occurs in the child's.
pub(crate) fn contained(parent_local: Option<&str>, child_local: &str) -> bool {
    parent_local.is_none_or(|p| child_local.contains(p))
}

/// Key-prefix filter for deletes: the child's table-local key is the
/// parent's, or extends it by whole components.
pub(crate) fn key_prefixed(parent_local: Option<&str>, child_local: &str, sep: &str) -> bool {
    parent_local.is_none_or(|p| {
        child_local
            .strip_prefix(p)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(sep))
    })
}

/// Value of key leaf `leaf` (a schema path) in instance path `path`.
fn key_value<'p>(path: &'p ModelPath, leaf: &str) -> Option<&'p str> {
    let list = parent_path(leaf)?;
    let depth = list.matches(PATH_SEPARATOR).count();
    let name = leaf.rsplit(PATH_SEPARATOR).next()?;

    path.elems().get(depth.checked_sub(1)?)?.key(name)
}

/// Plain name of a payload member, module prefix dropped.
pub(crate) fn member_name(name: &str) -> &str {
    name.split_once(':').map_or(name, |(_, n)| n)
}

/// Scalar payload value as stored text.
pub(crate) fn scalar(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_values_come_from_the_list_element() {
        let path = ModelPath::parse("/m:a/list[name=x|y]/leaf").expect("path");

        assert_eq!(key_value(&path, "/m:a/list/name"), Some("x|y"));
        assert_eq!(key_value(&path, "/m:a/list/other"), None);
        assert_eq!(key_value(&path, "/m:a/list/sub/list2/id"), None);
    }

    #[test]
    fn containment_is_a_substring_test() {
        assert!(contained(None, "anything"));
        assert!(contained(Some("Ethernet1"), "Ethernet1|rule"));
        assert!(contained(Some("Ethernet1"), "Ethernet10"));
        assert!(!contained(Some("Ethernet2"), "Ethernet1|rule"));
    }

    #[test]
    fn key_prefix_matches_whole_components() {
        assert!(key_prefixed(None, "anything", "|"));
        assert!(key_prefixed(Some("ACL1"), "ACL1", "|"));
        assert!(key_prefixed(Some("ACL1"), "ACL1|10", "|"));
        assert!(!key_prefixed(Some("ACL1"), "ACL10|10", "|"));
        assert!(!key_prefixed(Some("ACL1"), "XACL1|10", "|"));
    }

    #[test]
    fn payload_scalars() {
        assert_eq!(scalar(&JsonValue::from(9100)).as_deref(), Some("9100"));
        assert_eq!(scalar(&JsonValue::from(true)).as_deref(), Some("true"));
        assert_eq!(scalar(&JsonValue::Null), None);
        assert_eq!(member_name("openconfig-acl:acl"), "acl");
    }
}
