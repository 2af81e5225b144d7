use crate::config::DbNum;
use serde::Serialize;
use std::collections::BTreeMap;
use xlatedb_schema::node::NodeKind;

///
/// YangXpathInfo
///
/// Compiled metadata for one model path. Choice and case nodes get a record
/// of their own, keyed by their full path, but never appear in `children`.
///

#[derive(Clone, Debug, Serialize)]
pub struct YangXpathInfo {
    pub name: String,
    pub module: String,
    pub kind: NodeKind,

    /// Nearest concrete ancestor path.
    pub parent: Option<String>,

    /// Immediate parent record, a choice or case when there is one.
    pub schema_parent: Option<String>,

    /// Concrete child paths in schema order, choice/case flattened.
    pub children: Vec<String>,

    // table binding
    pub table: Option<String>,
    pub xfmr_table: Option<String>,
    pub table_boundary: bool,
    pub table_owner: Option<bool>,
    pub virtual_table: Option<bool>,
    pub child_tables: Vec<String>,
    pub db_key_count: usize,

    // keys
    pub keys: Vec<String>,
    pub key_levels: Vec<Vec<String>>,
    pub key_level: usize,
    pub key_name: Option<String>,
    pub delim: Option<String>,
    pub is_key: bool,

    // fields
    pub field: Option<String>,
    pub default: Option<String>,
    pub read_only: bool,

    // callbacks
    pub xfmr_subtree: Option<String>,
    pub xfmr_key: Option<String>,
    pub xfmr_field: Option<String>,
    pub validate: Option<String>,

    // inherited hints
    pub db: DbNum,
    pub cascade_delete: bool,
    pub subscribe_min_interval: u32,

    // derived flags
    pub has_non_terminal: bool,
    pub has_child_subtree: bool,
    pub operational: bool,
    pub has_child_operational: bool,
}

impl YangXpathInfo {
    pub(crate) fn new(name: &str, module: &str, kind: NodeKind) -> Self {
        Self {
            name: name.to_string(),
            module: module.to_string(),
            kind,
            parent: None,
            schema_parent: None,
            children: Vec::new(),
            table: None,
            xfmr_table: None,
            table_boundary: false,
            table_owner: None,
            virtual_table: None,
            child_tables: Vec::new(),
            db_key_count: 0,
            keys: Vec::new(),
            key_levels: Vec::new(),
            key_level: 0,
            key_name: None,
            delim: None,
            is_key: false,
            field: None,
            default: None,
            read_only: false,
            xfmr_subtree: None,
            xfmr_key: None,
            xfmr_field: None,
            validate: None,
            db: DbNum::ConfigDb,
            cascade_delete: false,
            subscribe_min_interval: 0,
            has_non_terminal: false,
            has_child_subtree: false,
            operational: false,
            has_child_operational: false,
        }
    }

    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self.kind, NodeKind::List)
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// True when this node declares its own table binding (direct or
    /// through a table transformer).
    #[must_use]
    pub const fn owns_table(&self) -> bool {
        self.table_boundary
    }

    /// Table is absent in the store: either declared virtual or bound to
    /// the `NONE` placeholder.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.virtual_table == Some(true) || self.table.as_deref() == Some(NO_TABLE)
    }

    /// The node is not the sole owner of its table rows.
    #[must_use]
    pub fn shares_table(&self) -> bool {
        self.table_owner == Some(false)
    }
}

/// Placeholder table name for model nodes with no store table.
pub const NO_TABLE: &str = "NONE";

///
/// DbInfo
///
/// Store-side metadata, keyed by `TABLE`, `TABLE/field` or `TABLE/LIST`
/// (and `/module:node` for module roots and RPCs).
///

#[derive(Clone, Debug, Serialize)]
pub struct DbInfo {
    pub module: String,
    pub kind: NodeKind,
    pub db: DbNum,
    pub key_name: Option<String>,
    pub delim: Option<String>,

    /// Row shapes hosted by a table.
    pub lists: Vec<String>,

    /// Key leaves of a list shape.
    pub keys: Vec<String>,

    /// Field names of a list shape, in schema order.
    pub fields: Vec<String>,

    pub default: Option<String>,

    /// The field is a key leaf of its row shape, never stored as a field.
    pub is_key: bool,

    pub leafrefs: Vec<String>,
    pub value_xfmr: Option<String>,
    pub key_xfmr: Option<String>,
    pub has_xfmr: bool,
    pub cascade_delete: bool,

    /// Model paths bound to this table or field.
    pub yang_paths: Vec<String>,
}

impl DbInfo {
    pub(crate) fn new(module: &str, kind: NodeKind) -> Self {
        Self {
            module: module.to_string(),
            kind,
            db: DbNum::ConfigDb,
            key_name: None,
            delim: None,
            lists: Vec::new(),
            keys: Vec::new(),
            fields: Vec::new(),
            default: None,
            is_key: false,
            leafrefs: Vec::new(),
            value_xfmr: None,
            key_xfmr: None,
            has_xfmr: false,
            cascade_delete: false,
            yang_paths: Vec::new(),
        }
    }

    /// A table hosting more than one keyed row shape.
    #[must_use]
    pub fn is_multi_shape(&self) -> bool {
        self.lists.len() > 1
    }
}

///
/// DepTables
///

#[derive(Clone, Debug, Default, Serialize)]
pub struct DepTables {
    pub within_module: Vec<String>,
    pub across_modules: Vec<String>,
}

///
/// TableSeqInfo
///
/// Per store module ordering: tables dependents-first, plus the dependency
/// lists of each table.
///

#[derive(Clone, Debug, Default, Serialize)]
pub struct TableSeqInfo {
    pub ordered: Vec<String>,
    pub deps: BTreeMap<String, DepTables>,
}

///
/// ModuleHooks
///

#[derive(Clone, Debug, Default, Serialize)]
pub struct ModuleHooks {
    pub pre: Option<String>,
    pub post: Option<String>,
}

///
/// ModelInfo
///
/// Capability record of a compiled model module. Missing metadata is an
/// empty string.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ModelInfo {
    pub version: String,
    pub organization: String,
}
