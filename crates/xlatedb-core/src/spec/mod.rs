//! Schema compiler.
//!
//! Compiles annotated model and store modules into an immutable
//! [`SpecSnapshot`]: model-path metadata, store-side table and field
//! metadata, per-module table ordering, RPC bindings and module hooks.

mod export;
mod flags;
mod handle;
mod info;
mod inherit;
mod model;
mod store;


pub use handle::SpecHandle;
pub use info::{
    DbInfo, DepTables, ModelInfo, ModuleHooks, NO_TABLE, TableSeqInfo, YangXpathInfo,
};
pub use inherit::Inherit;

use crate::{
    db::cvl::ValidationEngine,
    error::{Error, ErrorClass, ErrorOrigin},
    path::parent_path,
};
use derive_more::Deref;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error as ThisError;
use tracing::{info, warn};
use xlatedb_schema::{
    PATH_SEPARATOR,
    error::ErrorTree,
    node::{ModuleKind, NodeKind, SchemaModule},
    validate::validate_modules,
};

///
/// BuildError
///

#[derive(Debug, ThisError)]
pub enum BuildError {
    #[error("schema validation failed: {0}")]
    Validation(ErrorTree),
}

impl BuildError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Internal,
        }
    }
}

impl From<BuildError> for Error {
    fn from(err: BuildError) -> Self {
        Self::new(err.class(), ErrorOrigin::Spec, err.to_string())
    }
}

///
/// SpecInput
///
/// Parsed modules handed to the compiler, model and store alike.
///

#[derive(Clone, Debug, Default, Deref)]
pub struct SpecInput {
    modules: Vec<SchemaModule>,
}

impl SpecInput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn module(mut self, module: SchemaModule) -> Self {
        self.modules.push(module);
        self
    }

    fn of_kind(&self, kind: ModuleKind) -> impl Iterator<Item = &SchemaModule> {
        self.modules.iter().filter(move |m| m.kind == kind)
    }
}

impl From<Vec<SchemaModule>> for SpecInput {
    fn from(modules: Vec<SchemaModule>) -> Self {
        Self { modules }
    }
}

///
/// SpecSnapshot
///
/// Immutable output of one compile. Shared between requests through
/// [`SpecHandle`]; never mutated after `compile` returns.
///

#[derive(Clone, Debug, Default)]
pub struct SpecSnapshot {
    yang: BTreeMap<String, YangXpathInfo>,
    db: BTreeMap<String, DbInfo>,
    seq: BTreeMap<String, TableSeqInfo>,
    yang_rpc: BTreeMap<String, String>,
    db_rpc: BTreeMap<String, String>,
    hooks: BTreeMap<String, ModuleHooks>,
    models: BTreeMap<String, ModelInfo>,
    diagnostics: Vec<String>,
}

impl SpecSnapshot {
    /// Compile `input`, querying `engine` for table ordering.
    ///
    /// Structural schema errors reject the whole build. Annotation
    /// anomalies are logged and recorded in [`Self::diagnostics`]; they only
    /// cost the affected subtree.
    pub fn compile(input: &SpecInput, engine: &dyn ValidationEngine) -> Result<Self, Error> {
        validate_modules(&input.modules).map_err(BuildError::Validation)?;

        let mut builder = Builder::default();

        // Phase 1: store-side tables, fields and ordering
        for module in input.of_kind(ModuleKind::Store) {
            builder.store_module(module, engine);
        }
        builder.propagate_value_xfmrs();

        // Phase 2: model paths
        for module in input.of_kind(ModuleKind::Model) {
            builder.model_module(module);
        }

        // Phase 3: derived flags
        builder.link_child_tables();
        builder.propagate_flags();
        builder.classify_operational();

        let snapshot = builder.finish();
        info!(
            yang_paths = snapshot.yang.len(),
            db_paths = snapshot.db.len(),
            store_modules = snapshot.seq.len(),
            diagnostics = snapshot.diagnostics.len(),
            "schema compiled"
        );

        Ok(snapshot)
    }

    #[must_use]
    pub fn yang_info(&self, path: &str) -> Option<&YangXpathInfo> {
        self.yang.get(path)
    }

    #[must_use]
    pub fn db_info(&self, path: &str) -> Option<&DbInfo> {
        self.db.get(path)
    }

    pub fn yang_paths(&self) -> impl Iterator<Item = &str> {
        self.yang.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_terminal_node(&self, path: &str) -> bool {
        self.yang_info(path).is_some_and(YangXpathInfo::is_terminal)
    }

    #[must_use]
    pub fn is_leaf_node(&self, path: &str) -> bool {
        self.yang_info(path).is_some_and(|i| i.kind == NodeKind::Leaf)
    }

    #[must_use]
    pub fn is_leaf_list_node(&self, path: &str) -> bool {
        self.yang_info(path)
            .is_some_and(|i| i.kind == NodeKind::LeafList)
    }

    /// Name, version and organization of every compiled model module.
    #[must_use]
    pub const fn model_capabilities(&self) -> &BTreeMap<String, ModelInfo> {
        &self.models
    }

    /// True when `path` or any ancestor is operational-only.
    #[must_use]
    pub fn is_operational(&self, path: &str) -> bool {
        let mut cur = Some(path);
        while let Some(p) = cur {
            match self.yang.get(p) {
                Some(info) if info.operational => return true,
                Some(info) => cur = info.parent.as_deref(),
                None => cur = parent_path(p),
            }
        }

        false
    }

    /// Tables declared by store module `module`, in name order.
    #[must_use]
    pub fn store_tables(&self, module: &str) -> Vec<&str> {
        self.db
            .iter()
            .filter(|(p, i)| {
                !p.contains(PATH_SEPARATOR) && i.module == module && i.kind == NodeKind::Container
            })
            .map(|(p, _)| p.as_str())
            .collect()
    }

    /// Row shapes hosted by `table`: keyed lists and singleton containers.
    #[must_use]
    pub fn table_shapes(&self, table: &str) -> Vec<(&str, &DbInfo)> {
        let prefix = format!("{table}{PATH_SEPARATOR}");

        self.db
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter(|(_, i)| i.kind.is_interior())
            .map(|(p, i)| (&p[prefix.len()..], i))
            .collect()
    }

    #[must_use]
    pub fn table_seq(&self, module: &str) -> Option<&TableSeqInfo> {
        self.seq.get(module)
    }

    /// Store module whose ordering covers `table`.
    #[must_use]
    pub fn table_module(&self, table: &str) -> Option<&str> {
        self.seq
            .iter()
            .find(|(_, s)| s.ordered.iter().any(|t| t == table) || s.deps.contains_key(table))
            .map(|(m, _)| m.as_str())
    }

    /// Tables within `table`'s module that depend on it, delete order.
    #[must_use]
    pub fn ordered_dep_tables(&self, table: &str) -> Vec<String> {
        self.table_module(table)
            .and_then(|m| self.seq.get(m))
            .and_then(|s| s.deps.get(table))
            .map(|d| d.within_module.clone())
            .unwrap_or_default()
    }

    /// Every table a write touching `tables` must watch: each table plus
    /// its cross-module dependents.
    #[must_use]
    pub fn tables_to_watch<S: AsRef<str>>(&self, tables: &[S]) -> Vec<String> {
        let mut out = BTreeSet::new();
        for table in tables {
            let table = table.as_ref();
            out.insert(table.to_string());

            let deps = self
                .table_module(table)
                .and_then(|m| self.seq.get(m))
                .and_then(|s| s.deps.get(table));
            if let Some(deps) = deps {
                out.extend(deps.across_modules.iter().cloned());
            }
        }

        out.into_iter().collect()
    }

    /// Pre/post hooks bound to the top-level node of `path`.
    #[must_use]
    pub fn module_hooks(&self, path: &str) -> Option<&ModuleHooks> {
        let top = top_level(path);
        self.hooks.get(top)
    }

    #[must_use]
    pub fn yang_rpc(&self, path: &str) -> Option<&str> {
        self.yang_rpc.get(path).map(String::as_str)
    }

    #[must_use]
    pub fn db_rpc(&self, path: &str) -> Option<&str> {
        self.db_rpc.get(path).map(String::as_str)
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}

// first path element, e.g. "/m:acl" of "/m:acl/acl-sets"
fn top_level(path: &str) -> &str {
    path.char_indices()
        .skip(1)
        .find(|(_, c)| *c == '/')
        .map_or(path, |(i, _)| &path[..i])
}

///
/// Builder
///
/// Mutable compile state; consumed by `finish`.
///

#[derive(Default)]
struct Builder {
    yang: BTreeMap<String, YangXpathInfo>,
    db: BTreeMap<String, DbInfo>,
    seq: BTreeMap<String, TableSeqInfo>,
    yang_rpc: BTreeMap<String, String>,
    db_rpc: BTreeMap<String, String>,
    hooks: BTreeMap<String, ModuleHooks>,
    models: BTreeMap<String, ModelInfo>,

    /// Referenced field (`TABLE/field`) to referring fields.
    leafref_index: BTreeMap<String, Vec<String>>,

    /// Model paths declaring their own table name or subtree transformer.
    own_tables: Vec<(String, String)>,
    own_subtrees: BTreeSet<String>,

    diagnostics: Vec<String>,
}

impl Builder {
    fn diag(&mut self, path: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(path, %message, "schema compile anomaly");
        self.diagnostics.push(format!("{path}: {message}"));
    }

    fn finish(self) -> SpecSnapshot {
        SpecSnapshot {
            yang: self.yang,
            db: self.db,
            seq: self.seq,
            yang_rpc: self.yang_rpc,
            db_rpc: self.db_rpc,
            hooks: self.hooks,
            models: self.models,
            diagnostics: self.diagnostics,
        }
    }
}
