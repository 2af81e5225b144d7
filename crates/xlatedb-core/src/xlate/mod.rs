//! Translation engine.
//!
//! Turns model-path requests into store reads and mutation plans, and store
//! rows back into a model-shaped data tree, using the published schema
//! snapshot and the transformer registry.

mod apply;
mod context;
mod from_db;
mod keyspec;
mod rpc;
mod sonic;
mod to_db;
mod traverse;

#[cfg(test)]
mod tests;

pub use keyspec::{KeySpecNode, KeySpecTree};
pub use traverse::{DbData, Queried, TraverseResult};

use crate::{
    config::DbNum,
    db::{Key, Value},
    error::{Error, ErrorClass, ErrorOrigin},
    registry::XfmrRegistry,
    spec::SpecHandle,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::{collections::BTreeMap, fmt, sync::Arc};
use thiserror::Error as ThisError;

///
/// XlateError
///

#[derive(Debug, ThisError)]
pub enum XlateError {
    #[error("no schema node for path '{0}'")]
    UnknownPath(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("malformed payload at '{path}': {reason}")]
    Payload { path: String, reason: String },

    #[error("no rpc bound to '{0}'")]
    UnknownRpc(String),

    #[error("{oper} is not supported on '{path}'")]
    Unsupported { oper: Oper, path: String },
}

impl XlateError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownPath(_) | Self::Payload { .. } => ErrorClass::Internal,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::UnknownRpc(_) | Self::Unsupported { .. } => ErrorClass::Unsupported,
        }
    }

    pub(crate) fn payload(path: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::Payload {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<XlateError> for Error {
    fn from(err: XlateError) -> Self {
        Self::new(err.class(), ErrorOrigin::Translate, err.to_string())
    }
}

///
/// Oper
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Oper {
    Get,
    Create,
    Update,
    Replace,
    Delete,
}

impl Oper {
    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Get)
    }

    /// Create and replace fill omitted leaves with schema defaults.
    #[must_use]
    pub const fn fills_defaults(self) -> bool {
        matches!(self, Self::Create | Self::Replace)
    }
}

impl fmt::Display for Oper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Get => "GET",
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Replace => "REPLACE",
            Self::Delete => "DELETE",
        };
        write!(f, "{label}")
    }
}

///
/// Content
///
/// Which part of the data tree a read returns.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Content {
    #[default]
    All,
    Config,
    NonConfig,
    Operational,
}

///
/// QueryParams
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct QueryParams {
    pub content: Content,

    /// Schema levels to return, the target counting as level 1.
    pub depth: Option<usize>,
}

impl QueryParams {
    #[must_use]
    pub const fn with_content(mut self, content: Content) -> Self {
        self.content = content;
        self
    }

    #[must_use]
    pub const fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }
}

/// Rows to write, per database and table.
pub type DbMutations = BTreeMap<DbNum, BTreeMap<String, BTreeMap<Key, Value>>>;

/// Mutations grouped by the operation that applies them.
pub type MutationPlan = BTreeMap<Oper, DbMutations>;

///
/// WritePlan
///

#[derive(Clone, Debug, Default)]
pub struct WritePlan {
    pub plan: MutationPlan,

    /// Tables whose update markers the committing transaction watches.
    pub tables_to_watch: Vec<String>,
}

impl WritePlan {
    /// Rows planned for `oper` in `table` of `db`.
    #[must_use]
    pub fn rows(&self, oper: Oper, db: DbNum, table: &str) -> Option<&BTreeMap<Key, Value>> {
        self.plan.get(&oper)?.get(&db)?.get(table)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plan
            .values()
            .flat_map(BTreeMap::values)
            .all(BTreeMap::is_empty)
    }
}

///
/// GetResponse
///

#[derive(Clone, Debug)]
pub struct GetResponse {
    pub tree: JsonValue,

    /// Rows the read actually fetched, present or not.
    pub queried: Queried,
}

impl GetResponse {
    /// True when the read fetched the row, whether or not it existed.
    #[must_use]
    pub fn was_queried(&self, db: DbNum, table: &str, key: &Key) -> bool {
        traverse::queried_contains(&self.queried, db, table, key)
    }
}

///
/// Translator
///
/// Request-facing entry point. Cheap to clone; every call works against
/// the snapshot current when it starts.
///

#[derive(Clone, Debug)]
pub struct Translator {
    spec: SpecHandle,
    registry: Arc<XfmrRegistry>,
}

impl Translator {
    #[must_use]
    pub const fn new(spec: SpecHandle, registry: Arc<XfmrRegistry>) -> Self {
        Self { spec, registry }
    }

    #[must_use]
    pub const fn spec(&self) -> &SpecHandle {
        &self.spec
    }

    #[must_use]
    pub fn registry(&self) -> &XfmrRegistry {
        &self.registry
    }
}

/// Merge `src` into the `oper` part of `plan`.
pub(crate) fn merge_mutations(plan: &mut MutationPlan, oper: Oper, src: DbMutations) {
    let dst = plan.entry(oper).or_default();
    for (db, tables) in src {
        for (table, rows) in tables {
            let target = dst.entry(db).or_default().entry(table).or_default();
            for (key, value) in rows {
                merge_row(target, oper, key, &value);
            }
        }
    }
}

/// Field-wise merge; for deletes a row planned with no fields stands for
/// the whole row and absorbs field-level entries.
pub(crate) fn merge_row(rows: &mut BTreeMap<Key, Value>, oper: Oper, key: Key, value: &Value) {
    match rows.get_mut(&key) {
        Some(existing) if oper != Oper::Delete => existing.merge(value),
        Some(existing) if existing.is_populated() && value.is_populated() => existing.merge(value),
        Some(existing) => existing.clear(),
        None => {
            rows.insert(key, value.clone());
        }
    }
}
