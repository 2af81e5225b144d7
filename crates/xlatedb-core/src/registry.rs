//! Named transformer callbacks.
//!
//! Model-specific modules register callbacks by name at start-up; the
//! translation engine looks them up by the names bound in the compiled
//! schema. Each callback kind has one fixed signature, checked when the
//! callback is registered.
//!
//! Key, field and subtree transformers come in two halves registered as
//! `YangToDb_<name>` and `DbToYang_<name>`; every other kind is registered
//! under the bound name itself.

use crate::{
    config::DbNum,
    db::{DbSet, Key, Value},
    error::{Error, ErrorClass, ErrorOrigin},
    path::ModelPath,
    xlate::{DbMutations, Oper},
};
use serde_json::Value as JsonValue;
use std::{collections::BTreeMap, fmt, sync::Arc};
use thiserror::Error as ThisError;
use tracing::warn;

/// Registration prefix of the model-to-store half of a key, field or
/// subtree transformer.
pub const TO_DB_PREFIX: &str = "YangToDb_";

/// Registration prefix of the store-to-model half.
pub const FROM_DB_PREFIX: &str = "DbToYang_";

/// Registered name of the to-store callback bound as `name`.
#[must_use]
pub fn to_db_name(name: &str) -> String {
    format!("{TO_DB_PREFIX}{name}")
}

#[must_use]
pub fn from_db_name(name: &str) -> String {
    format!("{FROM_DB_PREFIX}{name}")
}

///
/// RegistryError
///

#[derive(Debug, ThisError)]
pub enum RegistryError {
    #[error("transformer '{0}' already registered")]
    AlreadyRegistered(String),

    #[error("transformer '{name}' is not registered")]
    NotRegistered { name: String },

    #[error("transformer '{name}' is a {actual} callback, expected {expected}")]
    KindMismatch {
        name: String,
        expected: XfmrKind,
        actual: XfmrKind,
    },
}

impl RegistryError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::AlreadyRegistered(_) => ErrorClass::Internal,
            Self::NotRegistered { .. } | Self::KindMismatch { .. } => ErrorClass::Unsupported,
        }
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        Self::new(err.class(), ErrorOrigin::Registry, err.to_string())
    }
}

///
/// XfmrKind
///

#[remain::sorted]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum XfmrKind {
    FieldFromDb,
    FieldToDb,
    KeyFromDb,
    KeyToDb,
    PostXfmr,
    PreXfmr,
    Rpc,
    SubtreeFromDb,
    SubtreeToDb,
    Table,
    Validate,
    Value,
}

impl fmt::Display for XfmrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FieldFromDb => "field-from-db",
            Self::FieldToDb => "field-to-db",
            Self::KeyFromDb => "key-from-db",
            Self::KeyToDb => "key-to-db",
            Self::PostXfmr => "post-transformer",
            Self::PreXfmr => "pre-transformer",
            Self::Rpc => "rpc",
            Self::SubtreeFromDb => "subtree-from-db",
            Self::SubtreeToDb => "subtree-to-db",
            Self::Table => "table",
            Self::Validate => "get-validate",
            Self::Value => "value",
        };
        write!(f, "{label}")
    }
}

///
/// XfmrParams
///
/// Parameter bundle handed to every model-side callback.
///

#[derive(Clone, Copy, Debug)]
pub struct XfmrParams<'a> {
    pub oper: Oper,

    /// The request path.
    pub uri: &'a ModelPath,

    /// Instance path of the node being translated.
    pub path: &'a ModelPath,

    pub db: DbNum,

    /// Read access to the rest of the store.
    pub dbs: &'a DbSet,

    /// Table and store key of the current row, when known.
    pub table: Option<&'a str>,
    pub key: Option<&'a Key>,

    /// Payload below `path` (writes only).
    pub payload: Option<&'a JsonValue>,
}

///
/// ValueXfmrParams
///

#[derive(Clone, Copy, Debug)]
pub struct ValueXfmrParams<'a> {
    pub to_db: bool,
    pub table: &'a str,
    pub field: &'a str,
    pub is_key: bool,
}

pub type KeyToDbFn = Arc<dyn Fn(&XfmrParams<'_>) -> Result<String, Error> + Send + Sync>;
pub type KeyFromDbFn =
    Arc<dyn Fn(&XfmrParams<'_>, &Key) -> Result<BTreeMap<String, String>, Error> + Send + Sync>;
pub type FieldToDbFn =
    Arc<dyn Fn(&XfmrParams<'_>, &JsonValue) -> Result<BTreeMap<String, String>, Error> + Send + Sync>;
pub type FieldFromDbFn =
    Arc<dyn Fn(&XfmrParams<'_>, &Value) -> Result<BTreeMap<String, JsonValue>, Error> + Send + Sync>;
pub type SubtreeToDbFn =
    Arc<dyn Fn(&XfmrParams<'_>) -> Result<DbMutations, Error> + Send + Sync>;
pub type SubtreeFromDbFn = Arc<dyn Fn(&XfmrParams<'_>) -> Result<JsonValue, Error> + Send + Sync>;
pub type TableFn = Arc<dyn Fn(&XfmrParams<'_>) -> Result<Vec<String>, Error> + Send + Sync>;
pub type ValidateFn = Arc<dyn Fn(&XfmrParams<'_>) -> bool + Send + Sync>;
pub type HookFn = Arc<
    dyn Fn(&XfmrParams<'_>, &mut BTreeMap<Oper, DbMutations>) -> Result<(), Error> + Send + Sync,
>;
pub type RpcFn = Arc<dyn Fn(&[u8], &mut DbSet) -> Result<Vec<u8>, Error> + Send + Sync>;
pub type ValueFn = Arc<dyn Fn(&ValueXfmrParams<'_>, &str) -> Result<String, Error> + Send + Sync>;

///
/// Xfmr
///
/// A registered callback, tagged by kind.
///

#[derive(Clone)]
pub enum Xfmr {
    FieldFromDb(FieldFromDbFn),
    FieldToDb(FieldToDbFn),
    KeyFromDb(KeyFromDbFn),
    KeyToDb(KeyToDbFn),
    PostXfmr(HookFn),
    PreXfmr(HookFn),
    Rpc(RpcFn),
    SubtreeFromDb(SubtreeFromDbFn),
    SubtreeToDb(SubtreeToDbFn),
    Table(TableFn),
    Validate(ValidateFn),
    Value(ValueFn),
}

impl Xfmr {
    #[must_use]
    pub const fn kind(&self) -> XfmrKind {
        match self {
            Self::FieldFromDb(_) => XfmrKind::FieldFromDb,
            Self::FieldToDb(_) => XfmrKind::FieldToDb,
            Self::KeyFromDb(_) => XfmrKind::KeyFromDb,
            Self::KeyToDb(_) => XfmrKind::KeyToDb,
            Self::PostXfmr(_) => XfmrKind::PostXfmr,
            Self::PreXfmr(_) => XfmrKind::PreXfmr,
            Self::Rpc(_) => XfmrKind::Rpc,
            Self::SubtreeFromDb(_) => XfmrKind::SubtreeFromDb,
            Self::SubtreeToDb(_) => XfmrKind::SubtreeToDb,
            Self::Table(_) => XfmrKind::Table,
            Self::Validate(_) => XfmrKind::Validate,
            Self::Value(_) => XfmrKind::Value,
        }
    }
}

impl fmt::Debug for Xfmr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Xfmr({})", self.kind())
    }
}

///
/// XfmrRegistry
///
/// Name-indexed callbacks. Names are unique across kinds.
///
/// By default a lookup of an unknown name, or of a name registered under a
/// different kind, logs a warning and yields nothing so the caller
/// continues with an empty result. A `strict` registry reports those
/// lookups as `Unsupported` errors instead.
///

#[derive(Clone, Debug, Default)]
pub struct XfmrRegistry {
    entries: BTreeMap<String, Xfmr>,
    strict: bool,
}

impl XfmrRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn strict() -> Self {
        Self {
            entries: BTreeMap::new(),
            strict: true,
        }
    }

    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn register(&mut self, name: impl Into<String>, xfmr: Xfmr) -> Result<(), RegistryError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.entries.insert(name, xfmr);

        Ok(())
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
    pub fn kind_of(&self, name: &str) -> Option<XfmrKind> {
        self.entries.get(name).map(Xfmr::kind)
    }

    /// Look up `name` as a callback of `kind`.
    ///
    /// `Ok(None)` means the lookup degraded: the name is unknown or bound
    /// to another kind, and the registry is not strict.
    pub fn lookup(&self, name: &str, kind: XfmrKind) -> Result<Option<&Xfmr>, Error> {
        let err = match self.entries.get(name) {
            Some(xfmr) if xfmr.kind() == kind => return Ok(Some(xfmr)),
            Some(xfmr) => RegistryError::KindMismatch {
                name: name.to_string(),
                expected: kind,
                actual: xfmr.kind(),
            },
            None => RegistryError::NotRegistered {
                name: name.to_string(),
            },
        };

        if self.strict {
            return Err(err.into());
        }
        warn!(name, %kind, error = %err, "transformer lookup degraded to empty result");

        Ok(None)
    }
}

// typed constructors: the closure signature is checked here
macro_rules! xfmr_ctor {
    ($fn_name:ident, $variant:ident, $alias:ty, ($($arg:ty),*) -> $ret:ty) => {
        impl Xfmr {
            pub fn $fn_name<F>(f: F) -> Self
            where
                F: Fn($($arg),*) -> $ret + Send + Sync + 'static,
            {
                let f: $alias = Arc::new(f);
                Self::$variant(f)
            }
        }
    };
}

xfmr_ctor!(key_to_db, KeyToDb, KeyToDbFn, (&XfmrParams<'_>) -> Result<String, Error>);
xfmr_ctor!(
    key_from_db,
    KeyFromDb,
    KeyFromDbFn,
    (&XfmrParams<'_>, &Key) -> Result<BTreeMap<String, String>, Error>
);
xfmr_ctor!(
    field_to_db,
    FieldToDb,
    FieldToDbFn,
    (&XfmrParams<'_>, &JsonValue) -> Result<BTreeMap<String, String>, Error>
);
xfmr_ctor!(
    field_from_db,
    FieldFromDb,
    FieldFromDbFn,
    (&XfmrParams<'_>, &Value) -> Result<BTreeMap<String, JsonValue>, Error>
);
xfmr_ctor!(subtree_to_db, SubtreeToDb, SubtreeToDbFn, (&XfmrParams<'_>) -> Result<DbMutations, Error>);
xfmr_ctor!(subtree_from_db, SubtreeFromDb, SubtreeFromDbFn, (&XfmrParams<'_>) -> Result<JsonValue, Error>);
xfmr_ctor!(table, Table, TableFn, (&XfmrParams<'_>) -> Result<Vec<String>, Error>);
xfmr_ctor!(validate, Validate, ValidateFn, (&XfmrParams<'_>) -> bool);
xfmr_ctor!(
    pre_xfmr,
    PreXfmr,
    HookFn,
    (&XfmrParams<'_>, &mut BTreeMap<Oper, DbMutations>) -> Result<(), Error>
);
xfmr_ctor!(
    post_xfmr,
    PostXfmr,
    HookFn,
    (&XfmrParams<'_>, &mut BTreeMap<Oper, DbMutations>) -> Result<(), Error>
);
xfmr_ctor!(rpc, Rpc, RpcFn, (&[u8], &mut DbSet) -> Result<Vec<u8>, Error>);
xfmr_ctor!(value, Value, ValueFn, (&ValueXfmrParams<'_>, &str) -> Result<String, Error>);
