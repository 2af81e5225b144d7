//! Core runtime for XlateDB: the transactional store layer, the schema
//! compiler, the transformer registry and the translation engine.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod path;
pub mod registry;
pub mod spec;
pub mod xlate;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

pub use error::{Error, ErrorClass};

///
/// Prelude
///
/// Prelude contains the request vocabulary: paths, operations, rows and
/// the entry points that act on them.
///

pub mod prelude {
    pub use crate::{
        config::DbNum,
        db::{Db, DbSet, Key, TableSpec, Value},
        path::ModelPath,
        registry::{Xfmr, XfmrRegistry},
        spec::{SpecHandle, SpecInput},
        xlate::{Content, Oper, QueryParams, Translator},
    };
}
