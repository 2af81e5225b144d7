//! Annotated schema tree consumed by the xlatedb schema compiler.
//!
//! A schema parser (out of scope here) lowers model and store modules into
//! [`node::SchemaModule`] values; [`validate`] checks structural invariants
//! before the compiler in `xlatedb-core` builds its lookup maps.

pub mod annotation;
pub mod error;
pub mod node;
pub mod validate;

use crate::error::ErrorTree;
use thiserror::Error as ThisError;

/// Separator between a module name and the first path element.
pub const MODULE_SEPARATOR: char = ':';

/// Path element separator used in schema and model paths.
pub const PATH_SEPARATOR: char = '/';

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        annotation::Annotation,
        err,
        error::ErrorTree,
        node::{ModuleKind, NodeKind, SchemaModule, SchemaNode},
    };
}

///
/// Error
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(ErrorTree),
}
