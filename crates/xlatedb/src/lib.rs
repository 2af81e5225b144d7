//! XlateDB translates requests against hierarchical configuration models
//! into reads and transactional writes on a hash-row key-value store.
//!
//! ## Crate layout
//! - `core`: store layer, validation contract, schema compiler, transformer
//!   registry and the translation engine.
//! - `schema`: annotated schema tree and structural validation.
//!
//! The `prelude` module covers request handling; `design::prelude` exposes
//! the schema-building vocabulary.

pub use xlatedb_core as core;
pub use xlatedb_schema as schema;

/// re-exports
///
/// transformer bodies build JSON fragments; this saves callers a direct
/// dependency
pub mod __reexports {
    pub use serde_json;
}

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use core::{Error, ErrorClass};

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::prelude::*;
}

///
/// Design Prelude
/// For schema modules and their annotations.
///

pub mod design {
    pub mod prelude {
        pub use crate::schema::prelude::*;
    }
}
