use crate::{
    db::{TxState, backend::BackendError},
    error::{Error, ErrorClass, ErrorOrigin},
};
use thiserror::Error as ThisError;

///
/// DbError
///

#[derive(Debug, ThisError)]
pub enum DbError {
    #[error("database connection is closed")]
    ConnectionUnavailable,

    #[error("database not initialized: indicator '{indicator}' is not 1")]
    NotInitialized { indicator: String },

    #[error("on-change cache cannot be enabled on a write-enabled connection")]
    CacheOnWritable,

    #[error("write to database disabled on this connection")]
    WriteDisabled,

    #[error("transaction already in progress")]
    TxAlreadyOpen,

    #[error("no transaction active")]
    TxNotOpen,

    #[error("operation not allowed in transaction state {0}")]
    TxBadState(TxState),

    #[error("transaction aborted: watched keys changed")]
    TxConflict,

    #[error("unable to open validation session: {0}")]
    SessionOpen(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl DbError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::ConnectionUnavailable | Self::CacheOnWritable => {
                ErrorClass::ConnectionUnavailable
            }
            Self::NotInitialized { .. } => ErrorClass::NotInitialized,
            Self::WriteDisabled => ErrorClass::WriteDisabled,
            Self::TxAlreadyOpen | Self::TxNotOpen | Self::TxBadState(_) => ErrorClass::TxState,
            Self::TxConflict => ErrorClass::Conflict,
            Self::SessionOpen(_) | Self::Backend(_) => ErrorClass::Internal,
        }
    }
}

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        Self::new(err.class(), ErrorOrigin::Store, err.to_string())
    }
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        DbError::from(err).into()
    }
}
