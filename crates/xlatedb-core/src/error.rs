use crate::db::cvl::ValidationFailure;
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Structured runtime error with a stable classification. Module-local
/// error enums convert into this at the public boundary.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct Error {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured detail; the variant matches `origin`.
    pub detail: Option<ErrorDetail>,
}

impl Error {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    pub(crate) fn store_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Store, message)
    }

    pub(crate) fn spec_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Spec, message)
    }

    pub(crate) fn translate_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Translate, message)
    }

    pub(crate) fn translate_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Translate, message)
    }

    /// Construct a row-not-found error for a physical key.
    pub fn store_not_found(key: impl Into<String>) -> Self {
        let key = key.into();

        Self {
            class: ErrorClass::NotFound,
            origin: ErrorOrigin::Store,
            message: format!("entry not found: {key}"),
            detail: Some(ErrorDetail::NotFound { key }),
        }
    }

    /// Wrap a validation-engine rejection.
    #[must_use]
    pub fn validation(failure: ValidationFailure) -> Self {
        Self {
            class: ErrorClass::Validation,
            origin: ErrorOrigin::Validation,
            message: failure.to_string(),
            detail: Some(ErrorDetail::Validation(failure)),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class, ErrorClass::NotFound)
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.class, ErrorClass::Conflict)
    }

    /// Validation diagnostics, when this error carries them.
    #[must_use]
    pub const fn validation_failure(&self) -> Option<&ValidationFailure> {
        match &self.detail {
            Some(ErrorDetail::Validation(failure)) => Some(failure),
            _ => None,
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("key not found: {key}")]
    NotFound { key: String },

    #[error("{0}")]
    Validation(ValidationFailure),
}

///
/// ErrorClass
///

#[remain::sorted]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Conflict,
    ConnectionUnavailable,
    Internal,
    NotFound,
    NotInitialized,
    TxState,
    Unsupported,
    Validation,
    WriteDisabled,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Conflict => "conflict",
            Self::ConnectionUnavailable => "connection_unavailable",
            Self::Internal => "internal",
            Self::NotFound => "not_found",
            Self::NotInitialized => "not_initialized",
            Self::TxState => "tx_state",
            Self::Unsupported => "unsupported",
            Self::Validation => "validation",
            Self::WriteDisabled => "write_disabled",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Config,
    Registry,
    Spec,
    Store,
    Translate,
    Validation,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Config => "config",
            Self::Registry => "registry",
            Self::Spec => "spec",
            Self::Store => "store",
            Self::Translate => "translate",
            Self::Validation => "validation",
        };
        write!(f, "{label}")
    }
}
