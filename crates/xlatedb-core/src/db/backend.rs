//! Contract with the backing key-value store.

use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// BackendError
///

#[derive(Debug, ThisError)]
pub enum BackendError {
    #[error("exec aborted: a watched key changed")]
    WatchAborted,

    #[error("exec without multi")]
    NoMulti,

    #[error("wrong value type at key '{0}'")]
    WrongType(String),

    #[error("{0}")]
    Io(String),
}

///
/// Command
///
/// Mutating primitives, applied directly or queued inside MULTI.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    HmSet {
        key: String,
        fields: BTreeMap<String, String>,
    },
    HDel {
        key: String,
        fields: Vec<String>,
    },
    Del {
        key: String,
    },
    Set {
        key: String,
        value: String,
    },
}

impl Command {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::HmSet { key, .. }
            | Self::HDel { key, .. }
            | Self::Del { key }
            | Self::Set { key, .. } => key,
        }
    }
}

///
/// Backend
///
/// One connection to a logical database. Hash rows, glob key enumeration,
/// plain string keys, optimistic WATCH/MULTI/EXEC and publish.
///

pub trait Backend: Send {
    fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, BackendError>;

    fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError>;

    fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Apply a command immediately.
    fn execute(&mut self, cmd: Command) -> Result<(), BackendError>;

    fn watch(&mut self, keys: &[String]) -> Result<(), BackendError>;

    fn unwatch(&mut self) -> Result<(), BackendError>;

    fn multi(&mut self) -> Result<(), BackendError>;

    /// Queue a command inside MULTI.
    fn queue(&mut self, cmd: Command) -> Result<(), BackendError>;

    /// Apply the queued commands atomically; [`BackendError::WatchAborted`]
    /// when any watched key changed since it was watched.
    fn exec(&mut self) -> Result<(), BackendError>;

    /// Publish a message; returns the number of receivers.
    fn publish(&self, channel: &str, message: &str) -> Result<usize, BackendError>;
}
