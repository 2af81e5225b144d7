//! Watch-based optimistic transactions.

use crate::{
    db::{
        Db, DbError, Key, KeyCodec, TableSpec, Value, WatchKeys,
        backend::{BackendError, Command},
        cvl::{EditRecord, ValidationSession},
    },
    error::Error,
};
use std::{collections::BTreeSet, fmt};
use tracing::{debug, error, info, warn};

/// Global "last updated" marker key.
pub const UPDATED_MARKER: &str = "CONFIG_DB_UPDATED";

///
/// TxState
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TxState {
    #[default]
    None,
    Watch,
    Set,
    MultiExec,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::Watch => "watch",
            Self::Set => "set",
            Self::MultiExec => "multi_exec",
        };
        write!(f, "{label}")
    }
}

///
/// TxOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxOp {
    HmSet,
    HDel,
    Del,
}

///
/// TxCmd
///
/// One queued mutation.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxCmd {
    pub ts: TableSpec,
    pub op: TxOp,
    pub key: Key,
    pub value: Value,
}

#[derive(Default)]
pub(crate) struct TxContext {
    pub(crate) state: TxState,
    pub(crate) cmds: Vec<TxCmd>,
    pub(crate) edits: Vec<EditRecord>,
    pub(crate) session: Option<Box<dyn ValidationSession>>,
}

impl TxContext {
    pub(crate) fn reset(&mut self) {
        self.state = TxState::None;
        self.cmds.clear();
        self.edits.clear();
        if let Some(session) = self.session.take() {
            session.close();
        }
    }
}

/// Marker key flagging `table` as updated; wildcard names map to the global marker.
#[must_use]
pub fn updated_marker(table: &str) -> String {
    if table.contains('*') {
        UPDATED_MARKER.to_string()
    } else {
        format!("{UPDATED_MARKER}_{table}")
    }
}

pub(crate) fn command(codec: &KeyCodec, ts: &TableSpec, op: TxOp, key: &Key, value: &Value) -> Command {
    let key = codec.encode(ts, key);
    match op {
        TxOp::HmSet => Command::HmSet {
            key,
            fields: value.clone().into_map(),
        },
        TxOp::HDel => Command::HDel {
            key,
            fields: value.keys().cloned().collect(),
        },
        TxOp::Del => Command::Del { key },
    }
}

impl Db {
    #[must_use]
    pub const fn tx_state(&self) -> TxState {
        self.tx.state
    }

    /// Queued mutations of the open transaction.
    #[must_use]
    pub fn tx_cmds(&self) -> &[TxCmd] {
        &self.tx.cmds
    }

    /// Edit records accumulated for validation in the open transaction.
    #[must_use]
    pub fn tx_edits(&self) -> &[EditRecord] {
        &self.tx.edits
    }

    /// Start a transaction, watching `watch` rows and the updated markers
    /// of `tables`.
    pub fn start_tx(&mut self, watch: &[WatchKeys], tables: &[TableSpec]) -> Result<(), Error> {
        self.backend()?;
        if self.tx.state != TxState::None {
            error!(state = %self.tx.state, "start_tx: transaction already in progress");
            return Err(DbError::TxAlreadyOpen.into());
        }

        if !self.opts.disable_cvl_check {
            let session = self
                .validator()
                .open_session()
                .map_err(|code| DbError::SessionOpen(format!("{code:?}")))?;
            self.tx.session = Some(session);
        }

        if let Err(err) = self.perform_watch(watch, tables) {
            self.tx.reset();
            return Err(err);
        }
        self.tx.state = TxState::Watch;

        debug!(db = %self.opts.db, "transaction started");
        Ok(())
    }

    /// Extend the watch set of the open transaction.
    pub fn append_watch_tx(
        &mut self,
        watch: &[WatchKeys],
        tables: &[TableSpec],
    ) -> Result<(), Error> {
        match self.tx.state {
            TxState::Watch | TxState::Set => self.perform_watch(watch, tables),
            TxState::None => {
                error!("append_watch_tx: transaction has not started");
                Err(DbError::TxNotOpen.into())
            }
            TxState::MultiExec => Err(DbError::TxBadState(self.tx.state).into()),
        }
    }

    fn perform_watch(&mut self, watch: &[WatchKeys], tables: &[TableSpec]) -> Result<(), Error> {
        let mut keys = Vec::with_capacity(watch.len() + tables.len());

        for w in watch {
            let physical = self.codec.encode(&w.ts, &w.key);
            if w.key.is_pattern() {
                match self.backend()?.keys(&physical) {
                    Ok(found) => keys.extend(found),
                    Err(err) => warn!(pattern = %physical, error = %err, "watch: key expansion failed"),
                }
            } else {
                keys.push(physical);
            }
        }
        keys.extend(tables.iter().map(|ts| updated_marker(&ts.name)));

        if keys.is_empty() {
            warn!("empty watch set, skipping watch");
            return Ok(());
        }

        debug!(count = keys.len(), "watching keys");
        self.backend_mut()?.watch(&keys)?;

        Ok(())
    }

    /// Commit the open transaction. State is reset whatever the outcome.
    pub fn commit_tx(&mut self) -> Result<(), Error> {
        match self.tx.state {
            TxState::Watch | TxState::Set => {}
            TxState::None => {
                error!("commit_tx: no transaction active");
                return Err(DbError::TxNotOpen.into());
            }
            TxState::MultiExec => {
                error!("commit_tx: already in multi/exec");
                return Err(DbError::TxBadState(self.tx.state).into());
            }
        }

        self.tx.state = TxState::MultiExec;
        let result = self.replay_and_exec();
        self.tx.reset();

        match &result {
            Ok(()) => info!(db = %self.opts.db, "transaction committed"),
            Err(err) => warn!(db = %self.opts.db, error = %err, "transaction commit failed"),
        }

        result
    }

    fn replay_and_exec(&mut self) -> Result<(), Error> {
        let cmds = std::mem::take(&mut self.tx.cmds);
        let mut touched = BTreeSet::new();
        let mut queued = Vec::with_capacity(cmds.len() + 1);

        for cmd in &cmds {
            touched.insert(cmd.ts.name.clone());
            queued.push(command(&self.codec, &cmd.ts, cmd.op, &cmd.key, &cmd.value));
        }
        for table in &touched {
            queued.push(Command::Set {
                key: updated_marker(table),
                value: "1".to_string(),
            });
        }
        queued.push(Command::Set {
            key: updated_marker("*"),
            value: "1".to_string(),
        });

        let backend = self.backend_mut()?;
        backend.multi()?;
        for cmd in queued {
            if let Err(err) = backend.queue(cmd) {
                warn!(error = %err, "commit_tx: queue failed");
            }
        }

        match backend.exec() {
            Ok(()) => Ok(()),
            Err(BackendError::WatchAborted) => Err(DbError::TxConflict.into()),
            Err(err) => Err(err.into()),
        }
    }

    /// Abort the open transaction, dropping every queued mutation.
    pub fn abort_tx(&mut self) -> Result<(), Error> {
        match self.tx.state {
            TxState::Watch | TxState::Set => {}
            TxState::None => {
                error!("abort_tx: no transaction active");
                return Err(DbError::TxNotOpen.into());
            }
            TxState::MultiExec => {
                return Err(DbError::TxBadState(self.tx.state).into());
            }
        }

        let unwatch = self.backend_mut().map(|b| b.unwatch());
        self.tx.reset();
        debug!(db = %self.opts.db, "transaction aborted");

        unwatch??;
        Ok(())
    }
}
