//! Transactional store layer over a hash-row key-value backend.

pub mod backend;
pub mod cvl;
pub mod glob;
pub mod memory;

mod cache;
mod error;
mod set;
mod tx;
mod types;


pub use error::DbError;
pub use set::DbSet;
pub use tx::{TxCmd, TxOp, TxState};
pub use types::{Key, KeyCodec, LIST_SUFFIX, Table, TableSpec, Value, WatchKeys, list_field};

use crate::{
    config::{DbNum, Options},
    db::{
        backend::Backend,
        cache::ReadCache,
        cvl::{CvlOp, EditRecord, ValidateType, ValidationEngine, ValidationFailure},
        memory::MemoryStore,
    },
    error::Error,
};
use std::{cell::RefCell, fmt, sync::Arc};
use tracing::{debug, error, warn};

///
/// Db
///
/// One single-owner connection to a logical database. Reads go straight
/// to the backend (or the read cache); mutations are validated and either
/// applied directly or queued inside the current transaction.
///

pub struct Db {
    opts: Options,
    codec: KeyCodec,
    backend: Option<Box<dyn Backend>>,
    validator: Arc<dyn ValidationEngine>,
    tx: tx::TxContext,
    cache: RefCell<ReadCache>,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("opts", &self.opts)
            .field("open", &self.backend.is_some())
            .field("tx_state", &self.tx.state)
            .field("tx_cmds", &self.tx.cmds.len())
            .finish_non_exhaustive()
    }
}

impl Db {
    /// Open a connection.
    ///
    /// Fails fast when the read cache is requested on a writable handle,
    /// and, for CONFIG_DB, when the init indicator is configured but not 1.
    pub fn open(
        opts: Options,
        backend: Box<dyn Backend>,
        validator: Arc<dyn ValidationEngine>,
    ) -> Result<Self, Error> {
        if opts.enable_on_change && !opts.write_disabled {
            error!(db = %opts.db, "on-change cache requested on write-enabled connection");
            return Err(DbError::CacheOnWritable.into());
        }

        if opts.db == DbNum::ConfigDb
            && let Some(indicator) = opts.init_indicator.as_deref()
            && !indicator.is_empty()
        {
            let value = backend.get(indicator)?;
            if value.as_deref().map(str::trim) != Some("1") {
                error!(db = %opts.db, indicator, "database not initialized");
                return Err(DbError::NotInitialized {
                    indicator: indicator.to_string(),
                }
                .into());
            }
        }

        debug!(db = %opts.db, "database connection opened");

        Ok(Self {
            codec: KeyCodec::new(opts.table_separator.clone(), opts.key_separator.clone()),
            opts,
            backend: Some(backend),
            validator,
            tx: tx::TxContext::default(),
            cache: RefCell::new(ReadCache::default()),
        })
    }

    /// Open a connection on an in-memory store.
    pub fn open_memory(
        store: &MemoryStore,
        opts: Options,
        validator: Arc<dyn ValidationEngine>,
    ) -> Result<Self, Error> {
        let backend = Box::new(store.connect(opts.db));
        Self::open(opts, backend, validator)
    }

    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.opts
    }

    #[must_use]
    pub const fn db_num(&self) -> DbNum {
        self.opts.db
    }

    #[must_use]
    pub const fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// Close the connection; later calls fail with ConnectionUnavailable.
    pub fn close(&mut self) {
        if self.tx.state != TxState::None {
            warn!(db = %self.opts.db, state = %self.tx.state, "closing connection with open transaction");
            self.tx.reset();
        }
        self.backend = None;
    }

    fn backend(&self) -> Result<&dyn Backend, DbError> {
        self.backend.as_deref().ok_or(DbError::ConnectionUnavailable)
    }

    fn backend_mut(&mut self) -> Result<&mut (dyn Backend + 'static), DbError> {
        self.backend.as_deref_mut().ok_or(DbError::ConnectionUnavailable)
    }

    /// Physical key for a row.
    #[must_use]
    pub fn physical_key(&self, ts: &TableSpec, key: &Key) -> String {
        self.codec.encode(ts, key)
    }

    /// Enable the read cache for `table`. Only effective on handles opened
    /// with the on-change option.
    pub fn register_cache_table(&mut self, table: &str) {
        if self.opts.enable_on_change {
            self.cache.get_mut().register(table);
        } else {
            warn!(table, "read cache not enabled on this connection");
        }
    }

    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.cache.borrow().len()
    }

    //
    // Reads
    //

    pub fn get_entry(&self, ts: &TableSpec, key: &Key) -> Result<Value, Error> {
        self.read_entry(ts, key, false)
    }

    /// Read a row, bypassing the read cache.
    pub fn get_entry_fresh(&self, ts: &TableSpec, key: &Key) -> Result<Value, Error> {
        self.read_entry(ts, key, true)
    }

    fn read_entry(&self, ts: &TableSpec, key: &Key, force: bool) -> Result<Value, Error> {
        let backend = self.backend()?;
        let physical = self.codec.encode(ts, key);
        let use_cache = self.opts.enable_on_change && self.cache.borrow().is_cached(&ts.name);

        if !force
            && use_cache
            && let Some(value) = self.cache.borrow().get(&ts.name, &physical)
        {
            return Ok(value);
        }

        let value = Value::from_map(backend.hgetall(&physical)?);
        if !value.is_populated() {
            debug!(key = %physical, "entry does not exist");
            return Err(Error::store_not_found(physical));
        }

        if use_cache {
            self.cache.borrow_mut().put(&ts.name, &physical, &value);
        }

        Ok(value)
    }

    pub fn get_keys(&self, ts: &TableSpec) -> Result<Vec<Key>, Error> {
        self.get_keys_pattern(ts, &Key::any())
    }

    /// Keys whose components match the per-component globs of `pattern`.
    pub fn get_keys_pattern(&self, ts: &TableSpec, pattern: &Key) -> Result<Vec<Key>, Error> {
        let raw = self.backend()?.keys(&self.codec.encode(ts, pattern))?;

        Ok(raw.iter().map(|k| self.codec.decode(ts, k)).collect())
    }

    /// Keys matching a single glob over the table-local key string.
    pub fn get_keys_by_pattern(&self, ts: &TableSpec, pattern: &str) -> Result<Vec<Key>, Error> {
        self.get_keys_pattern(ts, &Key::single(pattern))
    }

    /// Materialise every row of a table; unreadable rows are skipped.
    pub fn get_table(&self, ts: &TableSpec) -> Result<Table, Error> {
        let mut table = Table::new(ts.clone(), self.codec.clone());

        for key in self.get_keys(ts)? {
            match self.get_entry(ts, &key) {
                Ok(value) => table.insert(&key, value),
                Err(err) => warn!(table = %ts, key = %key, error = %err, "get_table: skipping row"),
            }
        }

        Ok(table)
    }

    //
    // Writes
    //

    pub fn create_entry(&mut self, ts: &TableSpec, key: &Key, value: &Value) -> Result<(), Error> {
        self.set_entry_inner(ts, key, value, true)
    }

    /// Replace the row's fields with exactly `value`.
    pub fn set_entry(&mut self, ts: &TableSpec, key: &Key, value: &Value) -> Result<(), Error> {
        self.set_entry_inner(ts, key, value, false)
    }

    fn set_entry_inner(
        &mut self,
        ts: &TableSpec,
        key: &Key,
        value: &Value,
        is_create: bool,
    ) -> Result<(), Error> {
        self.ensure_writable()?;

        if !value.is_populated() {
            return self.delete_unless_protected(ts, key, "set_entry");
        }

        let current = if is_create {
            None
        } else {
            match self.get_entry(ts, key) {
                Ok(current) => Some(current),
                Err(err) if err.is_not_found() => None,
                Err(err) => return Err(err),
            }
        };

        let complement = current
            .as_ref()
            .map(|cur| cur.complement(value))
            .unwrap_or_default();

        if current.is_some() {
            if complement.is_populated() {
                self.do_cvl(ts, key, &[(CvlOp::Update, value), (CvlOp::Delete, &complement)])?;
            } else {
                self.do_cvl(ts, key, &[(CvlOp::Update, value)])?;
            }
        } else {
            self.do_cvl(ts, key, &[(CvlOp::Create, value)])?;
        }

        self.do_write(ts, TxOp::HmSet, key, value.clone())?;
        if complement.is_populated() {
            self.do_write(ts, TxOp::HDel, key, complement)?;
        }

        Ok(())
    }

    /// Merge `value` into the row, leaving other fields untouched.
    pub fn mod_entry(&mut self, ts: &TableSpec, key: &Key, value: &Value) -> Result<(), Error> {
        self.ensure_writable()?;

        if !value.is_populated() {
            return self.delete_unless_protected(ts, key, "mod_entry");
        }

        self.do_cvl(ts, key, &[(CvlOp::Update, value)])?;
        self.do_write(ts, TxOp::HmSet, key, value.clone())
    }

    pub fn delete_entry(&mut self, ts: &TableSpec, key: &Key) -> Result<(), Error> {
        self.ensure_writable()?;
        self.do_cvl(ts, key, &[(CvlOp::Delete, &Value::new())])?;
        self.do_write(ts, TxOp::Del, key, Value::new())
    }

    /// Remove the fields named in `value` from the row.
    pub fn delete_entry_fields(
        &mut self,
        ts: &TableSpec,
        key: &Key,
        value: &Value,
    ) -> Result<(), Error> {
        self.ensure_writable()?;
        self.do_cvl(ts, key, &[(CvlOp::Delete, value)])?;
        self.do_write(ts, TxOp::HDel, key, value.clone())
    }

    /// Delete every row matching `pattern`. A failing row is logged and the
    /// rest are still attempted; the first failure is returned.
    pub fn delete_keys(&mut self, ts: &TableSpec, pattern: &Key) -> Result<(), Error> {
        let mut first_err = None;

        for key in self.get_keys_pattern(ts, pattern)? {
            if let Err(err) = self.delete_entry(ts, &key) {
                warn!(table = %ts, key = %key, error = %err, "delete_keys: row delete failed");
                first_err.get_or_insert(err);
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    /// Delete every row of the table, stopping at the first failure.
    pub fn delete_table(&mut self, ts: &TableSpec) -> Result<(), Error> {
        for key in self.get_keys(ts)? {
            self.delete_entry(ts, &key).inspect_err(|err| {
                warn!(table = %ts, key = %key, error = %err, "delete_table: stopping");
            })?;
        }

        Ok(())
    }

    pub fn publish(&self, channel: &str, message: &str) -> Result<usize, Error> {
        Ok(self.backend()?.publish(channel, message)?)
    }

    fn delete_unless_protected(&mut self, ts: &TableSpec, key: &Key, op: &str) -> Result<(), Error> {
        if ts.no_delete {
            debug!(table = %ts, key = %key, op, "no_delete set, keeping empty row");
            Ok(())
        } else {
            debug!(table = %ts, key = %key, op, "empty value maps to delete");
            self.delete_entry(ts, key)
        }
    }

    fn ensure_writable(&self) -> Result<(), Error> {
        if self.opts.write_disabled {
            error!(db = %self.opts.db, "write attempted on read-only connection");
            return Err(DbError::WriteDisabled.into());
        }
        self.backend()?;

        Ok(())
    }

    // Validation hook: append, re-submit the whole list, pop on reject.
    fn do_cvl(&mut self, ts: &TableSpec, key: &Key, ops: &[(CvlOp, &Value)]) -> Result<(), Error> {
        if self.opts.disable_cvl_check {
            debug!("validation disabled, skipping");
            return Ok(());
        }
        if self.tx.state == TxState::None {
            debug!("no transaction, skipping validation");
            return Ok(());
        }

        let physical = self.codec.encode(ts, key);
        for (op, value) in ops {
            self.tx.edits.push(EditRecord::new(
                *op,
                physical.clone(),
                (*value).clone().into_map(),
            ));
        }

        let Some(session) = self.tx.session.as_mut() else {
            self.tx.edits.truncate(self.tx.edits.len() - ops.len());
            return Err(Error::store_internal("transaction has no validation session"));
        };

        let outcome = session.validate(&self.tx.edits);
        let len = self.tx.edits.len();

        if outcome.code.is_success() {
            for rec in &mut self.tx.edits[len - ops.len()..] {
                rec.vtype = ValidateType::None;
            }
            Ok(())
        } else {
            warn!(key = %physical, code = ?outcome.code, "validation rejected edit");
            self.tx.edits.truncate(len - ops.len());
            Err(Error::validation(ValidationFailure {
                code: outcome.code,
                info: outcome.info,
            }))
        }
    }

    fn do_write(&mut self, ts: &TableSpec, op: TxOp, key: &Key, value: Value) -> Result<(), Error> {
        if self.opts.write_disabled {
            return Err(DbError::WriteDisabled.into());
        }

        match self.tx.state {
            TxState::None => {}
            TxState::Watch => self.tx.state = TxState::Set,
            TxState::Set => {}
            TxState::MultiExec => {
                error!(state = %self.tx.state, "mutation issued during multi/exec");
                return Err(DbError::TxBadState(self.tx.state).into());
            }
        }

        if self.tx.state == TxState::None {
            let cmd = tx::command(&self.codec, ts, op, key, &value);
            debug!(key = %cmd.key(), ?op, "direct write");
            self.backend_mut()?.execute(cmd)?;
            return Ok(());
        }

        debug!(table = %ts, key = %key, ?op, "queued write");
        self.tx.cmds.push(TxCmd {
            ts: ts.clone(),
            op,
            key: key.clone(),
            value,
        });

        Ok(())
    }

    pub(crate) fn validator(&self) -> &Arc<dyn ValidationEngine> {
        &self.validator
    }
}
