use crate::{
    config::{DbConfig, DbNum, Options},
    db::{Db, cvl::ValidationEngine, memory::MemoryStore},
    error::{Error, ErrorClass, ErrorOrigin},
};
use std::{collections::BTreeMap, sync::Arc};

///
/// DbSet
///
/// The set of open connections a request works against, one per
/// logical database.
///

#[derive(Debug, Default)]
pub struct DbSet {
    dbs: BTreeMap<DbNum, Db>,
}

impl DbSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open one connection per database on a memory store, resolving
    /// separators from `config` when given.
    pub fn open_memory(
        store: &MemoryStore,
        dbs: &[DbNum],
        config: Option<&DbConfig>,
        validator: &Arc<dyn ValidationEngine>,
    ) -> Result<Self, Error> {
        let mut set = Self::new();
        for db in dbs {
            let mut opts = Options::new(*db);
            if let Some(cfg) = config {
                opts = opts.resolve(cfg);
            }
            set.insert(Db::open_memory(store, opts, Arc::clone(validator))?);
        }

        Ok(set)
    }

    pub fn insert(&mut self, db: Db) -> Option<Db> {
        self.dbs.insert(db.db_num(), db)
    }

    pub fn get(&self, num: DbNum) -> Result<&Db, Error> {
        self.dbs.get(&num).ok_or_else(|| missing(num))
    }

    pub fn get_mut(&mut self, num: DbNum) -> Result<&mut Db, Error> {
        self.dbs.get_mut(&num).ok_or_else(|| missing(num))
    }

    pub fn iter(&self) -> impl Iterator<Item = (DbNum, &Db)> {
        self.dbs.iter().map(|(k, v)| (*k, v))
    }

    pub fn close_all(&mut self) {
        for db in self.dbs.values_mut() {
            db.close();
        }
    }
}

fn missing(num: DbNum) -> Error {
    Error::new(
        ErrorClass::ConnectionUnavailable,
        ErrorOrigin::Store,
        format!("no connection for {num}"),
    )
}
