//! In-process backend with store semantics, shared between connections.

use crate::{
    config::DbNum,
    db::{
        backend::{Backend, BackendError, Command},
        glob::glob_match,
    },
};
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    sync::{Arc, mpsc},
};
use tracing::debug;

#[derive(Clone, Debug, Eq, PartialEq)]
enum Entry {
    Hash(BTreeMap<String, String>),
    Str(String),
}

#[derive(Debug, Default)]
struct MemoryDb {
    data: BTreeMap<String, Entry>,
    // last-modified clock per key; deleted keys keep their version
    versions: BTreeMap<String, u64>,
    clock: u64,
}

impl MemoryDb {
    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.versions.insert(key.to_string(), self.clock);
    }

    fn apply(&mut self, cmd: Command) -> Result<(), BackendError> {
        match cmd {
            Command::HmSet { key, fields } => {
                if fields.is_empty() {
                    return Ok(());
                }
                let entry = self
                    .data
                    .entry(key.clone())
                    .or_insert_with(|| Entry::Hash(BTreeMap::new()));
                let Entry::Hash(map) = entry else {
                    return Err(BackendError::WrongType(key));
                };
                map.extend(fields);
                self.touch(&key);
            }
            Command::HDel { key, fields } => {
                let Some(entry) = self.data.get_mut(&key) else {
                    return Ok(());
                };
                let Entry::Hash(map) = entry else {
                    return Err(BackendError::WrongType(key));
                };
                let before = map.len();
                for f in &fields {
                    map.remove(f);
                }
                let changed = map.len() != before;
                if map.is_empty() {
                    self.data.remove(&key);
                }
                if changed {
                    self.touch(&key);
                }
            }
            Command::Del { key } => {
                if self.data.remove(&key).is_some() {
                    self.touch(&key);
                }
            }
            Command::Set { key, value } => {
                self.data.insert(key.clone(), Entry::Str(value));
                self.touch(&key);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    dbs: BTreeMap<DbNum, MemoryDb>,
    subscribers: BTreeMap<String, Vec<mpsc::Sender<String>>>,
}

///
/// MemoryStore
///
/// Cloneable handle to a shared in-memory store. Each connection sees the
/// same data; WATCH is emulated with per-key version counters.
///

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection to `db`.
    #[must_use]
    pub fn connect(&self, db: DbNum) -> MemoryConn {
        MemoryConn {
            store: self.clone(),
            db,
            watched: BTreeMap::new(),
            multi: None,
        }
    }

    /// Write a plain string key directly, bypassing any connection.
    pub fn set_string(&self, db: DbNum, key: &str, value: &str) {
        let mut state = self.inner.lock();
        let _ = state.dbs.entry(db).or_default().apply(Command::Set {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    /// Every hash row in `db`, keyed by physical key.
    #[must_use]
    pub fn dump(&self, db: DbNum) -> BTreeMap<String, BTreeMap<String, String>> {
        let state = self.inner.lock();
        state
            .dbs
            .get(&db)
            .map(|mdb| {
                mdb.data
                    .iter()
                    .filter_map(|(k, e)| match e {
                        Entry::Hash(map) => Some((k.clone(), map.clone())),
                        Entry::Str(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Plain string value at `key`, if any.
    #[must_use]
    pub fn string(&self, db: DbNum, key: &str) -> Option<String> {
        let state = self.inner.lock();
        match state.dbs.get(&db)?.data.get(key)? {
            Entry::Str(s) => Some(s.clone()),
            Entry::Hash(_) => None,
        }
    }

    /// Subscribe to a publish channel.
    #[must_use]
    pub fn subscribe(&self, channel: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel();
        self.inner
            .lock()
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .push(tx);

        rx
    }
}

///
/// MemoryConn
///

#[derive(Debug)]
pub struct MemoryConn {
    store: MemoryStore,
    db: DbNum,
    watched: BTreeMap<String, u64>,
    multi: Option<Vec<Command>>,
}

impl MemoryConn {
    fn with_db<R>(&self, f: impl FnOnce(&MemoryDb) -> R) -> Option<R> {
        let state = self.store.inner.lock();
        state.dbs.get(&self.db).map(f)
    }
}

impl Backend for MemoryConn {
    fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, BackendError> {
        match self.with_db(|db| db.data.get(key).cloned()).flatten() {
            None => Ok(BTreeMap::new()),
            Some(Entry::Hash(map)) => Ok(map),
            Some(Entry::Str(_)) => Err(BackendError::WrongType(key.to_string())),
        }
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        Ok(self
            .with_db(|db| {
                db.data
                    .keys()
                    .filter(|k| glob_match(pattern, k))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        match self.with_db(|db| db.data.get(key).cloned()).flatten() {
            None => Ok(None),
            Some(Entry::Str(s)) => Ok(Some(s)),
            Some(Entry::Hash(_)) => Err(BackendError::WrongType(key.to_string())),
        }
    }

    fn execute(&mut self, cmd: Command) -> Result<(), BackendError> {
        let mut state = self.store.inner.lock();
        state.dbs.entry(self.db).or_default().apply(cmd)
    }

    fn watch(&mut self, keys: &[String]) -> Result<(), BackendError> {
        let state = self.store.inner.lock();
        let db = state.dbs.get(&self.db);
        for key in keys {
            let version = db.map_or(0, |db| db.version(key));
            self.watched.entry(key.clone()).or_insert(version);
        }

        Ok(())
    }

    fn unwatch(&mut self) -> Result<(), BackendError> {
        self.watched.clear();
        Ok(())
    }

    fn multi(&mut self) -> Result<(), BackendError> {
        self.multi = Some(Vec::new());
        Ok(())
    }

    fn queue(&mut self, cmd: Command) -> Result<(), BackendError> {
        match self.multi.as_mut() {
            Some(queue) => {
                queue.push(cmd);
                Ok(())
            }
            None => Err(BackendError::NoMulti),
        }
    }

    fn exec(&mut self) -> Result<(), BackendError> {
        let queued = self.multi.take().ok_or(BackendError::NoMulti)?;
        let watched = std::mem::take(&mut self.watched);

        let mut state = self.store.inner.lock();
        let db = state.dbs.entry(self.db).or_default();

        if let Some((key, _)) = watched.iter().find(|(k, v)| db.version(k) != **v) {
            debug!(key = %key, "exec aborted by watched key");
            return Err(BackendError::WatchAborted);
        }

        // validate types before applying anything so exec stays atomic
        for cmd in &queued {
            let wrong = matches!(
                (cmd, db.data.get(cmd.key())),
                (Command::HmSet { .. } | Command::HDel { .. }, Some(Entry::Str(_)))
            );
            if wrong {
                return Err(BackendError::WrongType(cmd.key().to_string()));
            }
        }
        for cmd in queued {
            db.apply(cmd)?;
        }

        Ok(())
    }

    fn publish(&self, channel: &str, message: &str) -> Result<usize, BackendError> {
        let mut state = self.store.inner.lock();
        let Some(subs) = state.subscribers.get_mut(channel) else {
            return Ok(0);
        };
        subs.retain(|tx| tx.send(message.to_string()).is_ok());

        Ok(subs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hmset(key: &str, pairs: &[(&str, &str)]) -> Command {
        Command::HmSet {
            key: key.to_string(),
            fields: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn exec_aborts_when_watched_key_changes() {
        let store = MemoryStore::new();
        let mut a = store.connect(DbNum::ConfigDb);
        let mut b = store.connect(DbNum::ConfigDb);

        a.watch(&["T|k".to_string()]).unwrap();
        b.execute(hmset("T|k", &[("f", "b")])).unwrap();

        a.multi().unwrap();
        a.queue(hmset("T|k", &[("f", "a")])).unwrap();
        assert!(matches!(a.exec(), Err(BackendError::WatchAborted)));
        assert_eq!(a.hgetall("T|k").unwrap().get("f").map(String::as_str), Some("b"));
    }

    #[test]
    fn delete_then_recreate_still_conflicts() {
        let store = MemoryStore::new();
        let mut a = store.connect(DbNum::ConfigDb);
        let mut b = store.connect(DbNum::ConfigDb);
        b.execute(hmset("T|k", &[("f", "1")])).unwrap();

        a.watch(&["T|k".to_string()]).unwrap();
        b.execute(Command::Del { key: "T|k".to_string() }).unwrap();
        b.execute(hmset("T|k", &[("f", "1")])).unwrap();

        a.multi().unwrap();
        assert!(a.exec().is_err());
    }

    #[test]
    fn hdel_of_last_field_removes_row() {
        let store = MemoryStore::new();
        let mut c = store.connect(DbNum::ConfigDb);
        c.execute(hmset("T|k", &[("f", "1")])).unwrap();
        c.execute(Command::HDel {
            key: "T|k".to_string(),
            fields: vec!["f".to_string()],
        })
        .unwrap();

        assert!(c.keys("T|*").unwrap().is_empty());
    }

    #[test]
    fn publish_reaches_subscribers() {
        let store = MemoryStore::new();
        let rx = store.subscribe("chan");
        let c = store.connect(DbNum::ApplDb);

        assert_eq!(c.publish("chan", "hello").unwrap(), 1);
        assert_eq!(rx.recv().unwrap(), "hello");
        assert_eq!(c.publish("other", "x").unwrap(), 0);
    }
}
