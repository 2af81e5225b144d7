use super::{Translator, XlateError};
use crate::{
    db::DbSet,
    error::Error,
    path::strip_predicates,
    registry::{Xfmr, XfmrKind},
};
use tracing::{debug, info};

impl Translator {
    /// Invoke the callback bound to the RPC at `path` with the raw request
    /// body, returning its raw response.
    ///
    /// Model RPCs take precedence over store RPCs of the same path.
    pub fn call_rpc(&self, dbs: &mut DbSet, path: &str, body: &[u8]) -> Result<Vec<u8>, Error> {
        let snap = self.spec.load();
        let schema = strip_predicates(path)?;
        let name = snap
            .yang_rpc(&schema)
            .or_else(|| snap.db_rpc(&schema))
            .ok_or_else(|| XlateError::UnknownRpc(schema.clone()))?;

        let Some(Xfmr::Rpc(f)) = self.registry.lookup(name, XfmrKind::Rpc)? else {
            debug!(path, callback = name, "rpc callback not registered");
            return Ok(Vec::new());
        };
        info!(path, callback = name, bytes = body.len(), "rpc dispatched");

        f(body, dbs)
    }
}
