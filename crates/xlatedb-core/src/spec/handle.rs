use super::{SpecInput, SpecSnapshot};
use crate::{db::cvl::ValidationEngine, error::Error};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

///
/// SpecHandle
///
/// Shared handle to the published snapshot. Readers load the current
/// `Arc` without locking; `reload` compiles a replacement first and only
/// then swaps it in, so a request never sees a half-built snapshot.
///

#[derive(Clone, Debug)]
pub struct SpecHandle {
    inner: Arc<ArcSwap<SpecSnapshot>>,
}

impl SpecHandle {
    #[must_use]
    pub fn new(snapshot: SpecSnapshot) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(snapshot)),
        }
    }

    /// Compile and publish in one step.
    pub fn compile(input: &SpecInput, engine: &dyn ValidationEngine) -> Result<Self, Error> {
        Ok(Self::new(SpecSnapshot::compile(input, engine)?))
    }

    /// Current snapshot; stays valid across concurrent reloads.
    #[must_use]
    pub fn load(&self) -> Arc<SpecSnapshot> {
        self.inner.load_full()
    }

    /// Compile `input` and swap it in. On failure the published snapshot
    /// is left untouched.
    pub fn reload(&self, input: &SpecInput, engine: &dyn ValidationEngine) -> Result<(), Error> {
        let next = SpecSnapshot::compile(input, engine)?;
        self.publish(next);

        Ok(())
    }

    pub fn publish(&self, snapshot: SpecSnapshot) {
        let paths = snapshot.yang.len();
        self.inner.store(Arc::new(snapshot));
        info!(yang_paths = paths, "schema snapshot published");
    }
}

impl Default for SpecHandle {
    fn default() -> Self {
        Self::new(SpecSnapshot::default())
    }
}
