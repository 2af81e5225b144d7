use super::SpecSnapshot;
use serde_json::{Value as JsonValue, json};

impl SpecSnapshot {
    /// Dump the compiled maps for diagnostics.
    ///
    /// The shape is informational and may change between releases.
    #[must_use]
    pub fn export(&self) -> JsonValue {
        json!({
            "yang": self.yang,
            "db": self.db,
            "table_order": self.seq,
            "yang_rpc": self.yang_rpc,
            "db_rpc": self.db_rpc,
            "module_hooks": self.hooks,
            "models": self.models,
            "diagnostics": self.diagnostics,
        })
    }
}
