//! Extension annotation vocabulary.
//!
//! Annotations arrive on schema nodes as raw `key → string` pairs; this
//! module names the keys the compiler understands.

use serde::Serialize;
use std::fmt;

///
/// Annotation
///

#[remain::sorted]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Annotation {
    CascadeDelete,
    DbKeyCount,
    DbName,
    FieldName,
    FieldTransformer,
    GetValidate,
    KeyDelim,
    KeyDelimiter,
    KeyName,
    KeyTransformer,
    PostTransformer,
    PreTransformer,
    RpcCallback,
    SubscribeMinInterval,
    SubtreeTransformer,
    TableName,
    TableOwner,
    TableTransformer,
    UseSelfKey,
    ValueTransformer,
    VirtualTable,
}

impl Annotation {
    pub const ALL: [Self; 21] = [
        Self::CascadeDelete,
        Self::DbKeyCount,
        Self::DbName,
        Self::FieldName,
        Self::FieldTransformer,
        Self::GetValidate,
        Self::KeyDelim,
        Self::KeyDelimiter,
        Self::KeyName,
        Self::KeyTransformer,
        Self::PostTransformer,
        Self::PreTransformer,
        Self::RpcCallback,
        Self::SubscribeMinInterval,
        Self::SubtreeTransformer,
        Self::TableName,
        Self::TableOwner,
        Self::TableTransformer,
        Self::UseSelfKey,
        Self::ValueTransformer,
        Self::VirtualTable,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CascadeDelete => "cascade-delete",
            Self::DbKeyCount => "db-key-count",
            Self::DbName => "db-name",
            Self::FieldName => "field-name",
            Self::FieldTransformer => "field-transformer",
            Self::GetValidate => "get-validate",
            Self::KeyDelim => "key-delim",
            Self::KeyDelimiter => "key-delimiter",
            Self::KeyName => "key-name",
            Self::KeyTransformer => "key-transformer",
            Self::PostTransformer => "post-transformer",
            Self::PreTransformer => "pre-transformer",
            Self::RpcCallback => "rpc-callback",
            Self::SubscribeMinInterval => "subscribe-min-interval",
            Self::SubtreeTransformer => "subtree-transformer",
            Self::TableName => "table-name",
            Self::TableOwner => "table-owner",
            Self::TableTransformer => "table-transformer",
            Self::UseSelfKey => "use-self-key",
            Self::ValueTransformer => "value-transformer",
            Self::VirtualTable => "virtual-table",
        }
    }

    /// Look up an annotation by its raw key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == key)
    }

    /// Annotations meaningful on store-side (table schema) modules.
    #[must_use]
    pub const fn is_store_side(self) -> bool {
        matches!(
            self,
            Self::CascadeDelete
                | Self::DbName
                | Self::KeyDelim
                | Self::KeyName
                | Self::KeyTransformer
                | Self::RpcCallback
                | Self::ValueTransformer
        )
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_through_lookup() {
        for annot in Annotation::ALL {
            assert_eq!(Annotation::from_key(annot.as_str()), Some(annot));
        }
        assert_eq!(Annotation::from_key("no-such-annotation"), None);
    }
}
