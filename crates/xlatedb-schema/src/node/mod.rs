mod module;
mod tree;

pub use module::{ModuleKind, SchemaModule};
pub use tree::SchemaNode;

use derive_more::Display;
use serde::Serialize;

///
/// NodeKind
///

#[remain::sorted]
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, Serialize)]
pub enum NodeKind {
    #[display("case")]
    Case,
    #[display("choice")]
    Choice,
    #[display("container")]
    Container,
    #[display("leaf")]
    Leaf,
    #[display("leaf-list")]
    LeafList,
    #[display("list")]
    List,
    #[display("rpc")]
    Rpc,
}

impl NodeKind {
    /// Choice and case nodes do not contribute a path element.
    #[must_use]
    pub const fn is_transparent(self) -> bool {
        matches!(self, Self::Choice | Self::Case)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Leaf | Self::LeafList)
    }

    /// Containers and lists count as non-terminal descendants.
    #[must_use]
    pub const fn is_interior(self) -> bool {
        matches!(self, Self::Container | Self::List)
    }
}
