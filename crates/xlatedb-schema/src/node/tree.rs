use crate::{annotation::Annotation, node::NodeKind};
use serde::Serialize;
use std::collections::BTreeMap;

///
/// SchemaNode
///
/// One node of the annotated schema tree. `read_only` is the node's own
/// declaration; the compiler derives the effective value from ancestors.
///

#[derive(Clone, Debug, Serialize)]
pub struct SchemaNode {
    pub name: String,
    pub kind: NodeKind,
    pub keys: Vec<String>,
    pub default: Option<String>,
    pub read_only: bool,
    pub leafref: Vec<String>,
    pub annotations: BTreeMap<String, String>,
    pub children: Vec<Self>,
}

impl SchemaNode {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            keys: Vec::new(),
            default: None,
            read_only: false,
            leafref: Vec::new(),
            annotations: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn container(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Container)
    }

    #[must_use]
    pub fn list(name: impl Into<String>, keys: &[&str]) -> Self {
        let mut node = Self::new(name, NodeKind::List);
        node.keys = keys.iter().map(ToString::to_string).collect();
        node
    }

    #[must_use]
    pub fn leaf(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Leaf)
    }

    #[must_use]
    pub fn leaf_list(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::LeafList)
    }

    #[must_use]
    pub fn choice(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Choice)
    }

    #[must_use]
    pub fn case(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Case)
    }

    #[must_use]
    pub fn rpc(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Rpc)
    }

    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.children.extend(children);
        self
    }

    #[must_use]
    pub fn annotate(mut self, annotation: Annotation, value: impl Into<String>) -> Self {
        self.annotations
            .insert(annotation.as_str().to_string(), value.into());
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    #[must_use]
    pub fn leafref(mut self, path: impl Into<String>) -> Self {
        self.leafref.push(path.into());
        self
    }

    #[must_use]
    pub fn annotation(&self, annotation: Annotation) -> Option<&str> {
        self.annotations.get(annotation.as_str()).map(String::as_str)
    }

    /// Direct child by name; choice/case children are searched through.
    #[must_use]
    pub fn find_child(&self, name: &str) -> Option<&Self> {
        let mut stack: Vec<&Self> = self.children.iter().rev().collect();

        while let Some(node) = stack.pop() {
            if node.kind.is_transparent() {
                stack.extend(node.children.iter().rev());
            } else if node.name == name {
                return Some(node);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_child_looks_through_choice_and_case() {
        let node = SchemaNode::container("config").child(
            SchemaNode::choice("addr").child(
                SchemaNode::case("v4").child(SchemaNode::leaf("ipv4")),
            ),
        );

        assert!(node.find_child("ipv4").is_some());
        assert!(node.find_child("addr").is_none());
    }
}
