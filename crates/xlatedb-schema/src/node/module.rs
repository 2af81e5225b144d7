use crate::{
    MODULE_SEPARATOR, PATH_SEPARATOR,
    annotation::Annotation,
    node::SchemaNode,
};
use serde::Serialize;
use std::collections::BTreeMap;

///
/// ModuleKind
///
/// `Model` modules describe the northbound data model; `Store` modules
/// describe the flat table layout (one container per table).
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ModuleKind {
    Model,
    Store,
}

///
/// SchemaModule
///

#[derive(Clone, Debug, Serialize)]
pub struct SchemaModule {
    pub name: String,
    pub kind: ModuleKind,
    pub version: Option<String>,
    pub organization: Option<String>,
    pub annotations: BTreeMap<String, String>,
    pub nodes: Vec<SchemaNode>,
}

impl SchemaModule {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            name: name.into(),
            kind,
            version: None,
            organization: None,
            annotations: BTreeMap::new(),
            nodes: Vec::new(),
        }
    }

    #[must_use]
    pub fn model(name: impl Into<String>) -> Self {
        Self::new(name, ModuleKind::Model)
    }

    #[must_use]
    pub fn store(name: impl Into<String>) -> Self {
        Self::new(name, ModuleKind::Store)
    }

    /// Module revision, as advertised in model capabilities.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    #[must_use]
    pub fn node(mut self, node: SchemaNode) -> Self {
        self.nodes.push(node);
        self
    }

    #[must_use]
    pub fn annotate(mut self, annotation: Annotation, value: impl Into<String>) -> Self {
        self.annotations
            .insert(annotation.as_str().to_string(), value.into());
        self
    }

    #[must_use]
    pub fn annotation(&self, annotation: Annotation) -> Option<&str> {
        self.annotations.get(annotation.as_str()).map(String::as_str)
    }

    /// Path of a top-level node, e.g. `/openconfig-acl:acl`.
    #[must_use]
    pub fn top_path(&self, node: &str) -> String {
        format!("{PATH_SEPARATOR}{}{MODULE_SEPARATOR}{node}", self.name)
    }

    /// Store modules conventionally wrap their tables in a container named
    /// after the module.
    #[must_use]
    pub fn is_store_root(&self, node: &SchemaNode) -> bool {
        self.kind == ModuleKind::Store && node.name == self.name
    }
}
