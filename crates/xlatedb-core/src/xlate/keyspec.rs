use super::{Oper, Translator, context::Cx, sonic};
use crate::{
    config::DbNum,
    db::{DbSet, Key, TableSpec},
    error::Error,
    path::ModelPath,
    spec::YangXpathInfo,
};
use serde::Serialize;

///
/// KeySpecNode
///
/// One table to read: a single row when `key` is set, otherwise every row
/// that passes the parent-key containment filter.
///

#[derive(Clone, Debug, Serialize)]
pub struct KeySpecNode {
    pub db: DbNum,
    pub ts: TableSpec,
    pub key: Option<Key>,
    pub children: Vec<usize>,

    /// Rows are not correlated with the parent row by key containment.
    pub ignore_parent_key: bool,

    /// No table of its own; only the children are read.
    pub is_virtual: bool,

    /// Schema path of the node owning the rows.
    pub path: String,

    /// Key component count of the wanted rows in a multi-shape table.
    pub arity: Option<usize>,

    /// Row key a root's rows must contain.
    pub parent_key: Option<Key>,
}

///
/// KeySpecTree
///
/// Arena of [`KeySpecNode`]s; children refer to their nodes by index.
///

#[derive(Clone, Debug, Default, Serialize)]
pub struct KeySpecTree {
    nodes: Vec<KeySpecNode>,
    roots: Vec<usize>,
}

impl KeySpecTree {
    #[must_use]
    pub fn nodes(&self) -> &[KeySpecNode] {
        &self.nodes
    }

    #[must_use]
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    #[must_use]
    pub fn node(&self, idx: usize) -> Option<&KeySpecNode> {
        self.nodes.get(idx)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn add_root(&mut self, node: KeySpecNode) -> usize {
        let idx = self.push(node);
        self.roots.push(idx);
        idx
    }

    fn add_child(&mut self, parent: usize, node: KeySpecNode) -> usize {
        let idx = self.push(node);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(idx);
        }
        idx
    }

    fn push(&mut self, node: KeySpecNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

impl Translator {
    /// Tables and keys a read of `path` must fetch.
    pub fn key_specs(&self, dbs: &DbSet, path: &str) -> Result<KeySpecTree, Error> {
        let snap = self.spec.load();
        let uri = ModelPath::parse(path)?;
        let cx = Cx {
            snap: &snap,
            dbs,
            registry: &self.registry,
            oper: Oper::Get,
            uri: &uri,
        };

        match sonic::target(&snap, &uri)? {
            Some(target) => sonic::key_specs(&cx, &target),
            None => build(&cx),
        }
    }
}

/// Key specs of a model path: the row owner at or above the target, with
/// the row owners below the target as children.
pub(crate) fn build(cx: &Cx<'_>) -> Result<KeySpecTree, Error> {
    let uri = cx.uri;
    let target = uri.schema_path();
    let mut tree = KeySpecTree::default();

    let mut owner = None;
    for len in (1..=uri.len()).rev() {
        let prefix = uri.prefix(len);
        let info = cx.info(&prefix.schema_path())?;
        if cx.is_row_owner(info) || info.is_virtual() {
            owner = Some((prefix, info));
            break;
        }
    }

    let root = match owner {
        Some((prefix, info)) => {
            let node = owner_spec(cx, info, &prefix)?;
            tree.add_root(node)
        }
        None => tree.add_root(virtual_spec(&target)),
    };

    // Phase 2: row owners below the target
    let mut stack = vec![(root, target)];
    while let Some((parent, path)) = stack.pop() {
        let info = cx.info(&path)?;
        for child in &info.children {
            let child_info = cx.info(child)?;
            if cx.owns_subtree(child_info) {
                continue;
            }

            if cx.is_row_owner(child_info) || child_info.is_virtual() {
                let node = child_spec(cx, child_info, child)?;
                let idx = tree.add_child(parent, node);
                stack.push((idx, child.clone()));
            } else if child_info.kind.is_interior() {
                stack.push((parent, child.clone()));
            }
        }
    }

    Ok(tree)
}

fn virtual_spec(path: &str) -> KeySpecNode {
    KeySpecNode {
        db: DbNum::ConfigDb,
        ts: TableSpec::default(),
        key: None,
        children: Vec::new(),
        ignore_parent_key: false,
        is_virtual: true,
        path: path.to_string(),
        arity: None,
        parent_key: None,
    }
}

// the request names this owner, possibly with its keys
fn owner_spec(cx: &Cx<'_>, info: &YangXpathInfo, prefix: &ModelPath) -> Result<KeySpecNode, Error> {
    let path = prefix.schema_path();
    let Some(table) = cx.node_table(info, prefix)? else {
        return Ok(virtual_spec(&path));
    };

    let parent_row = cx.row_at(&prefix.prefix(prefix.len().saturating_sub(1)))?;
    let ignore_parent_key = Cx::ignores_parent_key(info);

    Ok(KeySpecNode {
        db: info.db,
        key: cx.derive_key(info, prefix, &table)?,
        children: Vec::new(),
        ignore_parent_key,
        is_virtual: false,
        path,
        arity: cx.arity(info, &table),
        parent_key: parent_row.filter(|_| !ignore_parent_key).map(|r| r.key),
        ts: TableSpec::new(table),
    })
}

// owners below the target are enumerated, except singleton rows
fn child_spec(cx: &Cx<'_>, info: &YangXpathInfo, path: &str) -> Result<KeySpecNode, Error> {
    let schema = ModelPath::parse(path)?;
    let Some(table) = cx.node_table(info, &schema)? else {
        return Ok(virtual_spec(path));
    };

    Ok(KeySpecNode {
        db: info.db,
        key: info.key_name.as_deref().map(Key::single),
        children: Vec::new(),
        ignore_parent_key: Cx::ignores_parent_key(info),
        is_virtual: false,
        path: path.to_string(),
        arity: cx.arity(info, &table),
        parent_key: None,
        ts: TableSpec::new(table),
    })
}
