use super::{Builder, DbInfo, DepTables, TableSeqInfo};
use crate::{
    config::DbNum,
    db::cvl::ValidationEngine,
    path::strip_predicates,
};
use tracing::debug;
use xlatedb_schema::{
    annotation::Annotation,
    node::{NodeKind, SchemaModule, SchemaNode},
};

impl Builder {
    /// Store-side pass over one store module.
    pub(super) fn store_module(&mut self, module: &SchemaModule, engine: &dyn ValidationEngine) {
        for top in &module.nodes {
            let top_path = module.top_path(&top.name);

            match top.kind {
                NodeKind::Rpc => {
                    self.db
                        .insert(top_path.clone(), DbInfo::new(&module.name, NodeKind::Rpc));
                    if let Some(cb) = top.annotation(Annotation::RpcCallback) {
                        self.db_rpc.insert(top_path, cb.to_string());
                    }
                }
                _ if module.is_store_root(top) => {
                    self.db
                        .insert(top_path, DbInfo::new(&module.name, top.kind));
                    for table in flatten(&top.children) {
                        self.store_table(&module.name, table);
                    }
                }
                _ => self.store_table(&module.name, top),
            }
        }

        self.fetch_ordering(&module.name, engine);
    }

    fn store_table(&mut self, module: &str, node: &SchemaNode) {
        if node.kind != NodeKind::Container {
            self.diag(&node.name, format!("store table must be a container, found {}", node.kind));
            return;
        }

        let table = node.name.clone();
        let mut info = DbInfo::new(module, NodeKind::Container);
        self.store_annotations(&table, node, &mut info);
        self.db.insert(table.clone(), info);

        for child in flatten(&node.children) {
            match child.kind {
                NodeKind::List => self.store_shape(module, &table, child),

                // singleton row keyed by the container name
                NodeKind::Container => {
                    self.store_shape(module, &table, child);
                    if let Some(shape) = self.db.get_mut(&format!("{table}/{}", child.name)) {
                        shape.key_name = Some(child.name.clone());
                    }
                }
                NodeKind::Leaf | NodeKind::LeafList => {
                    self.store_field(module, &table, child);
                }
                kind => self.diag(&table, format!("unexpected {kind} '{}' in table", child.name)),
            }
        }
    }

    fn store_shape(&mut self, module: &str, table: &str, node: &SchemaNode) {
        let shape_path = format!("{table}/{}", node.name);
        let mut shape = DbInfo::new(module, node.kind);
        shape.keys.clone_from(&node.keys);
        shape.key_xfmr = node
            .annotation(Annotation::KeyTransformer)
            .map(ToString::to_string);

        if node.kind == NodeKind::List && !node.keys.is_empty()
            && let Some(tbl) = self.db.get_mut(table)
        {
            tbl.lists.push(node.name.clone());
        }

        // fields may sit in nested containers of the row
        let mut stack: Vec<&SchemaNode> = node.children.iter().rev().collect();
        while let Some(child) = stack.pop() {
            match child.kind {
                NodeKind::Leaf | NodeKind::LeafList if node.keys.contains(&child.name) => {
                    self.store_field(module, table, child);
                    if let Some(key) = self.db.get_mut(&format!("{table}/{}", child.name)) {
                        key.is_key = true;
                    }
                }
                NodeKind::Leaf | NodeKind::LeafList => {
                    shape.fields.push(child.name.clone());
                    self.store_field(module, table, child);
                }
                _ => stack.extend(child.children.iter().rev()),
            }
        }

        self.db.insert(shape_path, shape);
    }

    fn store_field(&mut self, module: &str, table: &str, node: &SchemaNode) {
        let field_path = format!("{table}/{}", node.name);
        let mut info = DbInfo::new(module, node.kind);
        info.default.clone_from(&node.default);

        for target in &node.leafref {
            match leafref_target(target) {
                Some(resolved) => {
                    self.leafref_index
                        .entry(resolved.clone())
                        .or_default()
                        .push(field_path.clone());
                    info.leafrefs.push(resolved);
                }
                None => self.diag(&field_path, format!("unresolvable leafref '{target}'")),
            }
        }

        if let Some(xfmr) = node.annotation(Annotation::ValueTransformer) {
            info.value_xfmr = Some(xfmr.to_string());
            if let Some(tbl) = self.db.get_mut(table) {
                tbl.has_xfmr = true;
            }
        }

        self.db.insert(field_path, info);
    }

    fn store_annotations(&mut self, table: &str, node: &SchemaNode, info: &mut DbInfo) {
        for (key, value) in &node.annotations {
            match Annotation::from_key(key) {
                Some(Annotation::KeyName) => info.key_name = Some(value.clone()),
                Some(Annotation::KeyDelim | Annotation::KeyDelimiter) => {
                    info.delim = Some(value.clone());
                }
                Some(Annotation::CascadeDelete) => info.cascade_delete = is_enable(value),
                Some(Annotation::DbName) => match DbNum::from_name(value) {
                    Some(db) => info.db = db,
                    None => self.diag(table, format!("unknown db-name '{value}'")),
                },
                _ => debug!(table, annotation = %key, "store annotation ignored"),
            }
        }
    }

    /// Copy each referenced field's value transformer onto the fields that
    /// refer to it, unless they declare their own.
    pub(super) fn propagate_value_xfmrs(&mut self) {
        let index = std::mem::take(&mut self.leafref_index);

        for (target, referrers) in &index {
            let Some(xfmr) = self.db.get(target).and_then(|i| i.value_xfmr.clone()) else {
                continue;
            };

            for referrer in referrers {
                let Some(info) = self.db.get_mut(referrer) else {
                    continue;
                };
                if info.value_xfmr.is_some() {
                    continue;
                }
                info.value_xfmr = Some(xfmr.clone());

                let table = referrer.split('/').next().unwrap_or_default().to_string();
                if let Some(tbl) = self.db.get_mut(&table) {
                    tbl.has_xfmr = true;
                }
            }
        }

        self.leafref_index = index;
    }

    // one ordering query set per store module
    fn fetch_ordering(&mut self, module: &str, engine: &dyn ValidationEngine) {
        let mut seq = TableSeqInfo::default();

        match engine.ordered_tables(module) {
            Ok(tables) => seq.ordered = tables,
            Err(code) => {
                self.diag(module, format!("ordered table query failed: {code:?}"));
            }
        }

        for table in seq.ordered.clone() {
            let mut deps = DepTables::default();
            match engine.ordered_dep_tables(module, &table) {
                Ok(within) => deps.within_module = within,
                Err(code) => self.diag(&table, format!("dependent table query failed: {code:?}")),
            }
            match engine.cross_module_dep_tables(module, &table) {
                Ok(across) => deps.across_modules = across,
                Err(code) => {
                    self.diag(&table, format!("cross-module dependency query failed: {code:?}"));
                }
            }
            seq.deps.insert(table, deps);
        }

        self.seq.insert(module.to_string(), seq);
    }
}

/// Children with choice/case levels flattened away.
pub(super) fn flatten(nodes: &[SchemaNode]) -> Vec<&SchemaNode> {
    let mut out = Vec::new();
    let mut stack: Vec<&SchemaNode> = nodes.iter().rev().collect();

    while let Some(node) = stack.pop() {
        if node.kind.is_transparent() {
            stack.extend(node.children.iter().rev());
        } else {
            out.push(node);
        }
    }

    out
}

/// Resolve a leafref to `TABLE/field`.
///
/// Absolute paths name the table as the second element below the module
/// root; relative paths name it three elements from the end.
fn leafref_target(path: &str) -> Option<String> {
    if path.contains("..") {
        let parts: Vec<&str> = path
            .split('/')
            .map(|p| p.split('[').next().unwrap_or(p))
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() > 3 && parts[parts.len() - 3] != ".." {
            let table = parts[parts.len() - 3];
            let field = parts[parts.len() - 1];
            return Some(format!("{}/{}", strip_module(table), strip_module(field)));
        }
        return None;
    }

    let schema = strip_predicates(path).ok()?;
    let parts: Vec<&str> = schema.split('/').collect();
    if parts.len() < 4 {
        return None;
    }
    let table = parts[2];
    let field = parts[parts.len() - 1];

    Some(format!("{}/{}", strip_module(table), strip_module(field)))
}

fn strip_module(elem: &str) -> &str {
    elem.split_once(':').map_or(elem, |(_, n)| n)
}

fn is_enable(value: &str) -> bool {
    value.eq_ignore_ascii_case("enable")
}
