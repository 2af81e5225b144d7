//! Structural validation of schema modules, run before compilation.

pub mod naming;

use crate::{
    Error,
    err,
    error::ErrorTree,
    node::{ModuleKind, NodeKind, SchemaModule, SchemaNode},
};

/// Validate a module set, wrapping failures as [`Error::Validation`].
pub fn validate(modules: &[SchemaModule]) -> Result<(), Error> {
    validate_modules(modules).map_err(Error::Validation)
}

/// Run full validation in a staged, deterministic order.
pub fn validate_modules(modules: &[SchemaModule]) -> Result<(), ErrorTree> {
    let mut errors = ErrorTree::new();

    // Phase 1: per-node structural invariants.
    for module in modules {
        errors.merge_route(module.name.clone(), validate_module(module));
    }

    // Phase 2: invariants that need the whole set.
    naming::validate_module_names(modules, &mut errors);

    errors.result()
}

fn validate_module(module: &SchemaModule) -> ErrorTree {
    let mut errs = ErrorTree::new();

    if module.name.is_empty() {
        err!(errs, "module name is empty");
    }

    for node in &module.nodes {
        if module.kind == ModuleKind::Store
            && !matches!(node.kind, NodeKind::Container | NodeKind::Rpc)
        {
            err!(
                errs,
                "store module top-level node '{}' must be a container or rpc, found {}",
                node.name,
                node.kind
            );
        }
    }

    naming::validate_sibling_names(&module.nodes, &mut errs);

    // Depth-first over (route, node, parent kind).
    let mut stack: Vec<(String, &SchemaNode, Option<NodeKind>)> = module
        .nodes
        .iter()
        .rev()
        .map(|n| (n.name.clone(), n, None))
        .collect();

    while let Some((route, node, parent)) = stack.pop() {
        let mut node_errs = ErrorTree::new();
        validate_node(node, parent, &mut node_errs);
        errs.merge_route(route.clone(), node_errs);

        for child in node.children.iter().rev() {
            stack.push((format!("{route}/{}", child.name), child, Some(node.kind)));
        }
    }

    errs
}

fn validate_node(node: &SchemaNode, parent: Option<NodeKind>, errs: &mut ErrorTree) {
    if node.name.is_empty() {
        err!(errs, "node name is empty");
    }

    match node.kind {
        NodeKind::Leaf | NodeKind::LeafList => {
            if !node.children.is_empty() {
                err!(errs, "{} '{}' cannot have children", node.kind, node.name);
            }
        }
        NodeKind::List => {
            if node.keys.is_empty() && !node.read_only {
                err!(errs, "config list '{}' declares no keys", node.name);
            }
            for key in &node.keys {
                match node.find_child(key) {
                    Some(leaf) if leaf.kind == NodeKind::Leaf => {}
                    Some(other) => err!(
                        errs,
                        "key '{key}' of list '{}' is a {}, expected leaf",
                        node.name,
                        other.kind
                    ),
                    None => err!(errs, "key '{key}' of list '{}' has no leaf", node.name),
                }
            }
        }
        NodeKind::Choice => {
            if let Some(bad) = node.children.iter().find(|c| c.kind != NodeKind::Case) {
                err!(
                    errs,
                    "choice '{}' may only contain cases, found {} '{}'",
                    node.name,
                    bad.kind,
                    bad.name
                );
            }
        }
        NodeKind::Case => {
            if parent != Some(NodeKind::Choice) {
                err!(errs, "case '{}' is not nested in a choice", node.name);
            }
        }
        NodeKind::Rpc => {
            if parent.is_some() {
                err!(errs, "rpc '{}' must be declared at module level", node.name);
            }
        }
        NodeKind::Container => {}
    }

    if !node.keys.is_empty() && node.kind != NodeKind::List {
        err!(errs, "{} '{}' cannot declare keys", node.kind, node.name);
    }

    if !node.kind.is_transparent() {
        naming::validate_sibling_names(&node.children, errs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::SchemaNode;

    #[test]
    fn list_key_must_name_a_leaf() {
        let module = SchemaModule::model("m").node(
            SchemaNode::container("top").child(
                SchemaNode::list("item", &["id"]).child(SchemaNode::leaf("name")),
            ),
        );

        let errs = validate_modules(&[module]).expect_err("missing key leaf should fail");
        let flat = errs.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].0, "m/top/item");
        assert!(flat[0].1.contains("key 'id'"));
    }

    #[test]
    fn read_only_list_may_be_keyless() {
        let module = SchemaModule::model("m").node(
            SchemaNode::container("top")
                .child(SchemaNode::list("counters", &[]).read_only().child(SchemaNode::leaf("v"))),
        );

        assert!(validate_modules(&[module]).is_ok());
    }

    #[test]
    fn case_outside_choice_is_rejected() {
        let module = SchemaModule::model("m")
            .node(SchemaNode::container("top").child(SchemaNode::case("c")));

        assert!(validate_modules(&[module]).is_err());
    }

    #[test]
    fn store_module_top_level_must_be_container() {
        let module = SchemaModule::store("sonic-x").node(SchemaNode::leaf("stray"));

        assert!(validate(&[module]).is_err());
    }
}
