use crate::{
    err,
    error::ErrorTree,
    node::{SchemaModule, SchemaNode},
};
use std::collections::BTreeSet;

/// Module names must be unique across the set.
pub fn validate_module_names(modules: &[SchemaModule], errs: &mut ErrorTree) {
    let mut seen = BTreeSet::new();

    for module in modules {
        if !seen.insert(module.name.as_str()) {
            err!(errs, "duplicate module '{}'", module.name);
        }
    }
}

/// Sibling names must be unique once choice/case layers are flattened.
pub fn validate_sibling_names(children: &[SchemaNode], errs: &mut ErrorTree) {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<&SchemaNode> = children.iter().rev().collect();

    while let Some(node) = stack.pop() {
        if node.kind.is_transparent() {
            stack.extend(node.children.iter().rev());
            continue;
        }
        if !seen.insert(node.name.as_str()) {
            err!(errs, "duplicate sibling '{}'", node.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_through_case_are_detected() {
        let children = vec![
            SchemaNode::leaf("a"),
            SchemaNode::choice("c").child(SchemaNode::case("x").child(SchemaNode::leaf("a"))),
        ];
        let mut errs = ErrorTree::new();
        validate_sibling_names(&children, &mut errs);

        assert_eq!(errs.len(), 1);
    }
}
