//! Default-value fusion and block flattening (§4.7 passes 5–6).

use pamplemousse_core::{AstKind, AstNode, Catalogue, Literal};

use crate::analyze::{Assertions, might_be_missing};

/// `default(default(x, a), b)` collapses to `default(x, a)` once `a` is
/// statically known non-missing — `b` can never be reached. Conservative:
/// leaves the chain alone whenever `mightBeMissing` can't rule `a` out.
pub fn fuse_default_values(node: &mut AstNode, catalogue: &Catalogue) -> bool {
    let mut changed = false;
    for child in node.children_mut() {
        changed |= fuse_default_values(child, catalogue);
    }

    let should_fuse = match &node.kind {
        AstKind::DefaultValue { value, .. } => match &value.kind {
            AstKind::DefaultValue { default: inner_default, .. } => {
                !might_be_missing(inner_default, catalogue, &Assertions::new())
            }
            _ => false,
        },
        _ => false,
    };

    if should_fuse {
        if let AstKind::DefaultValue { value, .. } = std::mem::replace(&mut node.kind, AstKind::Constant(Literal::Invalid)) {
            *node = *value;
        }
        changed = true;
    }
    changed
}

/// A `Block` containing a nested `Block` splices the inner statements in
/// directly. Sound because `Block` carries no scope of its own here —
/// lexical scoping lives entirely in the symbol table closed before
/// optimisation runs, not in the emitted `do ... end` nesting.
pub fn flatten_blocks(node: &mut AstNode) -> bool {
    let mut changed = false;
    for child in node.children_mut() {
        changed |= flatten_blocks(child);
    }

    if let AstKind::Block(stmts) = &mut node.kind {
        let mut flattened = Vec::with_capacity(stmts.len());
        for stmt in stmts.drain(..) {
            match stmt.kind {
                AstKind::Block(inner) => {
                    flattened.extend(inner);
                    changed = true;
                }
                _ => flattened.push(stmt),
            }
        }
        *stmts = flattened;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pamplemousse_core::{ConversionContext, DataField, FieldOrigin, OpType, ValueType};

    #[test]
    fn fuses_when_inner_default_is_statically_non_missing() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let field = ctx.declare("x", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Temporary).unwrap();
        let mut node = AstNode::new(
            AstKind::DefaultValue {
                value: Box::new(AstNode::new(
                    AstKind::DefaultValue {
                        value: Box::new(AstNode::field_ref(field)),
                        default: Box::new(AstNode::constant(Literal::Number(0.0))),
                    },
                    ValueType::Number,
                )),
                default: Box::new(AstNode::constant(Literal::Number(1.0))),
            },
            ValueType::Number,
        );
        assert!(fuse_default_values(&mut node, &catalogue));
        match &node.kind {
            AstKind::DefaultValue { default, .. } => {
                assert!(matches!(default.kind, AstKind::Constant(Literal::Number(n)) if n == 0.0));
            }
            _ => panic!("expected a DefaultValue node"),
        }
    }

    #[test]
    fn flattens_a_block_nested_in_a_block() {
        let inner = AstNode::statement(AstKind::Block(vec![AstNode::constant(Literal::Number(1.0)), AstNode::constant(Literal::Number(2.0))]));
        let mut outer = AstNode::statement(AstKind::Block(vec![inner, AstNode::constant(Literal::Number(3.0))]));
        assert!(flatten_blocks(&mut outer));
        match &outer.kind {
            AstKind::Block(stmts) => assert_eq!(stmts.len(), 3),
            _ => panic!("expected a Block node"),
        }
    }
}
