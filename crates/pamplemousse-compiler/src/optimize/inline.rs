//! Dead-declaration removal and single-use local inlining (§4.7 passes 3–4).

use std::collections::HashMap;

use pamplemousse_core::{AstKind, AstNode};

/// Drop `Declaration` statements whose bound field is never read anywhere
/// in the tree. Safe to call repeatedly: removing one declaration can
/// make another dead (if its initializer was the only remaining read of
/// some field), which the next outer fixed-point iteration picks up.
pub fn remove_dead_declarations(root: &mut AstNode) -> bool {
    let mut counts = HashMap::new();
    count_reads(root, &mut counts);
    remove_dead(root, &counts)
}

fn count_reads(node: &AstNode, counts: &mut HashMap<u32, usize>) {
    if let AstKind::FieldRef(field) = &node.kind {
        *counts.entry(field.id).or_insert(0) += 1;
    }
    for child in node.children() {
        count_reads(child, counts);
    }
}

fn remove_dead(node: &mut AstNode, counts: &HashMap<u32, usize>) -> bool {
    let mut changed = false;
    if let AstKind::Block(stmts) = &mut node.kind {
        let before = stmts.len();
        stmts.retain(|stmt| match &stmt.kind {
            AstKind::Declaration { field, .. } => counts.get(&field.id).copied().unwrap_or(0) > 0,
            _ => true,
        });
        if stmts.len() != before {
            changed = true;
        }
    }
    for child in node.children_mut() {
        changed |= remove_dead(child, counts);
    }
    changed
}

/// A declaration read exactly once, whose initializer is a bare constant
/// or field reference, gets substituted at its one use site and the
/// declaration dropped. Anything costlier (a function call) is left
/// declared — duplicating it could change the emitted program's cost or,
/// for a call with side effects on an overflow slot, its behaviour.
pub fn inline_single_use_locals(root: &mut AstNode) -> bool {
    let mut counts = HashMap::new();
    count_reads(root, &mut counts);

    let mut candidates = Vec::new();
    collect_candidates(root, &counts, &mut candidates);

    let mut changed = false;
    for (field_id, value) in candidates {
        if replace_one_field_ref(root, field_id, &value) {
            remove_one_declaration(root, field_id);
            changed = true;
        }
    }
    changed
}

fn is_cheap(node: &AstNode) -> bool {
    matches!(node.kind, AstKind::Constant(_) | AstKind::FieldRef(_))
}

fn collect_candidates(node: &AstNode, counts: &HashMap<u32, usize>, out: &mut Vec<(u32, AstNode)>) {
    if let AstKind::Block(stmts) = &node.kind {
        for stmt in stmts {
            if let AstKind::Declaration { field, value } = &stmt.kind {
                if is_cheap(value) && counts.get(&field.id).copied().unwrap_or(0) == 1 {
                    out.push((field.id, value.as_ref().clone()));
                }
            }
        }
    }
    for child in node.children() {
        collect_candidates(child, counts, out);
    }
}

fn replace_one_field_ref(node: &mut AstNode, field_id: u32, replacement: &AstNode) -> bool {
    if let AstKind::FieldRef(field) = &node.kind {
        if field.id == field_id {
            *node = replacement.clone();
            return true;
        }
    }
    for child in node.children_mut() {
        if replace_one_field_ref(child, field_id, replacement) {
            return true;
        }
    }
    false
}

fn remove_one_declaration(node: &mut AstNode, field_id: u32) -> bool {
    if let AstKind::Block(stmts) = &mut node.kind {
        let position = stmts.iter().position(|stmt| matches!(&stmt.kind, AstKind::Declaration { field, .. } if field.id == field_id));
        if let Some(position) = position {
            stmts.remove(position);
            return true;
        }
    }
    for child in node.children_mut() {
        if remove_one_declaration(child, field_id) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pamplemousse_core::{ConversionContext, DataField, FieldOrigin, Literal, OpType, ValueType};

    #[test]
    fn drops_a_declaration_with_no_reads() {
        let mut ctx = ConversionContext::new(false);
        let field = ctx.declare("x", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Temporary).unwrap();
        let mut root = AstNode::statement(AstKind::Block(vec![
            AstNode::statement(AstKind::Declaration { field, value: Box::new(AstNode::constant(Literal::Number(1.0))) }),
            AstNode::constant(Literal::Number(2.0)),
        ]));
        assert!(remove_dead_declarations(&mut root));
        match &root.kind {
            AstKind::Block(stmts) => assert_eq!(stmts.len(), 1),
            _ => panic!("expected a Block node"),
        }
    }

    #[test]
    fn inlines_a_single_use_constant_declaration() {
        let mut ctx = ConversionContext::new(false);
        let field = ctx.declare("x", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Temporary).unwrap();
        let mut root = AstNode::statement(AstKind::Block(vec![
            AstNode::statement(AstKind::Declaration { field: field.clone(), value: Box::new(AstNode::constant(Literal::Number(7.0))) }),
            AstNode::field_ref(field),
        ]));
        assert!(inline_single_use_locals(&mut root));
        match &root.kind {
            AstKind::Block(stmts) => {
                assert_eq!(stmts.len(), 1);
                assert!(matches!(stmts[0].kind, AstKind::Constant(Literal::Number(n)) if n == 7.0));
            }
            _ => panic!("expected a Block node"),
        }
    }
}
