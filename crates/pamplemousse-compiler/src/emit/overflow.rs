//! Local-variable overflow packing (§4.8, C9).
//!
//! Lua gives a function 200 registers; every input parameter and
//! every `local` the emitter writes consumes one. A large scorecard or
//! segmentation can declare more locals than that comfortably allows,
//! so once the running count crosses [`LOCAL_VARIABLE_BUDGET`], every
//! further `Declaration` is redirected into a single `overflow` table
//! local instead of a fresh register: `overflow[7] = ...` instead of
//! `local tmp_7 = ...`. The budget sits well under the real 200-local
//! ceiling to leave headroom for whatever locals the surrounding
//! script (loop counters, `pcall` wrappers) introduces outside this
//! function.

use pamplemousse_core::{AstKind, AstNode, ConversionContext, FieldRef};

const LOCAL_VARIABLE_BUDGET: usize = 180;

/// Walks every `Declaration` in emission order and assigns an overflow
/// slot to each one past the budget. Returns the overflowed fields in
/// slot order, so the caller can size the `overflow` table up front
/// (not load-bearing for correctness, since Lua tables grow on their
/// own, but useful for a `table.create`-style pre-size hint if the
/// target runtime supports one).
pub fn assign_overflow_slots(root: &AstNode, ctx: &ConversionContext, budget: Option<usize>) -> Vec<FieldRef> {
    let mut count = ctx.inputs().count();
    let budget = budget.unwrap_or(LOCAL_VARIABLE_BUDGET);
    let mut overflowed = Vec::new();
    visit_declarations(root, &mut |field: &FieldRef| {
        if count < budget {
            count += 1;
            return;
        }
        if field.overflow_slot().is_none() {
            field.set_overflow_slot(overflowed.len() as u32);
            overflowed.push(field.clone());
        }
    });
    overflowed
}

fn visit_declarations(node: &AstNode, visit: &mut impl FnMut(&FieldRef)) {
    if let AstKind::Declaration { field, .. } = &node.kind {
        visit(field);
    }
    for child in node.children() {
        visit_declarations(child, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pamplemousse_core::{AstBuilder, Catalogue, DataField, FieldOrigin, Literal, OpType, ValueType};

    use crate::diagnostics::Diagnostics;

    #[test]
    fn declarations_within_budget_get_no_overflow_slot() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let field = ctx.declare("x", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Temporary).unwrap();

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        builder.push_constant(Literal::Number(1.0));
        builder.declare(field.clone());
        let root = builder.finish();

        let overflowed = assign_overflow_slots(&root, &ctx, Some(180));
        assert!(overflowed.is_empty());
        assert_eq!(field.overflow_slot(), None);
    }

    #[test]
    fn declarations_past_a_tiny_budget_get_sequential_overflow_slots() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let a = ctx.declare("a", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Temporary).unwrap();
        let b = ctx.declare("b", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Temporary).unwrap();

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        builder.push_constant(Literal::Number(1.0));
        builder.declare(a.clone());
        let first = builder.pop_node();
        builder.push_constant(Literal::Number(2.0));
        builder.declare(b.clone());
        let second = builder.pop_node();
        builder.push_node(first);
        builder.push_node(second);
        builder.push_block(2);
        let root = builder.finish();

        let overflowed = assign_overflow_slots(&root, &ctx, Some(0));
        assert_eq!(overflowed.len(), 2);
        assert_eq!(a.overflow_slot(), Some(0));
        assert_eq!(b.overflow_slot(), Some(1));
    }
}
