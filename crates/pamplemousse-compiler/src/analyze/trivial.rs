//! `checkIfTrivial` (§4.6): folds a boolean-typed node to a statically
//! known truth value where possible.

use pamplemousse_core::{AstKind, AstNode, Catalogue, Literal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trivial {
    AlwaysTrue,
    AlwaysFalse,
    RuntimeEvaluationNeeded,
}

/// Only constants and `and`/`or`/`not` chains over constants fold; a
/// single non-trivial operand makes the whole expression non-trivial,
/// not just that operand's contribution.
pub fn check_if_trivial(node: &AstNode, catalogue: &Catalogue) -> Trivial {
    match &node.kind {
        AstKind::Constant(Literal::Bool(true)) => Trivial::AlwaysTrue,
        AstKind::Constant(Literal::Bool(false)) => Trivial::AlwaysFalse,
        AstKind::FunctionCall { function, args } => {
            let name = catalogue.get(*function).name;
            match name {
                "not" => match check_if_trivial(&args[0], catalogue) {
                    Trivial::AlwaysTrue => Trivial::AlwaysFalse,
                    Trivial::AlwaysFalse => Trivial::AlwaysTrue,
                    Trivial::RuntimeEvaluationNeeded => Trivial::RuntimeEvaluationNeeded,
                },
                "and" => fold_variadic(args, catalogue, Trivial::AlwaysFalse, Trivial::AlwaysTrue),
                "or" => fold_variadic(args, catalogue, Trivial::AlwaysTrue, Trivial::AlwaysFalse),
                _ => Trivial::RuntimeEvaluationNeeded,
            }
        }
        _ => Trivial::RuntimeEvaluationNeeded,
    }
}

/// Shared fold for `and`/`or`: `short_circuit` is the value that decides
/// the whole expression the instant any operand has it (`AlwaysFalse` for
/// `and`, `AlwaysTrue` for `or`); `identity` is dropped silently.
fn fold_variadic(args: &[AstNode], catalogue: &Catalogue, short_circuit: Trivial, identity: Trivial) -> Trivial {
    let mut saw_runtime = false;
    for arg in args {
        match check_if_trivial(arg, catalogue) {
            t if t == short_circuit => return short_circuit,
            t if t == identity => continue,
            Trivial::RuntimeEvaluationNeeded => saw_runtime = true,
            _ => unreachable!(),
        }
    }
    if saw_runtime { Trivial::RuntimeEvaluationNeeded } else { identity }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pamplemousse_core::{AstNode, ValueType};

    #[test]
    fn bool_constants_fold_directly() {
        let catalogue = Catalogue::standard();
        assert_eq!(check_if_trivial(&AstNode::constant(Literal::Bool(true)), &catalogue), Trivial::AlwaysTrue);
        assert_eq!(check_if_trivial(&AstNode::constant(Literal::Bool(false)), &catalogue), Trivial::AlwaysFalse);
    }

    #[test]
    fn and_with_a_false_operand_is_always_false_even_with_a_runtime_operand() {
        let catalogue = Catalogue::standard();
        let id = catalogue.id_of("and").unwrap();
        let runtime = AstNode::new(AstKind::FieldRef(dummy_field()), ValueType::Bool);
        let node = AstNode::new(
            AstKind::FunctionCall { function: id, args: vec![runtime, AstNode::constant(Literal::Bool(false))] },
            ValueType::Bool,
        );
        assert_eq!(check_if_trivial(&node, &catalogue), Trivial::AlwaysFalse);
    }

    #[test]
    fn or_with_only_runtime_operands_is_not_trivial() {
        let catalogue = Catalogue::standard();
        let id = catalogue.id_of("or").unwrap();
        let node = AstNode::new(
            AstKind::FunctionCall {
                function: id,
                args: vec![AstNode::new(AstKind::FieldRef(dummy_field()), ValueType::Bool)],
            },
            ValueType::Bool,
        );
        assert_eq!(check_if_trivial(&node, &catalogue), Trivial::RuntimeEvaluationNeeded);
    }

    fn dummy_field() -> pamplemousse_core::FieldRef {
        use pamplemousse_core::{ConversionContext, DataField, FieldOrigin, OpType};
        let mut ctx = ConversionContext::new(false);
        ctx.declare("b", DataField::new(ValueType::Bool, OpType::Categorical), FieldOrigin::Temporary).unwrap()
    }
}
