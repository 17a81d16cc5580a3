//! `mightBeMissing` (§4.6): a conservative predicate over the AST.
//!
//! Reads the missingness class off the catalogue entry a `FunctionCall`
//! invokes; statement-shaped and function-valued nodes never "might be
//! missing" in the value sense the optimiser cares about.

use pamplemousse_core::{AstKind, AstNode, Catalogue, Literal, MissingnessClass};

use super::Assertions;

/// Whether `node`'s runtime value might be the missing/invalid value,
/// given the fields already asserted non-missing in `assertions`.
pub fn might_be_missing(node: &AstNode, catalogue: &Catalogue, assertions: &Assertions) -> bool {
    match &node.kind {
        AstKind::FieldRef(field) => !assertions.is_asserted_non_missing(field.id),
        AstKind::Constant(Literal::Invalid) => true,
        AstKind::Constant(_) => false,
        AstKind::FunctionCall { function, args } => {
            let entry = catalogue.get(*function);
            match entry.missingness {
                MissingnessClass::NeverMissing => false,
                MissingnessClass::IsMissing | MissingnessClass::IsNotMissing => false,
                MissingnessClass::MissingIfAnyArgumentMissing => {
                    args.iter().any(|a| might_be_missing(a, catalogue, assertions))
                }
                MissingnessClass::MissingIfAllArgumentsMissing | MissingnessClass::SurrogateMacro => {
                    args.iter().all(|a| might_be_missing(a, catalogue, assertions))
                }
                MissingnessClass::DefaultValue => args.iter().all(|a| might_be_missing(a, catalogue, assertions)),
            }
        }
        AstKind::DefaultValue { value, default } => {
            might_be_missing(value, catalogue, assertions) && might_be_missing(default, catalogue, assertions)
        }
        // Table reads can't be reasoned about without tracking table
        // contents; conservatively assume they might be missing.
        AstKind::IndirectField { .. } => true,
        AstKind::Lambda { .. } => false,
        // Statement-shaped nodes carry `Void` and are never read as values.
        AstKind::Declaration { .. }
        | AstKind::Assignment { .. }
        | AstKind::IndirectAssignment { .. }
        | AstKind::Block(_)
        | AstKind::IfChain(_)
        | AstKind::Return(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pamplemousse_core::{AstNode, ConversionContext, DataField, FieldOrigin, OpType, ValueType};

    #[test]
    fn unasserted_field_might_be_missing() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let field = ctx.declare("x", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Temporary).unwrap();
        let node = AstNode::field_ref(field);
        let assertions = Assertions::new();
        assert!(might_be_missing(&node, &catalogue, &assertions));
    }

    #[test]
    fn asserted_field_is_not_missing() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let field = ctx.declare("x", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Temporary).unwrap();
        let node = AstNode::field_ref(field.clone());
        let mut assertions = Assertions::new();
        assertions.assert_non_missing(field.id);
        assert!(!might_be_missing(&node, &catalogue, &assertions));
    }

    #[test]
    fn literal_constant_is_never_missing() {
        let catalogue = Catalogue::standard();
        let node = AstNode::constant(Literal::Number(1.0));
        let assertions = Assertions::new();
        assert!(!might_be_missing(&node, &catalogue, &assertions));
    }

    #[test]
    fn never_missing_function_ignores_missing_arguments() {
        let catalogue = Catalogue::standard();
        let id = catalogue.id_of("isMissing").unwrap();
        let node = AstNode::new(
            AstKind::FunctionCall { function: id, args: vec![AstNode::constant(Literal::Invalid)] },
            ValueType::Bool,
        );
        let assertions = Assertions::new();
        assert!(!might_be_missing(&node, &catalogue, &assertions));
    }
}
