//! Predicate compilation (§4.4, C5).
//!
//! Covers the five predicate kinds a PMML document expresses: simple
//! comparison, simple set-membership, compound (`and`/`or`/`xor`), the
//! ordered-fallback surrogate, and the trivial `true`/`false`.

use pamplemousse_core::{AstBuilder, Catalogue, FieldRef, Literal};

/// Above this many category values, set-membership compiles to a constant
/// string-table plus one lookup instead of a chain of `==` comparisons
/// (§4.4 "Set-membership with large category lists").
const STRING_TABLE_THRESHOLD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleOperator {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    IsMissing,
    IsNotMissing,
}

impl SimpleOperator {
    fn catalogue_name(self) -> &'static str {
        match self {
            SimpleOperator::Equal => "==",
            SimpleOperator::NotEqual => "!=",
            SimpleOperator::LessThan => "<",
            SimpleOperator::LessOrEqual => "<=",
            SimpleOperator::GreaterThan => ">",
            SimpleOperator::GreaterOrEqual => ">=",
            SimpleOperator::IsMissing => "isMissing",
            SimpleOperator::IsNotMissing => "isNotMissing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOperator {
    And,
    Or,
    Xor,
}

impl CompoundOperator {
    fn catalogue_name(self) -> &'static str {
        match self {
            CompoundOperator::And => "and",
            CompoundOperator::Or => "or",
            CompoundOperator::Xor => "xor",
        }
    }
}

/// A predicate tree, built by a model compiler from its PMML `*Predicate`
/// element before being lowered into AST by [`compile`].
#[derive(Debug, Clone)]
pub enum Predicate {
    True,
    False,
    Simple {
        field: FieldRef,
        operator: SimpleOperator,
        value: Option<Literal>,
    },
    SetMembership {
        field: FieldRef,
        is_in: bool,
        values: Vec<String>,
    },
    Compound {
        operator: CompoundOperator,
        predicates: Vec<Predicate>,
    },
    /// Ordered fallback: the first predicate whose referenced fields are
    /// all non-missing decides the result.
    Surrogate(Vec<Predicate>),
}

/// Lower a predicate tree into a boolean-typed AST fragment, pushed onto
/// the builder's stack.
pub fn compile(builder: &mut AstBuilder<'_>, catalogue: &Catalogue, predicate: &Predicate, line: Option<u32>) {
    match predicate {
        Predicate::True => builder.push_constant(Literal::Bool(true)),
        Predicate::False => builder.push_constant(Literal::Bool(false)),
        Predicate::Simple { field, operator, value } => compile_simple(builder, catalogue, field, *operator, value.as_ref(), line),
        Predicate::SetMembership { field, is_in, values } => compile_set_membership(builder, catalogue, field, *is_in, values, line),
        Predicate::Compound { operator, predicates } => compile_compound(builder, catalogue, *operator, predicates, line),
        Predicate::Surrogate(predicates) => compile_surrogate(builder, catalogue, predicates, line),
    }
}

fn compile_simple(
    builder: &mut AstBuilder<'_>,
    catalogue: &Catalogue,
    field: &FieldRef,
    operator: SimpleOperator,
    value: Option<&Literal>,
    line: Option<u32>,
) {
    builder.push_field(field.clone());
    let name = operator.catalogue_name();
    let Some(id) = catalogue.id_of(name) else {
        builder.parsing_error(format!("internal-invariant: unknown predicate operator `{name}`"), line);
        return;
    };
    match operator {
        SimpleOperator::IsMissing | SimpleOperator::IsNotMissing => {
            builder.push_function_call(id, 1, line);
        }
        _ => {
            let Some(value) = value else {
                builder.parsing_error(format!("predicate operator `{name}` requires a value"), line);
                return;
            };
            builder.push_constant(value.clone());
            builder.push_function_call(id, 2, line);
        }
    }
}

/// Emits either a chain of `==`/`!=`-and-joined comparisons, or (above
/// [`STRING_TABLE_THRESHOLD`] values) a constant string-table plus a
/// single `tableIsIn` lookup (§4.4).
fn compile_set_membership(
    builder: &mut AstBuilder<'_>,
    catalogue: &Catalogue,
    field: &FieldRef,
    is_in: bool,
    values: &[String],
    line: Option<u32>,
) {
    if values.len() > STRING_TABLE_THRESHOLD {
        builder.push_constant(Literal::StringTable(values.to_vec()));
        builder.push_field(field.clone());
        let id = catalogue.id_of("tableIsIn").expect("tableIsIn registered");
        builder.push_function_call(id, 2, line);
        if !is_in {
            negate(builder, catalogue, line);
        }
        return;
    }

    let join_name = if is_in { "isIn" } else { "isNotIn" };
    builder.push_field(field.clone());
    for v in values {
        builder.push_constant(Literal::String(v.clone()));
    }
    let Some(id) = catalogue.id_of(join_name) else {
        builder.parsing_error(format!("internal-invariant: unknown set operator `{join_name}`"), line);
        return;
    };
    builder.push_function_call(id, values.len() + 1, line);
}

fn negate(builder: &mut AstBuilder<'_>, catalogue: &Catalogue, line: Option<u32>) {
    let id = catalogue.id_of("not").expect("not registered");
    builder.push_function_call(id, 1, line);
}

fn compile_compound(builder: &mut AstBuilder<'_>, catalogue: &Catalogue, operator: CompoundOperator, predicates: &[Predicate], line: Option<u32>) {
    if predicates.is_empty() {
        builder.parsing_error("compound predicate with no children", line);
        return;
    }
    compile(builder, catalogue, &predicates[0], line);
    let name = operator.catalogue_name();
    let Some(id) = catalogue.id_of(name) else {
        builder.parsing_error(format!("internal-invariant: unknown compound operator `{name}`"), line);
        return;
    };
    for rest in &predicates[1..] {
        compile(builder, catalogue, rest, line);
        builder.push_function_call(id, 2, line);
    }
}

/// Surrogates translate to `surrogate-macro` calls so the analyser can
/// recognise the "first non-missing wins" pattern rather than having to
/// re-derive it from a chain of `default`s (§4.4).
fn compile_surrogate(builder: &mut AstBuilder<'_>, catalogue: &Catalogue, predicates: &[Predicate], line: Option<u32>) {
    if predicates.is_empty() {
        builder.push_constant(Literal::Invalid);
        return;
    }
    for p in predicates {
        compile(builder, catalogue, p, line);
    }
    let id = catalogue.id_of("surrogate").expect("surrogate registered");
    builder.push_function_call(id, predicates.len(), line);
}

/// Whether this predicate statically evaluates without reading any field
/// (used by the root compiler to cheaply special-case always-taken
/// segments before the optimiser runs; see also the analyser's own
/// `checkIfTrivial`, which handles the general AST case).
pub fn is_trivially_true(predicate: &Predicate) -> bool {
    matches!(predicate, Predicate::True)
}

pub fn is_trivially_false(predicate: &Predicate) -> bool {
    matches!(predicate, Predicate::False)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use pamplemousse_core::{AstKind, ConversionContext, DataField, FieldOrigin, OpType, ValueType};

    fn number_field(ctx: &mut ConversionContext, name: &str) -> FieldRef {
        ctx.declare(name, DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap()
    }

    #[test]
    fn simple_equal_compiles_to_bool() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let field = number_field(&mut ctx, "age");
        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &catalogue, &Predicate::Simple { field, operator: SimpleOperator::Equal, value: Some(Literal::Number(30.0)) }, None);
        let node = builder.finish();
        assert_eq!(node.value_type, ValueType::Bool);
    }

    #[test]
    fn small_set_membership_uses_isin_join() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let field = ctx.declare("continent", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::DataDictionary).unwrap();
        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &catalogue, &Predicate::SetMembership { field, is_in: true, values: vec!["africa".into(), "asia".into()] }, None);
        let node = builder.finish();
        let AstKind::FunctionCall { function, .. } = &node.kind else { panic!("expected call") };
        assert_eq!(*function, catalogue.id_of("isIn").unwrap());
    }

    #[test]
    fn large_set_membership_uses_string_table() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let field = ctx.declare("continent", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::DataDictionary).unwrap();
        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        let values: Vec<String> = (0..6).map(|i| format!("c{i}")).collect();
        compile(&mut builder, &catalogue, &Predicate::SetMembership { field, is_in: true, values }, None);
        let node = builder.finish();
        let AstKind::FunctionCall { function, args } = &node.kind else { panic!("expected call") };
        assert_eq!(*function, catalogue.id_of("tableIsIn").unwrap());
        assert_eq!(args[0].value_type, ValueType::StringTable);
    }

    #[test]
    fn surrogate_compiles_to_surrogate_macro_call() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let a = number_field(&mut ctx, "a");
        let b = number_field(&mut ctx, "b");
        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        let predicates = vec![
            Predicate::Simple { field: a, operator: SimpleOperator::GreaterThan, value: Some(Literal::Number(0.0)) },
            Predicate::Simple { field: b, operator: SimpleOperator::GreaterThan, value: Some(Literal::Number(0.0)) },
        ];
        compile(&mut builder, &catalogue, &Predicate::Surrogate(predicates), None);
        let node = builder.finish();
        let AstKind::FunctionCall { function, .. } = &node.kind else { panic!("expected call") };
        assert_eq!(*function, catalogue.id_of("surrogate").unwrap());
    }
}
