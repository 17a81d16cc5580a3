//! Parses a PMML predicate element (`True`, `False`, `SimplePredicate`,
//! `SimpleSetPredicate`, `CompoundPredicate`) into the XML-agnostic
//! [`crate::predicate::Predicate`] tree that [`crate::predicate::compile`]
//! consumes.

use roxmltree::Node;

use pamplemousse_core::{Literal, ValueType};

use crate::predicate::{CompoundOperator, Predicate, SimpleOperator};

use super::xml::{array_values, attr, children, line};
use super::CompileCtx;

/// Finds the first predicate-shaped child of `node` (one of the five
/// element names PMML allows in a predicate position) and parses it.
/// Falls back to `True` with a diagnostic when none is present, so
/// compilation can continue past a malformed document.
pub fn parse_predicate_child(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Predicate {
    for candidate in node.children().filter(|n| n.is_element()) {
        if let Some(p) = try_parse(candidate, ctx) {
            return p;
        }
    }
    ctx.diag.report(crate::diagnostics::ErrorKind::ParseError, "expected a predicate element", line(node));
    Predicate::True
}

/// Parses `node` itself as a predicate element (used where the caller has
/// already located the predicate element, rather than a wrapper around
/// one).
pub fn parse_predicate_element(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Predicate {
    try_parse(node, ctx).unwrap_or(Predicate::True)
}

fn try_parse(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Option<Predicate> {
    match node.tag_name().name() {
        "True" => Some(Predicate::True),
        "False" => Some(Predicate::False),
        "SimplePredicate" => Some(parse_simple(node, ctx)),
        "SimpleSetPredicate" => Some(parse_set(node, ctx)),
        "CompoundPredicate" => Some(parse_compound(node, ctx)),
        _ => None,
    }
}

fn parse_simple(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Predicate {
    let Some(field_name) = attr(node, "field") else {
        ctx.diag.report(crate::diagnostics::ErrorKind::ParseError, "SimplePredicate missing field attribute", line(node));
        return Predicate::True;
    };
    let Some(field) = ctx.context.lookup(field_name) else {
        ctx.diag.report_with_arg(crate::diagnostics::ErrorKind::BindingFailure, "unknown field in SimplePredicate", field_name, line(node));
        return Predicate::True;
    };
    let operator = match attr(node, "operator") {
        Some("equal") => SimpleOperator::Equal,
        Some("notEqual") => SimpleOperator::NotEqual,
        Some("lessThan") => SimpleOperator::LessThan,
        Some("lessOrEqual") => SimpleOperator::LessOrEqual,
        Some("greaterThan") => SimpleOperator::GreaterThan,
        Some("greaterOrEqual") => SimpleOperator::GreaterOrEqual,
        Some("isMissing") => SimpleOperator::IsMissing,
        Some("isNotMissing") => SimpleOperator::IsNotMissing,
        other => {
            ctx.diag.report_with_arg(
                crate::diagnostics::ErrorKind::UnknownAttributeValue,
                "unknown SimplePredicate operator",
                other.unwrap_or("").to_string(),
                line(node),
            );
            SimpleOperator::Equal
        }
    };
    let value = attr(node, "value").map(|raw| literal_for(field.value_type(), raw));
    Predicate::Simple { field, operator, value }
}

fn parse_set(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Predicate {
    let Some(field_name) = attr(node, "field") else {
        ctx.diag.report(crate::diagnostics::ErrorKind::ParseError, "SimpleSetPredicate missing field attribute", line(node));
        return Predicate::True;
    };
    let Some(field) = ctx.context.lookup(field_name) else {
        ctx.diag.report_with_arg(crate::diagnostics::ErrorKind::BindingFailure, "unknown field in SimpleSetPredicate", field_name, line(node));
        return Predicate::True;
    };
    let is_in = attr(node, "booleanOperator") != Some("isNotIn");
    let values = children(node, "Array").next().map(array_values).unwrap_or_default();
    Predicate::SetMembership { field, is_in, values }
}

fn parse_compound(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Predicate {
    let operator = attr(node, "booleanOperator").unwrap_or("and").to_string();
    let predicates: Vec<Predicate> = node
        .children()
        .filter(|n| n.is_element())
        .filter_map(|child| try_parse(child, ctx))
        .collect();

    match operator.as_str() {
        "and" => Predicate::Compound { operator: CompoundOperator::And, predicates },
        "or" => Predicate::Compound { operator: CompoundOperator::Or, predicates },
        "xor" => Predicate::Compound { operator: CompoundOperator::Xor, predicates },
        "surrogate" => Predicate::Surrogate(predicates),
        other => {
            ctx.diag.report_with_arg(crate::diagnostics::ErrorKind::UnknownAttributeValue, "unknown CompoundPredicate operator", other.to_string(), line(node));
            Predicate::Compound { operator: CompoundOperator::And, predicates }
        }
    }
}

fn literal_for(value_type: ValueType, raw: &str) -> Literal {
    match value_type {
        ValueType::Number => raw.parse::<f64>().map(Literal::Number).unwrap_or_else(|_| Literal::String(raw.to_string())),
        ValueType::Bool => match raw {
            "true" | "1" => Literal::Bool(true),
            "false" | "0" => Literal::Bool(false),
            _ => Literal::String(raw.to_string()),
        },
        _ => Literal::String(raw.to_string()),
    }
}
