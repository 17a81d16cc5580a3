//! Parses a PMML expression element (`Constant`, `FieldRef`, `Apply`,
//! `NormContinuous`, `NormDiscrete`, `Discretize`, `MapValues`) into the
//! XML-agnostic [`crate::transformation::Transformation`] tree that
//! [`crate::transformation::compile`] consumes.

use roxmltree::Node;

use pamplemousse_core::{value_type_from_str, Literal, ValueType};

use crate::diagnostics::ErrorKind;
use crate::transformation::{DiscretizeBin, NormPoint, Transformation};

use super::xml::{attr, attr_f64, children, first_non_extension, line};
use super::CompileCtx;

/// Parses the single value-producing child of a `DerivedField`/`Apply`
/// argument position.
pub fn parse_expression(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Transformation {
    match node.tag_name().name() {
        "Constant" => Transformation::Constant(literal_for(attr(node, "dataType"), node.text().unwrap_or(""))),
        "FieldRef" => match attr(node, "field").and_then(|n| ctx.context.lookup(n)) {
            Some(field) => Transformation::FieldRef(field),
            None => {
                ctx.diag.report_with_arg(ErrorKind::BindingFailure, "unknown field in FieldRef", attr(node, "field").unwrap_or("").to_string(), line(node));
                Transformation::Constant(Literal::Invalid)
            }
        },
        "Apply" => parse_apply(node, ctx),
        "NormContinuous" => parse_norm_continuous(node, ctx),
        "NormDiscrete" => parse_norm_discrete(node, ctx),
        "Discretize" => parse_discretize(node, ctx),
        "MapValues" => parse_map_values(node, ctx),
        other => {
            ctx.diag.report_with_arg(ErrorKind::ParseError, "unsupported expression element", other.to_string(), line(node));
            Transformation::Constant(Literal::Invalid)
        }
    }
}

/// The first value-producing child of `node`, skipping `Extension`.
pub fn parse_expression_child(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Transformation {
    match first_non_extension(node) {
        Some(child) => parse_expression(child, ctx),
        None => {
            ctx.diag.report(ErrorKind::ParseError, "expected an expression element", line(node));
            Transformation::Constant(Literal::Invalid)
        }
    }
}

fn literal_for(data_type: Option<&str>, raw: &str) -> Literal {
    match data_type {
        Some("double") | Some("float") | Some("integer") => raw.parse::<f64>().map(Literal::Number).unwrap_or_else(|_| Literal::String(raw.to_string())),
        Some("boolean") => match raw {
            "true" | "1" => Literal::Bool(true),
            "false" | "0" => Literal::Bool(false),
            _ => Literal::String(raw.to_string()),
        },
        _ => raw.parse::<f64>().map(Literal::Number).unwrap_or_else(|_| Literal::String(raw.to_string())),
    }
}

fn parse_apply(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Transformation {
    let function_name = attr(node, "function").unwrap_or("").to_string();
    let args = node.children().filter(|n| n.is_element() && n.tag_name().name() != "Extension").map(|n| parse_expression(n, ctx)).collect();
    Transformation::Apply { function_name, args }
}

fn field_of(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Option<pamplemousse_core::FieldRef> {
    let name = attr(node, "field")?;
    let field = ctx.context.lookup(name);
    if field.is_none() {
        ctx.diag.report_with_arg(ErrorKind::BindingFailure, "unknown field", name.to_string(), line(node));
    }
    field
}

fn parse_norm_continuous(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Transformation {
    let Some(field) = field_of(node, ctx) else { return Transformation::Constant(Literal::Invalid) };
    let points = children(node, "LinearNorm")
        .filter_map(|n| Some(NormPoint { orig: attr_f64(n, "orig")?, norm: attr_f64(n, "norm")? }))
        .collect();
    Transformation::NormContinuous { field, points }
}

fn parse_norm_discrete(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Transformation {
    let Some(field) = field_of(node, ctx) else { return Transformation::Constant(Literal::Invalid) };
    let category = attr(node, "value").unwrap_or("").to_string();
    Transformation::NormDiscrete { field, category }
}

fn parse_discretize(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Transformation {
    let Some(field) = field_of(node, ctx) else { return Transformation::Constant(Literal::Invalid) };
    let output_data_type = attr(node, "dataType");
    let bins = children(node, "DiscretizeBin")
        .map(|bin_node| {
            let interval = children(bin_node, "Interval").next();
            let low = interval.and_then(|n| attr_f64(n, "leftMargin"));
            let high = interval.and_then(|n| attr_f64(n, "rightMargin"));
            let closure = interval.and_then(|n| attr(n, "closure")).unwrap_or("closedOpen");
            DiscretizeBin {
                low,
                low_closed: closure.starts_with("closed"),
                high,
                high_closed: closure.ends_with("Closed"),
                value: literal_for(output_data_type, attr(bin_node, "binValue").unwrap_or("")),
            }
        })
        .collect();
    let default = attr(node, "defaultValue").map(|v| literal_for(output_data_type, v));
    Transformation::Discretize { field, bins, default }
}

fn parse_map_values(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Transformation {
    let output_type = match attr(node, "dataType").map(value_type_from_str) {
        Some(ValueType::Invalid) | None => ValueType::String,
        Some(t) => t,
    };
    let output_column = attr(node, "outputColumn").unwrap_or("");

    let mut input_column_of_field = None;
    for pair in children(node, "FieldColumnPair") {
        if let Some(field) = field_of(pair, ctx) {
            input_column_of_field = Some((field, attr(pair, "column").unwrap_or("").to_string()));
            break;
        }
    }
    let Some((field, input_column)) = input_column_of_field else {
        ctx.diag.report(ErrorKind::ParseError, "MapValues requires at least one FieldColumnPair", line(node));
        return Transformation::Constant(Literal::Invalid);
    };

    let mut mapping = Vec::new();
    if let Some(table) = children(node, "InlineTable").next() {
        for row in children(table, "row") {
            let mut key = None;
            let mut value = None;
            for cell in row.children().filter(|n| n.is_element()) {
                let text = cell.text().unwrap_or("").to_string();
                if cell.tag_name().name() == input_column {
                    key = Some(text);
                } else if cell.tag_name().name() == output_column {
                    value = Some(text);
                }
            }
            if let (Some(key), Some(value)) = (key, value) {
                mapping.push((key, value));
            }
        }
    }
    let default = attr(node, "defaultValue").map(str::to_string);
    Transformation::MapValues { field, mapping, default, output_type }
}
