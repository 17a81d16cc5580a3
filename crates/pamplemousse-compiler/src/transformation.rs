//! Derived-field transformation compilation (§4.4, C5).
//!
//! Covers constants, field references, arithmetic/function application,
//! piecewise mappings (`MapValues`), discretisation, normalisation, and
//! apply-by-name against the catalogue. Piecewise and discretisation
//! transforms are expression-shaped: each compiles to a chain of
//! `default(ifThenElse(cond, value, invalid), ...)` nodes rather than a
//! statement-shaped if-chain, so a transformation can always be nested
//! inside a larger expression (an `Apply` argument, another `MapValues`
//! branch) without the caller having to hoist statements first.

use pamplemousse_core::{AstBuilder, Catalogue, FieldRef, Literal, ValueType};

#[derive(Debug, Clone)]
pub struct DiscretizeBin {
    pub low: Option<f64>,
    pub low_closed: bool,
    pub high: Option<f64>,
    pub high_closed: bool,
    pub value: Literal,
}

#[derive(Debug, Clone)]
pub struct NormPoint {
    pub orig: f64,
    pub norm: f64,
}

#[derive(Debug, Clone)]
pub enum Transformation {
    Constant(Literal),
    FieldRef(FieldRef),
    /// Apply-by-name: looks the function up in the catalogue and applies
    /// it to the compiled arguments, honouring its declared arity.
    Apply { function_name: String, args: Vec<Transformation> },
    MapValues {
        field: FieldRef,
        mapping: Vec<(String, String)>,
        default: Option<String>,
        output_type: ValueType,
    },
    Discretize {
        field: FieldRef,
        bins: Vec<DiscretizeBin>,
        default: Option<Literal>,
    },
    /// Piecewise-linear interpolation between ordered `(orig, norm)`
    /// points. Values outside the outermost points extrapolate along the
    /// nearest segment's slope.
    NormContinuous { field: FieldRef, points: Vec<NormPoint> },
    /// `1.0` when `field == category`, else `0.0`.
    NormDiscrete { field: FieldRef, category: String },
}

pub fn compile(builder: &mut AstBuilder<'_>, catalogue: &Catalogue, transformation: &Transformation, line: Option<u32>) {
    match transformation {
        Transformation::Constant(lit) => builder.push_constant(lit.clone()),
        Transformation::FieldRef(field) => builder.push_field(field.clone()),
        Transformation::Apply { function_name, args } => compile_apply(builder, catalogue, function_name, args, line),
        Transformation::MapValues { field, mapping, default, output_type } => {
            compile_map_values(builder, catalogue, field, mapping, default.as_deref(), *output_type, line)
        }
        Transformation::Discretize { field, bins, default } => compile_discretize(builder, catalogue, field, bins, default.as_ref(), line),
        Transformation::NormContinuous { field, points } => compile_norm_continuous(builder, catalogue, field, points, line),
        Transformation::NormDiscrete { field, category } => compile_norm_discrete(builder, catalogue, field, category, line),
    }
}

fn compile_apply(builder: &mut AstBuilder<'_>, catalogue: &Catalogue, function_name: &str, args: &[Transformation], line: Option<u32>) {
    let Some(id) = catalogue.id_of(function_name) else {
        builder.parsing_error_with_arg("unknown function in Apply", function_name, line);
        return;
    };
    for arg in args {
        compile(builder, catalogue, arg, line);
    }
    builder.push_function_call(id, args.len(), line);
}

/// `cond ? then : else_`, as an expression. `then`/`else_` must already be
/// on the stack in that order when this is called; this only emits the
/// wrapping call.
fn push_if_then_else(builder: &mut AstBuilder<'_>, catalogue: &Catalogue, line: Option<u32>) {
    let id = catalogue.id_of("if").expect("if registered");
    builder.push_function_call(id, 3, line);
}

fn push_default(builder: &mut AstBuilder<'_>, catalogue: &Catalogue, line: Option<u32>) {
    let id = catalogue.id_of("default").expect("default registered");
    builder.push_function_call(id, 2, line);
}

/// Builds the chain innermost-first by walking `mapping` in reverse, so
/// the *first* entry ends up as the outermost `if` (evaluated first, per
/// first-match-wins). Each step pops the accumulated fallback off the
/// stack before building its own `if`, then pushes it back so `default`
/// sees `[candidate, fallback]` in that order — `push_function_call`
/// reads stack order as argument order, and swapping these would make an
/// always-present fallback shadow every real match.
fn compile_map_values(
    builder: &mut AstBuilder<'_>,
    catalogue: &Catalogue,
    field: &FieldRef,
    mapping: &[(String, String)],
    default: Option<&str>,
    output_type: ValueType,
    line: Option<u32>,
) {
    let tail = match default {
        Some(d) => Literal::String(d.to_string()),
        None => Literal::Invalid,
    };
    builder.push_constant(tail);

    let eq = catalogue.id_of("==").expect("== registered");
    for (key, value) in mapping.iter().rev() {
        let accumulated = builder.pop_node();
        builder.push_field(field.clone());
        builder.push_constant(Literal::String(key.clone()));
        builder.push_function_call(eq, 2, line);
        builder.push_constant(Literal::String(value.clone()));
        builder.push_constant(Literal::Invalid);
        push_if_then_else(builder, catalogue, line);
        builder.push_node(accumulated);
        push_default(builder, catalogue, line);
    }

    let top = builder.pop_node();
    let coerced = builder.coerce_to_type(top, output_type);
    builder.push_node(coerced);
}

/// Same right-to-left construction as [`compile_map_values`], so the first
/// bin in `bins` wins ties against later ones.
fn compile_discretize(builder: &mut AstBuilder<'_>, catalogue: &Catalogue, field: &FieldRef, bins: &[DiscretizeBin], default: Option<&Literal>, line: Option<u32>) {
    builder.push_constant(default.cloned().unwrap_or(Literal::Invalid));

    for bin in bins.iter().rev() {
        let accumulated = builder.pop_node();
        builder.push_field(field.clone());
        bin_condition(builder, catalogue, bin, line);
        builder.push_constant(bin.value.clone());
        builder.push_constant(Literal::Invalid);
        push_if_then_else(builder, catalogue, line);
        builder.push_node(accumulated);
        push_default(builder, catalogue, line);
    }
}

/// Pushes `low <op> field` and `field <op> high` (whichever bounds are
/// present) and joins present bounds with `and`, leaving one boolean node
/// on the stack. Assumes `field` is already the top of the stack and
/// consumes it.
fn bin_condition(builder: &mut AstBuilder<'_>, catalogue: &Catalogue, bin: &DiscretizeBin, line: Option<u32>) {
    let field_node = builder.pop_node();

    let mut parts = 0;
    if let Some(low) = bin.low {
        builder.push_node(field_node.clone());
        builder.push_constant(Literal::Number(low));
        let op = if bin.low_closed { ">=" } else { ">" };
        let id = catalogue.id_of(op).expect("comparison registered");
        builder.push_function_call(id, 2, line);
        parts += 1;
    }
    if let Some(high) = bin.high {
        builder.push_node(field_node.clone());
        builder.push_constant(Literal::Number(high));
        let op = if bin.high_closed { "<=" } else { "<" };
        let id = catalogue.id_of(op).expect("comparison registered");
        builder.push_function_call(id, 2, line);
        parts += 1;
        if parts == 2 {
            let and_id = catalogue.id_of("and").expect("and registered");
            builder.push_function_call(and_id, 2, line);
        }
    }
    if parts == 0 {
        builder.push_constant(Literal::Bool(true));
    }
}

/// Builds `if field in [a,b] then interpolate(a,b) else <rest>` right to
/// left, ending on the outermost segment's bounds check first. The single
/// fallback evaluation (outside every segment) extrapolates along the
/// slope of whichever outermost segment is nearest.
fn compile_norm_continuous(builder: &mut AstBuilder<'_>, catalogue: &Catalogue, field: &FieldRef, points: &[NormPoint], line: Option<u32>) {
    if points.len() < 2 {
        builder.parsing_error("NormContinuous requires at least two points", line);
        return;
    }

    let interp_fn = catalogue.id_of("normalizeLinear").expect("normalizeLinear registered");
    let ge = catalogue.id_of(">=").expect(">= registered");
    let le = catalogue.id_of("<=").expect("<= registered");
    let and_id = catalogue.id_of("and").expect("and registered");

    builder.push_field(field.clone());
    builder.push_constant(Literal::Number(points[0].orig));
    builder.push_constant(Literal::Number(points[1].orig));
    builder.push_constant(Literal::Number(points[0].norm));
    builder.push_constant(Literal::Number(points[1].norm));
    builder.push_function_call(interp_fn, 5, line);

    for window in points.windows(2).rev() {
        let (a, b) = (&window[0], &window[1]);
        let accumulated = builder.pop_node();

        builder.push_field(field.clone());
        builder.push_constant(Literal::Number(a.orig));
        builder.push_function_call(ge, 2, line);
        builder.push_field(field.clone());
        builder.push_constant(Literal::Number(b.orig));
        builder.push_function_call(le, 2, line);
        builder.push_function_call(and_id, 2, line);

        builder.push_field(field.clone());
        builder.push_constant(Literal::Number(a.orig));
        builder.push_constant(Literal::Number(b.orig));
        builder.push_constant(Literal::Number(a.norm));
        builder.push_constant(Literal::Number(b.norm));
        builder.push_function_call(interp_fn, 5, line);

        builder.push_node(accumulated);
        push_if_then_else(builder, catalogue, line);
    }

    // `if`/`default` are declared with a polymorphic Invalid return type
    // in the catalogue; the result is always a number here, so coerce it
    // explicitly rather than leave it typed Invalid.
    let top = builder.pop_node();
    let coerced = builder.coerce_to_type(top, ValueType::Number);
    builder.push_node(coerced);
}

fn compile_norm_discrete(builder: &mut AstBuilder<'_>, catalogue: &Catalogue, field: &FieldRef, category: &str, line: Option<u32>) {
    builder.push_field(field.clone());
    builder.push_constant(Literal::String(category.to_string()));
    let eq = catalogue.id_of("==").expect("== registered");
    builder.push_function_call(eq, 2, line);
    builder.push_constant(Literal::Number(1.0));
    builder.push_constant(Literal::Number(0.0));
    push_if_then_else(builder, catalogue, line);

    let top = builder.pop_node();
    let coerced = builder.coerce_to_type(top, ValueType::Number);
    builder.push_node(coerced);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use pamplemousse_core::{ConversionContext, DataField, FieldOrigin, OpType};

    #[test]
    fn map_values_falls_back_to_default() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let field = ctx.declare("dept", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::DataDictionary).unwrap();
        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        let mapping = vec![("engineering".to_string(), "ENG".to_string())];
        compile(
            &mut builder,
            &catalogue,
            &Transformation::MapValues { field, mapping, default: Some("OTHER".to_string()), output_type: ValueType::String },
            None,
        );
        let node = builder.finish();
        assert_eq!(node.value_type, ValueType::String);
    }

    #[test]
    fn norm_discrete_is_an_indicator() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let field = ctx.declare("dept", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::DataDictionary).unwrap();
        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &catalogue, &Transformation::NormDiscrete { field, category: "engineering".into() }, None);
        let node = builder.finish();
        assert_eq!(node.value_type, ValueType::Number);
    }

    #[test]
    fn discretize_compiles_without_error() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let field = ctx.declare("age", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        let bins = vec![
            DiscretizeBin { low: None, low_closed: false, high: Some(18.0), high_closed: false, value: Literal::String("minor".into()) },
            DiscretizeBin { low: Some(18.0), low_closed: true, high: None, high_closed: false, value: Literal::String("adult".into()) },
        ];
        compile(&mut builder, &catalogue, &Transformation::Discretize { field, bins, default: None }, None);
        assert!(!diag.has_errors());
        let node = builder.finish();
        assert_eq!(node.value_type, ValueType::Invalid);
    }
}
