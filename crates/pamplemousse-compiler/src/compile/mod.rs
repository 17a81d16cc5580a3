//! The root compilation driver (§4.1–§4.8, §6, §7): ties XML parsing to
//! model-body compilation and wires the whole pipeline end to end —
//! `DataDictionary`, `MiningSchema` preprocessing, derived fields, output
//! discovery, the model body itself, analysis, optimisation, and emission.
//!
//! Compilation runs in two non-overlapping phases over the same
//! [`pamplemousse_core::ConversionContext`]. Phase one (inside the
//! [`CompileCtx`]-scoped block below) turns XML into owned data structures —
//! [`model::ModelBody`], [`crate::transformation::Transformation`] trees,
//! pending output bindings — resolving every field reference against the
//! context as it goes. Phase two hands those data structures to the
//! [`pamplemousse_core::AstBuilder`] to build the actual AST; by
//! construction it needs no further XML and reports no parse errors of its
//! own (`model::compile` takes the context directly, not a diagnostics
//! sink). The two phases share `context` and `diag` sequentially, never
//! simultaneously, so there is no overlapping-borrow conflict in splitting
//! the work this way.

mod models;
mod predicate_xml;
mod transformation_xml;
mod xml;

use std::collections::HashMap;

use roxmltree::{Document, Node};

use pamplemousse_core::{
    AstBuilder, AstNode, Catalogue, ConversionContext, DataField, FieldOrigin, FieldRef, Literal,
    MiningField, OpType, OutlierTreatment, ValueType, value_type_from_str,
};

use crate::diagnostics::{Diagnostics, ErrorKind};
use crate::emit::{self, EmitOptions, InputFormat, OutputFormat};
use crate::model::output::{CastInteger, MiningFunction, ModelConfig, OutputFeature, OutputField, TargetConfig};
use crate::model::{self, ModelBody};
use crate::optimize;
use crate::transformation::{self, Transformation};

use xml::{attr, attr_f64, attr_usize, child, children, line};

/// Compile-time state shared by every XML-parsing helper in this module
/// (`models.rs`, `predicate_xml.rs`, `transformation_xml.rs`): the symbol
/// table being built up, and the diagnostics sink parse errors report
/// into. Exists only for the duration of phase one.
pub struct CompileCtx<'a> {
    pub context: &'a mut ConversionContext,
    pub diag: &'a mut Diagnostics,
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("compilation failed with {0} diagnostic(s)")]
    Failed(usize),
}

/// A `--input NAME[=EMITTED]` binding.
#[derive(Debug, Clone, Default)]
pub struct InputBinding {
    pub name: String,
    pub emitted: Option<String>,
}

/// A linear rescale applied to a bound output, the `+|-|*|/NUMBER` suffix
/// in `--output NAME[=EMITTED][+-*/NUMBER]` (§6).
#[derive(Debug, Clone, Copy)]
pub struct OutputTransform {
    pub op: char,
    pub operand: f64,
}

impl OutputTransform {
    fn catalogue_name(self) -> &'static str {
        match self.op {
            '+' => "+",
            '-' => "-",
            '*' => "*",
            _ => "/",
        }
    }
}

/// A `--output NAME[=EMITTED][+-*/NUMBER][,PRECISION]` binding. `name` is
/// either a PMML `OutputField` name or `neuron:<id>` (§6).
#[derive(Debug, Clone, Default)]
pub struct OutputBinding {
    pub name: String,
    pub emitted: Option<String>,
    pub transform: Option<OutputTransform>,
    pub precision: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub lowercase: bool,
    pub input_format: InputFormat,
    pub output_format: OutputFormat,
    pub local_variable_budget: Option<usize>,
    pub input_bindings: Vec<InputBinding>,
    pub output_bindings: Vec<OutputBinding>,
}

const MODEL_TAGS: [&str; 10] = [
    "TreeModel",
    "RuleSetModel",
    "MiningModel",
    "RegressionModel",
    "Scorecard",
    "NaiveBayesModel",
    "SupportVectorMachineModel",
    "NeuralNetwork",
    "ClusteringModel",
    "NearestNeighborModel",
];

fn find_model_node<'a, 'i>(root: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
    root.children().find(|n| n.is_element() && MODEL_TAGS.contains(&n.tag_name().name()))
}

/// Where a requested `OutputField` pulls its value from, before the
/// feature's backing field exists. Distinguishes the bare
/// `feature="probability"` (best-probability) case, which has no
/// [`OutputFeature`] counterpart and is instead wired directly onto
/// [`ModelConfig::best_probability`].
enum PendingFeature {
    PredictedValue,
    PredictedDisplayValue,
    EntityId,
    Probability(Option<String>),
    Confidence(String),
    ReasonCode(usize),
    TransformedValue(Transformation),
}

struct PendingOutputField {
    field: FieldRef,
    feature: PendingFeature,
    line: Option<u32>,
}

struct Parsed {
    body: ModelBody,
    mining_function: MiningFunction,
    target_value_type: ValueType,
    target_categories: Vec<String>,
    target: Option<TargetConfig>,
    preprocessing: Vec<(FieldRef, MiningField)>,
    derived: Vec<(FieldRef, Transformation)>,
    pending_outputs: Vec<PendingOutputField>,
}

/// Compiles one PMML-dialect document into a Lua scoring-program source.
pub fn compile_model(doc: &Document, options: &CompileOptions) -> Result<String, (CompileError, Diagnostics)> {
    let mut context = ConversionContext::new(options.lowercase);
    let mut diag = Diagnostics::new();
    let catalogue = Catalogue::standard();

    let root = doc.root_element();

    let field_catalog = match child(root, "DataDictionary") {
        Some(dict) => declare_data_dictionary(dict, &mut context, &mut diag, &options.input_bindings),
        None => {
            diag.report(ErrorKind::ParseError, "document has no DataDictionary", None);
            HashMap::new()
        }
    };

    let Some(model_node) = find_model_node(root) else {
        diag.report(ErrorKind::ParseError, "document contains no recognised model element", None);
        return Err((CompileError::Failed(diag.iter().count().max(1)), diag));
    };

    let mining_function = match attr(model_node, "functionName") {
        Some("regression") => MiningFunction::Regression,
        Some("classification") => MiningFunction::Classification,
        _ => MiningFunction::Any,
    };

    let target_name = child(model_node, "MiningSchema").and_then(|ms| {
        children(ms, "MiningField")
            .find(|mf| matches!(attr(mf, "usageType"), Some("predicted") | Some("target")))
            .and_then(|mf| attr(mf, "name"))
            .map(str::to_string)
    });
    let (target_value_type, target_categories) = match target_name.as_deref().and_then(|n| field_catalog.get(n)) {
        Some((value_type, categories)) => (*value_type, categories.clone()),
        None => {
            let default_vt = if mining_function == MiningFunction::Regression { ValueType::Number } else { ValueType::String };
            (default_vt, Vec::new())
        }
    };

    let parsed = {
        let mut ctx = CompileCtx { context: &mut context, diag: &mut diag };

        let preprocessing = parse_mining_schema_preprocessing(model_node, &mut ctx);
        let mut derived = Vec::new();
        if let Some(dict) = child(root, "TransformationDictionary") {
            derived.extend(parse_derived_fields(dict, &mut ctx));
        }
        if let Some(locals) = child(model_node, "LocalTransformations") {
            derived.extend(parse_derived_fields(locals, &mut ctx));
        }

        let target = child(model_node, "Targets").map(|targets| parse_target_config(targets, target_name.as_deref()));
        let pending_outputs = match child(model_node, "Output") {
            Some(output_node) => parse_output_fields(output_node, &mut ctx, &options.output_bindings),
            None => Vec::new(),
        };

        let body = match models::parse_model_body(model_node, &mut ctx) {
            Some(body) => body,
            None => {
                return Err((CompileError::Failed(diag.iter().count().max(1)), diag));
            }
        };

        Parsed { body, mining_function, target_value_type, target_categories, target, preprocessing, derived, pending_outputs }
    };

    let mut builder = AstBuilder::new(&catalogue, &mut diag);
    let mut statements = Vec::new();

    for (clean_field, mining_field) in &parsed.preprocessing {
        let node = build_clean_expression(&mut builder, &catalogue, mining_field);
        builder.push_node(node);
        builder.declare(clean_field.clone());
        statements.push(builder.pop_node());
    }

    for (field, transformation) in &parsed.derived {
        transformation::compile(&mut builder, &catalogue, transformation, None);
        builder.declare(field.clone());
        statements.push(builder.pop_node());
    }

    let mut category_union = parsed.target_categories.clone();
    for pending in &parsed.pending_outputs {
        let extra = match &pending.feature {
            PendingFeature::Probability(Some(category)) => Some(category.clone()),
            PendingFeature::Confidence(category) => Some(category.clone()),
            _ => None,
        };
        if let Some(category) = extra {
            if !category_union.contains(&category) {
                category_union.push(category);
            }
        }
    }

    let probabilities = if parsed.mining_function == MiningFunction::Classification {
        crate::model::output::build_probability_map(&mut context, &category_union)
    } else {
        indexmap::IndexMap::new()
    };
    let confidences = if parsed.mining_function == MiningFunction::Classification && !probabilities.is_empty() {
        crate::model::output::build_probability_map(&mut context, &category_union)
    } else {
        indexmap::IndexMap::new()
    };

    let entity_id_requested = parsed.pending_outputs.iter().any(|p| matches!(p.feature, PendingFeature::EntityId));
    let entity_id = entity_id_requested.then(|| context.fresh_temporary(ValueType::String, "entity_id"));

    let best_probability = parsed
        .pending_outputs
        .iter()
        .find(|p| matches!(p.feature, PendingFeature::Probability(None)))
        .map(|p| p.field.clone());

    let max_reason_rank = parsed
        .pending_outputs
        .iter()
        .filter_map(|p| match p.feature {
            PendingFeature::ReasonCode(rank) => Some(rank + 1),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    let reason_codes: Vec<FieldRef> = (0..max_reason_rank).map(|i| context.fresh_temporary(ValueType::String, &format!("reason_code_{}", i + 1))).collect();

    let mut outputs = Vec::new();
    for pending in &parsed.pending_outputs {
        let feature = match &pending.feature {
            PendingFeature::PredictedValue => OutputFeature::PredictedValue,
            PendingFeature::PredictedDisplayValue => OutputFeature::PredictedDisplayValue,
            PendingFeature::EntityId => OutputFeature::EntityId,
            PendingFeature::Probability(Some(category)) => OutputFeature::Probability(category.clone()),
            PendingFeature::Probability(None) => continue,
            PendingFeature::Confidence(category) => OutputFeature::Confidence(category.clone()),
            PendingFeature::ReasonCode(rank) => OutputFeature::ReasonCode(*rank),
            PendingFeature::TransformedValue(transformation) => {
                transformation::compile(&mut builder, &catalogue, transformation, pending.line);
                OutputFeature::TransformedValue(builder.pop_node())
            }
        };
        outputs.push(OutputField { field: pending.field.clone(), feature });
    }

    let predicted_value = Some(context.fresh_temporary(parsed.target_value_type, "predicted"));

    let config = ModelConfig {
        predicted_value: predicted_value.clone(),
        predicted_display_value: None,
        probabilities,
        confidences,
        entity_id,
        reason_codes,
        best_probability,
        target: parsed.target.clone(),
        mining_function: parsed.mining_function,
        output_type: parsed.target_value_type,
        outputs,
    };

    model::compile(&mut builder, &mut context, &catalogue, &config, &parsed.body);
    statements.push(builder.pop_node());

    let predicted_value_node = predicted_value.as_ref().map(|f| AstNode::field_ref(f.clone()));
    let predicted_display_value_node = match (&config.target, &predicted_value_node) {
        (Some(target), Some(pv)) if !target.display_values.is_empty() => {
            Some(crate::model::output::map_display_value(&mut builder, &catalogue, pv, &target.display_values))
        }
        _ => None,
    };
    statements.extend(crate::model::output::push_output_assembly(
        &mut builder,
        &config,
        predicted_value_node.as_ref(),
        predicted_display_value_node.as_ref(),
    ));

    let mut unknown_neurons = Vec::new();
    for binding in &options.output_bindings {
        let Some(neuron_id) = binding.name.strip_prefix("neuron:") else { continue };
        let Some(neuron_field) = context.lookup_neuron(neuron_id) else {
            unknown_neurons.push(binding.name.clone());
            continue;
        };
        let data_field = DataField::new(ValueType::Number, OpType::Continuous);
        let declared = match binding.emitted.as_deref() {
            Some(emitted) => context.declare_output_as(&binding.name, emitted, data_field),
            None => context.declare_output(&binding.name, data_field),
        };
        match declared {
            Ok(output_field) => {
                builder.push_field(neuron_field);
                builder.assign(output_field);
                statements.push(builder.pop_node());
            }
            Err(_) => unknown_neurons.push(binding.name.clone()),
        }
    }

    for binding in &options.output_bindings {
        if binding.name.starts_with("neuron:") {
            continue;
        }
        if binding.transform.is_none() && binding.precision.is_none() {
            continue;
        }
        let Some(field) = context.outputs().find(|(key, _)| *key == binding.name).map(|(_, f)| f.clone()) else { continue };

        builder.push_field(field.clone());
        if let Some(transform) = binding.transform {
            builder.push_constant(Literal::Number(transform.operand));
            let id = catalogue.id_of(transform.catalogue_name()).expect("arithmetic operator registered");
            builder.push_function_call(id, 2, None);
        }
        if let Some(precision) = binding.precision {
            // round(value * 10^p) / 10^p: the catalogue only exposes
            // whole-number `round`, so decimal precision is built out of it.
            let scale = 10f64.powi(precision as i32);
            let mul_id = catalogue.id_of("*").expect("* registered");
            let round_id = catalogue.id_of("round").expect("round registered");
            let div_id = catalogue.id_of("/").expect("/ registered");

            builder.push_constant(Literal::Number(scale));
            builder.push_function_call(mul_id, 2, None);
            builder.push_function_call(round_id, 1, None);
            builder.push_constant(Literal::Number(scale));
            builder.push_function_call(div_id, 2, None);
        }
        builder.assign(field);
        statements.push(builder.pop_node());
    }

    let output_fields: Vec<FieldRef> = context.outputs().map(|(_, f)| f.clone()).collect();
    for field in &output_fields {
        builder.push_field(field.clone());
    }
    builder.push_return(output_fields.len());
    statements.push(builder.pop_node());

    let total = statements.len();
    for stmt in statements {
        builder.push_node(stmt);
    }
    builder.push_block(total);
    let mut root_node = builder.finish();

    for id in unknown_neurons {
        diag.report_with_arg(ErrorKind::BindingFailure, "unknown neuron id in output binding", id, None);
    }

    if diag.has_errors() {
        return Err((CompileError::Failed(diag.iter().count()), diag));
    }

    optimize::optimize(&mut root_node, &catalogue);

    let emit_options = EmitOptions {
        lowercase: options.lowercase,
        input_format: options.input_format,
        output_format: options.output_format,
        local_variable_budget: options.local_variable_budget,
    };
    Ok(emit::emit(&root_node, &context, &catalogue, &emit_options))
}

fn declare_data_dictionary(
    dict: Node,
    context: &mut ConversionContext,
    diag: &mut Diagnostics,
    bindings: &[InputBinding],
) -> HashMap<String, (ValueType, Vec<String>)> {
    let mut field_catalog = HashMap::new();
    for df in children(dict, "DataField") {
        let Some(name) = attr(df, "name") else {
            diag.report(ErrorKind::ParseError, "DataField missing name", line(df));
            continue;
        };
        let value_type = attr(df, "dataType").map(value_type_from_str).unwrap_or(ValueType::String);
        let op_type = attr(df, "optype").map(OpType::from_str).unwrap_or(OpType::Invalid);
        let categories: Vec<String> = children(df, "Value")
            .filter(|v| attr(v, "property").unwrap_or("valid") == "valid")
            .filter_map(|v| attr(v, "value").map(str::to_string))
            .collect();
        field_catalog.insert(name.to_string(), (value_type, categories.clone()));

        let data_field = DataField::new(value_type, op_type).with_categories(categories);
        let emitted = bindings.iter().find(|b| b.name == name).and_then(|b| b.emitted.as_deref());
        let declared = match emitted {
            Some(emitted) => context.declare_input_as(name, emitted, data_field),
            None => context.declare_input(name, data_field),
        };
        if let Err(err) = declared {
            diag.report_with_arg(ErrorKind::DuplicateName, err.to_string(), name.to_string(), line(df));
        }
    }
    field_catalog
}

/// Shadows every `MiningField` that needs preprocessing with a fresh
/// cleaned field bound under the raw field's own name, so the model body
/// parse that follows sees the cleaned value without knowing preprocessing
/// happened. Returns the cleaned-field/settings pairs so phase two can
/// build the actual cleaning expressions once a builder exists.
fn parse_mining_schema_preprocessing(model_node: Node, ctx: &mut CompileCtx) -> Vec<(FieldRef, MiningField)> {
    let Some(mining_schema) = child(model_node, "MiningSchema") else { return Vec::new() };
    let mut preprocessing = Vec::new();
    for mf in children(mining_schema, "MiningField") {
        let Some(name) = attr(mf, "name") else { continue };
        let Some(raw) = ctx.context.lookup(name) else { continue };

        let mut settings = MiningField::new(raw.clone());
        settings.missing_value_replacement = attr(mf, "missingValueReplacement").map(str::to_string);
        settings.invalid_value_replacement = attr(mf, "invalidValueReplacement").map(str::to_string);
        settings.outlier_treatment = attr(mf, "outlierTreatment").map(OutlierTreatment::from_str).unwrap_or_default();
        settings.low_value = attr_f64(mf, "lowValue");
        settings.high_value = attr_f64(mf, "highValue");
        if !settings.needs_preprocessing() {
            continue;
        }

        let clean = ctx.context.fresh_temporary(raw.value_type(), &format!("{name}_clean"));
        ctx.context.rebind(name, clean.clone());
        preprocessing.push((clean, settings));
    }
    preprocessing
}

fn parse_derived_fields(container: Node, ctx: &mut CompileCtx) -> Vec<(FieldRef, Transformation)> {
    let mut derived = Vec::new();
    for df in children(container, "DerivedField") {
        let Some(name) = attr(df, "name") else { continue };
        let value_type = attr(df, "dataType").map(value_type_from_str).unwrap_or(ValueType::Invalid);
        let op_type = attr(df, "optype").map(OpType::from_str).unwrap_or(OpType::Invalid);
        let transformation = transformation_xml::parse_expression_child(df, ctx);
        match ctx.context.declare(name, DataField::new(value_type, op_type), FieldOrigin::TransformedValue) {
            Ok(field) => derived.push((field, transformation)),
            Err(err) => ctx.diag.report_with_arg(ErrorKind::DuplicateName, err.to_string(), name.to_string(), line(df)),
        }
    }
    derived
}

fn parse_target_config(targets_node: Node, target_field_name: Option<&str>) -> TargetConfig {
    let mut target = TargetConfig::new();
    let chosen = children(targets_node, "Target")
        .find(|t| target_field_name.is_some_and(|n| attr(t, "field") == Some(n)))
        .or_else(|| children(targets_node, "Target").next());
    let Some(t) = chosen else { return target };

    target.min = attr_f64(t, "min");
    target.max = attr_f64(t, "max");
    if let Some(factor) = attr_f64(t, "rescaleFactor") {
        target.rescale_factor = factor;
    }
    if let Some(constant) = attr_f64(t, "rescaleConstant") {
        target.rescale_constant = constant;
    }
    target.cast_integer = match attr(t, "castInteger") {
        Some("round") => Some(CastInteger::Round),
        Some("ceiling") => Some(CastInteger::Ceiling),
        Some("floor") => Some(CastInteger::Floor),
        _ => None,
    };
    for tv in children(t, "TargetValue") {
        if let Some(default) = attr_f64(tv, "defaultValue") {
            target.default_value = Some(default);
        }
        if let (Some(value), Some(display)) = (attr(tv, "value"), attr(tv, "displayValue")) {
            target.display_values.push((value.to_string(), display.to_string()));
        }
    }
    target
}

fn parse_output_fields(output_node: Node, ctx: &mut CompileCtx, bindings: &[OutputBinding]) -> Vec<PendingOutputField> {
    let mut pending = Vec::new();
    for of in children(output_node, "OutputField") {
        let Some(name) = attr(of, "name") else {
            ctx.diag.report(ErrorKind::ParseError, "OutputField missing name", line(of));
            continue;
        };
        let value_type = attr(of, "dataType").map(value_type_from_str).unwrap_or(ValueType::String);
        let op_type = attr(of, "optype").map(OpType::from_str).unwrap_or(OpType::Invalid);
        let data_field = DataField::new(value_type, op_type);

        let emitted = bindings.iter().find(|b| b.name == name).and_then(|b| b.emitted.as_deref());
        let declared = match emitted {
            Some(emitted) => ctx.context.declare_output_as(name, emitted, data_field),
            None => ctx.context.declare_output(name, data_field),
        };
        let Ok(field) = declared else {
            ctx.diag.report_with_arg(ErrorKind::DuplicateName, "duplicate output field", name.to_string(), line(of));
            continue;
        };

        let feature = match attr(of, "feature").unwrap_or("predictedValue") {
            "predictedValue" => PendingFeature::PredictedValue,
            "predictedDisplayValue" => PendingFeature::PredictedDisplayValue,
            "entityId" => PendingFeature::EntityId,
            "probability" => PendingFeature::Probability(attr(of, "value").map(str::to_string)),
            "confidence" => PendingFeature::Confidence(attr(of, "value").unwrap_or("").to_string()),
            "reasonCode" => PendingFeature::ReasonCode(attr_usize(of, "rank").unwrap_or(1).saturating_sub(1)),
            "transformedValue" => PendingFeature::TransformedValue(transformation_xml::parse_expression_child(of, ctx)),
            other => {
                ctx.diag.report_with_arg(ErrorKind::UnknownAttributeValue, "unknown OutputField feature", other.to_string(), line(of));
                PendingFeature::PredictedValue
            }
        };

        pending.push(PendingOutputField { field, feature, line: line(of) });
    }
    pending
}

/// Builds the Lua expression that cleans one mining field: outlier
/// clipping/masking first, then missing-value replacement, matching the
/// order PMML documents the two treatments (outlier treatment narrows the
/// value, then missingness replacement fills in what's left missing).
fn build_clean_expression(builder: &mut AstBuilder, catalogue: &Catalogue, settings: &MiningField) -> AstNode {
    builder.push_field(settings.field.clone());
    let mut value = builder.pop_node();

    match settings.outlier_treatment {
        OutlierTreatment::AsExtremeValues => {
            builder.push_node(value);
            if let Some(max) = settings.high_value {
                builder.push_constant(Literal::Number(max));
                let id = catalogue.id_of("min").expect("min registered");
                builder.push_function_call(id, 2, None);
            }
            if let Some(min) = settings.low_value {
                builder.push_constant(Literal::Number(min));
                let id = catalogue.id_of("max").expect("max registered");
                builder.push_function_call(id, 2, None);
            }
            value = builder.pop_node();
        }
        OutlierTreatment::AsMissing => {
            value = push_as_missing_if_out_of_range(builder, catalogue, value, settings.low_value, settings.high_value);
        }
        OutlierTreatment::AsIs => {}
    }

    if let Some(replacement) = &settings.missing_value_replacement {
        let literal = literal_for(settings.field.value_type(), replacement);
        let is_missing_id = catalogue.id_of("isMissing").expect("isMissing registered");
        let if_id = catalogue.id_of("if").expect("if registered");

        builder.push_node(value.clone());
        builder.push_function_call(is_missing_id, 1, None);
        let condition = builder.pop_node();

        builder.push_node(condition);
        builder.push_constant(literal);
        builder.push_node(value);
        builder.push_function_call(if_id, 3, None);
        value = builder.pop_node();
    }

    value
}

fn push_as_missing_if_out_of_range(builder: &mut AstBuilder, catalogue: &Catalogue, value: AstNode, low: Option<f64>, high: Option<f64>) -> AstNode {
    let Some(condition) = build_out_of_range_condition(builder, catalogue, &value, low, high) else { return value };
    let if_id = catalogue.id_of("if").expect("if registered");
    builder.push_node(condition);
    builder.push_constant(Literal::Invalid);
    builder.push_node(value);
    builder.push_function_call(if_id, 3, None);
    builder.pop_node()
}

fn build_out_of_range_condition(builder: &mut AstBuilder, catalogue: &Catalogue, value: &AstNode, low: Option<f64>, high: Option<f64>) -> Option<AstNode> {
    let lt_id = catalogue.id_of("<").expect("< registered");
    let gt_id = catalogue.id_of(">").expect("> registered");

    let below = low.map(|low| {
        builder.push_node(value.clone());
        builder.push_constant(Literal::Number(low));
        builder.push_function_call(lt_id, 2, None);
        builder.pop_node()
    });
    let above = high.map(|high| {
        builder.push_node(value.clone());
        builder.push_constant(Literal::Number(high));
        builder.push_function_call(gt_id, 2, None);
        builder.pop_node()
    });
    match (below, above) {
        (Some(b), Some(a)) => {
            builder.push_node(b);
            builder.push_node(a);
            let or_id = catalogue.id_of("or").expect("or registered");
            builder.push_function_call(or_id, 2, None);
            Some(builder.pop_node())
        }
        (Some(b), None) => Some(b),
        (None, Some(a)) => Some(a),
        (None, None) => None,
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
