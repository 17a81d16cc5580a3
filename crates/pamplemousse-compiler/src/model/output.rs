//! Shared model-compiler helpers (§4.5): target post-processing,
//! display-value mapping, output field assembly, probability map
//! construction, winner selection, and probability normalisation.
//!
//! Every model compiler (`tree.rs`, `ruleset.rs`, `mining.rs`,
//! `regression.rs`, ...) builds its body through these free functions
//! rather than a trait per model kind — the root driver already knows
//! the model kind from the document, so no dispatch indirection is
//! needed.

use indexmap::IndexMap;

use pamplemousse_core::{AstBuilder, AstNode, Catalogue, ConversionContext, FieldRef, Literal, ValueType};

/// PMML's `mining function` attribute, shared by every model kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningFunction {
    Regression,
    Classification,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastInteger {
    Round,
    Ceiling,
    Floor,
}

/// Numeric target post-processing: default, clipping, rescale, integer cast.
#[derive(Debug, Clone, Default)]
pub struct TargetConfig {
    pub default_value: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub rescale_factor: f64,
    pub rescale_constant: f64,
    pub cast_integer: Option<CastInteger>,
    /// Ordered category → display-string surrogate chain.
    pub display_values: Vec<(String, String)>,
}

impl TargetConfig {
    pub fn new() -> Self {
        Self { rescale_factor: 1.0, rescale_constant: 0.0, ..Default::default() }
    }
}

/// Where a declared `OutputField` pulls its value from.
#[derive(Debug, Clone)]
pub enum OutputFeature {
    PredictedValue,
    PredictedDisplayValue,
    EntityId,
    Probability(String),
    Confidence(String),
    ReasonCode(usize),
    TransformedValue(AstNode),
}

/// A declared output field: the emitted binding plus where its value
/// comes from.
pub struct OutputField {
    pub field: FieldRef,
    pub feature: OutputFeature,
}

/// Per-model record of where computed results are written (§3 "Model
/// config").
pub struct ModelConfig {
    pub predicted_value: Option<FieldRef>,
    pub predicted_display_value: Option<FieldRef>,
    pub probabilities: IndexMap<String, FieldRef>,
    pub confidences: IndexMap<String, FieldRef>,
    pub entity_id: Option<FieldRef>,
    pub reason_codes: Vec<FieldRef>,
    pub best_probability: Option<FieldRef>,
    pub target: Option<TargetConfig>,
    pub mining_function: MiningFunction,
    pub output_type: ValueType,
    pub outputs: Vec<OutputField>,
}

/// Applies default value, min/max clipping, rescale, then optional integer
/// casting to a raw numeric result (§4.5 "Target post-processing"). Each
/// step is skipped when not configured, so an untouched target round-trips
/// `raw` unchanged.
pub fn apply_target_postprocessing(builder: &mut AstBuilder, catalogue: &Catalogue, target: &TargetConfig, raw: AstNode) -> AstNode {
    builder.push_node(raw);

    if let Some(default_value) = target.default_value {
        builder.push_constant(Literal::Number(default_value));
        let id = catalogue.id_of("default").expect("default registered");
        builder.push_function_call(id, 2, None);
    }
    if let Some(max) = target.max {
        builder.push_constant(Literal::Number(max));
        let id = catalogue.id_of("min").expect("min registered");
        builder.push_function_call(id, 2, None);
    }
    if let Some(min) = target.min {
        builder.push_constant(Literal::Number(min));
        let id = catalogue.id_of("max").expect("max registered");
        builder.push_function_call(id, 2, None);
    }
    if target.rescale_factor != 1.0 {
        builder.push_constant(Literal::Number(target.rescale_factor));
        let id = catalogue.id_of("*").expect("* registered");
        builder.push_function_call(id, 2, None);
    }
    if target.rescale_constant != 0.0 {
        builder.push_constant(Literal::Number(target.rescale_constant));
        let id = catalogue.id_of("+").expect("+ registered");
        builder.push_function_call(id, 2, None);
    }
    if let Some(cast) = target.cast_integer {
        let name = match cast {
            CastInteger::Round => "round",
            CastInteger::Ceiling => "ceiling",
            CastInteger::Floor => "floor",
        };
        let id = catalogue.id_of(name).expect("cast function registered");
        builder.push_function_call(id, 1, None);
    }
    builder.pop_node()
}

/// Builds a surrogate chain mapping a predicted category onto its display
/// string, falling back to the category itself when nothing matches.
/// Pop-then-repush discipline, matching
/// [`crate::transformation::compile`]'s `MapValues`/`Discretize` pattern,
/// so the running fallback is always the most-recently-built candidate.
pub fn map_display_value(builder: &mut AstBuilder, catalogue: &Catalogue, predicted: &AstNode, display_values: &[(String, String)]) -> AstNode {
    let mut accumulated = builder.coerce_to_type(predicted.clone(), ValueType::String);
    let eq_id = catalogue.id_of("==").expect("== registered");
    let if_id = catalogue.id_of("if").expect("if registered");

    for (category, display) in display_values.iter().rev() {
        builder.push_node(predicted.clone());
        builder.push_constant(Literal::String(category.clone()));
        builder.push_function_call(eq_id, 2, None);
        builder.push_constant(Literal::String(display.clone()));
        builder.push_node(accumulated);
        builder.push_function_call(if_id, 3, None);
        accumulated = builder.pop_node();
    }
    accumulated
}

/// Allocates one fresh numeric temporary per category, in the categories'
/// declaration order — the order later drives `pickWinner`'s tie-break
/// (§4.5 "ties broken by first occurrence in the map's insertion order").
pub fn build_probability_map(ctx: &mut ConversionContext, categories: &[String]) -> IndexMap<String, FieldRef> {
    categories.iter().map(|category| (category.clone(), ctx.fresh_temporary(ValueType::Number, &format!("prob_{category}")))).collect()
}

/// Emits the arg-max scan over a probability map: initialises the
/// predicted value and running best to the first category, then for each
/// remaining category conditionally overtakes it. Ties resolve to the
/// earliest key (§8 property 5) because a later category only overtakes
/// on a *strictly* greater probability.
pub fn push_winner_selection(
    builder: &mut AstBuilder,
    ctx: &mut ConversionContext,
    catalogue: &Catalogue,
    probabilities: &IndexMap<String, FieldRef>,
    predicted_value: &FieldRef,
    best_probability: Option<&FieldRef>,
) -> AstNode {
    let mut entries = probabilities.iter();
    let (first_key, first_field) = entries.next().expect("pickWinner requires at least one category");

    // Tracks the current leader's probability regardless of whether the
    // model declares a `best_probability` output field, so comparisons
    // are always against the true running max, not the first candidate.
    let running_best = ctx.fresh_temporary(ValueType::Number, "best_prob");

    let mut statements = Vec::new();

    builder.push_constant(Literal::String(first_key.clone()));
    builder.assign(predicted_value.clone());
    statements.push(builder.pop_node());

    builder.push_field(first_field.clone());
    builder.declare(running_best.clone());
    statements.push(builder.pop_node());

    if let Some(best) = best_probability {
        builder.push_field(first_field.clone());
        builder.assign(best.clone());
        statements.push(builder.pop_node());
    }

    let gt_id = catalogue.id_of(">").expect("> registered");
    for (key, field) in entries {
        builder.push_field(field.clone());
        builder.push_field(running_best.clone());
        builder.push_function_call(gt_id, 2, None);
        let condition = builder.pop_node();

        let mut then_statements = Vec::new();
        builder.push_constant(Literal::String(key.clone()));
        builder.assign(predicted_value.clone());
        then_statements.push(builder.pop_node());

        builder.push_field(field.clone());
        builder.assign(running_best.clone());
        then_statements.push(builder.pop_node());

        if let Some(best) = best_probability {
            builder.push_field(field.clone());
            builder.assign(best.clone());
            then_statements.push(builder.pop_node());
        }
        let then_len = then_statements.len();
        for stmt in then_statements {
            builder.push_node(stmt);
        }
        builder.push_block(then_len);
        let then_body = builder.pop_node();

        builder.push_if_chain(vec![pamplemousse_core::IfArm { condition: Some(Box::new(condition)), body: Box::new(then_body) }]);
        statements.push(builder.pop_node());
    }

    let len = statements.len();
    for stmt in statements {
        builder.push_node(stmt);
    }
    builder.push_block(len);
    builder.pop_node()
}

/// Divides each probability field by `total` so the map sums to 1. `total`
/// is itself an expression (a constant record count, or a running
/// accumulator field) rather than a fixed literal.
pub fn push_probability_normalisation(builder: &mut AstBuilder, catalogue: &Catalogue, probabilities: &IndexMap<String, FieldRef>, total: &AstNode) -> Vec<AstNode> {
    let div_id = catalogue.id_of("/").expect("/ registered");
    probabilities
        .values()
        .map(|field| {
            builder.push_field(field.clone());
            builder.push_node(total.clone());
            builder.push_function_call(div_id, 2, None);
            builder.assign(field.clone());
            builder.pop_node()
        })
        .collect()
}

/// Traverses declared output fields and, per their [`OutputFeature`],
/// emits the assignment from the appropriate intermediate (§4.5 "Output
/// field assembly").
pub fn push_output_assembly(
    builder: &mut AstBuilder,
    config: &ModelConfig,
    predicted_value_node: Option<&AstNode>,
    predicted_display_value_node: Option<&AstNode>,
) -> Vec<AstNode> {
    let mut statements = Vec::new();
    for output in &config.outputs {
        let value = match &output.feature {
            OutputFeature::PredictedValue => predicted_value_node.cloned(),
            OutputFeature::PredictedDisplayValue => predicted_display_value_node.cloned(),
            OutputFeature::EntityId => config.entity_id.as_ref().map(|f| AstNode::field_ref(f.clone())),
            OutputFeature::Probability(category) => config.probabilities.get(category).map(|f| AstNode::field_ref(f.clone())),
            OutputFeature::Confidence(category) => config.confidences.get(category).map(|f| AstNode::field_ref(f.clone())),
            OutputFeature::ReasonCode(rank) => config.reason_codes.get(*rank).map(|f| AstNode::field_ref(f.clone())),
            OutputFeature::TransformedValue(node) => Some(node.clone()),
        };
        let Some(value) = value else { continue };
        builder.push_node(value);
        builder.assign(output.field.clone());
        statements.push(builder.pop_node());
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use pamplemousse_core::{AstKind, DataField, FieldOrigin, OpType};

    #[test]
    fn target_postprocessing_applies_default_clip_and_cast() {
        let catalogue = Catalogue::standard();
        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        let mut target = TargetConfig::new();
        target.default_value = Some(0.0);
        target.max = Some(10.0);
        target.cast_integer = Some(CastInteger::Round);
        let raw = AstNode::constant(Literal::Number(12.4));
        let result = apply_target_postprocessing(&mut builder, &catalogue, &target, raw);
        assert_eq!(result.value_type, ValueType::Number);
    }

    #[test]
    fn probability_map_preserves_category_order() {
        let mut ctx = ConversionContext::new(false);
        let categories = vec!["setosa".to_string(), "versicolor".to_string()];
        let map = build_probability_map(&mut ctx, &categories);
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, categories);
    }

    #[test]
    fn winner_selection_breaks_ties_by_insertion_order() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let categories = vec!["a".to_string(), "b".to_string()];
        let probabilities = build_probability_map(&mut ctx, &categories);
        let predicted = ctx.declare("predicted", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::Output).unwrap();
        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        let node = push_winner_selection(&mut builder, &mut ctx, &catalogue, &probabilities, &predicted, None);
        assert!(matches!(node.kind, AstKind::Block(_)));
    }
}
