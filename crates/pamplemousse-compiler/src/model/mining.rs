//! Mining model (segmentation / ensemble) compilation (§4.5.3, C6).
//!
//! Every segment compiles its sub-model's body into its own
//! compiler-introduced temporary (one per segment, typed by the
//! combination method's domain), guarded by the segment's predicate.
//! The combination method then folds those temporaries into the
//! parent model's declared outputs. Segment predicates that are
//! statically true or false are left for [`crate::optimize`] to
//! collapse rather than special-cased here.
//!
//! `sum`/`average`/`weightedAverage`/`median`/`max` assume every
//! segment is meant to participate in the combination (the common
//! ensemble shape, where segments carry no predicate or a trivially
//! true one); a segment whose predicate evaluates false at runtime
//! still contributes its method's identity value (`0` for
//! sum/average, `-infinity` for max) rather than being spliced out of
//! the arithmetic, since the combined set's size is otherwise a
//! runtime-only quantity this compiler has no array primitive to
//! index by.

use indexmap::IndexMap;

use pamplemousse_core::{AstBuilder, AstNode, Catalogue, ConversionContext, FieldRef, IfArm, Literal, ValueType};

use crate::predicate::{self, Predicate};

use super::output::{self, ModelConfig};
use super::ModelBody;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipleModelMethod {
    SelectFirst,
    SelectAll,
    ModelChain,
    Sum,
    Average,
    WeightedAverage,
    Median,
    Max,
    MajorityVote,
    WeightedMajorityVote,
}

pub struct Segment {
    pub predicate: Predicate,
    pub weight: f64,
    pub body: Box<ModelBody>,
}

pub struct Segmentation {
    pub segments: Vec<Segment>,
    pub method: MultipleModelMethod,
}

pub fn compile(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, segmentation: &Segmentation) {
    match segmentation.method {
        MultipleModelMethod::SelectFirst | MultipleModelMethod::SelectAll => compile_select_first(builder, ctx, catalogue, config, segmentation),
        MultipleModelMethod::ModelChain => compile_model_chain(builder, ctx, catalogue, config, segmentation),
        MultipleModelMethod::Average | MultipleModelMethod::WeightedAverage | MultipleModelMethod::Max if config.mining_function == output::MiningFunction::Classification => {
            compile_classification_combination(builder, ctx, catalogue, config, segmentation)
        }
        MultipleModelMethod::Sum | MultipleModelMethod::Average | MultipleModelMethod::WeightedAverage | MultipleModelMethod::Max => {
            compile_numeric_combination(builder, ctx, catalogue, config, segmentation)
        }
        MultipleModelMethod::Median => compile_median(builder, ctx, catalogue, config, segmentation),
        MultipleModelMethod::MajorityVote | MultipleModelMethod::WeightedMajorityVote => compile_vote(builder, ctx, catalogue, config, segmentation),
    }
}

/// Compiles one segment's sub-model into a freshly declared temporary
/// of `value_type`, guarded by its predicate; the `else` branch
/// assigns `default` so the temporary is always initialised even when
/// the segment does not match.
fn compile_segment(
    builder: &mut AstBuilder,
    ctx: &mut ConversionContext,
    catalogue: &Catalogue,
    mining_function: output::MiningFunction,
    segment: &Segment,
    value_type: ValueType,
    default: AstNode,
    index: usize,
    statements: &mut Vec<AstNode>,
) -> FieldRef {
    let value_field = ctx.fresh_temporary(value_type, &format!("segment_{index}_value"));
    builder.push_constant(Literal::Number(0.0));
    builder.declare(value_field.clone());
    statements.push(builder.pop_node());

    predicate::compile(builder, catalogue, &segment.predicate, None);
    let condition = builder.pop_node();

    let segment_config = ModelConfig {
        predicted_value: Some(value_field.clone()),
        predicted_display_value: None,
        probabilities: IndexMap::new(),
        confidences: IndexMap::new(),
        entity_id: None,
        reason_codes: vec![],
        best_probability: None,
        target: None,
        mining_function,
        output_type: value_type,
        outputs: vec![],
    };
    super::compile(builder, ctx, catalogue, &segment_config, &segment.body);
    let then_body = builder.pop_node();

    builder.push_node(default);
    builder.assign(value_field.clone());
    let else_body = builder.pop_node();

    builder.push_if_chain(vec![
        IfArm { condition: Some(Box::new(condition)), body: Box::new(then_body) },
        IfArm { condition: None, body: Box::new(else_body) },
    ]);
    statements.push(builder.pop_node());

    value_field
}

/// The first matching segment's result wins; later segments are
/// skipped entirely (an `if`/`elseif` chain, mirroring
/// [`super::ruleset::compile`]'s `firstHit`). `selectAll` collapses to
/// the same behaviour: without a multi-valued output slot to collect
/// every match into, returning the first is the only one-result
/// answer this compiler can give.
fn compile_select_first(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, segmentation: &Segmentation) {
    let mut arms = Vec::new();
    for segment in &segmentation.segments {
        predicate::compile(builder, catalogue, &segment.predicate, None);
        let condition = builder.pop_node();

        super::compile(builder, ctx, catalogue, config, &segment.body);
        let body = builder.pop_node();
        arms.push(IfArm { condition: Some(Box::new(condition)), body: Box::new(body) });
    }
    builder.push_if_chain(arms);
}

/// Segments run unconditionally in order, the last one's declared
/// outputs are the parent's; intermediate segments' output fields are
/// expected to already be wired as later segments' input fields by
/// however the document was resolved into [`super::ModelBody`] values.
fn compile_model_chain(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, segmentation: &Segmentation) {
    let mut statements = Vec::new();
    let last = segmentation.segments.len().saturating_sub(1);
    for (i, segment) in segmentation.segments.iter().enumerate() {
        if i == last {
            super::compile(builder, ctx, catalogue, config, &segment.body);
        } else {
            let passthrough = ModelConfig {
                predicted_value: None,
                predicted_display_value: None,
                probabilities: IndexMap::new(),
                confidences: IndexMap::new(),
                entity_id: None,
                reason_codes: vec![],
                best_probability: None,
                target: None,
                mining_function: config.mining_function,
                output_type: config.output_type,
                outputs: vec![],
            };
            super::compile(builder, ctx, catalogue, &passthrough, &segment.body);
        }
        statements.push(builder.pop_node());
    }
    let len = statements.len();
    for stmt in statements {
        builder.push_node(stmt);
    }
    builder.push_block(len.max(1));
}

fn compile_numeric_combination(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, segmentation: &Segmentation) {
    let mut statements = Vec::new();
    let is_max = segmentation.method == MultipleModelMethod::Max;

    let mut value_fields = Vec::new();
    for (i, segment) in segmentation.segments.iter().enumerate() {
        let default = if is_max {
            let id = catalogue.id_of("negInfinity").expect("negInfinity registered");
            builder.push_function_call(id, 0, None);
            builder.pop_node()
        } else {
            AstNode::constant(Literal::Number(0.0))
        };
        let value_field = compile_segment(builder, ctx, catalogue, config.mining_function, segment, ValueType::Number, default, i, &mut statements);
        value_fields.push(value_field);
    }

    let add_id = catalogue.id_of("+").expect("+ registered");
    let combined = match segmentation.method {
        MultipleModelMethod::Sum | MultipleModelMethod::Average => {
            let mut accumulated = AstNode::constant(Literal::Number(0.0));
            for field in &value_fields {
                builder.push_node(accumulated);
                builder.push_field(field.clone());
                builder.push_function_call(add_id, 2, None);
                accumulated = builder.pop_node();
            }
            if segmentation.method == MultipleModelMethod::Average {
                let div_id = catalogue.id_of("/").expect("/ registered");
                builder.push_node(accumulated);
                builder.push_constant(Literal::Number(value_fields.len().max(1) as f64));
                builder.push_function_call(div_id, 2, None);
                builder.pop_node()
            } else {
                accumulated
            }
        }
        MultipleModelMethod::WeightedAverage => {
            let mul_id = catalogue.id_of("*").expect("* registered");
            let div_id = catalogue.id_of("/").expect("/ registered");
            let mut weighted_sum = AstNode::constant(Literal::Number(0.0));
            let mut weight_sum = 0.0;
            for (field, segment) in value_fields.iter().zip(segmentation.segments.iter()) {
                builder.push_constant(Literal::Number(segment.weight));
                builder.push_field(field.clone());
                builder.push_function_call(mul_id, 2, None);
                let term = builder.pop_node();

                builder.push_node(weighted_sum);
                builder.push_node(term);
                builder.push_function_call(add_id, 2, None);
                weighted_sum = builder.pop_node();
                weight_sum += segment.weight;
            }
            builder.push_node(weighted_sum);
            builder.push_constant(Literal::Number(if weight_sum == 0.0 { 1.0 } else { weight_sum }));
            builder.push_function_call(div_id, 2, None);
            builder.pop_node()
        }
        MultipleModelMethod::Max => {
            let max_id = catalogue.id_of("max").expect("max registered");
            let mut iter = value_fields.iter();
            let first = iter.next().expect("max combination requires at least one segment");
            builder.push_field(first.clone());
            let mut accumulated = builder.pop_node();
            for field in iter {
                builder.push_node(accumulated);
                builder.push_field(field.clone());
                builder.push_function_call(max_id, 2, None);
                accumulated = builder.pop_node();
            }
            accumulated
        }
        _ => unreachable!("compile_numeric_combination only handles sum/average/weightedAverage/max"),
    };

    if let Some(predicted_value) = &config.predicted_value {
        let value = if let Some(target) = &config.target { output::apply_target_postprocessing(builder, catalogue, target, combined) } else { combined };
        builder.push_node(value);
        builder.assign(predicted_value.clone());
        statements.push(builder.pop_node());
    }

    let len = statements.len();
    for stmt in statements {
        builder.push_node(stmt);
    }
    builder.push_block(len.max(1));
}

/// `average`/`weightedAverage`/`max` on a classification ensemble combine
/// whole probability distributions, not scalar numbers (§4.5.3): each
/// segment gets its own probability map, populated the same way a
/// top-level classification model populates `config.probabilities`, and
/// the combination folds those maps category-by-category before the
/// shared winner selection runs once on the combined map. `max` picks the
/// distribution of whichever segment reached the single highest
/// probability anywhere in its own map, splitting the contribution evenly
/// across every segment tied for that maximum (§4.5.3 "ties").
fn compile_classification_combination(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, segmentation: &Segmentation) {
    let mut statements = Vec::new();
    let categories: Vec<String> = config.probabilities.keys().cloned().collect();
    let categories = if categories.is_empty() { vec!["default".to_string()] } else { categories };
    let combined = if config.probabilities.is_empty() { output::build_probability_map(ctx, &categories) } else { config.probabilities.clone() };

    let mut segment_maps = Vec::new();
    for (i, segment) in segmentation.segments.iter().enumerate() {
        let map: IndexMap<String, FieldRef> =
            categories.iter().map(|category| (category.clone(), ctx.fresh_temporary(ValueType::Number, &format!("segment_{i}_prob_{category}")))).collect();
        for field in map.values() {
            builder.push_constant(Literal::Number(0.0));
            builder.declare(field.clone());
            statements.push(builder.pop_node());
        }

        predicate::compile(builder, catalogue, &segment.predicate, None);
        let condition = builder.pop_node();

        let segment_config = ModelConfig {
            predicted_value: None,
            predicted_display_value: None,
            probabilities: map.clone(),
            confidences: IndexMap::new(),
            entity_id: None,
            reason_codes: vec![],
            best_probability: None,
            target: None,
            mining_function: output::MiningFunction::Classification,
            output_type: ValueType::String,
            outputs: vec![],
        };
        super::compile(builder, ctx, catalogue, &segment_config, &segment.body);
        let then_body = builder.pop_node();
        builder.push_if_chain(vec![IfArm { condition: Some(Box::new(condition)), body: Box::new(then_body) }]);
        statements.push(builder.pop_node());

        segment_maps.push(map);
    }

    let add_id = catalogue.id_of("+").expect("+ registered");
    let div_id = catalogue.id_of("/").expect("/ registered");

    if segmentation.method == MultipleModelMethod::Max {
        let gt_id = catalogue.id_of(">").expect("> registered");
        let eq_id = catalogue.id_of("==").expect("== registered");
        let if_id = catalogue.id_of("if").expect("if registered");

        let mut segment_bests = Vec::new();
        for (i, map) in segment_maps.iter().enumerate() {
            let best_field = ctx.fresh_temporary(ValueType::Number, &format!("segment_{i}_best"));
            let mut fields = map.values();
            let first = fields.next().expect("classification combination requires at least one category");
            builder.push_field(first.clone());
            builder.declare(best_field.clone());
            statements.push(builder.pop_node());

            for field in fields {
                builder.push_field(field.clone());
                builder.push_field(best_field.clone());
                builder.push_function_call(gt_id, 2, None);
                let condition = builder.pop_node();
                builder.push_field(field.clone());
                builder.assign(best_field.clone());
                let assign_best = builder.pop_node();
                builder.push_if_chain(vec![IfArm { condition: Some(Box::new(condition)), body: Box::new(assign_best) }]);
                statements.push(builder.pop_node());
            }
            segment_bests.push(best_field);
        }

        let global_best = ctx.fresh_temporary(ValueType::Number, "combination_best");
        builder.push_field(segment_bests[0].clone());
        builder.declare(global_best.clone());
        statements.push(builder.pop_node());
        for best in &segment_bests[1..] {
            builder.push_field(best.clone());
            builder.push_field(global_best.clone());
            builder.push_function_call(gt_id, 2, None);
            let condition = builder.pop_node();
            builder.push_field(best.clone());
            builder.assign(global_best.clone());
            let assign_best = builder.pop_node();
            builder.push_if_chain(vec![IfArm { condition: Some(Box::new(condition)), body: Box::new(assign_best) }]);
            statements.push(builder.pop_node());
        }

        let tie_count = ctx.fresh_temporary(ValueType::Number, "combination_ties");
        builder.push_constant(Literal::Number(0.0));
        builder.declare(tie_count.clone());
        statements.push(builder.pop_node());
        for best in &segment_bests {
            builder.push_field(best.clone());
            builder.push_field(global_best.clone());
            builder.push_function_call(eq_id, 2, None);
            let condition = builder.pop_node();
            builder.push_field(tie_count.clone());
            builder.push_constant(Literal::Number(1.0));
            builder.push_function_call(add_id, 2, None);
            builder.assign(tie_count.clone());
            let body = builder.pop_node();
            builder.push_if_chain(vec![IfArm { condition: Some(Box::new(condition)), body: Box::new(body) }]);
            statements.push(builder.pop_node());
        }

        for category in &categories {
            let mut sum = AstNode::constant(Literal::Number(0.0));
            for (map, best) in segment_maps.iter().zip(segment_bests.iter()) {
                let field = map.get(category).expect("category present in every segment map");

                builder.push_field(best.clone());
                builder.push_field(global_best.clone());
                builder.push_function_call(eq_id, 2, None);
                let is_tied = builder.pop_node();

                builder.push_field(field.clone());
                builder.push_field(tie_count.clone());
                builder.push_function_call(div_id, 2, None);
                let share = builder.pop_node();

                builder.push_node(is_tied);
                builder.push_node(share);
                builder.push_constant(Literal::Number(0.0));
                builder.push_function_call(if_id, 3, None);
                let term = builder.pop_node();

                builder.push_node(sum);
                builder.push_node(term);
                builder.push_function_call(add_id, 2, None);
                sum = builder.pop_node();
            }
            if let Some(target_field) = combined.get(category) {
                builder.push_node(sum);
                builder.assign(target_field.clone());
                statements.push(builder.pop_node());
            }
        }
    } else {
        let weighted = segmentation.method == MultipleModelMethod::WeightedAverage;
        let weight_sum: f64 = segmentation.segments.iter().map(|s| s.weight).sum();
        let divisor = if weighted { if weight_sum == 0.0 { 1.0 } else { weight_sum } } else { segment_maps.len().max(1) as f64 };
        let mul_id = catalogue.id_of("*").expect("* registered");

        for category in &categories {
            let mut sum = AstNode::constant(Literal::Number(0.0));
            for (map, segment) in segment_maps.iter().zip(segmentation.segments.iter()) {
                let field = map.get(category).expect("category present in every segment map");
                if weighted {
                    builder.push_constant(Literal::Number(segment.weight));
                    builder.push_field(field.clone());
                    builder.push_function_call(mul_id, 2, None);
                } else {
                    builder.push_field(field.clone());
                }
                let term = builder.pop_node();
                builder.push_node(sum);
                builder.push_node(term);
                builder.push_function_call(add_id, 2, None);
                sum = builder.pop_node();
            }
            builder.push_node(sum);
            builder.push_constant(Literal::Number(divisor));
            builder.push_function_call(div_id, 2, None);
            let averaged = builder.pop_node();
            if let Some(target_field) = combined.get(category) {
                builder.push_node(averaged);
                builder.assign(target_field.clone());
                statements.push(builder.pop_node());
            }
        }
    }

    if let Some(predicted_value) = &config.predicted_value {
        let winner = output::push_winner_selection(builder, ctx, catalogue, &combined, predicted_value, config.best_probability.as_ref());
        statements.push(winner);
    }

    let len = statements.len();
    for stmt in statements {
        builder.push_node(stmt);
    }
    builder.push_block(len.max(1));
}

/// Sorts every segment's numeric result ascending via `n` unrolled
/// scan-then-commit rounds (the same shape as
/// [`super::scorecard::compile`]'s reason-code ranking and
/// [`super::cluster`]'s nearest-neighbour selection, just run to
/// completion instead of stopping at the top `k`), then reads the
/// middle slot(s) directly — both known at compile time, so no
/// runtime array indexing is needed.
fn compile_median(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, segmentation: &Segmentation) {
    let mut statements = Vec::new();
    let n = segmentation.segments.len();

    let mut value_fields = Vec::new();
    let mut used = Vec::new();
    for (i, segment) in segmentation.segments.iter().enumerate() {
        let value_field = compile_segment(builder, ctx, catalogue, config.mining_function, segment, ValueType::Number, AstNode::constant(Literal::Number(0.0)), i, &mut statements);
        let used_flag = ctx.fresh_temporary(ValueType::Bool, &format!("segment_{i}_used"));
        builder.push_constant(Literal::Bool(false));
        builder.declare(used_flag.clone());
        statements.push(builder.pop_node());
        value_fields.push(value_field);
        used.push(used_flag);
    }

    let lt_id = catalogue.id_of("<").expect("< registered");
    let and_id = catalogue.id_of("and").expect("and registered");
    let not_id = catalogue.id_of("not").expect("not registered");
    let eq_id = catalogue.id_of("==").expect("== registered");
    let posinf_id = catalogue.id_of("posInfinity").expect("posInfinity registered");

    let mut sorted = Vec::new();
    for rank in 0..n {
        let best = ctx.fresh_temporary(ValueType::Number, &format!("median_{rank}_best"));
        let settled = ctx.fresh_temporary(ValueType::Bool, &format!("median_{rank}_settled"));
        let slot = ctx.fresh_temporary(ValueType::Number, &format!("median_{rank}_slot"));

        builder.push_function_call(posinf_id, 0, None);
        builder.declare(best.clone());
        statements.push(builder.pop_node());
        builder.push_constant(Literal::Bool(false));
        builder.declare(settled.clone());
        statements.push(builder.pop_node());
        builder.push_constant(Literal::Number(0.0));
        builder.declare(slot.clone());
        statements.push(builder.pop_node());

        for (value_field, used_flag) in value_fields.iter().zip(used.iter()) {
            builder.push_field(used_flag.clone());
            builder.push_function_call(not_id, 1, None);
            let not_used = builder.pop_node();

            builder.push_field(value_field.clone());
            builder.push_field(best.clone());
            builder.push_function_call(lt_id, 2, None);
            let beats_best = builder.pop_node();

            builder.push_node(not_used);
            builder.push_node(beats_best);
            builder.push_function_call(and_id, 2, None);
            let condition = builder.pop_node();

            builder.push_field(value_field.clone());
            builder.assign(best.clone());
            let assign_best = builder.pop_node();

            builder.push_if_chain(vec![IfArm { condition: Some(Box::new(condition)), body: Box::new(assign_best) }]);
            statements.push(builder.pop_node());
        }

        for (value_field, used_flag) in value_fields.iter().zip(used.iter()) {
            builder.push_field(used_flag.clone());
            builder.push_function_call(not_id, 1, None);
            let not_used = builder.pop_node();

            builder.push_field(settled.clone());
            builder.push_function_call(not_id, 1, None);
            let not_settled = builder.pop_node();

            builder.push_field(value_field.clone());
            builder.push_field(best.clone());
            builder.push_function_call(eq_id, 2, None);
            let matches_best = builder.pop_node();

            builder.push_node(not_used);
            builder.push_node(not_settled);
            builder.push_function_call(and_id, 2, None);
            builder.push_node(matches_best);
            builder.push_function_call(and_id, 2, None);
            let condition = builder.pop_node();

            let mut then_statements = Vec::new();
            builder.push_constant(Literal::Bool(true));
            builder.assign(used_flag.clone());
            then_statements.push(builder.pop_node());
            builder.push_constant(Literal::Bool(true));
            builder.assign(settled.clone());
            then_statements.push(builder.pop_node());
            builder.push_field(best.clone());
            builder.assign(slot.clone());
            then_statements.push(builder.pop_node());

            let then_len = then_statements.len();
            for stmt in then_statements {
                builder.push_node(stmt);
            }
            builder.push_block(then_len);
            let then_body = builder.pop_node();

            builder.push_if_chain(vec![IfArm { condition: Some(Box::new(condition)), body: Box::new(then_body) }]);
            statements.push(builder.pop_node());
        }

        sorted.push(slot);
    }

    let median = if n == 0 {
        builder.push_constant(Literal::Number(0.0));
        builder.pop_node()
    } else if n % 2 == 1 {
        builder.push_field(sorted[n / 2].clone());
        builder.pop_node()
    } else {
        let add_id = catalogue.id_of("+").expect("+ registered");
        let div_id = catalogue.id_of("/").expect("/ registered");
        builder.push_field(sorted[n / 2 - 1].clone());
        builder.push_field(sorted[n / 2].clone());
        builder.push_function_call(add_id, 2, None);
        builder.push_constant(Literal::Number(2.0));
        builder.push_function_call(div_id, 2, None);
        builder.pop_node()
    };

    if let Some(predicted_value) = &config.predicted_value {
        let value = if let Some(target) = &config.target { output::apply_target_postprocessing(builder, catalogue, target, median) } else { median };
        builder.push_node(value);
        builder.assign(predicted_value.clone());
        statements.push(builder.pop_node());
    }

    let len = statements.len();
    for stmt in statements {
        builder.push_node(stmt);
    }
    builder.push_block(len.max(1));
}

/// Each segment contributes one categorical vote (or, weighted, its
/// segment weight) to the matching category's tally; the shared
/// arg-max winner selection then picks the category with the most
/// votes, ties going to the first-declared category.
fn compile_vote(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, segmentation: &Segmentation) {
    let mut statements = Vec::new();

    let mut segment_categories = Vec::new();
    for (i, segment) in segmentation.segments.iter().enumerate() {
        let category_field =
            compile_segment(builder, ctx, catalogue, config.mining_function, segment, ValueType::String, AstNode::constant(Literal::String(String::new())), i, &mut statements);
        segment_categories.push(category_field);
    }

    let categories: Vec<String> = config.probabilities.keys().cloned().collect();
    let probabilities = if categories.is_empty() { output::build_probability_map(ctx, &["default".to_string()]) } else { config.probabilities.clone() };
    for field in probabilities.values() {
        builder.push_constant(Literal::Number(0.0));
        builder.declare(field.clone());
        statements.push(builder.pop_node());
    }

    let add_id = catalogue.id_of("+").expect("+ registered");
    let eq_id = catalogue.id_of("==").expect("== registered");
    let weighted = segmentation.method == MultipleModelMethod::WeightedMajorityVote;
    for (category_field, segment) in segment_categories.iter().zip(segmentation.segments.iter()) {
        for (category, tally_field) in &probabilities {
            builder.push_field(category_field.clone());
            builder.push_constant(Literal::String(category.clone()));
            builder.push_function_call(eq_id, 2, None);
            let condition = builder.pop_node();

            let increment = if weighted { segment.weight } else { 1.0 };
            builder.push_field(tally_field.clone());
            builder.push_constant(Literal::Number(increment));
            builder.push_function_call(add_id, 2, None);
            builder.assign(tally_field.clone());
            let body = builder.pop_node();

            builder.push_if_chain(vec![IfArm { condition: Some(Box::new(condition)), body: Box::new(body) }]);
            statements.push(builder.pop_node());
        }
    }

    if let Some(predicted_value) = &config.predicted_value {
        let winner = output::push_winner_selection(builder, ctx, catalogue, &probabilities, predicted_value, config.best_probability.as_ref());
        statements.push(winner);
    }

    let len = statements.len();
    for stmt in statements {
        builder.push_node(stmt);
    }
    builder.push_block(len.max(1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::model::ruleset::{Rule, RuleSelectionMethod, RuleSetConfig};
    use crate::model::tree::{MissingValueStrategy, NoTrueChildStrategy, ScoreDistribution, TreeConfig, TreeNode};
    use crate::predicate::{Predicate, SimpleOperator};
    use pamplemousse_core::{AstKind, DataField, FieldOrigin, OpType};

    fn rule_set_body(score: &str) -> Box<ModelBody> {
        Box::new(ModelBody::RuleSet(RuleSetConfig {
            selection_method: RuleSelectionMethod::FirstHit,
            rules: vec![Rule { predicate: Predicate::True, id: None, score: score.to_string(), weight: 1.0, confidences: vec![] }],
            default_score: None,
        }))
    }

    /// A single unconditional leaf that always predicts `winner` with
    /// probability 1.0 and every other category 0.0.
    fn classification_leaf_body(winner: &str, categories: &[&str]) -> Box<ModelBody> {
        Box::new(ModelBody::Tree {
            tree: TreeConfig { no_true_child_strategy: NoTrueChildStrategy::ReturnLastPrediction, missing_value_strategy: MissingValueStrategy::None, missing_value_penalty: None },
            root: TreeNode {
                predicate: Predicate::True,
                score: Some(winner.to_string()),
                id: None,
                default_child: None,
                distributions: categories
                    .iter()
                    .map(|category| ScoreDistribution { category: category.to_string(), record_count: if *category == winner { 1.0 } else { 0.0 }, confidence: None })
                    .collect(),
                children: vec![],
            },
        })
    }

    #[test]
    fn average_of_two_segments_compiles_to_a_block() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let predicted = ctx.declare("predicted", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Output).unwrap();

        let segmentation = Segmentation {
            segments: vec![
                Segment { predicate: Predicate::True, weight: 1.0, body: rule_set_body("10") },
                Segment { predicate: Predicate::True, weight: 1.0, body: rule_set_body("20") },
            ],
            method: MultipleModelMethod::Average,
        };

        let config = ModelConfig {
            predicted_value: Some(predicted),
            predicted_display_value: None,
            probabilities: IndexMap::new(),
            confidences: IndexMap::new(),
            entity_id: None,
            reason_codes: vec![],
            best_probability: None,
            target: None,
            mining_function: output::MiningFunction::Regression,
            output_type: ValueType::Number,
            outputs: vec![],
        };

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &mut ctx, &catalogue, &config, &segmentation);
        let node = builder.finish();
        assert!(matches!(node.kind, AstKind::Block(_)));

        // Both segments' temporaries must feed the combination, and the
        // combination must actually divide by the segment count (2), not
        // just sum or pick one segment.
        fn field_names(node: &AstNode, names: &mut Vec<String>) {
            if let AstKind::FieldRef(field) = &node.kind {
                if field.emitted_name.contains("segment_") {
                    names.push(field.emitted_name.clone());
                }
            }
            for child in node.children() {
                field_names(child, names);
            }
        }
        fn divides_by_two(node: &AstNode, catalogue: &Catalogue) -> bool {
            if let AstKind::FunctionCall { function, args } = &node.kind {
                if catalogue.get(*function).name == "/" && args.iter().any(|a| matches!(&a.kind, AstKind::Constant(Literal::Number(n)) if (*n - 2.0).abs() < 1e-9)) {
                    return true;
                }
            }
            node.children().iter().any(|c| divides_by_two(c, catalogue))
        }
        let mut names = Vec::new();
        field_names(&node, &mut names);
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 2, "both segment temporaries should be referenced, found {names:?}");
        assert!(divides_by_two(&node, &catalogue), "average of two segments must divide their sum by 2");
    }

    #[test]
    fn select_first_emits_an_if_chain() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let predicted = ctx.declare("predicted", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Output).unwrap();

        let high_value = ctx.declare("x", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let guarded = Predicate::Simple { field: high_value, operator: SimpleOperator::GreaterThan, value: Some(Literal::Number(0.0)) };

        let segmentation = Segmentation {
            segments: vec![
                Segment { predicate: guarded, weight: 1.0, body: rule_set_body("10") },
                Segment { predicate: Predicate::True, weight: 1.0, body: rule_set_body("20") },
            ],
            method: MultipleModelMethod::SelectFirst,
        };

        let config = ModelConfig {
            predicted_value: Some(predicted),
            predicted_display_value: None,
            probabilities: IndexMap::new(),
            confidences: IndexMap::new(),
            entity_id: None,
            reason_codes: vec![],
            best_probability: None,
            target: None,
            mining_function: output::MiningFunction::Regression,
            output_type: ValueType::Number,
            outputs: vec![],
        };

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &mut ctx, &catalogue, &config, &segmentation);
        let node = builder.finish();
        let AstKind::IfChain(arms) = &node.kind else { panic!("expected an if-chain, got {:?}", node.kind) };

        // Exactly the two segments, in document order: the guarded segment
        // first, the unconditional `true` segment last (not collapsed to
        // an unconditional else, since `selectAll` still needs the guard
        // to decide whether that segment even applies).
        assert_eq!(arms.len(), 2);
        assert!(arms[0].condition.is_some());
        let Some(condition) = &arms[0].condition else { unreachable!() };
        assert!(matches!(&condition.kind, AstKind::FunctionCall { function, .. } if catalogue.get(*function).name == ">"));

        fn contains_string(node: &AstNode, target: &str) -> bool {
            if matches!(&node.kind, AstKind::Constant(Literal::String(s)) if s == target) {
                return true;
            }
            node.children().iter().any(|c| contains_string(c, target))
        }
        assert!(contains_string(&arms[0].body, "10"), "first arm should assign the guarded segment's score");
        assert!(contains_string(&arms[1].body, "20"), "second arm should assign the fallback segment's score");
    }

    #[test]
    fn classification_average_combines_probability_maps_not_scalars() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let predicted = ctx.declare("predicted", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::Output).unwrap();
        let prob_yes = ctx.declare("prob_yes", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Output).unwrap();
        let prob_no = ctx.declare("prob_no", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Output).unwrap();

        let segmentation = Segmentation {
            segments: vec![
                Segment { predicate: Predicate::True, weight: 1.0, body: classification_leaf_body("yes", &["yes", "no"]) },
                Segment { predicate: Predicate::True, weight: 1.0, body: classification_leaf_body("no", &["yes", "no"]) },
            ],
            method: MultipleModelMethod::Average,
        };

        let mut probabilities = IndexMap::new();
        probabilities.insert("yes".to_string(), prob_yes);
        probabilities.insert("no".to_string(), prob_no);
        let config = ModelConfig {
            predicted_value: Some(predicted),
            predicted_display_value: None,
            probabilities,
            confidences: IndexMap::new(),
            entity_id: None,
            reason_codes: vec![],
            best_probability: None,
            target: None,
            mining_function: output::MiningFunction::Classification,
            output_type: ValueType::String,
            outputs: vec![],
        };

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &mut ctx, &catalogue, &config, &segmentation);
        let node = builder.finish();
        assert!(matches!(node.kind, AstKind::Block(_)));

        // Both segments' own "yes"/"no" probability temporaries must feed
        // the average (a dedicated per-category map per segment, not one
        // shared scalar), and the winner-selection arg-max must run once
        // on the combined map.
        fn field_names(node: &AstNode, names: &mut Vec<String>) {
            if let AstKind::FieldRef(field) = &node.kind {
                if field.emitted_name.contains("segment_") && field.emitted_name.contains("_prob_") {
                    names.push(field.emitted_name.clone());
                }
            }
            for child in node.children() {
                field_names(child, names);
            }
        }
        let mut names = Vec::new();
        field_names(&node, &mut names);
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 4, "each of the 2 segments needs its own yes/no probability pair, found {names:?}");

        fn contains_gt(node: &AstNode, catalogue: &Catalogue) -> bool {
            if let AstKind::FunctionCall { function, .. } = &node.kind {
                if catalogue.get(*function).name == ">" {
                    return true;
                }
            }
            node.children().iter().any(|c| contains_gt(c, catalogue))
        }
        assert!(contains_gt(&node, &catalogue), "winner selection's arg-max scan must run over the combined map");
    }

    #[test]
    fn classification_max_splits_ties_across_equally_confident_segments() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let predicted = ctx.declare("predicted", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::Output).unwrap();
        let prob_yes = ctx.declare("prob_yes", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Output).unwrap();
        let prob_no = ctx.declare("prob_no", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Output).unwrap();

        let segmentation = Segmentation {
            segments: vec![
                Segment { predicate: Predicate::True, weight: 1.0, body: classification_leaf_body("yes", &["yes", "no"]) },
                Segment { predicate: Predicate::True, weight: 1.0, body: classification_leaf_body("no", &["yes", "no"]) },
            ],
            method: MultipleModelMethod::Max,
        };

        let mut probabilities = IndexMap::new();
        probabilities.insert("yes".to_string(), prob_yes);
        probabilities.insert("no".to_string(), prob_no);
        let config = ModelConfig {
            predicted_value: Some(predicted),
            predicted_display_value: None,
            probabilities,
            confidences: IndexMap::new(),
            entity_id: None,
            reason_codes: vec![],
            best_probability: None,
            target: None,
            mining_function: output::MiningFunction::Classification,
            output_type: ValueType::String,
            outputs: vec![],
        };

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &mut ctx, &catalogue, &config, &segmentation);
        let node = builder.finish();

        // A tie-count accumulator and an equality comparison against the
        // running global best must both appear: that's the 1/k split, not
        // a plain arg-max over scalars.
        fn contains_function(node: &AstNode, catalogue: &Catalogue, name: &str) -> bool {
            if let AstKind::FunctionCall { function, .. } = &node.kind {
                if catalogue.get(*function).name == name {
                    return true;
                }
            }
            node.children().iter().any(|c| contains_function(c, catalogue, name))
        }
        assert!(contains_function(&node, &catalogue, "=="), "tie detection needs an equality comparison against the running best");
        assert!(contains_function(&node, &catalogue, "if"), "a tied segment's share must be computed via the ternary, zero otherwise");

        fn field_names(node: &AstNode, names: &mut Vec<String>) {
            if let AstKind::FieldRef(field) = &node.kind {
                if field.emitted_name.contains("combination_ties") {
                    names.push(field.emitted_name.clone());
                }
            }
            for child in node.children() {
                field_names(child, names);
            }
        }
        let mut names = Vec::new();
        field_names(&node, &mut names);
        assert!(!names.is_empty(), "expected a tie-count temporary to be declared");
    }
}
