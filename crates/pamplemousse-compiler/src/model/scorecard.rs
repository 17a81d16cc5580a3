//! Scorecard model compilation (§4.5.3, C6).
//!
//! Each characteristic contributes the partial score of its first
//! matching attribute to a running total seeded at `initial_score`.
//! When reason codes are requested, every characteristic also tracks
//! its contribution (`baseline - partial`, i.e. how far its matched
//! attribute fell below the characteristic's baseline) and the top
//! contributions are written out ranked descending, ties broken by
//! declaration order, one rank per requested `reasonCode` output field.
//!
//! The ranking is unrolled at compile time into repeated
//! scan-then-commit comparison passes rather than a runtime sort: the
//! number of characteristics and the number of requested reason codes
//! are both known before a line of output is emitted, so there is
//! nothing a sort would discover that isn't already a compile-time
//! constant.

use pamplemousse_core::{AstBuilder, Catalogue, ConversionContext, FieldRef, Literal, ValueType};

use crate::predicate::Predicate;

use super::output::ModelConfig;

#[derive(Debug, Clone)]
pub struct Attribute {
    pub predicate: Predicate,
    pub partial_score: f64,
    pub reason_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Characteristic {
    pub attributes: Vec<Attribute>,
    pub baseline_score: f64,
}

#[derive(Debug, Clone)]
pub struct ScorecardConfig {
    pub characteristics: Vec<Characteristic>,
    pub initial_score: f64,
    pub use_reason_codes: bool,
}

pub fn compile(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, scorecard: &ScorecardConfig) {
    let add_id = catalogue.id_of("+").expect("+ registered");
    let sub_id = catalogue.id_of("-").expect("- registered");

    let mut statements = Vec::new();

    let score = ctx.fresh_temporary(ValueType::Number, "scorecard_score");
    builder.push_constant(Literal::Number(scorecard.initial_score));
    builder.declare(score.clone());
    statements.push(builder.pop_node());

    let mut contributions = Vec::new();
    let mut reasons = Vec::new();
    let mut used = Vec::new();

    for (i, characteristic) in scorecard.characteristics.iter().enumerate() {
        let partial = ctx.fresh_temporary(ValueType::Number, &format!("char_{i}_partial"));
        let reason = ctx.fresh_temporary(ValueType::String, &format!("char_{i}_reason"));
        compile_characteristic(builder, catalogue, characteristic, &partial, &reason, &mut statements);

        builder.push_field(score.clone());
        builder.push_field(partial.clone());
        builder.push_function_call(add_id, 2, None);
        builder.assign(score.clone());
        statements.push(builder.pop_node());

        if scorecard.use_reason_codes {
            let contribution = ctx.fresh_temporary(ValueType::Number, &format!("char_{i}_contribution"));
            builder.push_constant(Literal::Number(characteristic.baseline_score));
            builder.push_field(partial.clone());
            builder.push_function_call(sub_id, 2, None);
            builder.declare(contribution.clone());
            statements.push(builder.pop_node());

            let used_flag = ctx.fresh_temporary(ValueType::Bool, &format!("char_{i}_used"));
            builder.push_constant(Literal::Bool(false));
            builder.declare(used_flag.clone());
            statements.push(builder.pop_node());

            contributions.push(contribution);
            reasons.push(reason);
            used.push(used_flag);
        }
    }

    if let Some(predicted_value) = &config.predicted_value {
        builder.push_field(score);
        builder.assign(predicted_value.clone());
        statements.push(builder.pop_node());
    }

    if scorecard.use_reason_codes {
        for rank in 0..config.reason_codes.len() {
            push_reason_code_round(builder, ctx, catalogue, &contributions, &reasons, &used, &config.reason_codes[rank], rank, &mut statements);
        }
    }

    let len = statements.len();
    for stmt in statements {
        builder.push_node(stmt);
    }
    builder.push_block(len.max(1));
}

fn compile_characteristic(
    builder: &mut AstBuilder,
    catalogue: &Catalogue,
    characteristic: &Characteristic,
    partial: &FieldRef,
    reason: &FieldRef,
    statements: &mut Vec<pamplemousse_core::AstNode>,
) {
    use crate::predicate;

    let mut arms = Vec::new();
    for attribute in &characteristic.attributes {
        predicate::compile(builder, catalogue, &attribute.predicate, None);
        let condition = builder.pop_node();

        builder.push_constant(Literal::Number(attribute.partial_score));
        builder.assign(partial.clone());
        let assign_partial = builder.pop_node();

        builder.push_constant(Literal::String(attribute.reason_code.clone().unwrap_or_default()));
        builder.assign(reason.clone());
        let assign_reason = builder.pop_node();

        builder.push_node(assign_partial);
        builder.push_node(assign_reason);
        builder.push_block(2);
        let body = Box::new(builder.pop_node());
        arms.push(pamplemousse_core::IfArm { condition: Some(Box::new(condition)), body });
    }

    builder.push_constant(Literal::Number(characteristic.baseline_score));
    builder.assign(partial.clone());
    let default_partial = builder.pop_node();

    builder.push_constant(Literal::String(String::new()));
    builder.assign(reason.clone());
    let default_reason = builder.pop_node();

    builder.push_node(default_partial);
    builder.push_node(default_reason);
    builder.push_block(2);
    let default_body = Box::new(builder.pop_node());
    arms.push(pamplemousse_core::IfArm { condition: None, body: default_body });

    builder.push_if_chain(arms);
    statements.push(builder.pop_node());
}

/// Scan every not-yet-used characteristic for the greatest positive
/// contribution (pass one), then commit exactly one winner: the first
/// not-yet-used characteristic whose contribution matches the scan's
/// result is marked used and, if a positive contribution was found at
/// all, has its reason code written to `output_field` (pass two).
fn push_reason_code_round(
    builder: &mut AstBuilder,
    ctx: &mut ConversionContext,
    catalogue: &Catalogue,
    contributions: &[FieldRef],
    reasons: &[FieldRef],
    used: &[FieldRef],
    output_field: &FieldRef,
    rank: usize,
    statements: &mut Vec<pamplemousse_core::AstNode>,
) {
    let gt_id = catalogue.id_of(">").expect("> registered");
    let and_id = catalogue.id_of("and").expect("and registered");
    let not_id = catalogue.id_of("not").expect("not registered");
    let eq_id = catalogue.id_of("==").expect("== registered");

    let best = ctx.fresh_temporary(ValueType::Number, &format!("reason_{rank}_best"));
    let settled = ctx.fresh_temporary(ValueType::Bool, &format!("reason_{rank}_settled"));

    let neg_inf = catalogue.id_of("negInfinity").expect("negInfinity registered");
    builder.push_function_call(neg_inf, 0, None);
    builder.declare(best.clone());
    statements.push(builder.pop_node());

    builder.push_constant(Literal::Bool(false));
    builder.declare(settled.clone());
    statements.push(builder.pop_node());

    // Pass one: find the greatest not-yet-used contribution.
    for (contribution, used_flag) in contributions.iter().zip(used.iter()) {
        builder.push_field(used_flag.clone());
        builder.push_function_call(not_id, 1, None);
        let not_used = builder.pop_node();

        builder.push_field(contribution.clone());
        builder.push_field(best.clone());
        builder.push_function_call(gt_id, 2, None);
        let beats_best = builder.pop_node();

        builder.push_node(not_used);
        builder.push_node(beats_best);
        builder.push_function_call(and_id, 2, None);
        let condition = builder.pop_node();

        builder.push_field(contribution.clone());
        builder.assign(best.clone());
        let assign_best = builder.pop_node();

        builder.push_if_chain(vec![pamplemousse_core::IfArm { condition: Some(Box::new(condition)), body: Box::new(assign_best) }]);
        statements.push(builder.pop_node());
    }

    // Pass two: commit the first not-yet-used characteristic whose
    // contribution equals the scan's result, marking it used so later
    // rounds skip it and writing its reason code out.
    for (i, ((contribution, reason), used_flag)) in contributions.iter().zip(reasons.iter()).zip(used.iter()).enumerate() {
        builder.push_field(used_flag.clone());
        builder.push_function_call(not_id, 1, None);
        let not_used = builder.pop_node();

        builder.push_field(settled.clone());
        builder.push_function_call(not_id, 1, None);
        let not_settled = builder.pop_node();

        builder.push_field(contribution.clone());
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
        builder.assign(used[i].clone());
        then_statements.push(builder.pop_node());

        builder.push_constant(Literal::Bool(true));
        builder.assign(settled.clone());
        then_statements.push(builder.pop_node());

        builder.push_constant(Literal::Number(0.0));
        builder.push_field(best.clone());
        builder.push_function_call(gt_id, 2, None);
        let found_positive = builder.pop_node();

        builder.push_field(reason.clone());
        builder.assign(output_field.clone());
        let assign_reason = builder.pop_node();

        builder.push_if_chain(vec![pamplemousse_core::IfArm { condition: Some(Box::new(found_positive)), body: Box::new(assign_reason) }]);
        then_statements.push(builder.pop_node());

        let then_len = then_statements.len();
        for stmt in then_statements {
            builder.push_node(stmt);
        }
        builder.push_block(then_len);
        let then_body = builder.pop_node();

        builder.push_if_chain(vec![pamplemousse_core::IfArm { condition: Some(Box::new(condition)), body: Box::new(then_body) }]);
        statements.push(builder.pop_node());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::predicate::SimpleOperator;
    use indexmap::IndexMap;
    use pamplemousse_core::{AstKind, DataField, FieldOrigin, OpType};

    /// `department="engineering", age=30, income=500` should yield
    /// `Final Score=41`, two reason codes, and no third.
    #[test]
    fn scorecard_compiles_score_and_two_ranked_reason_codes() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let department = ctx.declare("department", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::DataDictionary).unwrap();
        let age = ctx.declare("age", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let income = ctx.declare("income", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let predicted = ctx.declare("score", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Output).unwrap();
        let reason1 = ctx.declare("reason_code_1", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::Output).unwrap();
        let reason2 = ctx.declare("reason_code_2", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::Output).unwrap();
        let reason3 = ctx.declare("reason_code_3", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::Output).unwrap();

        let scorecard = ScorecardConfig {
            initial_score: 20.0,
            use_reason_codes: true,
            characteristics: vec![
                Characteristic {
                    baseline_score: 10.0,
                    attributes: vec![Attribute {
                        predicate: Predicate::Simple { field: department, operator: SimpleOperator::Equal, value: Some(Literal::String("engineering".into())) },
                        partial_score: 5.0,
                        reason_code: Some("RC1".into()),
                    }],
                },
                Characteristic {
                    baseline_score: 10.0,
                    attributes: vec![Attribute {
                        predicate: Predicate::Simple { field: age, operator: SimpleOperator::GreaterOrEqual, value: Some(Literal::Number(25.0)) },
                        partial_score: 6.0,
                        reason_code: Some("RC2".into()),
                    }],
                },
                Characteristic {
                    baseline_score: 10.0,
                    attributes: vec![Attribute {
                        predicate: Predicate::Simple { field: income, operator: SimpleOperator::GreaterOrEqual, value: Some(Literal::Number(100.0)) },
                        partial_score: 10.0,
                        reason_code: Some("RC3".into()),
                    }],
                },
            ],
        };

        let config = ModelConfig {
            predicted_value: Some(predicted),
            predicted_display_value: None,
            probabilities: IndexMap::new(),
            confidences: IndexMap::new(),
            entity_id: None,
            reason_codes: vec![reason1, reason2, reason3],
            best_probability: None,
            target: None,
            mining_function: super::super::output::MiningFunction::Regression,
            output_type: ValueType::Number,
            outputs: vec![],
        };

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &mut ctx, &catalogue, &config, &scorecard);
        let node = builder.finish();
        assert!(matches!(node.kind, AstKind::Block(_)));
    }
}
