//! Rule set model compilation (§4.5.2, C6).
//!
//! A flat list of rules plus a selection method. `firstHit` emits a
//! conditional chain; `weightedMax` evaluates every rule and tracks a
//! running best-weight variable, the same arg-max shape
//! [`super::output::push_winner_selection`] uses for probability maps,
//! but keyed on an explicit weight rather than a probability field.

use std::collections::HashMap;

use pamplemousse_core::{AstBuilder, AstNode, Catalogue, ConversionContext, IfArm, Literal, ValueType};

use crate::predicate::{self, Predicate};

use super::output::ModelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSelectionMethod {
    FirstHit,
    WeightedMax,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub predicate: Predicate,
    pub id: Option<String>,
    pub score: String,
    /// `weightedMax`'s confidence weight for this rule; unused by `firstHit`.
    pub weight: f64,
    /// Per-category confidence this rule assigns when it is the winner.
    pub confidences: Vec<(String, f64)>,
}

#[derive(Debug, Clone)]
pub struct RuleSetConfig {
    pub selection_method: RuleSelectionMethod,
    pub rules: Vec<Rule>,
    /// Emitted when no rule fires (`firstHit`) or when the rule list is
    /// empty (`weightedMax`).
    pub default_score: Option<String>,
}

pub fn compile(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, ruleset: &RuleSetConfig) {
    match ruleset.selection_method {
        RuleSelectionMethod::FirstHit => compile_first_hit(builder, catalogue, config, ruleset),
        RuleSelectionMethod::WeightedMax => compile_weighted_max(builder, ctx, catalogue, config, ruleset),
    }
}

fn push_rule_writes(builder: &mut AstBuilder, config: &ModelConfig, rule: &Rule) -> Vec<AstNode> {
    let mut statements = Vec::new();
    if let Some(predicted_value) = &config.predicted_value {
        builder.push_constant(Literal::String(rule.score.clone()));
        builder.assign(predicted_value.clone());
        statements.push(builder.pop_node());
    }
    for (category, confidence) in &rule.confidences {
        if let Some(field) = config.confidences.get(category) {
            builder.push_constant(Literal::Number(*confidence));
            builder.assign(field.clone());
            statements.push(builder.pop_node());
        }
    }
    statements
}

fn compile_first_hit(builder: &mut AstBuilder, catalogue: &Catalogue, config: &ModelConfig, ruleset: &RuleSetConfig) {
    let mut arms = Vec::new();
    for rule in &ruleset.rules {
        predicate::compile(builder, catalogue, &rule.predicate, None);
        let condition = builder.pop_node();
        let statements = push_rule_writes(builder, config, rule);
        let len = statements.len();
        for stmt in statements {
            builder.push_node(stmt);
        }
        builder.push_block(len);
        let body = Box::new(builder.pop_node());
        arms.push(IfArm { condition: Some(Box::new(condition)), body });
    }

    if let (Some(default_score), Some(predicted_value)) = (&ruleset.default_score, &config.predicted_value) {
        builder.push_constant(Literal::String(default_score.clone()));
        builder.assign(predicted_value.clone());
        let fallback = Box::new(builder.pop_node());
        arms.push(IfArm { condition: None, body: fallback });
    }

    builder.push_if_chain(arms);
}

/// Every rule is evaluated independently (unlike `firstHit`'s chain); a
/// matching rule with a strictly greater weight than the running best
/// overtakes it, so the earliest-declared rule wins ties.
fn compile_weighted_max(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, ruleset: &RuleSetConfig) {
    let best_weight = ctx.fresh_temporary(ValueType::Number, "rule_best_weight");
    let best_score = ctx.fresh_temporary(ValueType::String, "rule_best_score");
    let mut best_confidences = HashMap::new();
    for category in config.confidences.keys() {
        best_confidences.insert(category.clone(), ctx.fresh_temporary(ValueType::Number, &format!("rule_best_conf_{category}")));
    }

    let mut statements = Vec::new();

    let neg_inf = catalogue.id_of("negInfinity").expect("negInfinity registered");
    builder.push_function_call(neg_inf, 0, None);
    builder.declare(best_weight.clone());
    statements.push(builder.pop_node());

    builder.push_constant(Literal::String(ruleset.default_score.clone().unwrap_or_default()));
    builder.declare(best_score.clone());
    statements.push(builder.pop_node());

    for field in best_confidences.values() {
        builder.push_constant(Literal::Number(0.0));
        builder.declare(field.clone());
        statements.push(builder.pop_node());
    }

    let gt_id = catalogue.id_of(">").expect("> registered");
    let and_id = catalogue.id_of("and").expect("and registered");
    for rule in &ruleset.rules {
        predicate::compile(builder, catalogue, &rule.predicate, None);
        let rule_matched = builder.pop_node();

        builder.push_constant(Literal::Number(rule.weight));
        builder.push_field(best_weight.clone());
        builder.push_function_call(gt_id, 2, None);
        let beats_best = builder.pop_node();

        builder.push_node(rule_matched);
        builder.push_node(beats_best);
        builder.push_function_call(and_id, 2, None);
        let condition = builder.pop_node();

        let mut then_statements = Vec::new();
        builder.push_constant(Literal::Number(rule.weight));
        builder.assign(best_weight.clone());
        then_statements.push(builder.pop_node());

        builder.push_constant(Literal::String(rule.score.clone()));
        builder.assign(best_score.clone());
        then_statements.push(builder.pop_node());

        for (category, field) in &best_confidences {
            let value = rule.confidences.iter().find(|(c, _)| c == category).map(|(_, v)| *v).unwrap_or(0.0);
            builder.push_constant(Literal::Number(value));
            builder.assign(field.clone());
            then_statements.push(builder.pop_node());
        }

        let then_len = then_statements.len();
        for stmt in then_statements {
            builder.push_node(stmt);
        }
        builder.push_block(then_len);
        let then_body = builder.pop_node();

        builder.push_if_chain(vec![IfArm { condition: Some(Box::new(condition)), body: Box::new(then_body) }]);
        statements.push(builder.pop_node());
    }

    if let Some(predicted_value) = &config.predicted_value {
        builder.push_field(best_score);
        builder.assign(predicted_value.clone());
        statements.push(builder.pop_node());
    }
    for (category, field) in &best_confidences {
        if let Some(out) = config.confidences.get(category) {
            builder.push_field(field.clone());
            builder.assign(out.clone());
            statements.push(builder.pop_node());
        }
    }

    let len = statements.len();
    for stmt in statements {
        builder.push_node(stmt);
    }
    builder.push_block(len);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::predicate::SimpleOperator;
    use indexmap::IndexMap;
    use pamplemousse_core::{AstKind, DataField, FieldOrigin, OpType};

    fn setup_config(ctx: &mut ConversionContext) -> ModelConfig {
        let predicted = ctx.declare("predicted", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::Output).unwrap();
        ModelConfig {
            predicted_value: Some(predicted),
            predicted_display_value: None,
            probabilities: IndexMap::new(),
            confidences: IndexMap::new(),
            entity_id: None,
            reason_codes: vec![],
            best_probability: None,
            target: None,
            mining_function: super::super::output::MiningFunction::Classification,
            output_type: ValueType::String,
            outputs: vec![],
        }
    }

    #[test]
    fn first_hit_emits_an_if_chain() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let age = ctx.declare("age", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let config = setup_config(&mut ctx);
        let ruleset = RuleSetConfig {
            selection_method: RuleSelectionMethod::FirstHit,
            rules: vec![Rule {
                predicate: Predicate::Simple { field: age, operator: SimpleOperator::GreaterThan, value: Some(Literal::Number(18.0)) },
                id: Some("r1".into()),
                score: "adult".into(),
                weight: 1.0,
                confidences: vec![],
            }],
            default_score: Some("minor".into()),
        };
        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &mut ctx, &catalogue, &config, &ruleset);
        let node = builder.finish();
        assert!(matches!(node.kind, AstKind::IfChain(_)));
    }

    #[test]
    fn weighted_max_compiles_to_a_block() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let age = ctx.declare("age", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let config = setup_config(&mut ctx);
        let ruleset = RuleSetConfig {
            selection_method: RuleSelectionMethod::WeightedMax,
            rules: vec![
                Rule {
                    predicate: Predicate::Simple { field: age.clone(), operator: SimpleOperator::GreaterThan, value: Some(Literal::Number(18.0)) },
                    id: Some("r1".into()),
                    score: "adult".into(),
                    weight: 2.0,
                    confidences: vec![],
                },
                Rule {
                    predicate: Predicate::True,
                    id: Some("r2".into()),
                    score: "unknown".into(),
                    weight: 1.0,
                    confidences: vec![],
                },
            ],
            default_score: None,
        };
        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &mut ctx, &catalogue, &config, &ruleset);
        let node = builder.finish();
        assert!(matches!(node.kind, AstKind::Block(_)));
    }
}
