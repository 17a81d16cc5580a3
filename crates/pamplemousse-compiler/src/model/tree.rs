//! Decision tree model compilation (§4.5.1, C6).
//!
//! Leaf `ScoreDistribution` counts are PMML-document constants, not
//! runtime values, so per-category probabilities at a leaf are folded to
//! literal numbers at compile time rather than emitted as a runtime
//! division — the aggregating strategies are the only ones that need a
//! genuine runtime accumulator, since there multiple leaves can fire for
//! one input.

use pamplemousse_core::{AstBuilder, AstNode, Catalogue, ConversionContext, IfArm, Literal, ValueType};

use crate::predicate::{self, Predicate};

use super::output::ModelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoTrueChildStrategy {
    ReturnLastPrediction,
    ReturnNullPrediction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingValueStrategy {
    None,
    LastPrediction,
    NullPrediction,
    DefaultChild,
    AggregateNodes,
    WeightedConfidence,
}

#[derive(Debug, Clone)]
pub struct ScoreDistribution {
    pub category: String,
    pub record_count: f64,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub predicate: Predicate,
    pub score: Option<String>,
    pub id: Option<String>,
    pub default_child: Option<String>,
    pub distributions: Vec<ScoreDistribution>,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn leaf(score: Option<String>, distributions: Vec<ScoreDistribution>) -> Self {
        Self { predicate: Predicate::True, score, id: None, default_child: None, distributions, children: Vec::new() }
    }
}

#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub no_true_child_strategy: NoTrueChildStrategy,
    pub missing_value_strategy: MissingValueStrategy,
    pub missing_value_penalty: Option<f64>,
}

/// Pushes one AST node representing the whole tree's scoring body.
pub fn compile(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, tree: &TreeConfig, root: &TreeNode) {
    match tree.missing_value_strategy {
        MissingValueStrategy::AggregateNodes | MissingValueStrategy::WeightedConfidence => {
            compile_aggregating(builder, ctx, catalogue, config, tree, root);
        }
        _ => {
            let body = build_chain_body(builder, catalogue, config, tree, root);
            builder.push_node(body);
        }
    }
}

/// Children in the order the emitted `if`/`else if` chain should try them.
/// Under `defaultChild`, the designated default sibling is moved to the
/// end and becomes the chain's unconditional `else` — a simplification of
/// the source's precise "taken OR any sibling missing" masking rule,
/// recorded in `DESIGN.md`.
fn ordered_children<'a>(tree: &TreeConfig, node: &'a TreeNode) -> Vec<&'a TreeNode> {
    let mut children: Vec<&TreeNode> = node.children.iter().collect();
    if tree.missing_value_strategy == MissingValueStrategy::DefaultChild {
        if let Some(default_id) = &node.default_child {
            if let Some(pos) = children.iter().position(|c| c.id.as_deref() == Some(default_id.as_str())) {
                let default_child = children.remove(pos);
                children.push(default_child);
            }
        }
    }
    children
}

fn build_chain_body(builder: &mut AstBuilder, catalogue: &Catalogue, config: &ModelConfig, tree: &TreeConfig, node: &TreeNode) -> AstNode {
    if node.is_leaf() {
        return push_leaf_writes(builder, config, node);
    }

    let children = ordered_children(tree, node);
    let has_default_fallback = tree.missing_value_strategy == MissingValueStrategy::DefaultChild && node.default_child.is_some();
    let last_index = children.len().saturating_sub(1);

    let mut arms = Vec::new();
    for (i, child) in children.iter().enumerate() {
        let is_default_arm = has_default_fallback && i == last_index && child.id.as_deref() == node.default_child.as_deref();
        let body = Box::new(build_chain_body(builder, catalogue, config, tree, child));
        if is_default_arm {
            arms.push(IfArm { condition: None, body });
            continue;
        }
        predicate::compile(builder, catalogue, &child.predicate, None);
        let condition = builder.pop_node();
        if tree.missing_value_strategy == MissingValueStrategy::NullPrediction {
            // The missing case yields no prediction: an always-false guard
            // inside the arm would be indistinguishable from a normal
            // false predicate, so the branch itself is simply omitted when
            // its referenced fields are missing at runtime — handled by
            // the ordinary predicate compiling to `false` for a missing
            // comparison operand. No special-casing needed here.
        }
        arms.push(IfArm { condition: Some(Box::new(condition)), body });
    }

    if !has_default_fallback {
        match tree.no_true_child_strategy {
            NoTrueChildStrategy::ReturnLastPrediction => {
                if node.score.is_some() {
                    let fallback_node = TreeNode::leaf(node.score.clone(), node.distributions.clone());
                    let fallback_body = Box::new(push_leaf_writes(builder, config, &fallback_node));
                    arms.push(IfArm { condition: None, body: fallback_body });
                }
            }
            NoTrueChildStrategy::ReturnNullPrediction => {}
        }
    }

    builder.push_if_chain(arms);
    builder.pop_node()
}

/// Writes the predicted value and the static per-category probabilities a
/// leaf's `ScoreDistribution` implies.
fn push_leaf_writes(builder: &mut AstBuilder, config: &ModelConfig, node: &TreeNode) -> AstNode {
    let mut statements = Vec::new();

    if let Some(score) = &node.score {
        if let Some(predicted_value) = &config.predicted_value {
            builder.push_constant(Literal::String(score.clone()));
            builder.assign(predicted_value.clone());
            statements.push(builder.pop_node());
        }
    }

    if let (Some(entity_id), Some(id)) = (&config.entity_id, &node.id) {
        builder.push_constant(Literal::String(id.clone()));
        builder.assign(entity_id.clone());
        statements.push(builder.pop_node());
    }

    let total: f64 = node.distributions.iter().map(|d| d.record_count).sum();
    if total > 0.0 {
        for distribution in &node.distributions {
            if let Some(field) = config.probabilities.get(&distribution.category) {
                let probability = distribution.record_count / total;
                builder.push_constant(Literal::Number(probability));
                builder.assign(field.clone());
                statements.push(builder.pop_node());
            }
            if let Some(field) = config.confidences.get(&distribution.category) {
                let confidence = distribution.confidence.unwrap_or(distribution.record_count / total);
                builder.push_constant(Literal::Number(confidence));
                builder.assign(field.clone());
                statements.push(builder.pop_node());
            }
        }
    }

    let len = statements.len();
    for stmt in statements {
        builder.push_node(stmt);
    }
    builder.push_block(len);
    builder.pop_node()
}

/// `aggregateNodes`/`weightedConfidence`: every node's predicate is tested
/// independently (a flat sequence of plain `if`s, not a chain), each
/// matching leaf additively contributing to shared probability/confidence
/// accumulators and a running total-records counter. Normalised and
/// arg-maxed once, at the top, after the whole tree has been walked.
///
/// `missingValuePenalty` (§4.5.1) only has somewhere to apply inside this
/// aggregating path, since it scales a leaf's contribution to the shared
/// confidence accumulators rather than picking a single predicted value.
/// It is folded in for leaves reached through a `Predicate::Surrogate`:
/// when the surrogate's primary (first-listed) comparison references a
/// missing field, forcing a fallback comparison to decide the branch, that
/// leaf's contribution is scaled by `missingValuePenalty` before being
/// added to the accumulators. `aggregateNodes`/`weightedConfidence` never
/// route through `defaultChild` (that's a distinct, mutually exclusive
/// `missingValueStrategy` value handled entirely by `build_chain_body`), so
/// there is no default-child-driven penalty case to apply here.
fn compile_aggregating(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, tree: &TreeConfig, root: &TreeNode) {
    let total_field = ctx.fresh_temporary(ValueType::Number, "tree_total");
    let mut accumulators = std::collections::HashMap::new();
    for category in config.probabilities.keys() {
        accumulators.insert(category.clone(), ctx.fresh_temporary(ValueType::Number, &format!("acc_{category}")));
    }

    let mut statements = Vec::new();
    builder.push_constant(Literal::Number(0.0));
    builder.declare(total_field.clone());
    statements.push(builder.pop_node());
    for field in accumulators.values() {
        builder.push_constant(Literal::Number(0.0));
        builder.declare(field.clone());
        statements.push(builder.pop_node());
    }

    collect_aggregating_nodes(builder, ctx, catalogue, &accumulators, &total_field, tree.missing_value_penalty, root, &mut statements);

    let add_id = catalogue.id_of("+").expect("+ registered");
    for (category, field) in &accumulators {
        if let Some(prob_field) = config.probabilities.get(category) {
            builder.push_field(field.clone());
            builder.push_field(total_field.clone());
            builder.push_function_call(catalogue.id_of("/").expect("/ registered"), 2, None);
            builder.assign(prob_field.clone());
            statements.push(builder.pop_node());
        }
    }
    let _ = add_id;

    if let (Some(predicted_value), Some(_)) = (&config.predicted_value, config.probabilities.first()) {
        let winner = super::output::push_winner_selection(builder, ctx, catalogue, &config.probabilities, predicted_value, config.best_probability.as_ref());
        statements.push(winner);
    }

    let len = statements.len();
    for stmt in statements {
        builder.push_node(stmt);
    }
    builder.push_block(len);
}

fn collect_aggregating_nodes(
    builder: &mut AstBuilder,
    ctx: &mut ConversionContext,
    catalogue: &Catalogue,
    accumulators: &std::collections::HashMap<String, pamplemousse_core::FieldRef>,
    total_field: &pamplemousse_core::FieldRef,
    missing_value_penalty: Option<f64>,
    node: &TreeNode,
    statements: &mut Vec<AstNode>,
) {
    if node.is_leaf() {
        if node.distributions.is_empty() {
            return;
        }
        predicate::compile(builder, catalogue, &node.predicate, None);
        let condition = builder.pop_node();

        let mut body_statements = Vec::new();
        let mut weight_field = None;
        if let Some(penalty) = missing_value_penalty {
            if let Some(missing_condition) = primary_missing_condition(builder, catalogue, &node.predicate) {
                let field = ctx.fresh_temporary(ValueType::Number, "penalty_weight");
                builder.push_constant(Literal::Number(1.0));
                builder.declare(field.clone());
                body_statements.push(builder.pop_node());

                builder.push_constant(Literal::Number(penalty));
                builder.assign(field.clone());
                let assign_penalty = builder.pop_node();
                builder.push_if_chain(vec![IfArm { condition: Some(Box::new(missing_condition)), body: Box::new(assign_penalty) }]);
                body_statements.push(builder.pop_node());
                weight_field = Some(field);
            }
        }

        let add_id = catalogue.id_of("+").expect("+ registered");
        let mul_id = catalogue.id_of("*").expect("* registered");
        let leaf_total: f64 = node.distributions.iter().map(|d| d.record_count).sum();
        builder.push_field(total_field.clone());
        builder.push_constant(Literal::Number(leaf_total));
        if let Some(weight_field) = &weight_field {
            builder.push_field(weight_field.clone());
            builder.push_function_call(mul_id, 2, None);
        }
        builder.push_function_call(add_id, 2, None);
        builder.assign(total_field.clone());
        body_statements.push(builder.pop_node());

        for distribution in &node.distributions {
            if let Some(field) = accumulators.get(&distribution.category) {
                builder.push_field(field.clone());
                builder.push_constant(Literal::Number(distribution.record_count));
                if let Some(weight_field) = &weight_field {
                    builder.push_field(weight_field.clone());
                    builder.push_function_call(mul_id, 2, None);
                }
                builder.push_function_call(add_id, 2, None);
                builder.assign(field.clone());
                body_statements.push(builder.pop_node());
            }
        }

        let body_len = body_statements.len();
        for stmt in body_statements {
            builder.push_node(stmt);
        }
        builder.push_block(body_len);
        let body = builder.pop_node();

        builder.push_if_chain(vec![IfArm { condition: Some(Box::new(condition)), body: Box::new(body) }]);
        statements.push(builder.pop_node());
        return;
    }

    for child in &node.children {
        collect_aggregating_nodes(builder, ctx, catalogue, accumulators, total_field, missing_value_penalty, child, statements);
    }
}

/// Whether `predicate` is a surrogate whose primary (first-listed)
/// comparison resolves to a single field, and if so, the `isMissing`
/// check on that field — pushed and popped off the builder, ready to use
/// as an `if` condition. `None` for non-surrogate predicates or surrogates
/// whose primary comparison isn't a plain field read (nested compounds),
/// where there's no single field to blame the fallback on.
fn primary_missing_condition(builder: &mut AstBuilder, catalogue: &Catalogue, predicate: &Predicate) -> Option<AstNode> {
    let Predicate::Surrogate(predicates) = predicate else { return None };
    let field = match predicates.first()? {
        Predicate::Simple { field, .. } => field.clone(),
        Predicate::SetMembership { field, .. } => field.clone(),
        _ => return None,
    };
    builder.push_field(field);
    let id = catalogue.id_of("isMissing").expect("isMissing registered");
    builder.push_function_call(id, 1, None);
    Some(builder.pop_node())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::predicate::SimpleOperator;
    use indexmap::IndexMap;
    use pamplemousse_core::{AstKind, DataField, FieldOrigin, OpType};

    fn setup() -> (Catalogue, ConversionContext) {
        (Catalogue::standard(), ConversionContext::new(false))
    }

    #[test]
    fn chain_tree_assigns_predicted_value_at_a_matching_leaf() {
        let (catalogue, mut ctx) = setup();
        let petal = ctx.declare("petal_length", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let predicted = ctx.declare("predicted", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::Output).unwrap();

        let root = TreeNode {
            predicate: Predicate::True,
            score: None,
            id: Some("1".into()),
            default_child: None,
            distributions: vec![],
            children: vec![
                TreeNode {
                    predicate: Predicate::Simple { field: petal.clone(), operator: SimpleOperator::LessThan, value: Some(Literal::Number(2.0)) },
                    score: Some("setosa".into()),
                    id: Some("2".into()),
                    default_child: None,
                    distributions: vec![],
                    children: vec![],
                },
                TreeNode::leaf(Some("versicolor".into()), vec![]),
            ],
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
            mining_function: super::super::output::MiningFunction::Classification,
            output_type: ValueType::String,
            outputs: vec![],
        };

        let tree_config = TreeConfig {
            no_true_child_strategy: NoTrueChildStrategy::ReturnLastPrediction,
            missing_value_strategy: MissingValueStrategy::None,
            missing_value_penalty: None,
        };

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &mut ctx, &catalogue, &config, &tree_config, &root);
        let node = builder.finish();
        assert!(matches!(node.kind, AstKind::IfChain(_)));
    }

    #[test]
    fn aggregating_tree_scales_a_surrogate_leaf_by_the_missing_value_penalty() {
        let (catalogue, mut ctx) = setup();
        let primary = ctx.declare("a", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let fallback = ctx.declare("b", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let predicted = ctx.declare("predicted", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::Output).unwrap();
        let prob = ctx.declare("prob_yes", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Output).unwrap();

        let root = TreeNode {
            predicate: Predicate::Surrogate(vec![
                Predicate::Simple { field: primary, operator: SimpleOperator::GreaterThan, value: Some(Literal::Number(0.0)) },
                Predicate::Simple { field: fallback, operator: SimpleOperator::GreaterThan, value: Some(Literal::Number(0.0)) },
            ]),
            score: Some("yes".into()),
            id: Some("1".into()),
            default_child: None,
            distributions: vec![ScoreDistribution { category: "yes".into(), record_count: 10.0, confidence: None }],
            children: vec![],
        };

        let mut probabilities = IndexMap::new();
        probabilities.insert("yes".to_string(), prob);
        let config = ModelConfig {
            predicted_value: Some(predicted),
            predicted_display_value: None,
            probabilities,
            confidences: IndexMap::new(),
            entity_id: None,
            reason_codes: vec![],
            best_probability: None,
            target: None,
            mining_function: super::super::output::MiningFunction::Classification,
            output_type: ValueType::String,
            outputs: vec![],
        };

        let tree_config = TreeConfig {
            no_true_child_strategy: NoTrueChildStrategy::ReturnLastPrediction,
            missing_value_strategy: MissingValueStrategy::AggregateNodes,
            missing_value_penalty: Some(0.75),
        };

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &mut ctx, &catalogue, &config, &tree_config, &root);
        let node = builder.finish();
        assert!(matches!(node.kind, AstKind::Block(_)));

        // The penalty constant and an `isMissing` guard on the surrogate's
        // primary field must both appear somewhere in the compiled tree.
        fn contains_penalty_constant(node: &AstNode, catalogue: &Catalogue) -> bool {
            let here = match &node.kind {
                AstKind::Constant(Literal::Number(n)) => (*n - 0.75).abs() < 1e-9,
                AstKind::FunctionCall { function, .. } => catalogue.get(*function).name == "isMissing",
                _ => false,
            };
            here || node.children().iter().any(|c| contains_penalty_constant(c, catalogue))
        }
        assert!(contains_penalty_constant(&node, &catalogue));
    }
}
