//! Naive Bayes model compilation (§4.5.3, C6).
//!
//! Each category's raw score starts at its prior and is multiplied by
//! one conditional-probability factor per Bayes input: a pair-count
//! lookup for a discrete field, or a Gaussian density for a continuous
//! one. Scores are then normalised into a probability map and fed
//! through the shared arg-max winner selection.

use indexmap::IndexMap;

use pamplemousse_core::{AstBuilder, AstNode, Catalogue, ConversionContext, FieldRef, Literal, ValueType};

use super::output::{self, ModelConfig};

/// Gaussian mean/variance for one category, for one continuous field.
#[derive(Debug, Clone, Copy)]
pub struct GaussianParams {
    pub mean: f64,
    pub variance: f64,
}

#[derive(Debug, Clone)]
pub enum BayesInput {
    /// Per observed value, per category, the conditional probability —
    /// precomputed from PMML's `PairCounts` by the caller so this
    /// compiler only ever deals in ratios, never raw counts.
    Discrete {
        field: FieldRef,
        /// value -> (category -> probability)
        table: IndexMap<String, IndexMap<String, f64>>,
    },
    Gaussian {
        field: FieldRef,
        /// category -> distribution parameters
        params: IndexMap<String, GaussianParams>,
    },
}

#[derive(Debug, Clone)]
pub struct NaiveBayesConfig {
    pub inputs: Vec<BayesInput>,
    pub priors: IndexMap<String, f64>,
    /// Substituted for any conditional probability PMML would otherwise
    /// report as exactly zero, so no category's score collapses to
    /// zero from a single unseen value.
    pub threshold: f64,
}

pub fn compile(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, naive_bayes: &NaiveBayesConfig) {
    let categories: Vec<String> = naive_bayes.priors.keys().cloned().collect();
    let probabilities = if config.probabilities.is_empty() { output::build_probability_map(ctx, &categories) } else { config.probabilities.clone() };

    let mut statements = Vec::new();
    let mul_id = catalogue.id_of("*").expect("* registered");
    let add_id = catalogue.id_of("+").expect("+ registered");
    let div_id = catalogue.id_of("/").expect("/ registered");

    for category in &categories {
        let Some(field) = probabilities.get(category) else { continue };
        builder.push_constant(Literal::Number(*naive_bayes.priors.get(category).unwrap_or(&0.0)));
        builder.declare(field.clone());
        statements.push(builder.pop_node());
    }

    for input in &naive_bayes.inputs {
        for category in &categories {
            let Some(field) = probabilities.get(category) else { continue };
            let factor = compile_conditional(builder, catalogue, input, category, naive_bayes.threshold);
            builder.push_field(field.clone());
            builder.push_node(factor);
            builder.push_function_call(mul_id, 2, None);
            builder.assign(field.clone());
            statements.push(builder.pop_node());
        }
    }

    let total = ctx.fresh_temporary(ValueType::Number, "naive_bayes_total");
    builder.push_constant(Literal::Number(0.0));
    builder.declare(total.clone());
    statements.push(builder.pop_node());
    for field in probabilities.values() {
        builder.push_field(total.clone());
        builder.push_field(field.clone());
        builder.push_function_call(add_id, 2, None);
        builder.assign(total.clone());
        statements.push(builder.pop_node());
    }
    for field in probabilities.values() {
        builder.push_field(field.clone());
        builder.push_field(total.clone());
        builder.push_function_call(div_id, 2, None);
        builder.assign(field.clone());
        statements.push(builder.pop_node());
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

/// `P(value | category)` for one input: a chain of equality checks
/// against the pair-count table for a discrete field, or the Gaussian
/// density for a continuous one. Unknown discrete values fall back to
/// `threshold`.
fn compile_conditional(builder: &mut AstBuilder, catalogue: &Catalogue, input: &BayesInput, category: &str, threshold: f64) -> AstNode {
    match input {
        BayesInput::Discrete { field, table } => compile_discrete_conditional(builder, catalogue, field, table, category, threshold),
        BayesInput::Gaussian { field, params } => {
            let defaults = GaussianParams { mean: 0.0, variance: 1.0 };
            let p = params.get(category).copied().unwrap_or(defaults);
            compile_gaussian_density(builder, catalogue, field, p)
        }
    }
}

fn compile_discrete_conditional(
    builder: &mut AstBuilder,
    catalogue: &Catalogue,
    field: &FieldRef,
    table: &IndexMap<String, IndexMap<String, f64>>,
    category: &str,
    threshold: f64,
) -> AstNode {
    let eq_id = catalogue.id_of("==").expect("== registered");
    let if_id = catalogue.id_of("if").expect("if registered");

    builder.push_constant(Literal::Number(threshold));
    let mut accumulated = builder.pop_node();

    for (value, by_category) in table.iter().rev() {
        let probability = by_category.get(category).copied().unwrap_or(threshold);
        builder.push_field(field.clone());
        builder.push_constant(Literal::String(value.clone()));
        builder.push_function_call(eq_id, 2, None);
        builder.push_constant(Literal::Number(probability));
        builder.push_node(accumulated);
        builder.push_function_call(if_id, 3, None);
        accumulated = builder.pop_node();
    }
    accumulated
}

/// `exp(-(x - mean)^2 / (2 * variance)) / sqrt(2 * pi * variance)`.
fn compile_gaussian_density(builder: &mut AstBuilder, catalogue: &Catalogue, field: &FieldRef, params: GaussianParams) -> AstNode {
    let sub_id = catalogue.id_of("-").expect("- registered");
    let mul_id = catalogue.id_of("*").expect("* registered");
    let div_id = catalogue.id_of("/").expect("/ registered");
    let pow_id = catalogue.id_of("pow").expect("pow registered");
    let exp_id = catalogue.id_of("exp").expect("exp registered");
    let sqrt_id = catalogue.id_of("sqrt").expect("sqrt registered");
    let neg_id = catalogue.id_of("neg").expect("neg registered");

    builder.push_field(field.clone());
    builder.push_constant(Literal::Number(params.mean));
    builder.push_function_call(sub_id, 2, None);
    builder.push_constant(Literal::Number(2.0));
    builder.push_function_call(pow_id, 2, None);
    builder.push_constant(Literal::Number(2.0 * params.variance));
    builder.push_function_call(div_id, 2, None);
    builder.push_function_call(neg_id, 1, None);
    builder.push_function_call(exp_id, 1, None);
    let numerator = builder.pop_node();

    builder.push_constant(Literal::Number(2.0 * std::f64::consts::PI * params.variance));
    builder.push_function_call(sqrt_id, 1, None);
    let denominator = builder.pop_node();

    builder.push_node(numerator);
    builder.push_node(denominator);
    builder.push_function_call(div_id, 2, None);
    builder.pop_node()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use pamplemousse_core::{AstKind, DataField, FieldOrigin, OpType};

    #[test]
    fn naive_bayes_with_discrete_and_gaussian_inputs_compiles_to_a_block() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let outlook = ctx.declare("outlook", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::DataDictionary).unwrap();
        let humidity = ctx.declare("humidity", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let predicted = ctx.declare("predicted", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::Output).unwrap();

        let mut priors = IndexMap::new();
        priors.insert("play".to_string(), 0.64);
        priors.insert("no_play".to_string(), 0.36);

        let mut sunny_probs = IndexMap::new();
        sunny_probs.insert("play".to_string(), 0.2);
        sunny_probs.insert("no_play".to_string(), 0.6);
        let mut discrete_table = IndexMap::new();
        discrete_table.insert("sunny".to_string(), sunny_probs);

        let mut gaussian_params = IndexMap::new();
        gaussian_params.insert("play".to_string(), GaussianParams { mean: 70.0, variance: 25.0 });
        gaussian_params.insert("no_play".to_string(), GaussianParams { mean: 85.0, variance: 36.0 });

        let naive_bayes = NaiveBayesConfig {
            inputs: vec![BayesInput::Discrete { field: outlook, table: discrete_table }, BayesInput::Gaussian { field: humidity, params: gaussian_params }],
            priors,
            threshold: 0.001,
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
            mining_function: output::MiningFunction::Classification,
            output_type: ValueType::String,
            outputs: vec![],
        };

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &mut ctx, &catalogue, &config, &naive_bayes);
        let node = builder.finish();
        assert!(matches!(node.kind, AstKind::Block(_)));
    }
}
