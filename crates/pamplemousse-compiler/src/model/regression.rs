//! Regression model compilation (§4.5.3, C6).
//!
//! A linear predictor (intercept plus weighted terms, each term an
//! optionally-exponentiated product of one or more fields) followed by
//! a link function. `Regression` link yields the raw value directly;
//! `Classification` normalises one linear predictor per category
//! through softmax or, for the binary case, a single logistic term
//! whose complement is the other category's probability.

use indexmap::IndexMap;

use pamplemousse_core::{AstBuilder, AstNode, Catalogue, ConversionContext, FieldRef, Literal, ValueType};

use super::output::{self, ModelConfig};

#[derive(Debug, Clone)]
pub struct Predictor {
    pub field: FieldRef,
    pub exponent: f64,
}

/// One term of a linear predictor: a coefficient times the product of
/// its predictor fields (each raised to its own exponent).
#[derive(Debug, Clone)]
pub struct Term {
    pub coefficient: f64,
    pub predictors: Vec<Predictor>,
}

#[derive(Debug, Clone)]
pub struct LinearPredictor {
    pub intercept: f64,
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationMethod {
    None,
    Softmax,
    Logit,
}

#[derive(Debug, Clone)]
pub struct RegressionConfig {
    /// Regression models have exactly one; classification models have
    /// one per category (map key is the category name).
    pub predictors: IndexMap<String, LinearPredictor>,
    pub normalization: NormalizationMethod,
}

pub fn compile(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, regression: &RegressionConfig) {
    match config.mining_function {
        output::MiningFunction::Classification => compile_classification(builder, ctx, catalogue, config, regression),
        _ => compile_regression(builder, catalogue, config, regression),
    }
}

fn compile_regression(builder: &mut AstBuilder, catalogue: &Catalogue, config: &ModelConfig, regression: &RegressionConfig) {
    let (_, predictor) = regression.predictors.first().expect("regression model requires exactly one linear predictor");
    let raw = compile_linear_predictor(builder, catalogue, predictor);

    let mut statements = Vec::new();
    if let Some(predicted_value) = &config.predicted_value {
        let value = if let Some(target) = &config.target { output::apply_target_postprocessing(builder, catalogue, target, raw) } else { raw };
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

fn compile_linear_predictor(builder: &mut AstBuilder, catalogue: &Catalogue, predictor: &LinearPredictor) -> AstNode {
    let add_id = catalogue.id_of("+").expect("+ registered");
    builder.push_constant(Literal::Number(predictor.intercept));
    let mut accumulated = builder.pop_node();

    for term in &predictor.terms {
        let value = compile_term(builder, catalogue, term);
        builder.push_node(accumulated);
        builder.push_node(value);
        builder.push_function_call(add_id, 2, None);
        accumulated = builder.pop_node();
    }
    accumulated
}

fn compile_term(builder: &mut AstBuilder, catalogue: &Catalogue, term: &Term) -> AstNode {
    let mul_id = catalogue.id_of("*").expect("* registered");
    let pow_id = catalogue.id_of("pow").expect("pow registered");

    builder.push_constant(Literal::Number(term.coefficient));
    let mut accumulated = builder.pop_node();

    for predictor in &term.predictors {
        builder.push_field(predictor.field.clone());
        let value = if predictor.exponent != 1.0 {
            builder.push_field(predictor.field.clone());
            builder.push_constant(Literal::Number(predictor.exponent));
            builder.push_function_call(pow_id, 2, None);
            builder.pop_node()
        } else {
            builder.pop_node()
        };
        builder.push_node(accumulated);
        builder.push_node(value);
        builder.push_function_call(mul_id, 2, None);
        accumulated = builder.pop_node();
    }
    accumulated
}

/// One linear predictor per category, mapped through the configured
/// normalisation, then fed into the shared arg-max winner selection.
fn compile_classification(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, regression: &RegressionConfig) {
    let categories: Vec<String> = regression.predictors.keys().cloned().collect();
    let probabilities = if config.probabilities.is_empty() { output::build_probability_map(ctx, &categories) } else { config.probabilities.clone() };

    let mut statements = Vec::new();
    let mut raw_values = IndexMap::new();

    match regression.normalization {
        NormalizationMethod::Logit if regression.predictors.len() == 2 => {
            let mut iter = regression.predictors.iter();
            let (positive_category, positive_predictor) = iter.next().unwrap();
            let (negative_category, _) = iter.next().unwrap();

            let logit = compile_linear_predictor(builder, catalogue, positive_predictor);
            let sigmoid = push_sigmoid(builder, catalogue, logit);

            if let Some(field) = probabilities.get(positive_category) {
                builder.push_node(sigmoid.clone());
                builder.declare(field.clone());
                statements.push(builder.pop_node());
            }
            if let Some(field) = probabilities.get(negative_category) {
                let one_id = catalogue.id_of("-").expect("- registered");
                builder.push_constant(Literal::Number(1.0));
                builder.push_node(sigmoid);
                builder.push_function_call(one_id, 2, None);
                builder.declare(field.clone());
                statements.push(builder.pop_node());
            }
        }
        _ => {
            for (category, predictor) in &regression.predictors {
                let raw = compile_linear_predictor(builder, catalogue, predictor);
                raw_values.insert(category.clone(), raw);
            }
            if matches!(regression.normalization, NormalizationMethod::Softmax) {
                push_softmax(builder, ctx, catalogue, &raw_values, &probabilities, &mut statements);
            } else {
                for (category, raw) in raw_values {
                    if let Some(field) = probabilities.get(&category) {
                        builder.push_node(raw);
                        builder.declare(field.clone());
                        statements.push(builder.pop_node());
                    }
                }
            }
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

/// Softmax: exponentiate each raw value, sum the exponentials into a
/// temporary, then divide each exponential by the running sum.
fn push_softmax(
    builder: &mut AstBuilder,
    ctx: &mut ConversionContext,
    catalogue: &Catalogue,
    raw_values: &IndexMap<String, AstNode>,
    probabilities: &IndexMap<String, FieldRef>,
    statements: &mut Vec<AstNode>,
) {
    let exp_id = catalogue.id_of("exp").expect("exp registered");
    let add_id = catalogue.id_of("+").expect("+ registered");
    let div_id = catalogue.id_of("/").expect("/ registered");

    let sum = ctx.fresh_temporary(ValueType::Number, "softmax_sum");
    builder.push_constant(Literal::Number(0.0));
    builder.declare(sum.clone());
    statements.push(builder.pop_node());

    for (category, raw) in raw_values {
        let Some(field) = probabilities.get(category) else { continue };
        builder.push_node(raw.clone());
        builder.push_function_call(exp_id, 1, None);
        builder.declare(field.clone());
        statements.push(builder.pop_node());

        builder.push_field(sum.clone());
        builder.push_field(field.clone());
        builder.push_function_call(add_id, 2, None);
        builder.assign(sum.clone());
        statements.push(builder.pop_node());
    }

    for field in probabilities.values() {
        builder.push_field(field.clone());
        builder.push_field(sum.clone());
        builder.push_function_call(div_id, 2, None);
        builder.assign(field.clone());
        statements.push(builder.pop_node());
    }
}

/// `1 / (1 + exp(-logit))`.
fn push_sigmoid(builder: &mut AstBuilder, catalogue: &Catalogue, logit: AstNode) -> AstNode {
    let neg_id = catalogue.id_of("neg").expect("neg registered");
    let exp_id = catalogue.id_of("exp").expect("exp registered");
    let add_id = catalogue.id_of("+").expect("+ registered");
    let div_id = catalogue.id_of("/").expect("/ registered");

    builder.push_node(logit);
    builder.push_function_call(neg_id, 1, None);
    builder.push_function_call(exp_id, 1, None);
    builder.push_constant(Literal::Number(1.0));
    builder.push_function_call(add_id, 2, None);
    let denominator = builder.pop_node();

    builder.push_constant(Literal::Number(1.0));
    builder.push_node(denominator);
    builder.push_function_call(div_id, 2, None);
    builder.pop_node()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use pamplemousse_core::{AstKind, DataField, FieldOrigin, OpType};

    fn base_config(predicted_value: Option<FieldRef>, mining_function: output::MiningFunction) -> ModelConfig {
        ModelConfig {
            predicted_value,
            predicted_display_value: None,
            probabilities: IndexMap::new(),
            confidences: IndexMap::new(),
            entity_id: None,
            reason_codes: vec![],
            best_probability: None,
            target: None,
            mining_function,
            output_type: ValueType::Number,
            outputs: vec![],
        }
    }

    #[test]
    fn regression_compiles_intercept_plus_terms_to_a_block() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let age = ctx.declare("age", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let predicted = ctx.declare("predicted", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Output).unwrap();
        let config = base_config(Some(predicted), output::MiningFunction::Regression);

        let mut predictors = IndexMap::new();
        predictors.insert(
            "default".to_string(),
            LinearPredictor { intercept: 1.0, terms: vec![Term { coefficient: 2.0, predictors: vec![Predictor { field: age, exponent: 1.0 }] }] },
        );
        let regression = RegressionConfig { predictors, normalization: NormalizationMethod::None };

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &mut ctx, &catalogue, &config, &regression);
        let node = builder.finish();
        assert!(matches!(node.kind, AstKind::Block(_)));
    }

    #[test]
    fn binary_logit_classification_writes_complementary_probabilities() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let income = ctx.declare("income", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let predicted = ctx.declare("predicted", DataField::new(ValueType::String, OpType::Categorical), FieldOrigin::Output).unwrap();
        let mut config = base_config(Some(predicted), output::MiningFunction::Classification);
        config.probabilities = output::build_probability_map(&mut ctx, &["yes".to_string(), "no".to_string()]);

        let mut predictors = IndexMap::new();
        predictors.insert("yes".to_string(), LinearPredictor { intercept: 0.0, terms: vec![Term { coefficient: 1.0, predictors: vec![Predictor { field: income, exponent: 1.0 }] }] });
        predictors.insert("no".to_string(), LinearPredictor { intercept: 0.0, terms: vec![] });
        let regression = RegressionConfig { predictors, normalization: NormalizationMethod::Logit };

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        compile(&mut builder, &mut ctx, &catalogue, &config, &regression);
        let node = builder.finish();
        assert!(matches!(node.kind, AstKind::Block(_)));
    }
}
