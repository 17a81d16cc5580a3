//! Neural network model compilation (§4.5.3, C6).
//!
//! A feed-forward network organised into layers in topological order:
//! every neuron's inputs must already have been declared (by an
//! earlier layer, or the input fields themselves) by the time it is
//! compiled. Each neuron computes a weighted sum of its inputs plus a
//! bias, then applies an activation function.

use indexmap::IndexMap;

use pamplemousse_core::{AstBuilder, Catalogue, ConversionContext, FieldRef, Literal, ValueType};

use super::output::{self, ModelConfig};

#[derive(Debug, Clone, Copy)]
pub enum Activation {
    Identity,
    Logistic,
    Tanh,
    Exponential,
    /// Clamps to zero below, identity above.
    ReLU,
}

#[derive(Debug, Clone)]
pub enum NeuronInput {
    Field(FieldRef),
    /// References a previously compiled neuron by its PMML id.
    Neuron(String),
}

#[derive(Debug, Clone)]
pub struct Neuron {
    pub id: String,
    pub weighted_inputs: Vec<(NeuronInput, f64)>,
    pub bias: f64,
    pub activation: Activation,
}

#[derive(Debug, Clone)]
pub struct NeuralNetworkConfig {
    /// Layers in topological order; every neuron's inputs must resolve
    /// to a field declared by an earlier layer or a model input.
    pub layers: Vec<Vec<Neuron>>,
    /// Output neuron id -> category name, for classification models;
    /// empty for regression (the sole output layer neuron feeds
    /// `predicted_value` directly).
    pub output_neurons: IndexMap<String, String>,
}

pub fn compile(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, network: &NeuralNetworkConfig) {
    let mut statements = Vec::new();

    for layer in &network.layers {
        for neuron in layer {
            let field = ctx.declare_neuron(&neuron.id, pamplemousse_core::DataField::new(ValueType::Number, pamplemousse_core::OpType::Continuous));
            let value = compile_neuron(builder, ctx, catalogue, neuron);
            builder.push_node(value);
            builder.declare(field);
            statements.push(builder.pop_node());
        }
    }

    match config.mining_function {
        output::MiningFunction::Classification if !network.output_neurons.is_empty() => {
            let categories: Vec<String> = network.output_neurons.values().cloned().collect();
            let probabilities = if config.probabilities.is_empty() { output::build_probability_map(ctx, &categories) } else { config.probabilities.clone() };
            for (neuron_id, category) in &network.output_neurons {
                if let (Some(neuron_field), Some(prob_field)) = (ctx.lookup_neuron(neuron_id), probabilities.get(category)) {
                    builder.push_field(neuron_field);
                    builder.assign(prob_field.clone());
                    statements.push(builder.pop_node());
                }
            }
            if let Some(predicted_value) = &config.predicted_value {
                let winner = output::push_winner_selection(builder, ctx, catalogue, &probabilities, predicted_value, config.best_probability.as_ref());
                statements.push(winner);
            }
        }
        _ => {
            let output_neuron_field = network.layers.last().and_then(|layer| layer.last()).and_then(|neuron| ctx.lookup_neuron(&neuron.id));
            if let (Some(predicted_value), Some(neuron_field)) = (&config.predicted_value, output_neuron_field) {
                builder.push_field(neuron_field);
                let raw = builder.pop_node();
                let value = if let Some(target) = &config.target { output::apply_target_postprocessing(builder, catalogue, target, raw) } else { raw };
                builder.push_node(value);
                builder.assign(predicted_value.clone());
                statements.push(builder.pop_node());
            }
        }
    }

    let len = statements.len();
    for stmt in statements {
        builder.push_node(stmt);
    }
    builder.push_block(len.max(1));
}

fn compile_neuron(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, neuron: &Neuron) -> pamplemousse_core::AstNode {
    let add_id = catalogue.id_of("+").expect("+ registered");
    let mul_id = catalogue.id_of("*").expect("* registered");

    builder.push_constant(Literal::Number(neuron.bias));
    let mut accumulated = builder.pop_node();

    for (input, weight) in &neuron.weighted_inputs {
        // A dangling `Con/@from` is reported as a `BindingFailure` at parse
        // time (`compile/models.rs::parse_neural_network_model`); this term
        // is simply dropped from the weighted sum rather than crashing the
        // compiler on what is by then already-reported invalid input.
        let field = match input {
            NeuronInput::Field(field) => Some(field.clone()),
            NeuronInput::Neuron(id) => ctx.lookup_neuron(id),
        };
        let Some(field) = field else { continue };
        builder.push_field(field);
        builder.push_constant(Literal::Number(*weight));
        builder.push_function_call(mul_id, 2, None);
        let term = builder.pop_node();

        builder.push_node(accumulated);
        builder.push_node(term);
        builder.push_function_call(add_id, 2, None);
        accumulated = builder.pop_node();
    }

    apply_activation(builder, catalogue, accumulated, neuron.activation)
}

fn apply_activation(builder: &mut AstBuilder, catalogue: &Catalogue, value: pamplemousse_core::AstNode, activation: Activation) -> pamplemousse_core::AstNode {
    match activation {
        Activation::Identity => value,
        Activation::Logistic => push_sigmoid(builder, catalogue, value),
        Activation::Tanh => push_tanh(builder, catalogue, value),
        Activation::Exponential => {
            let exp_id = catalogue.id_of("exp").expect("exp registered");
            builder.push_node(value);
            builder.push_function_call(exp_id, 1, None);
            builder.pop_node()
        }
        Activation::ReLU => {
            let max_id = catalogue.id_of("max").expect("max registered");
            builder.push_node(value);
            builder.push_constant(Literal::Number(0.0));
            builder.push_function_call(max_id, 2, None);
            builder.pop_node()
        }
    }
}

fn push_sigmoid(builder: &mut AstBuilder, catalogue: &Catalogue, value: pamplemousse_core::AstNode) -> pamplemousse_core::AstNode {
    let neg_id = catalogue.id_of("neg").expect("neg registered");
    let exp_id = catalogue.id_of("exp").expect("exp registered");
    let add_id = catalogue.id_of("+").expect("+ registered");
    let div_id = catalogue.id_of("/").expect("/ registered");

    builder.push_node(value);
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

fn push_tanh(builder: &mut AstBuilder, catalogue: &Catalogue, value: pamplemousse_core::AstNode) -> pamplemousse_core::AstNode {
    let mul_id = catalogue.id_of("*").expect("* registered");
    let add_id = catalogue.id_of("+").expect("+ registered");
    let sub_id = catalogue.id_of("-").expect("- registered");
    let div_id = catalogue.id_of("/").expect("/ registered");
    let exp_id = catalogue.id_of("exp").expect("exp registered");

    builder.push_constant(Literal::Number(2.0));
    builder.push_node(value);
    builder.push_function_call(mul_id, 2, None);
    builder.push_function_call(exp_id, 1, None);
    let exp_2x = builder.pop_node();

    builder.push_node(exp_2x.clone());
    builder.push_constant(Literal::Number(1.0));
    builder.push_function_call(sub_id, 2, None);
    let numerator = builder.pop_node();

    builder.push_node(exp_2x);
    builder.push_constant(Literal::Number(1.0));
    builder.push_function_call(add_id, 2, None);
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
    use pamplemousse_core::{AstKind, AstNode, DataField, FieldOrigin, OpType};

    #[test]
    fn two_layer_network_compiles_to_a_block() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let x1 = ctx.declare("x1", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let x2 = ctx.declare("x2", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary).unwrap();
        let predicted = ctx.declare("predicted", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Output).unwrap();

        let hidden = Neuron {
            id: "h1".into(),
            weighted_inputs: vec![(NeuronInput::Field(x1), 0.5), (NeuronInput::Field(x2), -0.5)],
            bias: 0.1,
            activation: Activation::Tanh,
        };
        let output_neuron = Neuron { id: "o1".into(), weighted_inputs: vec![(NeuronInput::Neuron("h1".into()), 1.0)], bias: 0.0, activation: Activation::Identity };

        let mut output_neurons = IndexMap::new();
        output_neurons.insert("o1".to_string(), "predicted".to_string());

        let network = NeuralNetworkConfig { layers: vec![vec![hidden], vec![output_neuron]], output_neurons };

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
        compile(&mut builder, &mut ctx, &catalogue, &config, &network);
        let node = builder.finish();
        assert!(matches!(node.kind, AstKind::Block(_)));

        // The hidden neuron's weighted sum must actually combine both
        // inputs (not drop one), and tanh's e^(2x) term must appear
        // somewhere in the tree.
        fn field_names(node: &AstNode, names: &mut Vec<String>) {
            if let AstKind::FieldRef(field) = &node.kind {
                if field.data_field.op_type == OpType::Continuous && (field.emitted_name.contains('x') || field.emitted_name.contains("h1")) {
                    names.push(field.emitted_name.clone());
                }
            }
            for child in node.children() {
                field_names(child, names);
            }
        }
        fn contains_function(node: &AstNode, catalogue: &Catalogue, name: &str) -> bool {
            if let AstKind::FunctionCall { function, .. } = &node.kind {
                if catalogue.get(*function).name == name {
                    return true;
                }
            }
            node.children().iter().any(|c| contains_function(c, catalogue, name))
        }
        let mut names = Vec::new();
        field_names(&node, &mut names);
        names.sort();
        names.dedup();
        assert!(names.iter().any(|n| n.contains('x')), "hidden neuron should read an input field, found {names:?}");
        assert!(contains_function(&node, &catalogue, "exp"), "tanh activation should emit an exp call");
        assert!(contains_function(&node, &catalogue, "/"), "tanh activation should emit a division");
    }

    #[test]
    fn dangling_neuron_reference_is_dropped_not_panicking() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let predicted = ctx.declare("predicted", DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Output).unwrap();

        // `missing` was never declared by an earlier layer; this mirrors
        // what a same-layer or forward `Con/@from` reference looks like
        // once `compile/models.rs::parse_neural_network_model` has already
        // reported it and left it out of `weighted_inputs` for any
        // well-formed document. Exercising it here confirms `compile_neuron`
        // degrades to dropping the term instead of panicking if one ever
        // slips through.
        let output_neuron =
            Neuron { id: "o1".into(), weighted_inputs: vec![(NeuronInput::Neuron("missing".into()), 1.0)], bias: 0.25, activation: Activation::Identity };

        let network = NeuralNetworkConfig { layers: vec![vec![output_neuron]], output_neurons: IndexMap::new() };

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
        compile(&mut builder, &mut ctx, &catalogue, &config, &network);
        let node = builder.finish();
        assert!(matches!(node.kind, AstKind::Block(_)));
    }
}
