//! Parses a PMML model element's body into the XML-agnostic
//! [`crate::model::ModelBody`] the model compilers consume. Field lookups
//! (`ctx.context.lookup`) assume the caller has already declared every
//! `DataDictionary` input and `DerivedField` the model might reference.

use indexmap::IndexMap;
use roxmltree::Node;

use pamplemousse_core::ValueType;

use crate::diagnostics::ErrorKind;
use crate::predicate::Predicate;
use crate::model::cluster::{ClusterCenter, ClusterConfig, ClusteringConfig, Instance, InstanceTarget, NearestNeighborConfig};
use crate::model::mining::{MultipleModelMethod, Segment, Segmentation};
use crate::model::naive_bayes::{BayesInput, GaussianParams, NaiveBayesConfig};
use crate::model::neural_network::{Activation, NeuralNetworkConfig, Neuron, NeuronInput};
use crate::model::output::MiningFunction;
use crate::model::regression::{LinearPredictor, NormalizationMethod, Predictor, RegressionConfig, Term};
use crate::model::ruleset::{Rule, RuleSelectionMethod, RuleSetConfig};
use crate::model::scorecard::{Attribute, Characteristic, ScorecardConfig};
use crate::model::svm::{Kernel, SupportVector, SvmConfig};
use crate::model::tree::{MissingValueStrategy, NoTrueChildStrategy, ScoreDistribution, TreeConfig, TreeNode};
use crate::model::ModelBody;

use super::predicate_xml::parse_predicate_child;
use super::xml::{array_values, attr, attr_f64, attr_usize, child, children, first_non_extension, line};
use super::CompileCtx;

pub fn parse_model_body(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Option<ModelBody> {
    match node.tag_name().name() {
        "TreeModel" => Some(parse_tree_model(node, ctx)),
        "RuleSetModel" => Some(parse_rule_set_model(node, ctx)),
        "MiningModel" => Some(parse_mining_model(node, ctx)),
        "RegressionModel" => Some(parse_regression_model(node, ctx)),
        "Scorecard" => Some(parse_scorecard(node, ctx)),
        "NaiveBayesModel" => Some(parse_naive_bayes_model(node, ctx)),
        "SupportVectorMachineModel" => Some(parse_svm_model(node, ctx)),
        "NeuralNetwork" => Some(parse_neural_network_model(node, ctx)),
        "ClusteringModel" => Some(parse_clustering_model(node, ctx)),
        "NearestNeighborModel" => Some(parse_nearest_neighbor_model(node, ctx)),
        other => {
            ctx.diag.report_with_arg(ErrorKind::UnsupportedCombination, "unsupported model element", other.to_string(), line(node));
            None
        }
    }
}

// ---- TreeModel --------------------------------------------------------

fn parse_tree_model(node: Node<'_, '_>, ctx: &mut CompileCtx) -> ModelBody {
    let no_true_child_strategy = match attr(node, "noTrueChildStrategy") {
        Some("returnNullPrediction") => NoTrueChildStrategy::ReturnNullPrediction,
        _ => NoTrueChildStrategy::ReturnLastPrediction,
    };
    let missing_value_strategy = match attr(node, "missingValueStrategy") {
        Some("lastPrediction") => MissingValueStrategy::LastPrediction,
        Some("nullPrediction") => MissingValueStrategy::NullPrediction,
        Some("defaultChild") => MissingValueStrategy::DefaultChild,
        Some("aggregateNodes") => MissingValueStrategy::AggregateNodes,
        Some("weightedConfidence") => MissingValueStrategy::WeightedConfidence,
        _ => MissingValueStrategy::None,
    };
    let missing_value_penalty = attr_f64(node, "missingValuePenalty");

    let tree = TreeConfig { no_true_child_strategy, missing_value_strategy, missing_value_penalty };
    let root = child(node, "Node").map(|n| parse_tree_node(n, ctx)).unwrap_or_else(|| TreeNode {
        predicate: Predicate::True,
        score: None,
        id: None,
        default_child: None,
        distributions: Vec::new(),
        children: Vec::new(),
    });
    ModelBody::Tree { tree, root }
}

fn parse_tree_node(node: Node<'_, '_>, ctx: &mut CompileCtx) -> TreeNode {
    let predicate = parse_predicate_child(node, ctx);
    let score = attr(node, "score").map(str::to_string);
    let id = attr(node, "id").map(str::to_string);
    let default_child = attr(node, "defaultChild").map(str::to_string);
    let distributions = children(node, "ScoreDistribution")
        .map(|n| ScoreDistribution {
            category: attr(n, "value").unwrap_or_default().to_string(),
            record_count: attr_f64(n, "recordCount").unwrap_or(0.0),
            confidence: attr_f64(n, "confidence"),
        })
        .collect();
    let children: Vec<TreeNode> = children(node, "Node").map(|n| parse_tree_node(n, ctx)).collect();
    TreeNode { predicate, score, id, default_child, distributions, children }
}

// ---- RuleSetModel -------------------------------------------------------

fn parse_rule_set_model(node: Node<'_, '_>, ctx: &mut CompileCtx) -> ModelBody {
    let Some(rule_set) = child(node, "RuleSet") else {
        ctx.diag.report(ErrorKind::ParseError, "RuleSetModel missing RuleSet", line(node));
        return ModelBody::RuleSet(RuleSetConfig { selection_method: RuleSelectionMethod::FirstHit, rules: vec![], default_score: None });
    };
    let selection_method = match child(rule_set, "RuleSelectionMethod").and_then(|n| attr(n, "criterion")) {
        Some("weightedSum") | Some("weightedMax") => RuleSelectionMethod::WeightedMax,
        _ => RuleSelectionMethod::FirstHit,
    };
    let default_score = attr(rule_set, "defaultScore").map(str::to_string);
    let mut rules = Vec::new();
    collect_rules(rule_set, ctx, &mut rules);
    ModelBody::RuleSet(RuleSetConfig { selection_method, rules, default_score })
}

fn collect_rules(node: Node<'_, '_>, ctx: &mut CompileCtx, out: &mut Vec<Rule>) {
    for child_node in node.children().filter(|n| n.is_element()) {
        match child_node.tag_name().name() {
            "SimpleRule" => out.push(parse_simple_rule(child_node, ctx)),
            "CompoundRule" => {
                if let Some(nested) = child(child_node, "Rule").or_else(|| child(child_node, "RuleSet")) {
                    collect_rules(nested, ctx, out);
                }
                collect_rules(child_node, ctx, out);
            }
            _ => {}
        }
    }
}

fn parse_simple_rule(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Rule {
    let predicate = parse_predicate_child(node, ctx);
    let id = attr(node, "id").map(str::to_string);
    let score = attr(node, "score").unwrap_or_default().to_string();
    let weight = attr_f64(node, "weight").unwrap_or(1.0);
    let confidences = children(node, "ScoreDistribution")
        .filter_map(|n| Some((attr(n, "value")?.to_string(), attr_f64(n, "confidence").unwrap_or(0.0))))
        .collect();
    Rule { predicate, id, score, weight, confidences }
}

// ---- MiningModel --------------------------------------------------------

fn parse_mining_model(node: Node<'_, '_>, ctx: &mut CompileCtx) -> ModelBody {
    let Some(segmentation_node) = child(node, "Segmentation") else {
        ctx.diag.report(ErrorKind::ParseError, "MiningModel missing Segmentation", line(node));
        return ModelBody::Mining(Segmentation { segments: vec![], method: MultipleModelMethod::SelectFirst });
    };
    let method = match attr(segmentation_node, "multipleModelMethod") {
        Some("selectFirst") => MultipleModelMethod::SelectFirst,
        Some("selectAll") => MultipleModelMethod::SelectAll,
        Some("modelChain") => MultipleModelMethod::ModelChain,
        Some("sum") => MultipleModelMethod::Sum,
        Some("average") => MultipleModelMethod::Average,
        Some("weightedAverage") => MultipleModelMethod::WeightedAverage,
        Some("median") => MultipleModelMethod::Median,
        Some("max") => MultipleModelMethod::Max,
        Some("majorityVote") => MultipleModelMethod::MajorityVote,
        Some("weightedMajorityVote") => MultipleModelMethod::WeightedMajorityVote,
        other => {
            ctx.diag.report_with_arg(ErrorKind::UnknownAttributeValue, "unknown multipleModelMethod", other.unwrap_or("").to_string(), line(segmentation_node));
            MultipleModelMethod::SelectFirst
        }
    };

    let mining_function = match attr(node, "functionName") {
        Some("regression") => Some(MiningFunction::Regression),
        Some("classification") => Some(MiningFunction::Classification),
        _ => None,
    };
    match (method, mining_function) {
        (MultipleModelMethod::Sum, Some(MiningFunction::Classification)) => {
            ctx.diag.report_with_arg(
                ErrorKind::UnsupportedCombination,
                "sum is not a valid multipleModelMethod for a classification MiningModel",
                "sum",
                line(segmentation_node),
            );
        }
        (MultipleModelMethod::MajorityVote | MultipleModelMethod::WeightedMajorityVote, Some(MiningFunction::Regression)) => {
            ctx.diag.report_with_arg(
                ErrorKind::UnsupportedCombination,
                "majorityVote/weightedMajorityVote is not a valid multipleModelMethod for a regression MiningModel",
                if method == MultipleModelMethod::MajorityVote { "majorityVote" } else { "weightedMajorityVote" },
                line(segmentation_node),
            );
        }
        _ => {}
    }

    let mut segments = Vec::new();
    for segment_node in children(segmentation_node, "Segment") {
        let predicate = parse_predicate_child(segment_node, ctx);
        let weight = attr_f64(segment_node, "weight").unwrap_or(1.0);
        let Some(model_node) = segment_node.children().find(|n| n.is_element() && n.tag_name().name() != "Extension" && !is_predicate_element(n)) else {
            continue;
        };
        let Some(body) = parse_model_body(model_node, ctx) else { continue };
        segments.push(Segment { predicate, weight, body: Box::new(body) });
    }
    ModelBody::Mining(Segmentation { segments, method })
}

fn is_predicate_element(node: Node<'_, '_>) -> bool {
    matches!(node.tag_name().name(), "True" | "False" | "SimplePredicate" | "SimpleSetPredicate" | "CompoundPredicate")
}

// ---- RegressionModel ------------------------------------------------------

fn parse_regression_model(node: Node<'_, '_>, ctx: &mut CompileCtx) -> ModelBody {
    let normalization = match attr(node, "normalizationMethod") {
        Some("softmax") => NormalizationMethod::Softmax,
        Some("logit") => NormalizationMethod::Logit,
        _ => NormalizationMethod::None,
    };
    let mut predictors = IndexMap::new();
    for rt in children(node, "RegressionTable") {
        let category = attr(rt, "targetCategory").unwrap_or("").to_string();
        let intercept = attr_f64(rt, "intercept").unwrap_or(0.0);
        let mut terms = Vec::new();
        for num in children(rt, "NumericPredictor") {
            let Some(field) = attr(num, "name").and_then(|n| ctx.context.lookup(n)) else { continue };
            let coefficient = attr_f64(num, "coefficient").unwrap_or(0.0);
            let exponent = attr_f64(num, "exponent").unwrap_or(1.0);
            terms.push(Term { coefficient, predictors: vec![Predictor { field, exponent }] });
        }
        for cat in children(rt, "CategoricalPredictor") {
            // `Term`/`Predictor` carry no indicator-predicate slot, so a
            // CategoricalPredictor needs its field pre-turned into a 0/1
            // field by a `NormDiscrete` derived field in the document;
            // reported rather than approximated when that isn't the case.
            let field_name = attr(cat, "name").unwrap_or("");
            match ctx.context.lookup(field_name).filter(|f| f.value_type() == ValueType::Number) {
                Some(field) => {
                    let coefficient = attr_f64(cat, "coefficient").unwrap_or(0.0);
                    terms.push(Term { coefficient, predictors: vec![Predictor { field, exponent: 1.0 }] });
                }
                None => ctx.diag.report_with_arg(
                    ErrorKind::UnsupportedCombination,
                    "CategoricalPredictor requires a pre-indicated numeric field",
                    field_name.to_string(),
                    line(cat),
                ),
            }
        }
        predictors.insert(category, LinearPredictor { intercept, terms });
    }
    ModelBody::Regression(RegressionConfig { predictors, normalization })
}

// ---- Scorecard ------------------------------------------------------------

fn parse_scorecard(node: Node<'_, '_>, ctx: &mut CompileCtx) -> ModelBody {
    let initial_score = attr_f64(node, "initialScore").unwrap_or(0.0);
    let use_reason_codes = attr(node, "useReasonCodes") != Some("false");

    let mut characteristics = Vec::new();
    if let Some(characteristics_node) = child(node, "Characteristics") {
        for char_node in children(characteristics_node, "Characteristic") {
            let baseline_score = attr_f64(char_node, "baselineScore").unwrap_or(0.0);
            let attributes = children(char_node, "Attribute")
                .map(|attr_node| Attribute {
                    predicate: parse_predicate_child(attr_node, ctx),
                    partial_score: attr_f64(attr_node, "partialScore").unwrap_or(0.0),
                    reason_code: attr(attr_node, "reasonCode").map(str::to_string).or_else(|| attr(char_node, "reasonCode").map(str::to_string)),
                })
                .collect();
            characteristics.push(Characteristic { attributes, baseline_score });
        }
    }
    ModelBody::Scorecard(ScorecardConfig { characteristics, initial_score, use_reason_codes })
}

// ---- NaiveBayesModel --------------------------------------------------------

fn parse_naive_bayes_model(node: Node<'_, '_>, ctx: &mut CompileCtx) -> ModelBody {
    let threshold = attr_f64(node, "threshold").unwrap_or(0.001);
    let mut priors = IndexMap::new();
    if let Some(bayes_output) = child(node, "BayesOutput") {
        if let Some(target_counts) = child(bayes_output, "TargetValueCounts") {
            let total: f64 = children(target_counts, "TargetValueCount").filter_map(|n| attr_f64(n, "count")).sum();
            for tvc in children(target_counts, "TargetValueCount") {
                let Some(value) = attr(tvc, "value") else { continue };
                let count = attr_f64(tvc, "count").unwrap_or(0.0);
                priors.insert(value.to_string(), if total > 0.0 { count / total } else { 0.0 });
            }
        }
    }

    let mut inputs = Vec::new();
    if let Some(bayes_inputs) = child(node, "BayesInputs") {
        for bayes_input in children(bayes_inputs, "BayesInput") {
            let Some(field_name) = attr(bayes_input, "fieldName") else { continue };
            let Some(field) = ctx.context.lookup(field_name) else { continue };
            if let Some(gaussian_parent) = children(bayes_input, "TargetValueStats").next() {
                let mut params = IndexMap::new();
                for tvs in children(gaussian_parent, "TargetValueStat") {
                    let Some(category) = attr(tvs, "value") else { continue };
                    if let Some(dist) = child(tvs, "GaussianDistribution") {
                        params.insert(category.to_string(), GaussianParams { mean: attr_f64(dist, "mean").unwrap_or(0.0), variance: attr_f64(dist, "variance").unwrap_or(1.0) });
                    }
                }
                inputs.push(BayesInput::Gaussian { field, params });
            } else {
                let mut table: IndexMap<String, IndexMap<String, f64>> = IndexMap::new();
                for pair_counts in children(bayes_input, "PairCounts") {
                    let Some(value) = attr(pair_counts, "value") else { continue };
                    let Some(target_counts) = child(pair_counts, "TargetValueCounts") else { continue };
                    let counts: Vec<(String, f64)> =
                        children(target_counts, "TargetValueCount").filter_map(|n| Some((attr(n, "value")?.to_string(), attr_f64(n, "count").unwrap_or(0.0)))).collect();
                    let total: f64 = counts.iter().map(|(_, c)| c).sum();
                    let mut per_category = IndexMap::new();
                    for (category, count) in counts {
                        per_category.insert(category, if total > 0.0 { count / total } else { 0.0 });
                    }
                    table.insert(value.to_string(), per_category);
                }
                inputs.push(BayesInput::Discrete { field, table });
            }
        }
    }

    ModelBody::NaiveBayes(NaiveBayesConfig { inputs, priors, threshold })
}

// ---- SupportVectorMachineModel ---------------------------------------------

fn parse_svm_model(node: Node<'_, '_>, ctx: &mut CompileCtx) -> ModelBody {
    let kernel = parse_kernel(node);

    let mut vector_fields: IndexMap<String, Vec<f64>> = IndexMap::new();
    let mut field_order: Vec<pamplemousse_core::FieldRef> = Vec::new();
    if let Some(dict) = child(node, "VectorDictionary") {
        if let Some(fields_node) = child(dict, "VectorFields") {
            for field_ref_node in children(fields_node, "FieldRef") {
                if let Some(f) = attr(field_ref_node, "field").and_then(|n| ctx.context.lookup(n)) {
                    field_order.push(f);
                }
            }
        }
        for instance in children(dict, "VectorInstance") {
            let Some(id) = attr(instance, "id") else { continue };
            let coords = child(instance, "REAL-Array")
                .or_else(|| child(instance, "Array"))
                .map(array_values)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|v| v.parse::<f64>().ok())
                .collect();
            vector_fields.insert(id.to_string(), coords);
        }
    }

    let Some(svm_node) = child(node, "SupportVectorMachine") else {
        ctx.diag.report(ErrorKind::ParseError, "SupportVectorMachineModel missing SupportVectorMachine", line(node));
        return ModelBody::Svm(SvmConfig {
            fields: field_order,
            support_vectors: vec![],
            intercept: 0.0,
            kernel,
            positive_category: String::new(),
            negative_category: String::new(),
            threshold: 0.0,
        });
    };
    let positive_category = attr(svm_node, "targetCategory").unwrap_or("").to_string();
    let negative_category = attr(svm_node, "alternateTargetCategory").unwrap_or("").to_string();

    let mut ids = Vec::new();
    if let Some(support_vectors_node) = child(svm_node, "SupportVectors") {
        for sv in children(support_vectors_node, "SupportVector") {
            if let Some(id) = attr(sv, "vectorId") {
                ids.push(id.to_string());
            }
        }
    }
    let mut intercept = 0.0;
    let mut coefficients = Vec::new();
    if let Some(coeffs_node) = child(svm_node, "Coefficients") {
        intercept = attr_f64(coeffs_node, "absoluteValue").unwrap_or(0.0);
        for coeff in children(coeffs_node, "Coefficient") {
            coefficients.push(attr_f64(coeff, "value").unwrap_or(0.0));
        }
    }
    let support_vectors = ids
        .into_iter()
        .zip(coefficients)
        .filter_map(|(id, coefficient)| vector_fields.get(&id).map(|coordinates| SupportVector { coordinates: coordinates.clone(), coefficient }))
        .collect();

    ModelBody::Svm(SvmConfig { fields: field_order, support_vectors, intercept, kernel, positive_category, negative_category, threshold: 0.0 })
}

fn parse_kernel(node: Node<'_, '_>) -> Kernel {
    if let Some(k) = child(node, "LinearKernelType") {
        let _ = k;
        return Kernel::Linear;
    }
    if let Some(k) = child(node, "PolynomialKernelType") {
        return Kernel::Polynomial { gamma: attr_f64(k, "gamma").unwrap_or(1.0), coef0: attr_f64(k, "coef0").unwrap_or(0.0), degree: attr_f64(k, "degree").unwrap_or(1.0) };
    }
    if let Some(k) = child(node, "RadialBasisKernelType") {
        return Kernel::RadialBasis { gamma: attr_f64(k, "gamma").unwrap_or(1.0) };
    }
    if let Some(k) = child(node, "SigmoidKernelType") {
        return Kernel::Sigmoid { gamma: attr_f64(k, "gamma").unwrap_or(1.0), coef0: attr_f64(k, "coef0").unwrap_or(0.0) };
    }
    Kernel::Linear
}

// ---- NeuralNetwork ----------------------------------------------------------

fn parse_neural_network_model(node: Node<'_, '_>, ctx: &mut CompileCtx) -> ModelBody {
    let default_activation = parse_activation(attr(node, "activationFunction"));

    let mut layers = Vec::new();
    let mut declared_neuron_ids: std::collections::HashSet<String> = std::collections::HashSet::new();
    for layer_node in children(node, "NeuralLayer") {
        let layer_activation = attr(layer_node, "activationFunction").map(parse_activation_str).unwrap_or(default_activation);
        let mut neurons = Vec::new();
        let mut layer_ids = Vec::new();
        for neuron_node in children(layer_node, "Neuron") {
            let Some(id) = attr(neuron_node, "id") else { continue };
            let bias = attr_f64(neuron_node, "bias").unwrap_or(0.0);
            let weighted_inputs = children(neuron_node, "Con")
                .filter_map(|con| {
                    let from = attr(con, "from")?;
                    let weight = attr_f64(con, "weight").unwrap_or(0.0);
                    let input = match ctx.context.lookup(from) {
                        Some(field) => NeuronInput::Field(field),
                        None if declared_neuron_ids.contains(from) => NeuronInput::Neuron(from.to_string()),
                        None => {
                            ctx.diag.report_with_arg(
                                ErrorKind::BindingFailure,
                                "Con/@from does not resolve to a field or an already-declared neuron",
                                from.to_string(),
                                line(con),
                            );
                            return None;
                        }
                    };
                    Some((input, weight))
                })
                .collect();
            neurons.push(Neuron { id: id.to_string(), weighted_inputs, bias, activation: layer_activation });
            layer_ids.push(id.to_string());
        }
        layers.push(neurons);
        declared_neuron_ids.extend(layer_ids);
    }

    let mut output_neurons = IndexMap::new();
    if let Some(outputs_node) = child(node, "NeuralOutputs") {
        for output_node in children(outputs_node, "NeuralOutput") {
            let Some(neuron_id) = attr(output_node, "outputNeuron") else { continue };
            if let Some(norm_discrete) = first_non_extension(output_node).and_then(|n| child(n, "NormDiscrete")) {
                if let Some(category) = attr(norm_discrete, "value") {
                    output_neurons.insert(neuron_id.to_string(), category.to_string());
                }
            }
        }
    }

    ModelBody::NeuralNetwork(NeuralNetworkConfig { layers, output_neurons })
}

fn parse_activation(attr_value: Option<&str>) -> Activation {
    attr_value.map(parse_activation_str).unwrap_or(Activation::Logistic)
}

fn parse_activation_str(s: &str) -> Activation {
    match s {
        "identity" => Activation::Identity,
        "tanh" => Activation::Tanh,
        "exponential" => Activation::Exponential,
        "rectifier" => Activation::ReLU,
        _ => Activation::Logistic,
    }
}

// ---- ClusteringModel / NearestNeighborModel ---------------------------------

fn parse_clustering_model(node: Node<'_, '_>, ctx: &mut CompileCtx) -> ModelBody {
    let fields = clustering_fields(node, ctx);
    let clusters = children(node, "Cluster")
        .map(|n| ClusterCenter {
            id: attr(n, "id").unwrap_or_default().to_string(),
            coordinates: child(n, "Array").map(array_values).unwrap_or_default().into_iter().filter_map(|v| v.parse::<f64>().ok()).collect(),
        })
        .collect();
    ModelBody::Cluster(ClusterConfig::Clustering(ClusteringConfig { fields, clusters }))
}

fn clustering_fields(node: Node<'_, '_>, ctx: &mut CompileCtx) -> Vec<pamplemousse_core::FieldRef> {
    let Some(clustering_fields_container) = child(node, "ClusteringFields").or(Some(node)) else { return vec![] };
    children(clustering_fields_container, "ClusteringField")
        .filter_map(|n| attr(n, "field").and_then(|name| ctx.context.lookup(name)))
        .collect()
}

fn parse_nearest_neighbor_model(node: Node<'_, '_>, ctx: &mut CompileCtx) -> ModelBody {
    let k = attr_usize(node, "numberOfNeighbors").unwrap_or(1);

    let mut field_names: Vec<(String, pamplemousse_core::FieldRef)> = Vec::new();
    let mut target_column = None;
    if let Some(knn_inputs) = child(node, "KNNInputs") {
        for knn_input in children(knn_inputs, "KNNInput") {
            let Some(name) = attr(knn_input, "field") else { continue };
            if let Some(field) = ctx.context.lookup(name) {
                field_names.push((name.to_string(), field));
            }
        }
    }
    if let Some(mining_schema) = child(node, "MiningSchema") {
        for mining_field in children(mining_schema, "MiningField") {
            if attr(mining_field, "usageType") == Some("predicted") {
                target_column = attr(mining_field, "name").map(str::to_string);
            }
        }
    }

    let mut column_index: IndexMap<String, usize> = IndexMap::new();
    let mut instances = Vec::new();
    if let Some(training_instances) = child(node, "TrainingInstances") {
        if let Some(instance_fields) = child(training_instances, "InstanceFields") {
            for (i, instance_field) in children(instance_fields, "InstanceField").enumerate() {
                if let Some(name) = attr(instance_field, "field") {
                    column_index.insert(name.to_string(), i);
                }
            }
        }
        if let Some(table) = child(training_instances, "InlineTable") {
            for row in children(table, "row") {
                let mut values: IndexMap<String, String> = IndexMap::new();
                for cell in row.children().filter(|n| n.is_element()) {
                    values.insert(cell.tag_name().name().to_string(), cell.text().unwrap_or("").to_string());
                }
                let coordinates: Vec<f64> = field_names.iter().map(|(name, _)| values.get(name).and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0)).collect();
                let target = match &target_column {
                    Some(col) => match values.get(col).and_then(|v| v.parse::<f64>().ok()) {
                        Some(n) => InstanceTarget::Number(n),
                        None => InstanceTarget::Category(values.get(col).cloned().unwrap_or_default()),
                    },
                    None => InstanceTarget::Category(String::new()),
                };
                instances.push(Instance { coordinates, target });
            }
        }
    }

    let fields = field_names.into_iter().map(|(_, f)| f).collect();
    ModelBody::Cluster(ClusterConfig::NearestNeighbor(NearestNeighborConfig { fields, instances, k }))
}
