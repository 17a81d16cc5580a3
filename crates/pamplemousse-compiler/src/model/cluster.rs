//! Clustering and nearest-neighbour model compilation (§4.5.3, C6).
//!
//! Both kinds share a shape: compute a squared Euclidean distance from
//! the input record to every reference point (a cluster center, or a
//! training instance), then select from those distances. Clustering
//! takes a single argmin; nearest-neighbour takes the `k` smallest
//! (the same unrolled scan-then-commit rounds
//! [`super::scorecard::compile`] uses for ranking) and combines their
//! targets by majority vote or average.

use indexmap::IndexMap;

use pamplemousse_core::{AstBuilder, AstNode, Catalogue, ConversionContext, FieldRef, Literal, ValueType};

use super::output::{self, ModelConfig};

#[derive(Debug, Clone)]
pub struct ClusterCenter {
    pub id: String,
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ClusteringConfig {
    pub fields: Vec<FieldRef>,
    pub clusters: Vec<ClusterCenter>,
}

#[derive(Debug, Clone)]
pub enum InstanceTarget {
    Category(String),
    Number(f64),
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub coordinates: Vec<f64>,
    pub target: InstanceTarget,
}

#[derive(Debug, Clone)]
pub struct NearestNeighborConfig {
    pub fields: Vec<FieldRef>,
    pub instances: Vec<Instance>,
    pub k: usize,
}

#[derive(Debug, Clone)]
pub enum ClusterConfig {
    Clustering(ClusteringConfig),
    NearestNeighbor(NearestNeighborConfig),
}

pub fn compile(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, cluster: &ClusterConfig) {
    match cluster {
        ClusterConfig::Clustering(clustering) => compile_clustering(builder, ctx, catalogue, config, clustering),
        ClusterConfig::NearestNeighbor(knn) => compile_nearest_neighbor(builder, ctx, catalogue, config, knn),
    }
}

fn compile_squared_distance(builder: &mut AstBuilder, catalogue: &Catalogue, fields: &[FieldRef], coordinates: &[f64]) -> AstNode {
    let add_id = catalogue.id_of("+").expect("+ registered");
    let sub_id = catalogue.id_of("-").expect("- registered");
    let pow_id = catalogue.id_of("pow").expect("pow registered");

    builder.push_constant(Literal::Number(0.0));
    let mut accumulated = builder.pop_node();
    for (field, coordinate) in fields.iter().zip(coordinates.iter()) {
        builder.push_field(field.clone());
        builder.push_constant(Literal::Number(*coordinate));
        builder.push_function_call(sub_id, 2, None);
        builder.push_constant(Literal::Number(2.0));
        builder.push_function_call(pow_id, 2, None);
        let term = builder.pop_node();

        builder.push_node(accumulated);
        builder.push_node(term);
        builder.push_function_call(add_id, 2, None);
        accumulated = builder.pop_node();
    }
    accumulated
}

/// Assigns the id of whichever cluster's center is nearest (smallest
/// squared distance; ties go to the first-declared cluster).
fn compile_clustering(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, clustering: &ClusteringConfig) {
    let lt_id = catalogue.id_of("<").expect("< registered");
    let mut statements = Vec::new();

    let mut distances = Vec::new();
    for (i, center) in clustering.clusters.iter().enumerate() {
        let distance = ctx.fresh_temporary(ValueType::Number, &format!("cluster_{i}_distance"));
        let value = compile_squared_distance(builder, catalogue, &clustering.fields, &center.coordinates);
        builder.push_node(value);
        builder.declare(distance.clone());
        statements.push(builder.pop_node());
        distances.push(distance);
    }

    let best_distance = ctx.fresh_temporary(ValueType::Number, "cluster_best_distance");
    let posinf_id = catalogue.id_of("posInfinity").expect("posInfinity registered");
    builder.push_function_call(posinf_id, 0, None);
    builder.declare(best_distance.clone());
    statements.push(builder.pop_node());

    if config.predicted_value.is_some() || config.entity_id.is_some() {
        if let Some(predicted_value) = &config.predicted_value {
            builder.push_constant(Literal::String(String::new()));
            builder.declare(predicted_value.clone());
            statements.push(builder.pop_node());
        }
        if let Some(entity_id) = &config.entity_id {
            builder.push_constant(Literal::String(String::new()));
            builder.declare(entity_id.clone());
            statements.push(builder.pop_node());
        }

        for (distance, center) in distances.iter().zip(clustering.clusters.iter()) {
            builder.push_field(distance.clone());
            builder.push_field(best_distance.clone());
            builder.push_function_call(lt_id, 2, None);
            let condition = builder.pop_node();

            let mut then_statements = Vec::new();
            builder.push_field(distance.clone());
            builder.assign(best_distance.clone());
            then_statements.push(builder.pop_node());

            if let Some(predicted_value) = &config.predicted_value {
                builder.push_constant(Literal::String(center.id.clone()));
                builder.assign(predicted_value.clone());
                then_statements.push(builder.pop_node());
            }
            if let Some(entity_id) = &config.entity_id {
                builder.push_constant(Literal::String(center.id.clone()));
                builder.assign(entity_id.clone());
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
    }

    let len = statements.len();
    for stmt in statements {
        builder.push_node(stmt);
    }
    builder.push_block(len.max(1));
}

/// Selects the `k` nearest instances via `k` unrolled scan-then-commit
/// rounds, then combines their targets: majority vote (classification,
/// via the shared probability-map winner selection) or arithmetic mean
/// (regression).
fn compile_nearest_neighbor(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, knn: &NearestNeighborConfig) {
    let mut statements = Vec::new();

    let mut distances = Vec::new();
    let mut used = Vec::new();
    for (i, instance) in knn.instances.iter().enumerate() {
        let distance = ctx.fresh_temporary(ValueType::Number, &format!("neighbor_{i}_distance"));
        let value = compile_squared_distance(builder, catalogue, &knn.fields, &instance.coordinates);
        builder.push_node(value);
        builder.declare(distance.clone());
        statements.push(builder.pop_node());

        let used_flag = ctx.fresh_temporary(ValueType::Bool, &format!("neighbor_{i}_used"));
        builder.push_constant(Literal::Bool(false));
        builder.declare(used_flag.clone());
        statements.push(builder.pop_node());

        distances.push(distance);
        used.push(used_flag);
    }

    match config.mining_function {
        output::MiningFunction::Classification => {
            let categories: Vec<String> = {
                let mut seen = IndexMap::new();
                for instance in &knn.instances {
                    if let InstanceTarget::Category(category) = &instance.target {
                        seen.entry(category.clone()).or_insert(());
                    }
                }
                seen.into_keys().collect()
            };
            let probabilities = if config.probabilities.is_empty() { output::build_probability_map(ctx, &categories) } else { config.probabilities.clone() };
            for field in probabilities.values() {
                builder.push_constant(Literal::Number(0.0));
                builder.declare(field.clone());
                statements.push(builder.pop_node());
            }

            for round in 0..knn.k.min(knn.instances.len()) {
                push_nearest_round(builder, ctx, catalogue, &distances, &used, round, &mut statements, |builder, winner_index, statements| {
                    if let InstanceTarget::Category(category) = &knn.instances[winner_index].target {
                        if let Some(field) = probabilities.get(category) {
                            let add_id = catalogue.id_of("+").expect("+ registered");
                            builder.push_field(field.clone());
                            builder.push_constant(Literal::Number(1.0));
                            builder.push_function_call(add_id, 2, None);
                            builder.assign(field.clone());
                            statements.push(builder.pop_node());
                        }
                    }
                });
            }

            if let Some(predicted_value) = &config.predicted_value {
                let winner = output::push_winner_selection(builder, ctx, catalogue, &probabilities, predicted_value, config.best_probability.as_ref());
                statements.push(winner);
            }
        }
        _ => {
            let sum = ctx.fresh_temporary(ValueType::Number, "neighbor_sum");
            builder.push_constant(Literal::Number(0.0));
            builder.declare(sum.clone());
            statements.push(builder.pop_node());

            let k = knn.k.min(knn.instances.len()).max(1);
            for round in 0..k {
                push_nearest_round(builder, ctx, catalogue, &distances, &used, round, &mut statements, |builder, winner_index, statements| {
                    if let InstanceTarget::Number(value) = knn.instances[winner_index].target {
                        let add_id = catalogue.id_of("+").expect("+ registered");
                        builder.push_field(sum.clone());
                        builder.push_constant(Literal::Number(value));
                        builder.push_function_call(add_id, 2, None);
                        builder.assign(sum.clone());
                        statements.push(builder.pop_node());
                    }
                });
            }

            if let Some(predicted_value) = &config.predicted_value {
                let div_id = catalogue.id_of("/").expect("/ registered");
                builder.push_field(sum);
                builder.push_constant(Literal::Number(k as f64));
                builder.push_function_call(div_id, 2, None);
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

/// One scan-then-commit round over not-yet-used instances: finds the
/// smallest distance, marks its instance used, then invokes
/// `on_commit` with that instance's index so the caller can fold its
/// target into a vote tally or a running sum.
fn push_nearest_round(
    builder: &mut AstBuilder,
    ctx: &mut ConversionContext,
    catalogue: &Catalogue,
    distances: &[FieldRef],
    used: &[FieldRef],
    round: usize,
    statements: &mut Vec<AstNode>,
    mut on_commit: impl FnMut(&mut AstBuilder, usize, &mut Vec<AstNode>),
) {
    let lt_id = catalogue.id_of("<").expect("< registered");
    let and_id = catalogue.id_of("and").expect("and registered");
    let not_id = catalogue.id_of("not").expect("not registered");
    let eq_id = catalogue.id_of("==").expect("== registered");

    let best = ctx.fresh_temporary(ValueType::Number, &format!("nearest_{round}_best"));
    let settled = ctx.fresh_temporary(ValueType::Bool, &format!("nearest_{round}_settled"));

    let posinf_id = catalogue.id_of("posInfinity").expect("posInfinity registered");
    builder.push_function_call(posinf_id, 0, None);
    builder.declare(best.clone());
    statements.push(builder.pop_node());

    builder.push_constant(Literal::Bool(false));
    builder.declare(settled.clone());
    statements.push(builder.pop_node());

    for (distance, used_flag) in distances.iter().zip(used.iter()) {
        builder.push_field(used_flag.clone());
        builder.push_function_call(not_id, 1, None);
        let not_used = builder.pop_node();

        builder.push_field(distance.clone());
        builder.push_field(best.clone());
        builder.push_function_call(lt_id, 2, None);
        let beats_best = builder.pop_node();

        builder.push_node(not_used);
        builder.push_node(beats_best);
        builder.push_function_call(and_id, 2, None);
        let condition = builder.pop_node();

        builder.push_field(distance.clone());
        builder.assign(best.clone());
        let assign_best = builder.pop_node();

        builder.push_if_chain(vec![pamplemousse_core::IfArm { condition: Some(Box::new(condition)), body: Box::new(assign_best) }]);
        statements.push(builder.pop_node());
    }

    for (i, (distance, used_flag)) in distances.iter().zip(used.iter()).enumerate() {
        builder.push_field(used_flag.clone());
        builder.push_function_call(not_id, 1, None);
        let not_used = builder.pop_node();

        builder.push_field(settled.clone());
        builder.push_function_call(not_id, 1, None);
        let not_settled = builder.pop_node();

        builder.push_field(distance.clone());
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
        on_commit(builder, i, &mut then_statements);

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
