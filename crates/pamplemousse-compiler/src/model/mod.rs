//! Model compiler dispatch (§4.5, C6).
//!
//! One compiler per model kind, each pushing exactly one AST node
//! representing the model body. The root driver ([`crate::compile`])
//! already knows the model kind from the document, so dispatch here is a
//! plain `match` rather than a trait per model kind (§9: "tagged variants
//! over polymorphic base classes" applies just as well to model kinds as
//! to AST nodes).

pub mod cluster;
pub mod mining;
pub mod naive_bayes;
pub mod neural_network;
pub mod output;
pub mod regression;
pub mod ruleset;
pub mod scorecard;
pub mod svm;
pub mod tree;

use pamplemousse_core::{AstBuilder, Catalogue, ConversionContext};

use output::ModelConfig;

/// One model's scoring-body shape, tagged by kind (§4.5.1–§4.5.4).
pub enum ModelBody {
    Tree { tree: tree::TreeConfig, root: tree::TreeNode },
    RuleSet(ruleset::RuleSetConfig),
    Mining(mining::Segmentation),
    Regression(regression::RegressionConfig),
    Scorecard(scorecard::ScorecardConfig),
    NaiveBayes(naive_bayes::NaiveBayesConfig),
    Svm(svm::SvmConfig),
    NeuralNetwork(neural_network::NeuralNetworkConfig),
    Cluster(cluster::ClusterConfig),
}

/// Pushes one AST node for `body`'s scoring logic onto `builder`'s stack,
/// honouring `config`'s output bookkeeping (probabilities, confidences,
/// predicted-value field, ...).
pub fn compile(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, body: &ModelBody) {
    match body {
        ModelBody::Tree { tree, root } => tree::compile(builder, ctx, catalogue, config, tree, root),
        ModelBody::RuleSet(ruleset) => ruleset::compile(builder, ctx, catalogue, config, ruleset),
        ModelBody::Mining(segmentation) => mining::compile(builder, ctx, catalogue, config, segmentation),
        ModelBody::Regression(regression) => regression::compile(builder, ctx, catalogue, config, regression),
        ModelBody::Scorecard(scorecard) => scorecard::compile(builder, ctx, catalogue, config, scorecard),
        ModelBody::NaiveBayes(naive_bayes) => naive_bayes::compile(builder, ctx, catalogue, config, naive_bayes),
        ModelBody::Svm(svm) => svm::compile(builder, ctx, catalogue, config, svm),
        ModelBody::NeuralNetwork(neural_network) => neural_network::compile(builder, ctx, catalogue, config, neural_network),
        ModelBody::Cluster(cluster) => cluster::compile(builder, ctx, catalogue, config, cluster),
    }
}
