//! Support vector machine model compilation (§4.5.3, C6).
//!
//! One binary decision function: `sum(coefficient_i * kernel(x, sv_i))
//! + intercept`. Regression models read the decision value directly
//! (through target post-processing); classification models assign the
//! positive category when the value is at least `threshold`, the
//! negative category otherwise.

use pamplemousse_core::{AstBuilder, AstNode, Catalogue, ConversionContext, FieldRef, Literal};

use super::output::{self, ModelConfig};

#[derive(Debug, Clone, Copy)]
pub enum Kernel {
    Linear,
    Polynomial { gamma: f64, coef0: f64, degree: f64 },
    RadialBasis { gamma: f64 },
    Sigmoid { gamma: f64, coef0: f64 },
}

#[derive(Debug, Clone)]
pub struct SupportVector {
    /// Coordinates in the same order as [`SvmConfig::fields`].
    pub coordinates: Vec<f64>,
    pub coefficient: f64,
}

#[derive(Debug, Clone)]
pub struct SvmConfig {
    pub fields: Vec<FieldRef>,
    pub support_vectors: Vec<SupportVector>,
    pub intercept: f64,
    pub kernel: Kernel,
    pub positive_category: String,
    pub negative_category: String,
    pub threshold: f64,
}

pub fn compile(builder: &mut AstBuilder, ctx: &mut ConversionContext, catalogue: &Catalogue, config: &ModelConfig, svm: &SvmConfig) {
    let decision = compile_decision_function(builder, catalogue, svm);

    let mut statements = Vec::new();
    match config.mining_function {
        output::MiningFunction::Classification => {
            let decision_value = ctx.fresh_temporary(pamplemousse_core::ValueType::Number, "svm_decision");
            builder.push_node(decision);
            builder.declare(decision_value.clone());
            statements.push(builder.pop_node());

            if let Some(predicted_value) = &config.predicted_value {
                let ge_id = catalogue.id_of(">=").expect(">= registered");
                let if_id = catalogue.id_of("if").expect("if registered");
                builder.push_field(decision_value);
                builder.push_constant(Literal::Number(svm.threshold));
                builder.push_function_call(ge_id, 2, None);
                builder.push_constant(Literal::String(svm.positive_category.clone()));
                builder.push_constant(Literal::String(svm.negative_category.clone()));
                builder.push_function_call(if_id, 3, None);
                builder.assign(predicted_value.clone());
                statements.push(builder.pop_node());
            }
        }
        _ => {
            if let Some(predicted_value) = &config.predicted_value {
                let value = if let Some(target) = &config.target { output::apply_target_postprocessing(builder, catalogue, target, decision) } else { decision };
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

fn compile_decision_function(builder: &mut AstBuilder, catalogue: &Catalogue, svm: &SvmConfig) -> AstNode {
    let add_id = catalogue.id_of("+").expect("+ registered");
    let mul_id = catalogue.id_of("*").expect("* registered");

    builder.push_constant(Literal::Number(svm.intercept));
    let mut accumulated = builder.pop_node();

    for sv in &svm.support_vectors {
        let kernel_value = compile_kernel(builder, catalogue, &svm.fields, sv, svm.kernel);
        builder.push_constant(Literal::Number(sv.coefficient));
        builder.push_node(kernel_value);
        builder.push_function_call(mul_id, 2, None);
        let term = builder.pop_node();

        builder.push_node(accumulated);
        builder.push_node(term);
        builder.push_function_call(add_id, 2, None);
        accumulated = builder.pop_node();
    }
    accumulated
}

fn compile_dot_product(builder: &mut AstBuilder, catalogue: &Catalogue, fields: &[FieldRef], sv: &SupportVector) -> AstNode {
    let add_id = catalogue.id_of("+").expect("+ registered");
    let mul_id = catalogue.id_of("*").expect("* registered");

    builder.push_constant(Literal::Number(0.0));
    let mut accumulated = builder.pop_node();
    for (field, coordinate) in fields.iter().zip(sv.coordinates.iter()) {
        builder.push_field(field.clone());
        builder.push_constant(Literal::Number(*coordinate));
        builder.push_function_call(mul_id, 2, None);
        let term = builder.pop_node();

        builder.push_node(accumulated);
        builder.push_node(term);
        builder.push_function_call(add_id, 2, None);
        accumulated = builder.pop_node();
    }
    accumulated
}

fn compile_squared_distance(builder: &mut AstBuilder, catalogue: &Catalogue, fields: &[FieldRef], sv: &SupportVector) -> AstNode {
    let add_id = catalogue.id_of("+").expect("+ registered");
    let sub_id = catalogue.id_of("-").expect("- registered");
    let pow_id = catalogue.id_of("pow").expect("pow registered");

    builder.push_constant(Literal::Number(0.0));
    let mut accumulated = builder.pop_node();
    for (field, coordinate) in fields.iter().zip(sv.coordinates.iter()) {
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

fn compile_kernel(builder: &mut AstBuilder, catalogue: &Catalogue, fields: &[FieldRef], sv: &SupportVector, kernel: Kernel) -> AstNode {
    match kernel {
        Kernel::Linear => compile_dot_product(builder, catalogue, fields, sv),
        Kernel::Polynomial { gamma, coef0, degree } => {
            let dot = compile_dot_product(builder, catalogue, fields, sv);
            let mul_id = catalogue.id_of("*").expect("* registered");
            let add_id = catalogue.id_of("+").expect("+ registered");
            let pow_id = catalogue.id_of("pow").expect("pow registered");
            builder.push_constant(Literal::Number(gamma));
            builder.push_node(dot);
            builder.push_function_call(mul_id, 2, None);
            builder.push_constant(Literal::Number(coef0));
            builder.push_function_call(add_id, 2, None);
            builder.push_constant(Literal::Number(degree));
            builder.push_function_call(pow_id, 2, None);
            builder.pop_node()
        }
        Kernel::RadialBasis { gamma } => {
            let squared_distance = compile_squared_distance(builder, catalogue, fields, sv);
            let neg_id = catalogue.id_of("neg").expect("neg registered");
            let mul_id = catalogue.id_of("*").expect("* registered");
            let exp_id = catalogue.id_of("exp").expect("exp registered");
            builder.push_constant(Literal::Number(gamma));
            builder.push_node(squared_distance);
            builder.push_function_call(mul_id, 2, None);
            builder.push_function_call(neg_id, 1, None);
            builder.push_function_call(exp_id, 1, None);
            builder.pop_node()
        }
        Kernel::Sigmoid { gamma, coef0 } => {
            let dot = compile_dot_product(builder, catalogue, fields, sv);
            let mul_id = catalogue.id_of("*").expect("* registered");
            let add_id = catalogue.id_of("+").expect("+ registered");
            let sub_id = catalogue.id_of("-").expect("- registered");
            let div_id = catalogue.id_of("/").expect("/ registered");
            let exp_id = catalogue.id_of("exp").expect("exp registered");

            builder.push_constant(Literal::Number(gamma));
            builder.push_node(dot);
            builder.push_function_call(mul_id, 2, None);
            builder.push_constant(Literal::Number(coef0));
            builder.push_function_call(add_id, 2, None);
            let z = builder.pop_node();

            // tanh(z) = (exp(2z) - 1) / (exp(2z) + 1)
            builder.push_constant(Literal::Number(2.0));
            builder.push_node(z);
            builder.push_function_call(mul_id, 2, None);
            builder.push_function_call(exp_id, 1, None);
            let exp_2z = builder.pop_node();

            builder.push_node(exp_2z.clone());
            builder.push_constant(Literal::Number(1.0));
            builder.push_function_call(sub_id, 2, None);
            let numerator = builder.pop_node();

            builder.push_node(exp_2z);
            builder.push_constant(Literal::Number(1.0));
            builder.push_function_call(add_id, 2, None);
            let denominator = builder.pop_node();

            builder.push_node(numerator);
            builder.push_node(denominator);
            builder.push_function_call(div_id, 2, None);
            builder.pop_node()
        }
    }
}
