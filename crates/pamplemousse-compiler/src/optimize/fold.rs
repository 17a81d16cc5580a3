//! Constant folding and short-circuit elimination (§4.7 passes 1–2).

use pamplemousse_core::{AstKind, AstNode, Catalogue, IfArm, Literal};

use crate::analyze::{Trivial, check_if_trivial};

/// Bottom-up: fold every pure catalogue call whose arguments are all
/// already literal constants into a single `Constant` node.
pub fn fold_constants(node: &mut AstNode, catalogue: &Catalogue) -> bool {
    let mut changed = false;
    for child in node.children_mut() {
        changed |= fold_constants(child, catalogue);
    }
    if let AstKind::FunctionCall { function, args } = &node.kind {
        let name = catalogue.get(*function).name;
        if let Some(folded) = try_fold(name, args) {
            node.value_type = folded.value_type();
            node.kind = AstKind::Constant(folded);
            changed = true;
        }
    }
    changed
}

fn literal(node: &AstNode) -> Option<&Literal> {
    match &node.kind {
        AstKind::Constant(lit) => Some(lit),
        _ => None,
    }
}

fn number(node: &AstNode) -> Option<f64> {
    match literal(node)? {
        Literal::Number(n) => Some(*n),
        _ => None,
    }
}

fn string(node: &AstNode) -> Option<&str> {
    match literal(node)? {
        Literal::String(s) => Some(s.as_str()),
        _ => None,
    }
}

/// Evaluate a catalogue function over already-literal arguments. Returns
/// `None` for anything not a pure literal-in-literal-out computation
/// (set-membership, surrogates, anything with a non-literal argument) —
/// the node is then left as a runtime call.
fn try_fold(name: &str, args: &[AstNode]) -> Option<Literal> {
    match name {
        "+" => Some(Literal::Number(number(&args[0])? + number(&args[1])?)),
        "-" => Some(Literal::Number(number(&args[0])? - number(&args[1])?)),
        "neg" => Some(Literal::Number(-number(&args[0])?)),
        "*" => Some(Literal::Number(number(&args[0])? * number(&args[1])?)),
        "/" => Some(Literal::Number(number(&args[0])? / number(&args[1])?)),
        "min" => args.iter().map(number).collect::<Option<Vec<_>>>()?.into_iter().reduce(f64::min).map(Literal::Number),
        "max" => args.iter().map(number).collect::<Option<Vec<_>>>()?.into_iter().reduce(f64::max).map(Literal::Number),
        "sum" => Some(Literal::Number(args.iter().map(number).collect::<Option<Vec<_>>>()?.into_iter().sum())),
        "avg" => {
            let values = args.iter().map(number).collect::<Option<Vec<_>>>()?;
            Some(Literal::Number(values.iter().sum::<f64>() / values.len() as f64))
        }
        "abs" => Some(Literal::Number(number(&args[0])?.abs())),
        "exp" => Some(Literal::Number(number(&args[0])?.exp())),
        "ln" => Some(Literal::Number(number(&args[0])?.ln())),
        "log10" => Some(Literal::Number(number(&args[0])?.log10())),
        "sqrt" => Some(Literal::Number(number(&args[0])?.sqrt())),
        "pow" => Some(Literal::Number(number(&args[0])?.powf(number(&args[1])?))),
        "floor" => Some(Literal::Number(number(&args[0])?.floor())),
        "ceiling" => Some(Literal::Number(number(&args[0])?.ceil())),
        "round" => Some(Literal::Number(number(&args[0])?.round())),
        "==" => Some(Literal::Bool(string(&args[0])? == string(&args[1])?)),
        "!=" => Some(Literal::Bool(string(&args[0])? != string(&args[1])?)),
        "<" => Some(Literal::Bool(number(&args[0])? < number(&args[1])?)),
        "<=" => Some(Literal::Bool(number(&args[0])? <= number(&args[1])?)),
        ">" => Some(Literal::Bool(number(&args[0])? > number(&args[1])?)),
        ">=" => Some(Literal::Bool(number(&args[0])? >= number(&args[1])?)),
        "concat" => {
            let mut out = String::new();
            for arg in args {
                out.push_str(string(arg)?);
            }
            Some(Literal::String(out))
        }
        "uppercase" => Some(Literal::String(string(&args[0])?.to_uppercase())),
        "lowercase" => Some(Literal::String(string(&args[0])?.to_lowercase())),
        "trimBlanks" => Some(Literal::String(string(&args[0])?.trim().to_string())),
        "stringLength" => Some(Literal::Number(string(&args[0])?.chars().count() as f64)),
        "equalsIgnoreCase" => Some(Literal::Bool(string(&args[0])?.eq_ignore_ascii_case(string(&args[1])?))),
        "toNumber" => match literal(&args[0])? {
            Literal::Number(n) => Some(Literal::Number(*n)),
            Literal::String(s) => s.trim().parse::<f64>().ok().map(Literal::Number),
            Literal::Bool(b) => Some(Literal::Number(if *b { 1.0 } else { 0.0 })),
            Literal::Invalid | Literal::StringTable(_) => None,
        },
        "toString" => match literal(&args[0])? {
            Literal::String(s) => Some(Literal::String(s.clone())),
            Literal::Number(n) => Some(Literal::String(format!("{n}"))),
            Literal::Bool(b) => Some(Literal::String(b.to_string())),
            Literal::Invalid | Literal::StringTable(_) => None,
        },
        "toBool" => match literal(&args[0])? {
            Literal::Bool(b) => Some(Literal::Bool(*b)),
            Literal::Number(n) => Some(Literal::Bool(*n != 0.0)),
            Literal::String(_) | Literal::Invalid | Literal::StringTable(_) => None,
        },
        _ => None,
    }
}

/// Bottom-up: collapse `and`/`or` calls with a trivial operand and prune
/// `if-chain` arms whose condition is statically decided (§4.7 pass 2).
pub fn eliminate_short_circuits(node: &mut AstNode, catalogue: &Catalogue) -> bool {
    let mut changed = false;
    match &mut node.kind {
        AstKind::FunctionCall { args, .. } => {
            for arg in args.iter_mut() {
                changed |= eliminate_short_circuits(arg, catalogue);
            }
        }
        AstKind::IfChain(arms) => {
            for arm in arms.iter_mut() {
                if let Some(cond) = arm.condition.as_deref_mut() {
                    changed |= eliminate_short_circuits(cond, catalogue);
                }
                changed |= eliminate_short_circuits(&mut arm.body, catalogue);
            }
            changed |= simplify_if_chain(arms, catalogue);
        }
        AstKind::Declaration { value, .. } | AstKind::Assignment { value, .. } => {
            changed |= eliminate_short_circuits(value, catalogue);
        }
        AstKind::IndirectAssignment { table, key, value } => {
            changed |= eliminate_short_circuits(table, catalogue);
            changed |= eliminate_short_circuits(key, catalogue);
            changed |= eliminate_short_circuits(value, catalogue);
        }
        AstKind::IndirectField { table, key } => {
            changed |= eliminate_short_circuits(table, catalogue);
            changed |= eliminate_short_circuits(key, catalogue);
        }
        AstKind::Block(stmts) => {
            for stmt in stmts.iter_mut() {
                changed |= eliminate_short_circuits(stmt, catalogue);
            }
        }
        AstKind::Return(values) => {
            for value in values.iter_mut() {
                changed |= eliminate_short_circuits(value, catalogue);
            }
        }
        AstKind::Lambda { body, .. } => changed |= eliminate_short_circuits(body, catalogue),
        AstKind::DefaultValue { value, default } => {
            changed |= eliminate_short_circuits(value, catalogue);
            changed |= eliminate_short_circuits(default, catalogue);
        }
        AstKind::FieldRef(_) | AstKind::Constant(_) => {}
    }

    let mut replacement = None;
    if let AstKind::FunctionCall { function, args } = &mut node.kind {
        let name = catalogue.get(*function).name;
        match name {
            "and" => replacement = simplify_logical(args, catalogue, Trivial::AlwaysFalse, Trivial::AlwaysTrue),
            "or" => replacement = simplify_logical(args, catalogue, Trivial::AlwaysTrue, Trivial::AlwaysFalse),
            _ => {}
        }
    }
    if let Some(replacement) = replacement {
        *node = replacement;
        changed = true;
    }
    changed
}

/// `short_circuit` is the absorbing truth value (`AlwaysFalse` for `and`,
/// `AlwaysTrue` for `or`); `identity` is the value an operand may be
/// dropped for. Returns the node's replacement, if any.
fn simplify_logical(args: &mut Vec<AstNode>, catalogue: &Catalogue, short_circuit: Trivial, identity: Trivial) -> Option<AstNode> {
    if args.iter().any(|a| check_if_trivial(a, catalogue) == short_circuit) {
        return Some(AstNode::constant(Literal::Bool(short_circuit == Trivial::AlwaysTrue)));
    }
    let before = args.len();
    let kept: Vec<AstNode> = std::mem::take(args).into_iter().filter(|a| check_if_trivial(a, catalogue) != identity).collect();
    match kept.len() {
        0 => Some(AstNode::constant(Literal::Bool(identity == Trivial::AlwaysTrue))),
        1 => kept.into_iter().next(),
        n if n == before => {
            *args = kept;
            None
        }
        _ => {
            *args = kept;
            None
        }
    }
}

fn simplify_if_chain(arms: &mut Vec<IfArm>, catalogue: &Catalogue) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i < arms.len() {
        let Some(cond) = &arms[i].condition else {
            i += 1;
            continue;
        };
        match check_if_trivial(cond, catalogue) {
            Trivial::AlwaysFalse => {
                arms.remove(i);
                changed = true;
            }
            Trivial::AlwaysTrue => {
                arms[i].condition = None;
                arms.truncate(i + 1);
                changed = true;
                break;
            }
            Trivial::RuntimeEvaluationNeeded => i += 1,
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pamplemousse_core::AstNode;

    #[test]
    fn folds_arithmetic_over_literals() {
        let catalogue = Catalogue::standard();
        let id = catalogue.id_of("+").unwrap();
        let mut node = AstNode::new(
            AstKind::FunctionCall { function: id, args: vec![AstNode::constant(Literal::Number(2.0)), AstNode::constant(Literal::Number(3.0))] },
            pamplemousse_core::ValueType::Number,
        );
        assert!(fold_constants(&mut node, &catalogue));
        assert!(matches!(node.kind, AstKind::Constant(Literal::Number(n)) if n == 5.0));
    }

    #[test]
    fn and_with_false_operand_collapses_to_false() {
        let catalogue = Catalogue::standard();
        let id = catalogue.id_of("and").unwrap();
        let mut node = AstNode::new(
            AstKind::FunctionCall { function: id, args: vec![AstNode::constant(Literal::Bool(true)), AstNode::constant(Literal::Bool(false))] },
            pamplemousse_core::ValueType::Bool,
        );
        assert!(eliminate_short_circuits(&mut node, &catalogue));
        assert!(matches!(node.kind, AstKind::Constant(Literal::Bool(false))));
    }

    #[test]
    fn if_chain_drops_always_false_arm() {
        let catalogue = Catalogue::standard();
        let mut arms = vec![
            IfArm { condition: Some(Box::new(AstNode::constant(Literal::Bool(false)))), body: Box::new(AstNode::constant(Literal::Number(1.0))) },
            IfArm { condition: None, body: Box::new(AstNode::constant(Literal::Number(2.0))) },
        ];
        assert!(simplify_if_chain(&mut arms, &catalogue));
        assert_eq!(arms.len(), 1);
    }
}
