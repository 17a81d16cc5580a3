//! The AST: a closed, tagged-variant sum over roughly a dozen node shapes
//! (§3, §9 "tagged variants over polymorphic base classes").
//!
//! Every node carries its coerced value type; visitors dispatch on the
//! `AstKind` tag rather than through a virtual hierarchy.

use crate::field::FieldRef;
use crate::value::ValueType;

/// A literal value baked into the AST at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
    /// The sentinel for a statically-known-missing value.
    Invalid,
    /// A constant set of category values, emitted as a key→true table so a
    /// set-membership predicate compiles to one table lookup instead of a
    /// chain of equality comparisons (§4.4).
    StringTable(Vec<String>),
}

impl Literal {
    pub fn value_type(&self) -> ValueType {
        match self {
            Literal::String(_) => ValueType::String,
            Literal::Number(_) => ValueType::Number,
            Literal::Bool(_) => ValueType::Bool,
            Literal::Invalid => ValueType::Invalid,
            Literal::StringTable(_) => ValueType::StringTable,
        }
    }
}

/// A stable identifier into the function catalogue (§4.3). Interned at
/// catalogue-construction time so equality is a cheap integer compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

/// One arm of an if-chain: `None` as the condition marks the trailing
/// `else` arm (at most one, always last).
#[derive(Debug, Clone)]
pub struct IfArm {
    pub condition: Option<Box<AstNode>>,
    pub body: Box<AstNode>,
}

/// The tag of an [`AstNode`] (§3 "AST node").
#[derive(Debug, Clone)]
pub enum AstKind {
    FieldRef(FieldRef),
    Constant(Literal),
    FunctionCall { function: FunctionId, args: Vec<AstNode> },
    Declaration { field: FieldRef, value: Box<AstNode> },
    Assignment { field: FieldRef, value: Box<AstNode> },
    /// A table write: `table[key] = value`.
    IndirectAssignment { table: Box<AstNode>, key: Box<AstNode>, value: Box<AstNode> },
    /// A table read: `table[key]`.
    IndirectField { table: Box<AstNode>, key: Box<AstNode> },
    Block(Vec<AstNode>),
    IfChain(Vec<IfArm>),
    Return(Vec<AstNode>),
    Lambda { params: Vec<FieldRef>, body: Box<AstNode> },
    /// Missing-coalesce: evaluates `value`, falling back to `default` only
    /// when `value` is missing at runtime.
    DefaultValue { value: Box<AstNode>, default: Box<AstNode> },
}

/// An AST node: a tag plus its coerced value type (§3).
#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: AstKind,
    pub value_type: ValueType,
}

impl AstNode {
    pub fn new(kind: AstKind, value_type: ValueType) -> Self {
        Self { kind, value_type }
    }

    pub fn field_ref(field: FieldRef) -> Self {
        let value_type = field.value_type();
        Self::new(AstKind::FieldRef(field), value_type)
    }

    pub fn constant(lit: Literal) -> Self {
        let value_type = lit.value_type();
        Self::new(AstKind::Constant(lit), value_type)
    }

    pub fn statement(kind: AstKind) -> Self {
        Self::new(kind, ValueType::Void)
    }

    /// Direct children, in evaluation order. Used by the analyser and
    /// optimiser for whole-tree traversal; does not recurse.
    pub fn children(&self) -> Vec<&AstNode> {
        match &self.kind {
            AstKind::FieldRef(_) | AstKind::Constant(_) => vec![],
            AstKind::FunctionCall { args, .. } => args.iter().collect(),
            AstKind::Declaration { value, .. } | AstKind::Assignment { value, .. } => vec![value.as_ref()],
            AstKind::IndirectAssignment { table, key, value } => vec![table.as_ref(), key.as_ref(), value.as_ref()],
            AstKind::IndirectField { table, key } => vec![table.as_ref(), key.as_ref()],
            AstKind::Block(stmts) => stmts.iter().collect(),
            AstKind::IfChain(arms) => arms
                .iter()
                .flat_map(|arm| {
                    arm.condition
                        .as_deref()
                        .into_iter()
                        .chain(std::iter::once(arm.body.as_ref()))
                })
                .collect(),
            AstKind::Return(values) => values.iter().collect(),
            AstKind::Lambda { body, .. } => vec![body.as_ref()],
            AstKind::DefaultValue { value, default } => vec![value.as_ref(), default.as_ref()],
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut AstNode> {
        match &mut self.kind {
            AstKind::FieldRef(_) | AstKind::Constant(_) => vec![],
            AstKind::FunctionCall { args, .. } => args.iter_mut().collect(),
            AstKind::Declaration { value, .. } | AstKind::Assignment { value, .. } => vec![value.as_mut()],
            AstKind::IndirectAssignment { table, key, value } => vec![table.as_mut(), key.as_mut(), value.as_mut()],
            AstKind::IndirectField { table, key } => vec![table.as_mut(), key.as_mut()],
            AstKind::Block(stmts) => stmts.iter_mut().collect(),
            AstKind::IfChain(arms) => arms
                .iter_mut()
                .flat_map(|arm| {
                    arm.condition
                        .as_deref_mut()
                        .into_iter()
                        .chain(std::iter::once(arm.body.as_mut()))
                })
                .collect(),
            AstKind::Return(values) => values.iter_mut().collect(),
            AstKind::Lambda { body, .. } => vec![body.as_mut()],
            AstKind::DefaultValue { value, default } => vec![value.as_mut(), default.as_mut()],
        }
    }

    /// True for the handful of kinds the emitter formats as statements
    /// rather than expressions (§4.3 "special statement-shaped entries").
    pub fn is_statement(&self) -> bool {
        matches!(
            self.kind,
            AstKind::Declaration { .. }
                | AstKind::Assignment { .. }
                | AstKind::IndirectAssignment { .. }
                | AstKind::Block(_)
                | AstKind::IfChain(_)
                | AstKind::Return(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{DataField, FieldDescription, FieldOrigin};
    use crate::value::OpType;

    #[test]
    fn field_ref_inherits_its_field_type() {
        let field = FieldDescription::new(0, DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::DataDictionary, "x".into());
        let node = AstNode::field_ref(field);
        assert_eq!(node.value_type, ValueType::Number);
    }

    #[test]
    fn children_of_leaf_nodes_is_empty() {
        let node = AstNode::constant(Literal::Number(1.0));
        assert!(node.children().is_empty());
    }

    #[test]
    fn if_chain_children_includes_conditions_and_bodies() {
        let cond = AstNode::constant(Literal::Bool(true));
        let body = AstNode::constant(Literal::Number(1.0));
        let node = AstNode::statement(AstKind::IfChain(vec![IfArm {
            condition: Some(Box::new(cond)),
            body: Box::new(body),
        }]));
        assert_eq!(node.children().len(), 2);
    }
}
