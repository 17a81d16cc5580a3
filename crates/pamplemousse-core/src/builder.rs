//! The stack-based AST builder (§4.2, §9 "stack-based builder").
//!
//! Model compilers push leaves (`field`, `constant`) and reduce the top of
//! the working stack into compound nodes. Every reduction validates and
//! coerces its operands against the catalogue entry it is building.

use crate::ast::{AstKind, AstNode, FunctionId, IfArm, Literal};
use crate::catalogue::Catalogue;
use crate::field::FieldRef;
use crate::value::ValueType;

/// Sink for builder diagnostics. The builder never throws: errors are
/// reported through this trait and a sentinel node is pushed so that
/// compilation continues far enough to surface multiple errors (§4.2).
pub trait ErrorSink {
    fn error(&mut self, message: String, argument: Option<String>, line: Option<u32>);
}

/// The working stack and its error sink.
pub struct AstBuilder<'a> {
    stack: Vec<AstNode>,
    catalogue: &'a Catalogue,
    sink: &'a mut dyn ErrorSink,
    had_error: bool,
}

impl<'a> AstBuilder<'a> {
    pub fn new(catalogue: &'a Catalogue, sink: &'a mut dyn ErrorSink) -> Self {
        Self { stack: Vec::new(), catalogue, sink, had_error: false }
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    /// Report an error and push a sentinel `invalid` constant, so callers
    /// that expect exactly one new node on the stack remain correct and
    /// compilation can keep discovering further errors.
    pub fn parsing_error(&mut self, message: impl Into<String>, line: Option<u32>) {
        self.had_error = true;
        self.sink.error(message.into(), None, line);
        self.stack.push(AstNode::constant(Literal::Invalid));
    }

    pub fn parsing_error_with_arg(&mut self, message: impl Into<String>, argument: impl Into<String>, line: Option<u32>) {
        self.had_error = true;
        self.sink.error(message.into(), Some(argument.into()), line);
        self.stack.push(AstNode::constant(Literal::Invalid));
    }

    /// A checkpoint for the "exactly one new node" invariant many reduction
    /// call sites rely on. Pair with [`AstBuilder::assert_grew_by_one`].
    pub fn mark(&self) -> usize {
        self.stack.len()
    }

    pub fn assert_grew_by_one(&self, mark: usize) {
        debug_assert_eq!(self.stack.len(), mark + 1, "builder reduction must push exactly one node");
    }

    pub fn push_field(&mut self, field: FieldRef) {
        self.stack.push(AstNode::field_ref(field));
    }

    pub fn push_constant(&mut self, lit: Literal) {
        self.stack.push(AstNode::constant(lit));
    }

    pub fn push_node(&mut self, node: AstNode) {
        self.stack.push(node);
    }

    pub fn pop_node(&mut self) -> AstNode {
        self.stack.pop().expect("builder stack underflow: internal-invariant violation")
    }

    pub fn peek_type(&self) -> Option<ValueType> {
        self.stack.last().map(|n| n.value_type)
    }

    /// Explicit downward coercion, requested by model compilers when the
    /// catalogue doesn't already demand it (§4.2 `coerce-to-types`).
    pub fn coerce_to_type(&mut self, node: AstNode, target: ValueType) -> AstNode {
        if node.value_type == target {
            return node;
        }
        if node.value_type.coercible_to(target) {
            if let Some(conv) = conversion_function_name(target) {
                if let Some(id) = self.catalogue.id_of(conv) {
                    return AstNode::new(AstKind::FunctionCall { function: id, args: vec![node] }, target);
                }
            }
        }
        node
    }

    pub fn coerce_to_types(&mut self, nodes: Vec<AstNode>, targets: &[ValueType]) -> Vec<AstNode> {
        nodes
            .into_iter()
            .zip(targets.iter())
            .map(|(n, &t)| self.coerce_to_type(n, t))
            .collect()
    }

    /// Build an n-ary function call: pops `arity` operands off the stack,
    /// coerces each against the catalogue entry's declared argument types,
    /// and pushes the resulting call carrying the entry's return type.
    pub fn push_function_call(&mut self, function: FunctionId, arity: usize, line: Option<u32>) {
        let entry = self.catalogue.get(function).clone();
        if self.stack.len() < arity {
            self.parsing_error(format!("internal-invariant: stack underflow building `{}`", entry.name), line);
            return;
        }
        if !entry.arity.accepts(arity) {
            self.sink.error(format!("wrong number of arguments to `{}`", entry.name), None, line);
            self.had_error = true;
        }
        let mut args = self.stack.split_off(self.stack.len() - arity);
        for (i, arg) in args.iter_mut().enumerate() {
            let expected = entry.arg_type(i);
            let taken = std::mem::replace(arg, AstNode::constant(Literal::Invalid));
            *arg = self.coerce_to_type(taken, expected);
        }
        self.stack.push(AstNode::new(AstKind::FunctionCall { function, args }, entry.return_type));
    }

    pub fn push_block(&mut self, n: usize) {
        let stmts = self.stack.split_off(self.stack.len() - n);
        self.stack.push(AstNode::statement(AstKind::Block(stmts)));
    }

    pub fn push_if_chain(&mut self, arms: Vec<IfArm>) {
        self.stack.push(AstNode::statement(AstKind::IfChain(arms)));
    }

    /// `declare`: pops the initialiser and the top of stack becomes a new
    /// local bound to `field`, coerced to the field's declared type.
    pub fn declare(&mut self, field: FieldRef) {
        let value = self.pop_node();
        let target = field.value_type();
        let value = self.coerce_to_type(value, target);
        self.stack.push(AstNode::statement(AstKind::Declaration { field, value: Box::new(value) }));
    }

    pub fn assign(&mut self, field: FieldRef) {
        let value = self.pop_node();
        let target = field.value_type();
        let value = self.coerce_to_type(value, target);
        self.stack.push(AstNode::statement(AstKind::Assignment { field, value: Box::new(value) }));
    }

    /// `assign-indirect`: pops value, key, table (in that order, value on
    /// top) and pushes the table write.
    pub fn assign_indirect(&mut self) {
        let value = self.pop_node();
        let key = self.pop_node();
        let table = self.pop_node();
        self.stack.push(AstNode::statement(AstKind::IndirectAssignment {
            table: Box::new(table),
            key: Box::new(key),
            value: Box::new(value),
        }));
    }

    pub fn push_indirect_field(&mut self, value_type: ValueType) {
        let key = self.pop_node();
        let table = self.pop_node();
        self.stack.push(AstNode::new(
            AstKind::IndirectField { table: Box::new(table), key: Box::new(key) },
            value_type,
        ));
    }

    pub fn push_return(&mut self, n: usize) {
        let values = self.stack.split_off(self.stack.len() - n);
        self.stack.push(AstNode::statement(AstKind::Return(values)));
    }

    pub fn push_lambda(&mut self, params: Vec<FieldRef>) {
        let body = Box::new(self.pop_node());
        self.stack.push(AstNode::new(AstKind::Lambda { params, body }, ValueType::Lambda));
    }

    /// Missing-coalesce: pops `default` then `value`; the resulting node's
    /// type is `value`'s type unless it is `Invalid`, in which case it
    /// widens to `default`'s type.
    pub fn push_default_value(&mut self) {
        let default = self.pop_node();
        let value = self.pop_node();
        let value_type = if value.value_type == ValueType::Invalid { default.value_type } else { value.value_type };
        self.stack.push(AstNode::new(
            AstKind::DefaultValue { value: Box::new(value), default: Box::new(default) },
            value_type,
        ));
    }

    pub fn finish(mut self) -> AstNode {
        assert_eq!(self.stack.len(), 1, "internal-invariant: builder must end with exactly one root node");
        self.stack.pop().unwrap()
    }
}

fn conversion_function_name(target: ValueType) -> Option<&'static str> {
    match target {
        ValueType::String => Some("toString"),
        ValueType::Number => Some("toNumber"),
        ValueType::Bool => Some("toBool"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{DataField, FieldDescription, FieldOrigin};
    use crate::value::OpType;

    struct VecSink(Vec<String>);
    impl ErrorSink for VecSink {
        fn error(&mut self, message: String, _argument: Option<String>, _line: Option<u32>) {
            self.0.push(message);
        }
    }

    #[test]
    fn function_call_coerces_string_argument_to_number() {
        let catalogue = Catalogue::standard();
        let mut sink = VecSink(Vec::new());
        let mut builder = AstBuilder::new(&catalogue, &mut sink);
        builder.push_constant(Literal::String("2".into()));
        builder.push_constant(Literal::Number(3.0));
        let id = catalogue.id_of("+").unwrap();
        builder.push_function_call(id, 2, None);
        let node = builder.finish();
        assert_eq!(node.value_type, ValueType::Number);
        let AstKind::FunctionCall { args, .. } = &node.kind else { panic!("expected call") };
        assert_eq!(args[0].value_type, ValueType::Number);
    }

    #[test]
    fn wrong_arity_reports_error_but_does_not_panic() {
        let catalogue = Catalogue::standard();
        let mut sink = VecSink(Vec::new());
        let mut builder = AstBuilder::new(&catalogue, &mut sink);
        builder.push_constant(Literal::Number(1.0));
        let id = catalogue.id_of("+").unwrap();
        builder.push_function_call(id, 1, Some(7));
        assert!(builder.had_error());
        assert_eq!(sink.0.len(), 1);
    }

    #[test]
    fn parsing_error_pushes_sentinel_so_compilation_continues() {
        let catalogue = Catalogue::standard();
        let mut sink = VecSink(Vec::new());
        let mut builder = AstBuilder::new(&catalogue, &mut sink);
        builder.parsing_error("broken predicate", Some(12));
        let node = builder.finish();
        assert_eq!(node.value_type, ValueType::Invalid);
        assert!(builder.had_error());
    }

    #[test]
    fn declare_assigns_field_type_to_initializer() {
        let catalogue = Catalogue::standard();
        let mut sink = VecSink(Vec::new());
        let mut builder = AstBuilder::new(&catalogue, &mut sink);
        let field = FieldDescription::new(0, DataField::new(ValueType::Number, OpType::Continuous), FieldOrigin::Temporary, "x".into());
        builder.push_constant(Literal::String("4".into()));
        builder.declare(field);
        let node = builder.finish();
        let AstKind::Declaration { value, .. } = &node.kind else { panic!("expected declaration") };
        assert_eq!(value.value_type, ValueType::Number);
    }
}
