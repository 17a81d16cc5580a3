//! The Lua pretty-printer (§4.8, C9).
//!
//! Walks the optimised tree once, bottom-up through expression
//! rendering and top-down through statement rendering. Never rewrites
//! the tree; every choice it makes (parenthesisation, overflow packing,
//! input/output shape) is driven entirely by what's already encoded in
//! the AST plus the caller's [`EmitOptions`] (§4.8: "the emitter does
//! not rewrite; it never depends on anything not encoded in the AST").

pub mod overflow;
pub mod precedence;
pub mod stringtable;

use pamplemousse_core::{AstKind, AstNode, Catalogue, ConversionContext, FieldRef, Literal, Notation};
use pamplemousse_core::catalogue::Precedence;

use precedence::{needs_parens, node_precedence};
use stringtable::{quote, render_string_table};

/// Whether the emitted function's input features arrive as positional
/// parameters or as a single table keyed by field name (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
    #[default]
    MultiArg,
    Table,
}

/// Whether the emitted function returns its outputs positionally or as
/// a single table keyed by output name (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    MultiArg,
    Table,
}

#[derive(Debug, Clone)]
pub struct EmitOptions {
    /// Case-insensitive identifier and string-literal handling (§6, §9
    /// "set-membership predicates on string tables"). Field identifiers
    /// are already folded by [`ConversionContext`] when this is set;
    /// the emitter additionally lowercases every string literal and
    /// string-table entry so probability-map keys and predicate
    /// literals stay consistent with each other (see `DESIGN.md`).
    pub lowercase: bool,
    pub input_format: InputFormat,
    pub output_format: OutputFormat,
    /// Override for [`overflow::LOCAL_VARIABLE_BUDGET`]; `None` uses the
    /// module default. Exposed for tests that need a tiny budget.
    pub local_variable_budget: Option<usize>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self { lowercase: false, input_format: InputFormat::default(), output_format: OutputFormat::default(), local_variable_budget: None }
    }
}

/// Renders `root` (the whole compiled and optimised program, a single
/// `Block` ending in a `Return`) as a target-script source text
/// defining one top-level function `func` (§6).
pub fn emit(root: &AstNode, ctx: &ConversionContext, catalogue: &Catalogue, options: &EmitOptions) -> String {
    let overflowed = overflow::assign_overflow_slots(root, ctx, options.local_variable_budget);

    let mut out = String::new();
    write_signature(&mut out, ctx, &overflowed, options);

    let mut emitter = Emitter { catalogue, ctx, options, out: &mut out, indent: 1 };
    emitter.write_prologue();
    emitter.write_statement(root);

    out.push_str("end\n");
    out
}

fn write_signature(out: &mut String, ctx: &ConversionContext, overflowed: &[FieldRef], options: &EmitOptions) {
    let mut params = Vec::new();
    if !overflowed.is_empty() {
        params.push("overflow".to_string());
    }
    match options.input_format {
        InputFormat::MultiArg => {
            for (_, field) in ctx.inputs() {
                params.push(field.emitted_name.clone());
            }
        }
        InputFormat::Table => params.push("input".to_string()),
    }
    out.push_str(&format!("function func({})\n", params.join(", ")));
}

/// The no-op precedence: passing this as a node's parent precedence in
/// [`needs_parens`] never adds parentheses, because no precedence class
/// compares greater than [`Precedence::Statement`]. Used wherever Lua's
/// own grouping (call-argument commas, table-index brackets, `if`'s
/// `then` keyword) already disambiguates without help.
const UNGROUPED: Precedence = Precedence::Statement;

struct Emitter<'a> {
    catalogue: &'a Catalogue,
    ctx: &'a ConversionContext,
    options: &'a EmitOptions,
    out: &'a mut String,
    indent: usize,
}

impl Emitter<'_> {
    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn write_prologue(&mut self) {
        if self.options.input_format == InputFormat::Table {
            for (name, field) in self.ctx.inputs() {
                let line = format!("local {} = input[{}]", field.emitted_name, quote(name));
                self.line(line);
            }
        }
    }

    fn field_ref_text(&self, field: &FieldRef) -> String {
        match field.overflow_slot() {
            Some(slot) => format!("overflow[{}]", slot + 1),
            None => field.emitted_name.clone(),
        }
    }

    /// Render `node` as an expression, wrapping it in parentheses if its
    /// own precedence would otherwise be misread in `parent`'s context.
    fn render_expr(&self, node: &AstNode, parent: Precedence, is_right: bool) -> String {
        let text = self.render_bare(node);
        let child = node_precedence(node, self.catalogue);
        if needs_parens(child, parent, is_right) { format!("({text})") } else { text }
    }

    /// Render `node`'s own text, recursing into children with whatever
    /// precedence context each child position demands. Never adds
    /// parentheses around `node` itself — that's `render_expr`'s job, so
    /// callers don't double-wrap.
    fn render_bare(&self, node: &AstNode) -> String {
        match &node.kind {
            AstKind::FieldRef(field) => self.field_ref_text(field),
            AstKind::Constant(lit) => self.render_literal(lit),
            AstKind::FunctionCall { function, args } => self.render_call(*function, args),
            AstKind::IndirectField { table, key } => {
                format!("{}[{}]", self.render_expr(table, Precedence::Primary, false), self.render_expr(key, UNGROUPED, false))
            }
            AstKind::DefaultValue { value, default } => {
                format!("pmml_default({}, {})", self.render_expr(value, UNGROUPED, false), self.render_expr(default, UNGROUPED, false))
            }
            AstKind::Lambda { params, body } => {
                let params: Vec<&str> = params.iter().map(|p| p.emitted_name.as_str()).collect();
                format!("function({}) return {} end", params.join(", "), self.render_expr(body, UNGROUPED, false))
            }
            AstKind::Declaration { .. }
            | AstKind::Assignment { .. }
            | AstKind::IndirectAssignment { .. }
            | AstKind::Block(_)
            | AstKind::IfChain(_)
            | AstKind::Return(_) => {
                unreachable!("internal-invariant: statement-shaped node in expression position")
            }
        }
    }

    fn render_literal(&self, lit: &Literal) -> String {
        match lit {
            Literal::String(s) => quote(&self.maybe_lowercase(s)),
            Literal::Number(n) => format_number(*n),
            Literal::Bool(b) => b.to_string(),
            Literal::Invalid => "nil".to_string(),
            Literal::StringTable(values) => {
                let values: Vec<String> = values.iter().map(|v| self.maybe_lowercase(v)).collect();
                render_string_table(&values)
            }
        }
    }

    fn maybe_lowercase(&self, s: &str) -> String {
        if self.options.lowercase { s.to_ascii_lowercase() } else { s.to_string() }
    }

    fn render_call(&self, function: pamplemousse_core::FunctionId, args: &[AstNode]) -> String {
        let entry = self.catalogue.get(function);
        match entry.notation {
            Notation::Call(name) => {
                if args.is_empty() {
                    name.to_string()
                } else {
                    let rendered: Vec<String> = args.iter().map(|a| self.render_expr(a, UNGROUPED, false)).collect();
                    format!("{name}({})", rendered.join(", "))
                }
            }
            Notation::Prefix(op) => {
                let operand = self.render_expr(&args[0], entry.precedence, true);
                format!("{op}{operand}")
            }
            Notation::Infix(op) => {
                let mut parts = args.iter().enumerate().map(|(i, a)| self.render_expr(a, entry.precedence, i > 0));
                let first = parts.next().unwrap_or_default();
                parts.fold(first, |acc, part| format!("{acc} {op} {part}"))
            }
        }
    }

    fn write_statement(&mut self, node: &AstNode) {
        match &node.kind {
            AstKind::Declaration { field, value } => {
                let rendered = self.render_expr(value, UNGROUPED, false);
                let line = match field.overflow_slot() {
                    Some(slot) => format!("overflow[{}] = {rendered}", slot + 1),
                    None => format!("local {} = {rendered}", field.emitted_name),
                };
                self.line(line);
            }
            AstKind::Assignment { field, value } => {
                let rendered = self.render_expr(value, UNGROUPED, false);
                let line = format!("{} = {rendered}", self.field_ref_text(field));
                self.line(line);
            }
            AstKind::IndirectAssignment { table, key, value } => {
                let table = self.render_expr(table, Precedence::Primary, false);
                let key = self.render_expr(key, UNGROUPED, false);
                let value = self.render_expr(value, UNGROUPED, false);
                self.line(format!("{table}[{key}] = {value}"));
            }
            AstKind::Block(stmts) => {
                for stmt in stmts {
                    self.write_statement(stmt);
                }
            }
            AstKind::IfChain(arms) => self.write_if_chain(arms),
            AstKind::Return(values) => self.write_return(values),
            AstKind::FieldRef(_)
            | AstKind::Constant(_)
            | AstKind::FunctionCall { .. }
            | AstKind::IndirectField { .. }
            | AstKind::DefaultValue { .. }
            | AstKind::Lambda { .. } => {
                unreachable!("internal-invariant: expression-shaped node in statement position")
            }
        }
    }

    fn write_if_chain(&mut self, arms: &[pamplemousse_core::IfArm]) {
        for (i, arm) in arms.iter().enumerate() {
            match &arm.condition {
                Some(cond) => {
                    let keyword = if i == 0 { "if" } else { "elseif" };
                    let cond = self.render_expr(cond, UNGROUPED, false);
                    self.line(format!("{keyword} {cond} then"));
                }
                None => self.line("else"),
            }
            self.indent += 1;
            self.write_statement(&arm.body);
            self.indent -= 1;
        }
        self.line("end");
    }

    fn write_return(&mut self, values: &[AstNode]) {
        match self.options.output_format {
            OutputFormat::MultiArg => {
                let rendered: Vec<String> = values.iter().map(|v| self.render_expr(v, UNGROUPED, false)).collect();
                self.line(format!("return {}", rendered.join(", ")));
            }
            OutputFormat::Table => {
                let names: Vec<&str> = self.ctx.outputs().map(|(name, _)| name).collect();
                let pairs: Vec<String> = values
                    .iter()
                    .zip(names.iter())
                    .map(|(v, name)| format!("[{}] = {}", quote(name), self.render_expr(v, UNGROUPED, false)))
                    .collect();
                self.line(format!("return {{{}}}", pairs.join(", ")));
            }
        }
    }
}

/// Lua has one numeric type at the source-literal level; whole values
/// render without a decimal point so the emitted source reads the way a
/// human author would write it, not the way `f64`'s `Display` would.
fn format_number(n: f64) -> String {
    if n.is_finite() && n == n.trunc() && n.abs() < 1e15 { format!("{}", n as i64) } else { format!("{n}") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use pamplemousse_core::{AstBuilder, DataField, IfArm, OpType, ValueType};

    fn number_field(ctx: &mut ConversionContext, name: &str) -> FieldRef {
        ctx.declare_input(name, DataField::new(ValueType::Number, OpType::Continuous)).unwrap()
    }

    #[test]
    fn emits_a_top_level_func_with_multi_arg_params() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let age = number_field(&mut ctx, "age");
        let out = ctx.declare_output("result", DataField::new(ValueType::Number, OpType::Continuous)).unwrap();

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        builder.push_field(age);
        builder.assign(out.clone());
        let assign = builder.pop_node();
        builder.push_field(out);
        builder.push_return(1);
        let ret = builder.pop_node();
        builder.push_node(assign);
        builder.push_node(ret);
        builder.push_block(2);
        let root = builder.finish();

        let source = emit(&root, &ctx, &catalogue, &EmitOptions::default());
        assert!(source.starts_with("function func(age)\n"));
        assert!(source.contains("result = age"));
        assert!(source.contains("return result"));
        assert!(source.ends_with("end\n"));
    }

    #[test]
    fn table_output_format_uses_declared_names_as_keys() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let out = ctx.declare_output("Final Score", DataField::new(ValueType::Number, OpType::Continuous)).unwrap();

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        builder.push_field(out);
        builder.push_return(1);
        let root = builder.finish();

        let options = EmitOptions { output_format: OutputFormat::Table, ..EmitOptions::default() };
        let source = emit(&root, &ctx, &catalogue, &options);
        assert!(source.contains(r#"return {["Final Score"] = "#));
    }

    #[test]
    fn table_input_format_destructures_from_a_single_parameter() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let age = number_field(&mut ctx, "age");

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        builder.push_field(age);
        builder.push_return(1);
        let root = builder.finish();

        let options = EmitOptions { input_format: InputFormat::Table, ..EmitOptions::default() };
        let source = emit(&root, &ctx, &catalogue, &options);
        assert!(source.starts_with("function func(input)\n"));
        assert!(source.contains(r#"local age = input["age"]"#));
    }

    #[test]
    fn additive_right_operand_of_subtraction_is_parenthesised() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let a = number_field(&mut ctx, "a");
        let b = number_field(&mut ctx, "b");
        let c = number_field(&mut ctx, "c");

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        builder.push_field(b);
        builder.push_field(c);
        builder.push_function_call(catalogue.id_of("+").unwrap(), 2, None);
        let rhs = builder.pop_node();
        builder.push_field(a);
        builder.push_node(rhs);
        builder.push_function_call(catalogue.id_of("-").unwrap(), 2, None);
        let node = builder.finish();

        let emitter = Emitter { catalogue: &catalogue, ctx: &ctx, options: &EmitOptions::default(), out: &mut String::new(), indent: 0 };
        assert_eq!(emitter.render_expr(&node, UNGROUPED, false), "a - (b + c)");
    }

    #[test]
    fn overflowed_field_renders_as_a_table_index() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let tmp = ctx.fresh_temporary(ValueType::Number, "tmp");
        tmp.set_overflow_slot(2);

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        builder.push_field(tmp);
        let node = builder.finish();

        let emitter = Emitter { catalogue: &catalogue, ctx: &ctx, options: &EmitOptions::default(), out: &mut String::new(), indent: 0 };
        assert_eq!(emitter.render_bare(&node), "overflow[3]");
    }

    #[test]
    fn empty_if_arm_body_renders_without_panicking() {
        let catalogue = Catalogue::standard();
        let mut ctx = ConversionContext::new(false);
        let a = number_field(&mut ctx, "a");

        let mut diag = Diagnostics::new();
        let mut builder = AstBuilder::new(&catalogue, &mut diag);
        builder.push_field(a.clone());
        builder.push_constant(Literal::Number(0.0));
        builder.push_function_call(catalogue.id_of(">").unwrap(), 2, None);
        let cond = builder.pop_node();
        builder.push_block(0);
        let empty_body = builder.pop_node();
        builder.push_if_chain(vec![IfArm { condition: Some(Box::new(cond)), body: Box::new(empty_body) }]);
        let root = builder.finish();

        let source = emit(&root, &ctx, &catalogue, &EmitOptions::default());
        assert!(source.contains("if a > 0 then\n    end\n") || source.contains("if a > 0 then\nend\n"));
    }
}
