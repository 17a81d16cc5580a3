//! Parenthesisation rules for the pretty-printer (§4.8, C9).
//!
//! Every expression node's [`Precedence`] comes straight from the
//! catalogue entry that built it; literals, field references, and
//! table reads sit at `Primary`, the tightest-binding class, and never
//! need parentheses around themselves. A child needs parentheses
//! around it when rendering it bare inside its parent would change
//! what the parent's operator applies to.
//!
//! Lua's infix operators associate left except `^` and `..`, which
//! associate right; rather than special-case each one, the right
//! operand of every same-precedence infix pair is parenthesised
//! unconditionally. That is occasionally one pair of parens more than
//! strictly necessary (`a .. (b .. c)` instead of `a .. b .. c`) but
//! never wrong, and it is the only rule that also keeps a doubled
//! unary minus (`neg(neg(x))`) from landing on Lua's `--` comment
//! marker.

use pamplemousse_core::{AstKind, AstNode, Catalogue, Precedence};

pub fn node_precedence(node: &AstNode, catalogue: &Catalogue) -> Precedence {
    match &node.kind {
        AstKind::FieldRef(_) | AstKind::Constant(_) | AstKind::IndirectField { .. } | AstKind::Lambda { .. } => Precedence::Primary,
        AstKind::FunctionCall { function, .. } => catalogue.get(*function).precedence,
        // Rendered as a `pmml_default(...)` call, so it binds like any
        // other primary-precedence call.
        AstKind::DefaultValue { .. } => Precedence::Primary,
        _ => Precedence::Statement,
    }
}

/// Whether `child` needs parentheses when rendered as an operand of a
/// node with `parent` precedence. `is_right` distinguishes the
/// right-hand operand of a binary operator (and a prefix operator's
/// sole operand, for the same reason) from the left, since only the
/// right side needs the stricter `>=` comparison.
pub fn needs_parens(child: Precedence, parent: Precedence, is_right: bool) -> bool {
    if is_right { child >= parent } else { child > parent }
}
