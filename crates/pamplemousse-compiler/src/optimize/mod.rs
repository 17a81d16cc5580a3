//! Whole-tree rewrite driven by the analyser (§4.7, C8).
//!
//! A fixed-point loop over six passes. Each pass reports whether it
//! changed anything; the loop repeats until none do, or until
//! [`MAX_ITERATIONS`] is hit as a backstop against a pass that
//! oscillates instead of converging.

mod fold;
mod fuse;
mod inline;

use pamplemousse_core::{AstNode, Catalogue};

const MAX_ITERATIONS: usize = 32;

/// Run every pass to a fixed point. Must preserve observable semantics:
/// every field written to an output mapping ends up holding the same
/// value for every input as the unoptimised tree would have produced
/// (§4.7, §8 property 4).
pub fn optimize(root: &mut AstNode, catalogue: &Catalogue) {
    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        changed |= fold::fold_constants(root, catalogue);
        changed |= fold::eliminate_short_circuits(root, catalogue);
        changed |= inline::remove_dead_declarations(root);
        changed |= inline::inline_single_use_locals(root);
        changed |= fuse::fuse_default_values(root, catalogue);
        changed |= fuse::flatten_blocks(root);
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pamplemousse_core::{AstKind, Literal};

    #[test]
    fn runs_to_a_fixed_point_without_panicking_on_a_leaf() {
        let catalogue = Catalogue::standard();
        let mut node = AstNode::constant(Literal::Number(1.0));
        optimize(&mut node, &catalogue);
        assert!(matches!(node.kind, AstKind::Constant(Literal::Number(_))));
    }
}
