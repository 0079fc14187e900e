//! In-place assignment rewriting.
//!
//! `x = x + e` becomes a single `INPLACE_ADD x` after `e` is pushed. The
//! pass doesn't change the tree; it records which `Binary` nodes the
//! generator should emit in place and where their result goes.

use rustc_hash::FxHashMap;

use crate::ast::{Ast, Node, NodeId, Visitor, walk};
use crate::compiler::bytecode::OpCode;
use crate::compiler::scope::{Binding, Bindings};

/// `Binary` nodes emitted as in-place operations, with their target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InPlace(FxHashMap<NodeId, Binding>);

impl InPlace {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target of an in-place `Binary` node.
    pub fn target(&self, binary: NodeId) -> Option<Binding> {
        self.0.get(&binary).copied()
    }

    /// Returns true if `binary` is emitted in place.
    pub fn contains(&self, binary: NodeId) -> bool {
        self.0.contains_key(&binary)
    }

    /// Number of rewritten assignments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing was rewritten.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Finds assignments that can be emitted in place.
pub struct Optimizer<'b> {
    bindings: &'b Bindings,
    in_place: InPlace,
}

impl<'b> Optimizer<'b> {
    /// Creates an optimizer over resolved `bindings`.
    pub fn new(bindings: &'b Bindings) -> Self {
        Self {
            bindings,
            in_place: InPlace::new(),
        }
    }

    /// Runs the pass over the tree under `root`.
    pub fn optimize(mut self, ast: &mut Ast, root: NodeId) -> InPlace {
        walk(ast, root, &mut self);
        tracing::debug!(rewritten = self.in_place.len(), "optimized assignments");
        self.in_place
    }

    fn candidate(&self, ast: &Ast, node: NodeId) -> Option<(NodeId, Binding)> {
        let Node::SetVariable {
            name,
            value: Some(value),
            declaration: false,
            receiver: None,
        } = &ast[node]
        else {
            return None;
        };
        let target = self.bindings.get(node)?;
        let Node::Binary { op, left, .. } = &ast[*value] else {
            return None;
        };
        OpCode::in_place(*op)?;

        match &ast[*left] {
            Node::Variable {
                name: read,
                receiver: None,
            } if read == name && self.bindings.get(*left) == Some(target) => {
                Some((*value, target))
            }
            _ => None,
        }
    }
}

impl Visitor for Optimizer<'_> {
    fn leave(&mut self, ast: &mut Ast, node: NodeId, _parent: Option<NodeId>) {
        if let Some((binary, target)) = self.candidate(ast, node) {
            tracing::trace!(?binary, ?target, "in-place assignment");
            self.in_place.0.insert(binary, target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::scope::Resolver;
    use crate::diagnostics::Diagnostics;
    use crate::lexer::Lexer;
    use crate::parser::Grammar;

    fn optimize(src: &str) -> (Ast, InPlace) {
        let tokens = Lexer::default().tokenize(src).unwrap();
        let mut ast = Ast::new();
        let mut diagnostics = Diagnostics::new();
        let root = Grammar::default().parse(tokens, &mut ast, &mut diagnostics);
        let bindings = Resolver::new(&mut diagnostics).resolve(&mut ast, root);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics.into_vec());
        let in_place = Optimizer::new(&bindings).optimize(&mut ast, root);
        (ast, in_place)
    }

    #[test]
    fn test_self_update_is_rewritten() {
        let (ast, in_place) = optimize("var x = 1\nx = x + 2");
        assert_eq!(in_place.len(), 1);
        let binary = (0..ast.len())
            .map(NodeId::new)
            .find(|&id| in_place.contains(id))
            .unwrap();
        assert!(matches!(ast[binary], Node::Binary { .. }));
        assert_eq!(in_place.target(binary), Some(Binding::Global));
    }

    #[test]
    fn test_other_operand_order_is_kept() {
        let (_, in_place) = optimize("var x = 1\nx = 2 + x");
        assert!(in_place.is_empty());
    }

    #[test]
    fn test_declaration_is_kept() {
        let (_, in_place) = optimize("var x = 1\nvar x = x + 1");
        assert!(in_place.is_empty());
    }

    #[test]
    fn test_comparison_has_no_in_place_form() {
        let (_, in_place) = optimize("var x = 1\nx = x < 2");
        assert!(in_place.is_empty());
    }

    #[test]
    fn test_local_and_param_targets() {
        let (_, in_place) = optimize("func f(n) {\n  var i = 0\n  i = i * 2\n  n = n - 1\n}");
        let mut targets: Vec<_> = in_place.0.values().copied().collect();
        targets.sort_by_key(|b| b.slot_id());
        assert_eq!(targets, vec![Binding::Param(1), Binding::Local(0)]);
    }

    #[test]
    fn test_field_update_is_kept() {
        let (_, in_place) = optimize("var o = {}\no.x = o.x + 1");
        assert!(in_place.is_empty());
    }
}
