//! Generic tree walking.

use super::{Ast, NodeId};

/// A pass over the tree.
///
/// `enter` runs before a node's children, `leave` after. Both receive the
/// parent so passes don't need their own parent table. The walk snapshots a
/// node's child lists before descending, so statements a pass appends to a
/// sequence in `leave` are not visited.
pub trait Visitor {
    /// Called before the node's children are walked.
    fn enter(&mut self, ast: &mut Ast, node: NodeId, parent: Option<NodeId>) {
        let _ = (ast, node, parent);
    }

    /// Called after the node's children are walked.
    fn leave(&mut self, ast: &mut Ast, node: NodeId, parent: Option<NodeId>) {
        let _ = (ast, node, parent);
    }
}

/// Walks the subtree rooted at `root`.
///
/// Expression children are walked before statement children, so an `if`
/// or `while` condition is seen before the body it guards.
pub fn walk<V: Visitor + ?Sized>(ast: &mut Ast, root: NodeId, visitor: &mut V) {
    walk_node(ast, root, None, visitor);
}

fn walk_node<V: Visitor + ?Sized>(
    ast: &mut Ast,
    node: NodeId,
    parent: Option<NodeId>,
    visitor: &mut V,
) {
    visitor.enter(ast, node, parent);

    let values = ast[node].values();
    for child in values {
        walk_node(ast, child, Some(node), visitor);
    }

    let blocks = ast[node].code_blocks();
    for child in blocks {
        walk_node(ast, child, Some(node), visitor);
    }

    visitor.leave(ast, node, parent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Node};
    use crate::decimal::Decimal;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl Visitor for Recorder {
        fn enter(&mut self, ast: &mut Ast, node: NodeId, _parent: Option<NodeId>) {
            self.events.push(format!("enter {}", ast[node].kind()));
        }

        fn leave(&mut self, ast: &mut Ast, node: NodeId, parent: Option<NodeId>) {
            self.events.push(format!("leave {}", ast[node].kind()));
            if matches!(ast[node], Node::Print(_)) {
                if let Some(parent) = parent {
                    let extra = ast.add(Node::Break, 1);
                    ast.push_statement(parent, extra);
                }
            }
        }
    }

    #[test]
    fn test_walk_order() {
        let mut ast = Ast::new();
        let one = ast.add(Node::Number(Decimal::from_integer(1)), 1);
        let two = ast.add(Node::Number(Decimal::from_integer(2)), 1);
        let sum = ast.add(
            Node::Binary {
                op: BinaryOp::Add,
                left: one,
                right: two,
            },
            1,
        );
        let print = ast.add(Node::Print(sum), 1);
        let root = ast.add(Node::Blocks(vec![print]), 1);

        let mut recorder = Recorder::default();
        walk(&mut ast, root, &mut recorder);

        assert_eq!(
            recorder.events,
            vec![
                "enter Blocks",
                "enter Print",
                "enter Binary",
                "enter Number",
                "leave Number",
                "enter Number",
                "leave Number",
                "leave Binary",
                "leave Print",
                "leave Blocks",
            ]
        );
        // The appended statement exists but was not visited.
        assert_eq!(ast[root].code_blocks().len(), 2);
    }
}
