//! Abstract Syntax Tree (AST) definitions.
//!
//! Nodes live in an [`Ast`] arena and refer to each other by [`NodeId`].
//! Passes keep what they learn about a node (slot ids, optimizer tags) in
//! their own side tables keyed by `NodeId`, so the node types stay plain
//! data.
//!
//! Every node exposes its children through two lists:
//!
//! - [`Node::values`]: expression children, in evaluation order
//! - [`Node::code_blocks`]: statement children (sequences, bodies, branches)
//!
//! [`visit::walk`] uses only those two lists, so tree passes need no
//! per-variant traversal code.

pub mod visit;

use std::fmt;
use std::ops::Index;

use crate::decimal::Decimal;

pub use visit::{Visitor, walk};

/// A reference to a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
}

impl NodeId {
    /// Creates a new node reference.
    ///
    /// # Panics
    ///
    /// Panics if `index` does not fit in a `u32`. An arena never holds that
    /// many nodes.
    pub fn new(index: usize) -> Self {
        Self {
            index: u32::try_from(index).expect("node index exceeds u32::MAX"),
        }
    }

    /// Returns the index of this reference.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `**`
    Pow,
    /// `==`
    Equals,
    /// `!=`
    NotEquals,
    /// `>`
    Greater,
    /// `>=`
    GreaterEquals,
    /// `<`
    Less,
    /// `<=`
    LessEquals,
    /// `and` / `&&`
    And,
    /// `or` / `||`
    Or,
    /// `&`
    BitwiseAnd,
    /// `|`
    BitwiseOr,
    /// `^`
    Xor,
    /// `<<`
    LeftShift,
    /// `>>`
    RightShift,
}

impl BinaryOp {
    /// Maps an `OP1` token's text.
    pub fn multiplicative(text: &str) -> Self {
        match text {
            "*" => Self::Mul,
            "%" => Self::Mod,
            _ => Self::Div,
        }
    }

    /// Maps an `OP2` token's text.
    pub fn additive(text: &str) -> Self {
        match text {
            "+" => Self::Add,
            _ => Self::Sub,
        }
    }

    /// Maps a `COMP` token's text.
    pub fn comparison(text: &str) -> Self {
        match text {
            "==" => Self::Equals,
            "!=" => Self::NotEquals,
            ">" => Self::Greater,
            "<" => Self::Less,
            "<=" => Self::LessEquals,
            _ => Self::GreaterEquals,
        }
    }

    /// Maps an `OP3` token's text.
    pub fn logical(text: &str) -> Self {
        match text {
            ">>" => Self::RightShift,
            "<<" => Self::LeftShift,
            "^" => Self::Xor,
            "&" => Self::BitwiseAnd,
            "and" | "&&" => Self::And,
            "or" | "||" => Self::Or,
            _ => Self::BitwiseOr,
        }
    }

    /// Source spelling.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::Greater => ">",
            Self::GreaterEquals => ">=",
            Self::Less => "<",
            Self::LessEquals => "<=",
            Self::And => "and",
            Self::Or => "or",
            Self::BitwiseAnd => "&",
            Self::BitwiseOr => "|",
            Self::Xor => "^",
            Self::LeftShift => "<<",
            Self::RightShift => ">>",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Negative,
    /// `!x` / `not x`
    Not,
    /// `~x`
    BitwiseNot,
}

/// The else branch of an `if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Else {
    /// `else if`: another `If` node
    ElseIf(NodeId),
    /// Terminal `else`: a `Blocks` body
    Else(NodeId),
}

impl Else {
    /// The node the branch points at.
    pub fn node(&self) -> NodeId {
        match self {
            Else::ElseIf(id) | Else::Else(id) => *id,
        }
    }
}

/// A node in the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // Values
    /// Number literal
    Number(Decimal),
    /// String literal, quotes stripped
    Text(String),
    /// `true` / `false`
    Boolean(bool),
    /// `null`
    Null,
    /// `[a, b, ...]`
    List(Vec<NodeId>),
    /// `{k: v, ...}`
    Map(Vec<(NodeId, NodeId)>),
    /// Variable read, or field read when a receiver is present
    Variable {
        /// Variable or field name
        name: String,
        /// Object the field is read from
        receiver: Option<NodeId>,
    },
    /// Binary operator
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: NodeId,
        /// Right operand
        right: NodeId,
    },
    /// Unary operator
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: NodeId,
    },
    /// Function call, or method call when a receiver is present
    Call {
        /// Function or method name
        name: String,
        /// Object the method is called on
        receiver: Option<NodeId>,
        /// Arguments in source order
        args: Vec<NodeId>,
    },
    /// `new Class(args)`
    New {
        /// Class name
        class: String,
        /// Constructor arguments
        args: Vec<NodeId>,
    },
    /// `this`
    This,
    /// `super`
    Super,

    // Statements
    /// Assignment or declaration
    SetVariable {
        /// Variable or field name
        name: String,
        /// Assigned value; `None` for `var x` without initializer
        value: Option<NodeId>,
        /// Written with `var`
        declaration: bool,
        /// Object whose field is assigned
        receiver: Option<NodeId>,
    },
    /// `print value`
    Print(NodeId),
    /// `if` with an optional else branch
    If {
        /// Condition
        condition: NodeId,
        /// `Blocks` run when the condition holds
        then_block: NodeId,
        /// Else branch
        otherwise: Option<Else>,
    },
    /// `while` loop
    While {
        /// Condition
        condition: NodeId,
        /// `Blocks` body
        body: NodeId,
    },
    /// Function declaration
    Function {
        /// Function name
        name: String,
        /// Parameter names
        params: Vec<String>,
        /// `Blocks` body
        body: NodeId,
    },
    /// Class declaration
    Class {
        /// Class name
        name: String,
        /// Parent class name
        parent: Option<String>,
        /// `Blocks` of field declarations and methods
        members: NodeId,
    },
    /// `return` with an optional value
    Return(Option<NodeId>),
    /// `continue`
    Continue,
    /// `break`
    Break,
    /// Statement sequence
    Blocks(Vec<NodeId>),
    /// Releases a local slot when its scope ends
    Free {
        /// Name of the released variable
        name: String,
        /// Released slot id
        slot: u32,
    },
}

impl Node {
    /// Returns true for nodes that leave a value on the stack.
    pub fn is_value(&self) -> bool {
        matches!(
            self,
            Node::Number(_)
                | Node::Text(_)
                | Node::Boolean(_)
                | Node::Null
                | Node::List(_)
                | Node::Map(_)
                | Node::Variable { .. }
                | Node::Binary { .. }
                | Node::Unary { .. }
                | Node::Call { .. }
                | Node::New { .. }
                | Node::This
                | Node::Super
        )
    }

    /// Expression children in evaluation order.
    pub fn values(&self) -> Vec<NodeId> {
        match self {
            Node::List(items) => items.clone(),
            Node::Map(entries) => entries.iter().flat_map(|(k, v)| [*k, *v]).collect(),
            Node::Variable { receiver, .. } => receiver.iter().copied().collect(),
            Node::Binary { left, right, .. } => vec![*left, *right],
            Node::Unary { operand, .. } => vec![*operand],
            Node::Call { receiver, args, .. } => {
                args.iter().copied().chain(receiver.iter().copied()).collect()
            }
            Node::New { args, .. } => args.clone(),
            Node::SetVariable {
                value, receiver, ..
            } => receiver.iter().chain(value.iter()).copied().collect(),
            Node::Print(value) => vec![*value],
            Node::If { condition, .. } | Node::While { condition, .. } => vec![*condition],
            Node::Return(value) => value.iter().copied().collect(),
            Node::Number(_)
            | Node::Text(_)
            | Node::Boolean(_)
            | Node::Null
            | Node::This
            | Node::Super
            | Node::Function { .. }
            | Node::Class { .. }
            | Node::Continue
            | Node::Break
            | Node::Blocks(_)
            | Node::Free { .. } => Vec::new(),
        }
    }

    /// Statement children: sequence members, bodies and branches.
    pub fn code_blocks(&self) -> Vec<NodeId> {
        match self {
            Node::Blocks(children) => children.clone(),
            Node::If {
                then_block,
                otherwise,
                ..
            } => std::iter::once(*then_block)
                .chain(otherwise.map(|branch| branch.node()))
                .collect(),
            Node::While { body, .. } | Node::Function { body, .. } => vec![*body],
            Node::Class { members, .. } => vec![*members],
            _ => Vec::new(),
        }
    }

    /// Short name of the variant, for logs and test failures.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Number(_) => "Number",
            Node::Text(_) => "Text",
            Node::Boolean(_) => "Boolean",
            Node::Null => "Null",
            Node::List(_) => "List",
            Node::Map(_) => "Map",
            Node::Variable { .. } => "Variable",
            Node::Binary { .. } => "Binary",
            Node::Unary { .. } => "Unary",
            Node::Call { .. } => "Call",
            Node::New { .. } => "New",
            Node::This => "This",
            Node::Super => "Super",
            Node::SetVariable { .. } => "SetVariable",
            Node::Print(_) => "Print",
            Node::If { .. } => "If",
            Node::While { .. } => "While",
            Node::Function { .. } => "Function",
            Node::Class { .. } => "Class",
            Node::Return(_) => "Return",
            Node::Continue => "Continue",
            Node::Break => "Break",
            Node::Blocks(_) => "Blocks",
            Node::Free { .. } => "Free",
        }
    }
}

/// Arena owning every node of one compilation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ast {
    nodes: Vec<Node>,
    lines: Vec<usize>,
}

impl Ast {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node created from source `line`.
    pub fn add(&mut self, node: Node, line: usize) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(node);
        self.lines.push(line);
        id
    }

    /// Returns the node.
    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Returns the node mutably.
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Source line the node was built from.
    pub fn line(&self, id: NodeId) -> usize {
        self.lines[id.index()]
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Wraps `id` in a `Blocks` unless it already is one.
    pub fn as_blocks(&mut self, id: NodeId) -> NodeId {
        if matches!(self.get(id), Node::Blocks(_)) {
            id
        } else {
            let line = self.line(id);
            self.add(Node::Blocks(vec![id]), line)
        }
    }

    /// Appends a statement to a `Blocks` node. Other nodes are left alone.
    pub fn push_statement(&mut self, blocks: NodeId, statement: NodeId) {
        if let Node::Blocks(children) = self.get_mut(blocks) {
            children.push(statement);
        }
    }
}

impl Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        self.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_add_and_get() {
        let mut ast = Ast::new();
        let one = ast.add(Node::Number(Decimal::from_integer(1)), 1);
        let two = ast.add(Node::Number(Decimal::from_integer(2)), 2);
        let sum = ast.add(
            Node::Binary {
                op: BinaryOp::Add,
                left: one,
                right: two,
            },
            2,
        );
        assert_eq!(ast.len(), 3);
        assert_eq!(ast[sum].values(), vec![one, two]);
        assert_eq!(ast.line(two), 2);
        assert!(ast[sum].is_value());
    }

    #[test]
    fn test_as_blocks_wraps_once() {
        let mut ast = Ast::new();
        let stmt = ast.add(Node::Break, 1);
        let blocks = ast.as_blocks(stmt);
        assert_ne!(blocks, stmt);
        assert_eq!(ast.as_blocks(blocks), blocks);
        assert_eq!(ast[blocks].code_blocks(), vec![stmt]);
    }

    #[test]
    fn test_if_children() {
        let mut ast = Ast::new();
        let cond = ast.add(Node::Boolean(true), 1);
        let then_block = ast.add(Node::Blocks(vec![]), 1);
        let else_block = ast.add(Node::Blocks(vec![]), 1);
        let node = Node::If {
            condition: cond,
            then_block,
            otherwise: Some(Else::Else(else_block)),
        };
        assert_eq!(node.values(), vec![cond]);
        assert_eq!(node.code_blocks(), vec![then_block, else_block]);
        assert!(!node.is_value());
    }

    #[test]
    fn test_operator_text_mapping() {
        assert_eq!(BinaryOp::multiplicative("%"), BinaryOp::Mod);
        assert_eq!(BinaryOp::additive("-"), BinaryOp::Sub);
        assert_eq!(BinaryOp::comparison(">="), BinaryOp::GreaterEquals);
        assert_eq!(BinaryOp::logical("&&"), BinaryOp::And);
        assert_eq!(BinaryOp::logical("|"), BinaryOp::BitwiseOr);
    }
}
