//! Expression binders and the predicates that keep operator rules in order.
//!
//! ## Precedence Table (lowest to highest)
//!
//! | Level | Tag | Operators | Associativity |
//! |-------|-----|-----------|---------------|
//! | 1 | `OP3` | `and` `or` `&&` `\|\|` `&` `\|` `^` `<<` `>>` | left |
//! | 2 | `COMP` | `==` `!=` `<` `<=` `>` `>=` | left |
//! | 3 | `OP2` | `+` `-` | left |
//! | 4 | `OP1` | `*` `/` `%` | left |
//! | 5 | `EXPONENTIATION` | `**` | right |
//! | - | prefix | `-` `!` `not` `~` | binds tighter than levels 1-4 |
//! | - | postfix | `.field` `.method(...)` `(...)` | binds tightest |
//!
//! Rules are regexes, so a rule always sees the leftmost structurally valid
//! span first. Delayed reductions (a call whose arguments are not folded yet,
//! a field read waiting for its receiver) can leave a lower precedence
//! operator matchable before a higher one. The binary predicates look at the
//! tokens on both sides of a match and reject it while a neighbouring
//! operator binds tighter.

use super::parser::{BuildContext, Match, Parser};
use crate::ast::{BinaryOp, Node, NodeId, UnaryOp};
use crate::decimal::Decimal;
use crate::error::CompileError;
use crate::lexer::{Tag, literals, tags};

// ============================================================================
// Token classes
// ============================================================================

/// Binding level of a binary operator tag.
pub(crate) fn binary_level(tag: Tag) -> Option<u8> {
    match tag {
        tags::OP3 => Some(1),
        tags::COMP => Some(2),
        tags::OP2 => Some(3),
        tags::OP1 => Some(4),
        tags::EXPONENTIATION => Some(5),
        _ => None,
    }
}

/// Tags that close an operand, so an `OP2` right after them is binary.
fn ends_operand(tag: Tag) -> bool {
    matches!(
        tag,
        tags::EXPRESSION
            | tags::RIGHT_PARENTHESIS
            | tags::RIGHT_BRACKET
            | tags::ID
            | tags::NUM
            | tags::TXT
            | tags::BOOL
            | tags::NULL
            | tags::THIS
            | tags::SUPER
    )
}

/// Tags that can begin an expression that isn't reduced yet.
pub(crate) fn starts_expression(tag: Tag) -> bool {
    matches!(
        tag,
        tags::EXPRESSION
            | tags::ID
            | tags::NUM
            | tags::TXT
            | tags::BOOL
            | tags::NULL
            | tags::THIS
            | tags::SUPER
            | tags::LEFT_PARENTHESIS
            | tags::LEFT_BRACKET
            | tags::CALL_FUNCTION
            | tags::NEW_INSTANCE
            | tags::NOT
            | tags::TILDE
            | tags::OP2
            | tags::NEW
    )
}

/// Returns true if the `-` at `index` is a prefix operator.
///
/// A minus is binary only when it follows an operand on the same line.
pub(crate) fn is_prefix_minus(p: &Parser<'_>, index: usize) -> bool {
    if p.tag_at(index) != Some(tags::OP2) || p.text_at(index) != "-" {
        return false;
    }
    match index.checked_sub(1).and_then(|i| p.tag_at(i)) {
        Some(before) => !ends_operand(before) || p.line_break_before(index),
        None => true,
    }
}

/// Returns true if the token at `index` extends the expression in front of
/// it: a binary operator or a `.` on the same line.
pub(crate) fn continues(p: &Parser<'_>, index: usize) -> bool {
    match p.tag_at(index) {
        Some(tag) => {
            (binary_level(tag).is_some() || tag == tags::DOT) && !p.line_break_before(index)
        }
        None => false,
    }
}

// ============================================================================
// Predicates
// ============================================================================

/// The match isn't the member name of a `.` access.
pub(crate) fn not_after_dot(p: &Parser<'_>, m: &Match) -> bool {
    m.before().and_then(|i| p.tag_at(i)) != Some(tags::DOT)
}

/// A bare identifier is a variable read, not a name in a declaration.
pub(crate) fn is_variable_read(p: &Parser<'_>, m: &Match) -> bool {
    !matches!(
        m.before().and_then(|i| p.tag_at(i)),
        Some(tags::DOT | tags::FUNC | tags::CLASS | tags::EXTENDS | tags::NEW | tags::VAR)
    )
}

/// A field read, unless the field is called or assigned.
pub(crate) fn is_field_read(p: &Parser<'_>, m: &Match) -> bool {
    !matches!(
        p.tag_at(m.after()),
        Some(tags::LEFT_PARENTHESIS | tags::SET)
    )
}

/// Parentheses right after an identifier are a call, not a group.
pub(crate) fn is_group(p: &Parser<'_>, m: &Match) -> bool {
    m.before().and_then(|i| p.tag_at(i)) != Some(tags::ID)
}

/// Braces holding `key: value` pairs only where a value is expected, so an
/// empty block is not taken for an empty map.
pub(crate) fn is_map_literal(p: &Parser<'_>, m: &Match) -> bool {
    let Some(before) = m.before() else {
        return false;
    };
    match p.tag_at(before) {
        Some(tag) => matches!(
            tag,
            tags::VARIABLE_SET
                | tags::PRINT
                | tags::RETURN
                | tags::COMMA
                | tags::LEFT_PARENTHESIS
                | tags::LEFT_BRACKET
                | tags::COLON
                | tags::CALL_FUNCTION
                | tags::NEW_INSTANCE
                | tags::NOT
                | tags::TILDE
        ) || binary_level(tag).is_some(),
        None => false,
    }
}

/// Prefix operators bind tighter than every binary level except `**`, and
/// looser than `.` access.
pub(crate) fn unary_fits(p: &Parser<'_>, m: &Match) -> bool {
    if p.tag_at(m.start) == Some(tags::OP2) && !is_prefix_minus(p, m.start) {
        return false;
    }
    !matches!(
        p.tag_at(m.after()),
        Some(tags::DOT | tags::EXPONENTIATION)
    )
}

fn binary_fits(p: &Parser<'_>, m: &Match, level: u8, right_assoc: bool) -> bool {
    if let Some(before) = m.before() {
        let tag = p.tag_at(before);
        if is_prefix_minus(p, before) || matches!(tag, Some(tags::NOT | tags::TILDE)) {
            if level < 5 {
                return false;
            }
        } else if let Some(other) = tag.and_then(binary_level) {
            if other > level || (other == level && !right_assoc) {
                return false;
            }
        }
    }

    match p.tag_at(m.after()) {
        Some(tags::DOT) => false,
        Some(tag) => match binary_level(tag) {
            Some(other) => other < level || (other == level && !right_assoc),
            None => true,
        },
        None => true,
    }
}

/// `**` is right associative.
pub(crate) fn power_fits(p: &Parser<'_>, m: &Match) -> bool {
    binary_fits(p, m, 5, true)
}

/// `*`, `/` and `%`.
pub(crate) fn multiplicative_fits(p: &Parser<'_>, m: &Match) -> bool {
    binary_fits(p, m, 4, false)
}

/// `+` and `-`.
pub(crate) fn additive_fits(p: &Parser<'_>, m: &Match) -> bool {
    binary_fits(p, m, 3, false)
}

/// Comparisons.
pub(crate) fn comparison_fits(p: &Parser<'_>, m: &Match) -> bool {
    binary_fits(p, m, 2, false)
}

/// Logical, bitwise and shift operators.
pub(crate) fn logical_fits(p: &Parser<'_>, m: &Match) -> bool {
    binary_fits(p, m, 1, false)
}

// ============================================================================
// Binders
// ============================================================================

/// `NUM`, `TXT`, `BOOL`, `NULL`, `THIS` or `SUPER`.
pub(crate) fn literal(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let token = p.token(0)?;
    let node = match token.tag {
        tags::NUM => match token.text.parse::<Decimal>() {
            Ok(value) => Node::Number(value),
            Err(_) => {
                ctx.diagnostics.push(CompileError::UnexpectedToken {
                    text: token.text.clone(),
                    line: token.line,
                });
                return None;
            }
        },
        tags::TXT => Node::Text(literals::unquote(&token.text)),
        tags::BOOL => Node::Boolean(token.text == "true"),
        tags::THIS => Node::This,
        tags::SUPER => Node::Super,
        _ => Node::Null,
    };
    Some(ctx.ast.add(node, token.line))
}

/// `ID`
pub(crate) fn variable(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let node = Node::Variable {
        name: p.text_at(0).to_string(),
        receiver: None,
    };
    Some(ctx.ast.add(node, p.line()))
}

/// `expression DOT ID`
pub(crate) fn field(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let receiver = p.node_at(0)?;
    let node = Node::Variable {
        name: p.text_at(2).to_string(),
        receiver: Some(receiver),
    };
    Some(ctx.ast.add(node, p.line()))
}

/// `ID (` or `expression DOT ID (`. Arguments are filled in by
/// [`arguments`] once they are reduced.
pub(crate) fn call_function(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let node = if p.tag_at(0) == Some(tags::ID) {
        Node::Call {
            name: p.text_at(0).to_string(),
            receiver: None,
            args: Vec::new(),
        }
    } else {
        Node::Call {
            name: p.text_at(2).to_string(),
            receiver: Some(p.node_at(0)?),
            args: Vec::new(),
        }
    };
    Some(ctx.ast.add(node, p.line()))
}

/// `NEW ID (`
pub(crate) fn new_instance(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let node = Node::New {
        class: p.text_at(1).to_string(),
        args: Vec::new(),
    };
    Some(ctx.ast.add(node, p.line()))
}

/// `(call_function | new_instance) expression, ... )`
pub(crate) fn arguments(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let target = p.node_at(0)?;
    let values = p.nodes_tagged(tags::EXPRESSION);
    match ctx.ast.get_mut(target) {
        Node::Call { args, .. } | Node::New { args, .. } => *args = values,
        _ => {}
    }
    Some(target)
}

/// `[ expression, ... ]`
pub(crate) fn list(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let items = p.nodes_tagged(tags::EXPRESSION);
    Some(ctx.ast.add(Node::List(items), p.line()))
}

/// `{ expression: expression, ... }`
pub(crate) fn map(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let entries = p
        .nodes_tagged(tags::EXPRESSION)
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .collect();
    Some(ctx.ast.add(Node::Map(entries), p.line()))
}

/// `( expression )`
pub(crate) fn group(p: &mut Parser<'_>, _ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    p.node_at(1)
}

/// `-`, `!`/`not` or `~` followed by an expression.
pub(crate) fn unary(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let op = match p.tag_at(0)? {
        tags::NOT => UnaryOp::Not,
        tags::TILDE => UnaryOp::BitwiseNot,
        _ => UnaryOp::Negative,
    };
    let operand = p.node_at(1)?;
    Some(ctx.ast.add(Node::Unary { op, operand }, p.line()))
}

/// `expression OP expression` for every binary operator tag.
pub(crate) fn binary(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let text = p.text_at(1);
    let op = match p.tag_at(1)? {
        tags::EXPONENTIATION => BinaryOp::Pow,
        tags::OP1 => BinaryOp::multiplicative(text),
        tags::OP2 => BinaryOp::additive(text),
        tags::COMP => BinaryOp::comparison(text),
        _ => BinaryOp::logical(text),
    };
    let left = p.node_at(0)?;
    let right = p.node_at(2)?;
    Some(ctx.ast.add(Node::Binary { op, left, right }, p.line()))
}
