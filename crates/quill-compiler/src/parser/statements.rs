//! Statement binders.
//!
//! ## Statement Forms
//!
//! | Statement | Tag pattern | Binder |
//! |-----------|-------------|--------|
//! | Declaration | `VAR ID` | [`declaration`] |
//! | Assignment | `variable_set expression` | [`assignment`] |
//! | Print | `PRINT expression` | [`print`] |
//! | If | `IF expression { program? }` | [`if_statement`] |
//! | Else if | `program ELSEIF expression { program? }` | [`else_if`] |
//! | Else | `program ELSE { program? }` | [`else_statement`] |
//! | While | `WHILE expression { program? }` | [`while_statement`] |
//! | Function | `declare_function program? }` | [`close_declaration`] |
//! | Class | `declare_class program? }` | [`close_declaration`] |
//! | Return | `RETURN expression?` | [`return_statement`] |
//! | Continue / Break | `CONTINUE` / `BREAK` | [`jump`] |
//! | Sequence | `program (NEWLINE\|SEMICOLON)+ program ...` | [`programs`] |
//! | Expression | `expression` | [`statement`] |
//!
//! Bodies are always stored as `Blocks`, an empty body as an empty one.

use super::expressions::{continues, starts_expression};
use super::parser::{BuildContext, Match, Parser};
use crate::ast::{Else, Node, NodeId};
use crate::error::CompileError;
use crate::lexer::tags;

// ============================================================================
// Predicates
// ============================================================================

/// Nothing after the match extends its last expression.
pub(crate) fn ends_statement(p: &Parser<'_>, m: &Match) -> bool {
    !continues(p, m.after())
}

/// `return value` needs a finished value; a bare `return` must not be
/// followed by the start of one on the same line.
pub(crate) fn return_fits(p: &Parser<'_>, m: &Match) -> bool {
    let after = m.after();
    if m.len > 1 {
        return !continues(p, after);
    }
    match p.tag_at(after) {
        Some(tag) => p.line_break_before(after) || !starts_expression(tag),
        None => true,
    }
}

/// Statements are not joined while an `else` still has to attach to the
/// last of them.
pub(crate) fn sequence_fits(p: &Parser<'_>, m: &Match) -> bool {
    !matches!(p.tag_at(m.after()), Some(tags::ELSE | tags::ELSEIF))
}

/// A trailing `;` at the end of the input or of a block.
pub(crate) fn trailing_separator(p: &Parser<'_>, m: &Match) -> bool {
    matches!(p.tag_at(m.after()), None | Some(tags::RIGHT_BRACE))
}

/// An expression standing where a statement may start.
pub(crate) fn is_statement(p: &Parser<'_>, m: &Match) -> bool {
    let before = m.before().and_then(|i| p.tag_at(i));
    let starts = matches!(
        before,
        None | Some(
            tags::LEFT_BRACE
                | tags::SEMICOLON
                | tags::RIGHT_BRACE
                | tags::PROGRAM
                | tags::DECLARE_FUNCTION
                | tags::DECLARE_CLASS
        )
    );
    let after = m.after();
    let ends = !matches!(
        p.tag_at(after),
        Some(
            tags::COLON
                | tags::COMMA
                | tags::RIGHT_PARENTHESIS
                | tags::RIGHT_BRACKET
                | tags::LEFT_BRACE
        )
    );
    starts && ends && !continues(p, after)
}

// ============================================================================
// Helpers
// ============================================================================

/// The body at `index` as a `Blocks`, or a new empty one when the braces
/// were empty.
fn body(p: &Parser<'_>, ctx: &mut BuildContext<'_>, index: usize) -> NodeId {
    match (p.tag_at(index), p.node_at(index)) {
        (Some(tags::PROGRAM), Some(node)) => ctx.ast.as_blocks(node),
        _ => ctx.ast.add(Node::Blocks(Vec::new()), p.line()),
    }
}

/// Finds the last `If` of the chain headed by the program at index 0.
///
/// The keyword at index 1 is reported when there is no chain to attach to,
/// or when the chain already ends in a terminal `else`.
fn chain_tail(p: &Parser<'_>, ctx: &BuildContext<'_>) -> Result<NodeId, CompileError> {
    let line = p.token(1).map_or_else(|| p.line(), |t| t.line);
    let else_if = p.tag_at(1) == Some(tags::ELSEIF);

    let Some(mut tail) = p.node_at(0) else {
        return Err(CompileError::DanglingElse { line });
    };
    if !matches!(ctx.ast[tail], Node::If { .. }) {
        return Err(CompileError::DanglingElse { line });
    }

    loop {
        match &ctx.ast[tail] {
            Node::If {
                otherwise: Some(Else::ElseIf(next)),
                ..
            } => tail = *next,
            Node::If {
                otherwise: Some(Else::Else(_)),
                ..
            } => {
                return Err(if else_if {
                    CompileError::ElseIfAfterElse { line }
                } else {
                    CompileError::DanglingElse { line }
                });
            }
            _ => return Ok(tail),
        }
    }
}

fn attach(ctx: &mut BuildContext<'_>, tail: NodeId, branch: Else) {
    if let Node::If { otherwise, .. } = ctx.ast.get_mut(tail) {
        *otherwise = Some(branch);
    }
}

// ============================================================================
// Binders
// ============================================================================

/// `VAR ID SET`, `ID SET` or `expression DOT ID SET`. The value is filled
/// in by [`assignment`].
pub(crate) fn variable_set(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let node = match p.tag_at(0)? {
        tags::VAR => Node::SetVariable {
            name: p.text_at(1).to_string(),
            value: None,
            declaration: true,
            receiver: None,
        },
        tags::ID => Node::SetVariable {
            name: p.text_at(0).to_string(),
            value: None,
            declaration: false,
            receiver: None,
        },
        _ => Node::SetVariable {
            name: p.text_at(2).to_string(),
            value: None,
            declaration: false,
            receiver: Some(p.node_at(0)?),
        },
    };
    Some(ctx.ast.add(node, p.line()))
}

/// `VAR ID` without an initializer.
pub(crate) fn declaration(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let node = Node::SetVariable {
        name: p.text_at(1).to_string(),
        value: None,
        declaration: true,
        receiver: None,
    };
    Some(ctx.ast.add(node, p.line()))
}

/// `variable_set expression`
pub(crate) fn assignment(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let target = p.node_at(0)?;
    if let (Some(node), Node::SetVariable { value, .. }) = (p.node_at(1), ctx.ast.get_mut(target))
    {
        *value = Some(node);
    }
    Some(target)
}

/// `FUNC ID ( ID, ... ) {`. The body is filled in by [`close_declaration`].
pub(crate) fn declare_function(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let params = p.tokens()[2..]
        .iter()
        .filter(|t| t.tag == tags::ID)
        .map(|t| t.text.clone())
        .collect();
    let body = ctx.ast.add(Node::Blocks(Vec::new()), p.line());
    let node = Node::Function {
        name: p.text_at(1).to_string(),
        params,
        body,
    };
    Some(ctx.ast.add(node, p.line()))
}

/// `CLASS ID (EXTENDS ID)? {`. Members are filled in by
/// [`close_declaration`].
pub(crate) fn declare_class(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let parent = (p.tag_at(2) == Some(tags::EXTENDS)).then(|| p.text_at(3).to_string());
    let members = ctx.ast.add(Node::Blocks(Vec::new()), p.line());
    let node = Node::Class {
        name: p.text_at(1).to_string(),
        parent,
        members,
    };
    Some(ctx.ast.add(node, p.line()))
}

/// `declare_function program? }` or `declare_class program? }`
pub(crate) fn close_declaration(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let head = p.node_at(0)?;
    if p.tag_at(1) != Some(tags::PROGRAM) {
        return Some(head);
    }
    let block = body(p, ctx, 1);
    match ctx.ast.get_mut(head) {
        Node::Function { body, .. } => *body = block,
        Node::Class { members, .. } => *members = block,
        _ => {}
    }
    Some(head)
}

/// `CONTINUE` or `BREAK`
pub(crate) fn jump(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let node = if p.tag_at(0) == Some(tags::BREAK) {
        Node::Break
    } else {
        Node::Continue
    };
    Some(ctx.ast.add(node, p.line()))
}

/// `PRINT expression`
pub(crate) fn print(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let value = p.node_at(1)?;
    Some(ctx.ast.add(Node::Print(value), p.line()))
}

/// `RETURN expression?`
pub(crate) fn return_statement(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let value = p.node_at(1);
    Some(ctx.ast.add(Node::Return(value), p.line()))
}

/// `IF expression { program? }`
pub(crate) fn if_statement(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let condition = p.node_at(1)?;
    let then_block = body(p, ctx, 3);
    let node = Node::If {
        condition,
        then_block,
        otherwise: None,
    };
    Some(ctx.ast.add(node, p.line()))
}

/// `program ELSEIF expression { program? }`
///
/// Returns the head of the chain with a new `If` attached to its last link.
pub(crate) fn else_if(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let tail = match chain_tail(p, ctx) {
        Ok(tail) => tail,
        Err(error) => {
            ctx.diagnostics.push(error);
            return p.node_at(0);
        }
    };

    let condition = p.node_at(2)?;
    let then_block = body(p, ctx, 4);
    let line = p.token(1).map_or_else(|| p.line(), |t| t.line);
    let branch = ctx.ast.add(
        Node::If {
            condition,
            then_block,
            otherwise: None,
        },
        line,
    );
    attach(ctx, tail, Else::ElseIf(branch));
    p.node_at(0)
}

/// `program ELSE { program? }`
pub(crate) fn else_statement(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let tail = match chain_tail(p, ctx) {
        Ok(tail) => tail,
        Err(error) => {
            ctx.diagnostics.push(error);
            return p.node_at(0);
        }
    };

    let block = body(p, ctx, 3);
    attach(ctx, tail, Else::Else(block));
    p.node_at(0)
}

/// `WHILE expression { program? }`
pub(crate) fn while_statement(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let condition = p.node_at(1)?;
    let body = body(p, ctx, 3);
    Some(ctx.ast.add(Node::While { condition, body }, p.line()))
}

/// Two or more programs separated by line breaks or `;`, joined into one
/// flat `Blocks`.
pub(crate) fn programs(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    let line_breaks = (0..p.tokens().len())
        .filter(|&i| p.was_reinserted(i))
        .count();
    p.purge(tags::SEMICOLON);
    p.purge(tags::NEWLINE);

    let mut statements = Vec::new();
    for id in p.nodes_tagged(tags::PROGRAM) {
        match &ctx.ast[id] {
            Node::Blocks(children) => statements.extend(children.iter().copied()),
            _ => statements.push(id),
        }
    }
    tracing::trace!(statements = statements.len(), line_breaks, "joined statements");
    Some(ctx.ast.add(Node::Blocks(statements), p.line()))
}

/// `program ;` with nothing left to join.
pub(crate) fn trailing(p: &mut Parser<'_>, _ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    p.node_at(0)
}

/// An expression used as a statement.
pub(crate) fn statement(p: &mut Parser<'_>, _ctx: &mut BuildContext<'_>) -> Option<NodeId> {
    p.node_at(0)
}
