//! The ordered rule list and the fixpoint driver.

use super::expressions as expr;
use super::parser::{BuildContext, Parser, Rule};
use super::statements as stmt;
use crate::ast::{Ast, Node, NodeId};
use crate::diagnostics::Diagnostics;
use crate::error::CompileError;
use crate::lexer::{Token, tags};

/// Default cap on fixpoint passes.
pub const DEFAULT_MAX_PASSES: usize = 10_000;

/// An ordered list of rules run to a fixpoint.
#[derive(Debug, Clone)]
pub struct Grammar {
    rules: Vec<Rule>,
    max_passes: usize,
}

impl Default for Grammar {
    fn default() -> Self {
        Self::standard().expect("standard grammar patterns are valid")
    }
}

impl Grammar {
    /// Creates a grammar with no rules.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    /// The rule list of the language, in priority order.
    pub fn standard() -> Result<Self, regex::Error> {
        use tags::*;

        let rules = vec![
            // Literals and names
            Rule::new("NUM|TXT|BOOL|NULL|THIS|SUPER", EXPRESSION, expr::literal)?,
            Rule::new("(VAR )?ID SET", VARIABLE_SET, stmt::variable_set)?.when(expr::not_after_dot),
            Rule::new("VAR ID", PROGRAM, stmt::declaration)?,
            Rule::new(
                "FUNC ID LEFT_PARENTHESIS( ID( COMMA ID)*)? RIGHT_PARENTHESIS LEFT_BRACE",
                DECLARE_FUNCTION,
                stmt::declare_function,
            )?,
            Rule::new("CLASS ID( EXTENDS ID)? LEFT_BRACE", DECLARE_CLASS, stmt::declare_class)?,
            Rule::new("NEW ID LEFT_PARENTHESIS", NEW_INSTANCE, expr::new_instance)?,
            Rule::new("expression DOT ID LEFT_PARENTHESIS", CALL_FUNCTION, expr::call_function)?,
            Rule::new("expression DOT ID SET", VARIABLE_SET, stmt::variable_set)?,
            Rule::new("expression DOT ID", EXPRESSION, expr::field)?.when(expr::is_field_read),
            Rule::new("ID LEFT_PARENTHESIS", CALL_FUNCTION, expr::call_function)?
                .when(expr::not_after_dot),
            Rule::new("ID", EXPRESSION, expr::variable)?.when(expr::is_variable_read),
            // Compound values
            Rule::new(
                "LEFT_BRACKET (expression (COMMA expression )*)?RIGHT_BRACKET",
                EXPRESSION,
                expr::list,
            )?,
            Rule::new(
                "LEFT_BRACE (expression COLON expression (COMMA expression COLON expression )*)?RIGHT_BRACE",
                EXPRESSION,
                expr::map,
            )?
            .when(expr::is_map_literal),
            Rule::new("LEFT_PARENTHESIS expression RIGHT_PARENTHESIS", EXPRESSION, expr::group)?
                .when(expr::is_group),
            // Operators, tightest first
            Rule::new("(OP2|NOT|TILDE) expression", EXPRESSION, expr::unary)?
                .when(expr::unary_fits),
            Rule::new("expression EXPONENTIATION expression", EXPRESSION, expr::binary)?
                .when(expr::power_fits),
            Rule::new("expression OP1 expression", EXPRESSION, expr::binary)?
                .when(expr::multiplicative_fits),
            Rule::new("expression OP2 expression", EXPRESSION, expr::binary)?
                .when(expr::additive_fits),
            Rule::new("expression COMP expression", EXPRESSION, expr::binary)?
                .when(expr::comparison_fits),
            Rule::new("expression OP3 expression", EXPRESSION, expr::binary)?
                .when(expr::logical_fits),
            Rule::new(
                "(call_function|new_instance) (expression (COMMA expression )*)?RIGHT_PARENTHESIS",
                EXPRESSION,
                expr::arguments,
            )?,
            // Statements
            Rule::new("CONTINUE|BREAK", PROGRAM, stmt::jump)?,
            Rule::new("PRINT expression", PROGRAM, stmt::print)?.when(stmt::ends_statement),
            Rule::new("RETURN( expression)?", PROGRAM, stmt::return_statement)?
                .when(stmt::return_fits),
            Rule::new("variable_set expression", PROGRAM, stmt::assignment)?
                .when(stmt::ends_statement),
            Rule::new(
                "IF expression LEFT_BRACE (program )?RIGHT_BRACE",
                PROGRAM,
                stmt::if_statement,
            )?,
            Rule::new(
                "program ELSEIF expression LEFT_BRACE (program )?RIGHT_BRACE",
                PROGRAM,
                stmt::else_if,
            )?,
            Rule::new(
                "program ELSE LEFT_BRACE (program )?RIGHT_BRACE",
                PROGRAM,
                stmt::else_statement,
            )?,
            Rule::new(
                "WHILE expression LEFT_BRACE (program )?RIGHT_BRACE",
                PROGRAM,
                stmt::while_statement,
            )?,
            Rule::new("declare_function( program)? RIGHT_BRACE", PROGRAM, stmt::close_declaration)?,
            Rule::new("declare_class( program)? RIGHT_BRACE", PROGRAM, stmt::close_declaration)?,
            // Sequencing
            Rule::new(
                "program( (NEWLINE|SEMICOLON))+ program(( (NEWLINE|SEMICOLON))+ program)*",
                PROGRAM,
                stmt::programs,
            )?
            .including(&[NEWLINE])
            .when(stmt::sequence_fits),
            Rule::new("program SEMICOLON", PROGRAM, stmt::trailing)?.when(stmt::trailing_separator),
            Rule::new("expression", PROGRAM, stmt::statement)?.when(stmt::is_statement),
        ];

        Ok(Self {
            rules,
            max_passes: DEFAULT_MAX_PASSES,
        })
    }

    /// Appends a rule after the existing ones.
    pub fn push(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// The rules in priority order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Sets the fixpoint pass cap.
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Applies every rule once, in order. Returns the number of reductions.
    pub fn run_pass(&self, parser: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> usize {
        self.rules.iter().map(|rule| parser.apply(rule, ctx)).sum()
    }

    /// Prepares a lexed token list for the rules: layout is dropped, line
    /// breaks are detached so only the rules that ask for them see them.
    pub fn prepare(&self, tokens: Vec<Token>) -> Parser<'static> {
        let mut parser = Parser::new(tokens);
        parser.purge(tags::IGNORE);
        parser.purge(tags::COMMENT);
        parser.remove(tags::NEWLINE);
        parser
    }

    /// Runs passes until one leaves the tag map unchanged.
    ///
    /// Returns the number of passes run, the unchanged one included.
    pub fn reduce(&self, parser: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> usize {
        let mut map = parser.tag_map();
        for pass in 1..=self.max_passes {
            let reductions = self.run_pass(parser, ctx);
            let next = parser.tag_map();
            tracing::debug!(pass, reductions, tokens = parser.tokens().len(), "grammar pass");
            if next == map {
                return pass;
            }
            map = next;
        }

        tracing::warn!(max_passes = self.max_passes, "grammar did not reach a fixpoint");
        self.max_passes
    }

    /// Parses a lexed token list into a `Blocks` root.
    ///
    /// Tokens left over at the fixpoint are reported to `diagnostics`, and
    /// the root is whatever did reduce to a program.
    pub fn parse(&self, tokens: Vec<Token>, ast: &mut Ast, diagnostics: &mut Diagnostics) -> NodeId {
        let mut parser = self.prepare(tokens);
        let mut ctx = BuildContext { ast, diagnostics };
        self.reduce(&mut parser, &mut ctx);

        let tokens = parser.into_tokens();
        report_leftovers(&tokens, ctx.diagnostics);

        let programs: Vec<NodeId> = tokens
            .iter()
            .filter(|t| t.tag == tags::PROGRAM)
            .filter_map(|t| t.node)
            .collect();
        let line = tokens.first().map_or(1, |t| t.line);
        match programs.as_slice() {
            [single] => ctx.ast.as_blocks(*single),
            _ => {
                let mut statements = Vec::new();
                for id in programs {
                    match &ctx.ast[id] {
                        Node::Blocks(children) => statements.extend(children.iter().copied()),
                        _ => statements.push(id),
                    }
                }
                ctx.ast.add(Node::Blocks(statements), line)
            }
        }
    }
}

/// A fully reduced input is a single program token. Anything else is
/// reported: every stray `else` / `else if`, or the first token that didn't
/// fold into the program.
fn report_leftovers(tokens: &[Token], diagnostics: &mut Diagnostics) {
    if tokens.len() <= 1 && tokens.iter().all(|t| t.tag == tags::PROGRAM) {
        return;
    }

    let mut dangling = false;
    for token in tokens {
        if matches!(token.tag, tags::ELSE | tags::ELSEIF) {
            dangling = true;
            diagnostics.push(CompileError::DanglingElse { line: token.line });
        }
    }
    if dangling {
        return;
    }

    let index = usize::from(tokens.first().is_some_and(|t| t.tag == tags::PROGRAM));
    if let Some(token) = tokens.get(index) {
        let text = if token.text.is_empty() {
            token.tag.to_string()
        } else {
            token.text.clone()
        };
        diagnostics.push(CompileError::UnexpectedToken {
            text,
            line: token.line,
        });
    }
}
