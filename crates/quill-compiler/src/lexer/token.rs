//! Token definitions for the lexer and grammar engine.

use crate::ast::NodeId;

/// The category name of a token or of a reduced span.
///
/// Lexer tags are upper case (`NUM`, `LEFT_BRACE`); grammar results are lower
/// case (`expression`, `program`).
pub type Tag = &'static str;

/// A span in the source code, representing a range of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the length of this span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if this span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A token produced by the lexer or by a grammar reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Category name
    pub tag: Tag,
    /// Literal source text (empty for reduced tokens)
    pub text: String,
    /// 1-based line the token starts on
    pub line: usize,
    /// Location in the source
    pub span: Span,
    /// AST node bound by a reduction
    pub node: Option<NodeId>,
}

impl Token {
    /// Creates a new lexed token.
    pub fn new(tag: Tag, text: impl Into<String>, line: usize, span: Span) -> Self {
        Self {
            tag,
            text: text.into(),
            line,
            span,
            node: None,
        }
    }

    /// Creates the token that replaces a reduced span.
    pub fn reduced(tag: Tag, line: usize, span: Span, node: Option<NodeId>) -> Self {
        Self {
            tag,
            text: String::new(),
            line,
            span,
            node,
        }
    }

    /// Returns true if this token came straight from the lexer.
    pub fn is_lexical(&self) -> bool {
        self.tag.bytes().all(|b| b.is_ascii_uppercase() || b == b'_')
    }
}

/// Tags produced by the standard recognizer table and the grammar.
pub mod tags {
    use super::Tag;

    // Layout
    /// One or more line breaks (with the blank lines between them)
    pub const NEWLINE: Tag = "NEWLINE";
    /// Spaces and tabs
    pub const IGNORE: Tag = "IGNORE";
    /// `// ...` up to the end of the line
    pub const COMMENT: Tag = "COMMENT";

    // Literals
    /// Quoted string literal
    pub const TXT: Tag = "TXT";
    /// Decimal number literal
    pub const NUM: Tag = "NUM";
    /// `true` or `false`
    pub const BOOL: Tag = "BOOL";
    /// `null`
    pub const NULL: Tag = "NULL";
    /// Identifier
    pub const ID: Tag = "ID";

    // Operators
    /// `**`
    pub const EXPONENTIATION: Tag = "EXPONENTIATION";
    /// `*`, `/`, `%`
    pub const OP1: Tag = "OP1";
    /// `+`, `-`
    pub const OP2: Tag = "OP2";
    /// Logical, bitwise and shift operators
    pub const OP3: Tag = "OP3";
    /// Comparisons
    pub const COMP: Tag = "COMP";
    /// `!` or `not`
    pub const NOT: Tag = "NOT";
    /// `~`
    pub const TILDE: Tag = "TILDE";
    /// `=`
    pub const SET: Tag = "SET";

    // Punctuation
    /// `;`
    pub const SEMICOLON: Tag = "SEMICOLON";
    /// `,`
    pub const COMMA: Tag = "COMMA";
    /// `:`
    pub const COLON: Tag = "COLON";
    /// `.`
    pub const DOT: Tag = "DOT";
    /// `{`
    pub const LEFT_BRACE: Tag = "LEFT_BRACE";
    /// `}`
    pub const RIGHT_BRACE: Tag = "RIGHT_BRACE";
    /// `(`
    pub const LEFT_PARENTHESIS: Tag = "LEFT_PARENTHESIS";
    /// `)`
    pub const RIGHT_PARENTHESIS: Tag = "RIGHT_PARENTHESIS";
    /// `[`
    pub const LEFT_BRACKET: Tag = "LEFT_BRACKET";
    /// `]`
    pub const RIGHT_BRACKET: Tag = "RIGHT_BRACKET";

    // Keywords
    /// `print`
    pub const PRINT: Tag = "PRINT";
    /// `while`
    pub const WHILE: Tag = "WHILE";
    /// `if`
    pub const IF: Tag = "IF";
    /// `else if`
    pub const ELSEIF: Tag = "ELSEIF";
    /// `else`
    pub const ELSE: Tag = "ELSE";
    /// `var`
    pub const VAR: Tag = "VAR";
    /// `func`
    pub const FUNC: Tag = "FUNC";
    /// `return`
    pub const RETURN: Tag = "RETURN";
    /// `continue`
    pub const CONTINUE: Tag = "CONTINUE";
    /// `break`
    pub const BREAK: Tag = "BREAK";
    /// `class`
    pub const CLASS: Tag = "CLASS";
    /// `extends`
    pub const EXTENDS: Tag = "EXTENDS";
    /// `new`
    pub const NEW: Tag = "NEW";
    /// `this`
    pub const THIS: Tag = "THIS";
    /// `super`
    pub const SUPER: Tag = "SUPER";

    // Grammar results
    /// Anything that produces a value
    pub const EXPRESSION: Tag = "expression";
    /// A statement or a sequence of statements
    pub const PROGRAM: Tag = "program";
    /// `name =` or `var name =` waiting for its value
    pub const VARIABLE_SET: Tag = "variable_set";
    /// `name(` or `receiver.name(` waiting for arguments
    pub const CALL_FUNCTION: Tag = "call_function";
    /// `new Name(` waiting for arguments
    pub const NEW_INSTANCE: Tag = "new_instance";
    /// `func name(params) {` waiting for its body
    pub const DECLARE_FUNCTION: Tag = "declare_function";
    /// `class Name {` waiting for its members
    pub const DECLARE_CLASS: Tag = "declare_class";
}
