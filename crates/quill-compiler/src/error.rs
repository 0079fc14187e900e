//! Error types for the compiler.

use thiserror::Error;

/// Result type for compiler API operations
pub type Result<T> = std::result::Result<T, Error>;

/// A problem found in the source program.
///
/// These are collected in [`Diagnostics`](crate::Diagnostics) instead of being
/// returned one at a time, so a single compile reports every issue it finds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// No recognizer matched at the current input position
    #[error("Syntax error: unexpected input {snippet:?} (line {line})")]
    Lexical {
        /// Line of the offending input
        line: usize,
        /// Byte offset into the source
        offset: usize,
        /// A short excerpt starting at the offset
        snippet: String,
    },

    /// `else` or `else if` without a preceding `if`
    #[error("Else-if/Else statements can only be used after an if statement (line {line})")]
    DanglingElse {
        /// Line of the `else`
        line: usize,
    },

    /// `else if` attached after a terminal `else`
    #[error("Else-if statements can not be used after an else statement (line {line})")]
    ElseIfAfterElse {
        /// Line of the `else if`
        line: usize,
    },

    /// A token the grammar could not fold into the program
    #[error("Syntax error: unexpected {text:?} (line {line})")]
    UnexpectedToken {
        /// Source text of the token
        text: String,
        /// Line of the token
        line: usize,
    },

    /// Read of a name that was never declared
    #[error("Tried to access undefined variable \"{name}\" in line {line}")]
    UndefinedAccess {
        /// Variable name
        name: String,
        /// Line of the read
        line: usize,
    },

    /// Assignment to a name that was never declared
    #[error("Tried to modify the value of an undefined variable \"{name}\" in line {line}")]
    UndefinedMutation {
        /// Variable name
        name: String,
        /// Line of the assignment
        line: usize,
    },
}

impl CompileError {
    /// Source line the problem was found on.
    pub fn line(&self) -> usize {
        match self {
            Self::Lexical { line, .. }
            | Self::DanglingElse { line }
            | Self::ElseIfAfterElse { line }
            | Self::UnexpectedToken { line, .. }
            | Self::UndefinedAccess { line, .. }
            | Self::UndefinedMutation { line, .. } => *line,
        }
    }

    /// Returns true for undefined variable access or mutation.
    pub fn is_semantic(&self) -> bool {
        matches!(
            self,
            Self::UndefinedAccess { .. } | Self::UndefinedMutation { .. }
        )
    }
}

/// Errors returned by the compiler API
#[derive(Debug, Error)]
pub enum Error {
    /// Generation refused because the compilation recorded diagnostics
    #[error("compilation failed with {0} error(s)")]
    Compilation(usize),

    /// Malformed disassembly text
    #[error("disassembly line {line}: {reason}")]
    Disassembly {
        /// 1-based line in the listing
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Fault raised by the reference machine
    #[error("RuntimeError: {0}")]
    Runtime(String),

    /// File system error
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new runtime error
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Create a new disassembly error
    pub fn disassembly(line: usize, reason: impl Into<String>) -> Self {
        Self::Disassembly {
            line,
            reason: reason.into(),
        }
    }
}
