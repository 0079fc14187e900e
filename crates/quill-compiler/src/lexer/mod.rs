//! Lexical analysis (tokenization) for Quill source code.
//!
//! The lexer transforms source text into a flat list of tagged tokens that
//! the grammar engine rewrites.
//!
//! ## Structure
//!
//! - `scanner.rs` - `Lexer`, its ordered recognizer list and the standard table
//! - `token.rs` - `Token`, `Span` and the tag constants
//! - `literals` - custom matchers for newline runs and string literals
//!
//! ## Usage
//!
//! ```rust
//! use quill_compiler::lexer::{Lexer, tags};
//!
//! let tokens = Lexer::default().tokenize("var x = 42").unwrap();
//! assert_eq!(tokens[0].tag, tags::VAR);
//! ```

mod scanner;
mod token;

pub mod literals;

pub use scanner::{Lexer, Recognizer};
pub use token::{Span, Tag, Token, tags};
