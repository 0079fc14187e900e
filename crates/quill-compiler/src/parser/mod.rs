//! Token-rewriting parser.
//!
//! There is no parse table. A [`Grammar`] is an ordered list of [`Rule`]s,
//! each a regex over the space-joined tags of the current tokens. A rule
//! reduces every span it matches into one token carrying the rule's result
//! tag and the AST node its builder made. Passes over the whole list repeat
//! until one leaves the tags unchanged.
//!
//! ## Structure
//!
//! - `stream` - Active and detached token lists, tag maps
//! - `parser` - Rule application on one token list
//! - `grammar` - The rule list of the language and the fixpoint driver
//! - `expressions` - Expression binders, operator precedence predicates
//! - `statements` - Statement binders
//!
//! ## Usage
//!
//! ```rust
//! use quill_compiler::ast::{Ast, Node};
//! use quill_compiler::lexer::Lexer;
//! use quill_compiler::parser::Grammar;
//! use quill_compiler::Diagnostics;
//!
//! let tokens = Lexer::default().tokenize("print 1 + 2").unwrap();
//! let mut ast = Ast::new();
//! let mut diagnostics = Diagnostics::new();
//! let root = Grammar::default().parse(tokens, &mut ast, &mut diagnostics);
//!
//! assert!(diagnostics.is_empty());
//! assert!(matches!(&ast[root], Node::Blocks(statements) if statements.len() == 1));
//! ```

mod grammar;
#[allow(clippy::module_inception)]
mod parser;
mod stream;

pub(crate) mod expressions;
pub(crate) mod statements;

pub use grammar::{DEFAULT_MAX_PASSES, Grammar};
pub use parser::{BuildContext, Builder, Match, Parser, Predicate, Rule};
pub use stream::{Detached, Entry, TagMap, TokenStream};
