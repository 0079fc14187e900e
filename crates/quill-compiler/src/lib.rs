// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # quill-compiler
//!
//! Compiler for the Quill scripting language, producing flat bytecode for an
//! external stack machine.
//!
//! ## Overview
//!
//! A compilation runs these stages in order:
//! - Lexing with an ordered table of recognizers
//! - Parsing by rewriting the token list with regex rules until nothing
//!   changes
//! - Scope resolution, assigning slot ids to locals
//! - Tagging `x = x op e` assignments for in-place opcodes
//! - Code generation into `(opcode, operand)` pairs
//!
//! Problems are collected in the [`Compilation`]'s [`Diagnostics`] rather
//! than returned one at a time. [`generate`] refuses a compilation that
//! recorded any.
//!
//! ## Quick Start
//!
//! ```rust
//! use quill_compiler::{compile, generate};
//! use quill_compiler::vm::Machine;
//!
//! let compilation = compile("var x = 2\nprint x * 21");
//! assert!(compilation.is_ok());
//!
//! let bytecode = generate(&compilation).unwrap();
//! let mut machine = Machine::new();
//! machine.run(&bytecode).unwrap();
//! assert_eq!(machine.output(), "42\n");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod compiler;
pub mod decimal;
pub mod diagnostics;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod vm;

use ast::{Ast, Node, NodeId};
use compiler::{Generator, InPlace, Optimizer, Resolver};
use lexer::Lexer;
use parser::Grammar;

// Re-exports for convenience
pub use compiler::{Bindings, Bytecode, GeneratorConfig, Instruction, OpCode, Operand};
pub use diagnostics::Diagnostics;
pub use error::{CompileError, Error, Result};

/// Everything one compile produced: the tree, the results of the passes
/// over it, and the problems found.
#[derive(Debug, Clone)]
pub struct Compilation {
    /// Node arena
    pub ast: Ast,
    /// Root `Blocks` node
    pub root: NodeId,
    /// Variable resolution
    pub bindings: Bindings,
    /// Assignments emitted as in-place opcodes
    pub in_place: InPlace,
    /// Problems found by any stage
    pub diagnostics: Diagnostics,
}

impl Compilation {
    /// Returns true if no stage recorded a problem.
    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// A configured compiler.
pub struct Compiler {
    lexer: Lexer,
    grammar: Grammar,
    config: GeneratorConfig,
}

impl Compiler {
    /// Creates a compiler with the standard lexer and grammar.
    pub fn new() -> Self {
        Self {
            lexer: Lexer::default(),
            grammar: Grammar::default(),
            config: GeneratorConfig::default(),
        }
    }

    /// Replaces the generator settings.
    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the grammar.
    pub fn with_grammar(mut self, grammar: Grammar) -> Self {
        self.grammar = grammar;
        self
    }

    /// Replaces the lexer.
    pub fn with_lexer(mut self, lexer: Lexer) -> Self {
        self.lexer = lexer;
        self
    }

    /// The lexer, for tools that only need tokens.
    pub fn lexer(&self) -> &Lexer {
        &self.lexer
    }

    /// Compiles one unit.
    pub fn compile(&self, source: &str) -> Compilation {
        self.compile_with_globals(source, std::iter::empty::<&str>())
    }

    /// Compiles one unit in which `globals` are already declared.
    pub fn compile_with_globals<I, S>(&self, source: &str, globals: I) -> Compilation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ast = Ast::new();
        let mut diagnostics = Diagnostics::new();

        let tokens = match self.lexer.tokenize(source) {
            Ok(tokens) => tokens,
            Err(error) => {
                diagnostics.push(error);
                let root = ast.add(Node::Blocks(Vec::new()), 1);
                return Compilation {
                    ast,
                    root,
                    bindings: Bindings::new(),
                    in_place: InPlace::new(),
                    diagnostics,
                };
            }
        };

        let root = self.grammar.parse(tokens, &mut ast, &mut diagnostics);
        let bindings = Resolver::new(&mut diagnostics)
            .with_globals(globals)
            .resolve(&mut ast, root);
        let in_place = Optimizer::new(&bindings).optimize(&mut ast, root);

        Compilation {
            ast,
            root,
            bindings,
            in_place,
            diagnostics,
        }
    }

    /// Generates bytecode for a compilation without diagnostics.
    pub fn generate(&self, compilation: &Compilation) -> Result<Bytecode> {
        let errors = compilation.diagnostics.len();
        if errors > 0 {
            tracing::warn!(errors, "refusing to generate code");
            return Err(Error::Compilation(errors));
        }
        let generator = Generator::new(
            &compilation.ast,
            &compilation.bindings,
            &compilation.in_place,
            &self.config,
        );
        Ok(generator.generate(compilation.root))
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiles `source` with the standard lexer and grammar.
pub fn compile(source: &str) -> Compilation {
    Compiler::new().compile(source)
}

/// Generates bytecode with the default settings.
pub fn generate(compilation: &Compilation) -> Result<Bytecode> {
    Compiler::new().generate(compilation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical_failure_stops_compilation() {
        let compilation = compile("var x = 1 $ 2");
        assert_eq!(compilation.diagnostics.len(), 1);
        assert!(matches!(
            compilation.diagnostics.iter().next(),
            Some(CompileError::Lexical { line: 1, .. })
        ));
        assert!(matches!(&compilation.ast[compilation.root], Node::Blocks(s) if s.is_empty()));
    }

    #[test]
    fn test_generation_refused_with_diagnostics() {
        let compilation = compile("print y");
        assert!(!compilation.is_ok());
        assert!(matches!(generate(&compilation), Err(Error::Compilation(1))));
    }

    #[test]
    fn test_known_globals() {
        let compiler = Compiler::new();
        assert!(!compiler.compile("x = x + 1").is_ok());
        let compilation = compiler.compile_with_globals("x = x + 1", ["x"]);
        assert!(compilation.is_ok());
        assert_eq!(compilation.in_place.len(), 1);
    }

    #[test]
    fn test_repl_config_keeps_values() {
        let compiler = Compiler::new().with_config(GeneratorConfig::repl());
        let bytecode = compiler.generate(&compiler.compile("1")).unwrap();
        assert_eq!(bytecode.disassemble(), "PUT\tNUM1\n");
    }

    #[test]
    fn test_empty_source() {
        let compilation = compile("");
        assert!(compilation.is_ok());
        assert!(generate(&compilation).unwrap().is_empty());
    }
}
