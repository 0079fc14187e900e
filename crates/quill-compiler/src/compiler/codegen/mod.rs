//! Code generation from the resolved tree to bytecode.
//!
//! Generation is a post-order walk: operands are emitted before the
//! instruction that consumes them. Each call returns its own instruction
//! list so parents can measure a child before placing a skip over it.
//!
//! ## Generation modes
//!
//! Code outside every loop and function body is generated in
//! [`Mode::Direct`]. The machine runs it instruction by instruction, so skip
//! offsets count instructions. Loop and function bodies are recorded
//! between `REC` and `END` and replayed from the raw slot array, so inside
//! them ([`Mode::Recording`]) offsets count slots.
//!
//! A `while` in direct mode is recorded and handed to the machine's native
//! `WHILE`. A `while` inside a recording is unrolled into skips:
//!
//! ```text
//! SKIP     C            jump to the condition
//! <body>                C slots
//! <cond>                K slots
//! SKIPIF   -(C+K+2)     back to the body
//! ```
//!
//! `continue` and `break` inside recordings are first emitted as
//! `CONTINUE 0` / `BREAK 0` and rewritten to `SKIP n` by the innermost
//! unrolled loop around them.

mod expressions;
mod statements;


use crate::ast::{Ast, Node, NodeId};
use crate::compiler::bytecode::{Bytecode, Instruction, OpCode, Operand};
use crate::compiler::optimize::InPlace;
use crate::compiler::scope::{Binding, Bindings};

/// How skip offsets are counted in the code being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Top-level code; offsets count instructions
    Direct,
    /// Inside a recorded loop or function body; offsets count raw slots
    Recording,
}

impl Mode {
    /// Length of `code` in this mode's units.
    pub fn length(self, code: &[Instruction]) -> usize {
        match self {
            Mode::Direct => code.len(),
            Mode::Recording => code.iter().map(Instruction::width).sum(),
        }
    }

    /// Units taken by one `SKIP n` instruction.
    pub fn skip_width(self) -> usize {
        match self {
            Mode::Direct => 1,
            Mode::Recording => 2,
        }
    }
}

/// Generator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// Emitted after an expression used as a statement
    pub discard: Vec<Instruction>,
}

impl GeneratorConfig {
    /// Keeps statement values on the stack, so a shell can show the last one.
    pub fn repl() -> Self {
        Self {
            discard: Vec::new(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            discard: vec![Instruction::simple(OpCode::POP)],
        }
    }
}

/// Turns a resolved tree into bytecode.
pub struct Generator<'a> {
    ast: &'a Ast,
    bindings: &'a Bindings,
    in_place: &'a InPlace,
    config: &'a GeneratorConfig,
}

impl<'a> Generator<'a> {
    /// Creates a generator over a tree and the results of its passes.
    pub fn new(
        ast: &'a Ast,
        bindings: &'a Bindings,
        in_place: &'a InPlace,
        config: &'a GeneratorConfig,
    ) -> Self {
        Self {
            ast,
            bindings,
            in_place,
            config,
        }
    }

    /// Generates the program rooted at `root`.
    pub fn generate(&self, root: NodeId) -> Bytecode {
        let code = self.node(root, Mode::Direct);
        tracing::debug!(instructions = code.len(), "generated bytecode");
        Bytecode::from(code)
    }

    /// Generates one node in `mode`.
    fn node(&self, id: NodeId, mode: Mode) -> Vec<Instruction> {
        let mut code = Vec::new();
        self.emit(id, mode, &mut code);
        code
    }

    /// Appends the code of one node to `code`.
    fn emit(&self, id: NodeId, mode: Mode, code: &mut Vec<Instruction>) {
        match &self.ast[id] {
            Node::Blocks(statements) => {
                for &statement in statements {
                    self.emit(statement, mode, code);
                    if self.ast[statement].is_value() {
                        code.extend(self.config.discard.iter().cloned());
                    }
                }
            }
            Node::SetVariable {
                name,
                value,
                receiver,
                ..
            } => self.set_variable(id, name, *value, *receiver, mode, code),
            Node::Print(value) => {
                self.emit(*value, mode, code);
                code.push(Instruction::simple(OpCode::CALLFUNC));
            }
            Node::If {
                condition,
                then_block,
                otherwise,
            } => self.if_statement(*condition, *then_block, *otherwise, mode, code),
            Node::While { condition, body } => match mode {
                Mode::Direct => self.native_loop(*condition, *body, code),
                Mode::Recording => self.unrolled_loop(*condition, *body, code),
            },
            Node::Function { name, params, body } => {
                self.function(name, params.len(), *body, code)
            }
            Node::Class {
                name,
                parent,
                members,
            } => self.class(name, parent.as_deref(), *members, mode, code),
            Node::Return(value) => {
                match value {
                    Some(value) => self.emit(*value, mode, code),
                    None => code.push(put(None)),
                }
                code.push(Instruction::simple(OpCode::RETURN));
            }
            Node::Continue => code.push(jump(OpCode::CONTINUE, mode)),
            Node::Break => code.push(jump(OpCode::BREAK, mode)),
            Node::Free { slot, .. } => code.push(Instruction::with_operand(
                OpCode::DELVAR,
                Operand::Int(i64::from(*slot)),
            )),
            _ => self.expression(id, mode, code),
        }
    }

    /// The operand addressing a variable for `SETVAR` and in-place ops.
    fn target(&self, name: &str, binding: Option<Binding>) -> Operand {
        match binding.and_then(|b| b.slot_id()) {
            Some(id) => Operand::Int(id),
            None => Operand::Text(name.to_string()),
        }
    }
}

/// `PUT` of an optional constant.
fn put(operand: Option<Operand>) -> Instruction {
    Instruction {
        opcode: OpCode::PUT,
        operand,
    }
}

/// `continue` / `break`; inside recordings a placeholder waiting for its
/// offset.
fn jump(opcode: OpCode, mode: Mode) -> Instruction {
    match mode {
        Mode::Direct => Instruction::simple(opcode),
        Mode::Recording => Instruction::with_operand(opcode, Operand::Int(0)),
    }
}

/// `SKIP`-family instruction over `offset` units.
fn skip(opcode: OpCode, offset: i64) -> Instruction {
    Instruction::with_operand(opcode, Operand::Int(offset))
}
