//! Expression code generation.

use super::{Generator, Mode, put};
use crate::ast::{Node, NodeId, UnaryOp};
use crate::compiler::bytecode::{Instruction, OpCode, Operand};
use crate::compiler::scope::Binding;

impl Generator<'_> {
    /// Emits code leaving the value of `id` on the stack.
    pub(super) fn expression(&self, id: NodeId, mode: Mode, code: &mut Vec<Instruction>) {
        match &self.ast[id] {
            Node::Number(value) => code.push(put(Some(match value.to_i64() {
                Some(int) => Operand::Int(int),
                None => Operand::Decimal(value.clone()),
            }))),
            Node::Text(text) => code.push(put(Some(Operand::Text(text.clone())))),
            Node::Boolean(value) => code.push(put(Some(Operand::Bool(*value)))),
            Node::Null => code.push(put(None)),

            // Popped back in source order.
            Node::List(items) => {
                for &item in items.iter().rev() {
                    self.emit(item, mode, code);
                }
                code.push(Instruction::with_operand(
                    OpCode::CREATE_ARR,
                    Operand::Int(items.len() as i64),
                ));
            }
            Node::Map(entries) => {
                for &(key, value) in entries {
                    self.emit(key, mode, code);
                    self.emit(value, mode, code);
                }
                code.push(Instruction::with_operand(
                    OpCode::CREATE_MAP,
                    Operand::Int(entries.len() as i64),
                ));
            }

            Node::Variable {
                name,
                receiver: Some(receiver),
            } => {
                self.emit(*receiver, mode, code);
                code.push(put(Some(Operand::Text(name.clone()))));
                code.push(Instruction::simple(OpCode::GET));
            }
            Node::Variable {
                name,
                receiver: None,
            } => code.push(match self.bindings.get(id) {
                Some(Binding::Local(slot)) => {
                    Instruction::with_operand(OpCode::GETVAR, Operand::Int(i64::from(slot)))
                }
                Some(Binding::Param(ordinal)) => {
                    Instruction::with_operand(OpCode::GETPARAM, Operand::Int(i64::from(ordinal)))
                }
                Some(Binding::Global) | None => {
                    Instruction::with_operand(OpCode::GETVAR, Operand::Text(name.clone()))
                }
            }),

            Node::Binary { op, left, right } => {
                self.emit(*left, mode, code);
                self.emit(*right, mode, code);
                code.push(Instruction::simple(OpCode::binary(*op)));
            }
            Node::Unary { op, operand } => {
                self.emit(*operand, mode, code);
                code.push(Instruction::simple(match op {
                    UnaryOp::Negative => OpCode::NEGATE,
                    UnaryOp::Not => OpCode::NOT,
                    UnaryOp::BitwiseNot => OpCode::B_NOT,
                }));
            }

            Node::Call {
                name,
                receiver,
                args,
            } => {
                for &arg in args {
                    self.emit(arg, mode, code);
                }
                match receiver {
                    Some(receiver) => {
                        self.emit(*receiver, mode, code);
                        code.push(Instruction::with_operand(
                            OpCode::CALLMETHOD,
                            Operand::Text(format!("#{name}")),
                        ));
                    }
                    None => code.push(Instruction::with_operand(
                        OpCode::CALLFUNC,
                        Operand::Text(name.clone()),
                    )),
                }
            }
            Node::New { class, args } => {
                for &arg in args {
                    self.emit(arg, mode, code);
                }
                code.push(Instruction::with_operand(
                    OpCode::CREATE_INSTANCE,
                    Operand::Text(class.clone()),
                ));
            }

            Node::This => code.push(Instruction::simple(OpCode::THIS)),
            // The parent view of `this`.
            Node::Super => {
                code.push(Instruction::simple(OpCode::THIS));
                code.push(put(Some(Operand::Bool(true))));
                code.push(Instruction::simple(OpCode::GET));
            }

            other => tracing::warn!(kind = other.kind(), "not an expression"),
        }
    }
}
