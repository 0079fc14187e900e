//! Statement code generation: assignments, branches, loops and declarations.

use super::{Generator, Mode, jump, put, skip};
use crate::ast::{Else, Node, NodeId};
use crate::compiler::bytecode::{Instruction, OpCode, Operand};

impl Generator<'_> {
    /// `name = value`, `var name = value` or `receiver.name = value`.
    pub(super) fn set_variable(
        &self,
        id: NodeId,
        name: &str,
        value: Option<NodeId>,
        receiver: Option<NodeId>,
        mode: Mode,
        code: &mut Vec<Instruction>,
    ) {
        if let Some(receiver) = receiver {
            self.emit(receiver, mode, code);
            code.push(put(Some(Operand::Text(name.to_string()))));
            self.value_or_null(value, mode, code);
            code.push(Instruction::simple(OpCode::SET));
            code.push(Instruction::simple(OpCode::POP));
            return;
        }

        if let Some(value) = value
            && let Some(target) = self.in_place.target(value)
            && let Node::Binary { op, right, .. } = &self.ast[value]
            && let Some(opcode) = OpCode::in_place(*op)
        {
            self.emit(*right, mode, code);
            code.push(Instruction::with_operand(opcode, self.target(name, Some(target))));
            return;
        }

        self.value_or_null(value, mode, code);
        code.push(Instruction::with_operand(
            OpCode::SETVAR,
            self.target(name, self.bindings.get(id)),
        ));
    }

    /// `cond, SKIPIFN then, then` with an optional `SKIP else, else` tail.
    pub(super) fn if_statement(
        &self,
        condition: NodeId,
        then_block: NodeId,
        otherwise: Option<Else>,
        mode: Mode,
        code: &mut Vec<Instruction>,
    ) {
        self.emit(condition, mode, code);
        let then_code = self.node(then_block, mode);
        let then_len = mode.length(&then_code);

        let Some(branch) = otherwise else {
            code.push(skip(OpCode::SKIPIFN, then_len as i64));
            code.extend(then_code);
            return;
        };

        // An else-if chain is generated as a nested `if` in the else slot.
        let else_code = self.node(branch.node(), mode);
        code.push(skip(
            OpCode::SKIPIFN,
            (then_len + mode.skip_width()) as i64,
        ));
        code.extend(then_code);
        code.push(skip(OpCode::SKIP, mode.length(&else_code) as i64));
        code.extend(else_code);
    }

    /// Top-level loop: body and condition are recorded and replayed by the
    /// machine's `WHILE`.
    pub(super) fn native_loop(&self, condition: NodeId, body: NodeId, code: &mut Vec<Instruction>) {
        code.push(Instruction::simple(OpCode::REC));
        self.emit(body, Mode::Recording, code);
        code.push(Instruction::simple(OpCode::END));
        code.push(Instruction::simple(OpCode::REC));
        self.emit(condition, Mode::Recording, code);
        code.push(Instruction::simple(OpCode::END));
        code.push(Instruction::simple(OpCode::WHILE));
    }

    /// Loop inside a recording, unrolled into skips.
    pub(super) fn unrolled_loop(&self, condition: NodeId, body: NodeId, code: &mut Vec<Instruction>) {
        let mut looped = self.node(body, Mode::Recording);
        let body_len = Mode::Recording.length(&looped);
        let cond_code = self.node(condition, Mode::Recording);
        let cond_len = Mode::Recording.length(&cond_code);

        looped.extend(cond_code);
        looped.push(skip(
            OpCode::SKIPIF,
            -((body_len + cond_len + 2) as i64),
        ));
        patch_jumps(&mut looped, cond_len);

        code.push(skip(OpCode::SKIP, body_len as i64));
        code.extend(looped);
    }

    /// `REC body END PUT nargs MKFUNC name`
    pub(super) fn function(
        &self,
        name: &str,
        params: usize,
        body: NodeId,
        code: &mut Vec<Instruction>,
    ) {
        code.push(Instruction::simple(OpCode::REC));
        self.emit(body, Mode::Recording, code);
        code.push(Instruction::simple(OpCode::END));
        code.push(put(Some(Operand::Int(params as i64))));
        code.push(Instruction::with_operand(
            OpCode::MKFUNC,
            Operand::Text(name.to_string()),
        ));
    }

    /// Builds the class descriptor map and registers it.
    ///
    /// Fields contribute `name: value`, methods `#name: function` (the
    /// constructor `init` goes under `<init>`), and a parent class is stored
    /// under the key `false`.
    pub(super) fn class(
        &self,
        name: &str,
        parent: Option<&str>,
        members: NodeId,
        mode: Mode,
        code: &mut Vec<Instruction>,
    ) {
        let mut items = 0;
        let statements = match &self.ast[members] {
            Node::Blocks(statements) => statements.as_slice(),
            _ => std::slice::from_ref(&members),
        };

        for &member in statements {
            match &self.ast[member] {
                Node::SetVariable {
                    name: field, value, ..
                } => {
                    code.push(put(Some(Operand::Text(field.clone()))));
                    self.value_or_null(*value, mode, code);
                }
                Node::Function {
                    name: method,
                    params,
                    body,
                } => {
                    self.function(&format!("{name}#{method}"), params.len(), *body, code);
                    let key = if method == "init" {
                        "<init>".to_string()
                    } else {
                        format!("#{method}")
                    };
                    code.push(put(Some(Operand::Text(key))));
                    code.push(Instruction::simple(OpCode::GETPTRTOLASTFUNC));
                }
                other => {
                    tracing::warn!(class = name, kind = other.kind(), "skipped class member");
                    continue;
                }
            }
            items += 1;
        }

        if let Some(parent) = parent {
            code.push(put(Some(Operand::Bool(false))));
            code.push(put(Some(Operand::Text(parent.to_string()))));
            items += 1;
        }

        code.push(Instruction::with_operand(
            OpCode::CREATE_MAP,
            Operand::Int(items),
        ));
        code.push(Instruction::with_operand(
            OpCode::CREATE_CLASS,
            Operand::Text(name.to_string()),
        ));
    }

    fn value_or_null(&self, value: Option<NodeId>, mode: Mode, code: &mut Vec<Instruction>) {
        match value {
            Some(value) => self.emit(value, mode, code),
            None => code.push(put(None)),
        }
    }
}

/// Rewrites the `CONTINUE 0` / `BREAK 0` placeholders of one unrolled loop.
///
/// `looped` is body, condition and the closing `SKIPIF`; `cond_len` is the
/// condition's slot length. Function bodies recorded inside the loop are
/// left alone.
pub(super) fn patch_jumps(looped: &mut [Instruction], cond_len: usize) {
    let total = Mode::Recording.length(looped) as i64;
    let cond_len = cond_len as i64;
    let mut slot = 0i64;
    let mut depth = 0usize;

    for instruction in looped.iter_mut() {
        let width = instruction.width() as i64;
        match instruction.opcode {
            OpCode::REC => depth += 1,
            OpCode::END => depth = depth.saturating_sub(1),
            OpCode::CONTINUE | OpCode::BREAK
                if depth == 0 && *instruction == jump(instruction.opcode, Mode::Recording) =>
            {
                // Both land relative to the slot after the placeholder.
                let offset = if instruction.opcode == OpCode::CONTINUE {
                    total - slot - cond_len - 4
                } else {
                    total - slot - 2
                };
                *instruction = skip(OpCode::SKIP, offset);
            }
            _ => {}
        }
        slot += width;
    }
}
