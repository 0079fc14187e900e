//! The bytecode interpreter.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::comparison::{compare, loose_equals};
use super::value::{Class, Function, Instance, Value};
use crate::compiler::bytecode::{Bytecode, Instruction, OpCode, Operand};
use crate::error::{Error, Result};

/// Default limit on nested calls.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// How skip offsets are counted in the code being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Units {
    /// Top-level code
    Instructions,
    /// Recorded bodies, replayed from raw slots
    Slots,
}

/// How a block finished.
#[derive(Debug)]
enum Flow {
    Normal,
    Return(Value),
    Continue,
    Break,
}

#[derive(Debug, Default)]
struct Frame {
    params: Vec<Value>,
    this: Option<Rc<Instance>>,
}

/// A stack machine with the external interpreter's semantics.
///
/// Globals, functions and classes survive between [`run`](Self::run) calls,
/// so a shell can feed it one input at a time. Local slots live in one
/// store shared by every call, so a function body sees the live locals of
/// the blocks around its definition. A call saves the slots its body
/// declares and restores them on return.
#[derive(Debug)]
pub struct Machine {
    stack: Vec<Value>,
    locals: Vec<Value>,
    frames: Vec<Frame>,
    globals: FxHashMap<String, Value>,
    functions: FxHashMap<String, Rc<Function>>,
    classes: FxHashMap<String, Rc<Class>>,
    recordings: Vec<Rc<[Instruction]>>,
    last_function: Option<Rc<Function>>,
    output: String,
    max_depth: usize,
}

impl Machine {
    /// Creates a machine with empty state.
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            locals: Vec::new(),
            frames: vec![Frame::default()],
            globals: FxHashMap::default(),
            functions: FxHashMap::default(),
            classes: FxHashMap::default(),
            recordings: Vec::new(),
            last_function: None,
            output: String::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Sets the limit on nested calls.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Runs top-level code.
    pub fn run(&mut self, bytecode: &Bytecode) -> Result<()> {
        match self.block(&bytecode.instructions, Units::Instructions)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(Error::runtime("return outside a function")),
            Flow::Continue => Err(Error::runtime("continue outside a loop")),
            Flow::Break => Err(Error::runtime("break outside a loop")),
        }
    }

    /// The value stack, bottom first.
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Pops the top of the stack.
    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    /// Everything printed so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Returns and clears the printed output.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Value of a global variable.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Drops the stack above `depth` and any call state left by a failed
    /// run. Globals, functions and classes are kept.
    pub fn recover(&mut self, depth: usize) {
        self.stack.truncate(depth);
        self.locals.clear();
        self.frames.truncate(1);
        self.recordings.clear();
    }

    fn block(&mut self, code: &[Instruction], units: Units) -> Result<Flow> {
        let offsets = unit_offsets(code, units);
        let mut pc = 0;

        while pc < code.len() {
            let instruction = &code[pc];
            let mut next = pc + 1;
            tracing::trace!(pc, opcode = %instruction.opcode, "step");

            match instruction.opcode {
                OpCode::REC => {
                    let end = matching_end(code, pc)?;
                    self.recordings.push(Rc::from(&code[pc + 1..end]));
                    next = end + 1;
                }
                OpCode::END => return Err(Error::runtime("END without REC")),
                OpCode::SKIP => next = jump(&offsets, pc, int_operand(instruction)?)?,
                OpCode::SKIPIF => {
                    if self.pop_value()?.to_boolean() {
                        next = jump(&offsets, pc, int_operand(instruction)?)?;
                    }
                }
                OpCode::SKIPIFN => {
                    if !self.pop_value()?.to_boolean() {
                        next = jump(&offsets, pc, int_operand(instruction)?)?;
                    }
                }
                OpCode::WHILE => {
                    if let Some(flow) = self.native_loop()? {
                        return Ok(flow);
                    }
                }
                OpCode::CONTINUE => return Ok(Flow::Continue),
                OpCode::BREAK => return Ok(Flow::Break),
                OpCode::RETURN => return Ok(Flow::Return(self.pop_value()?)),
                _ => self.step(instruction)?,
            }
            pc = next;
        }
        Ok(Flow::Normal)
    }

    /// Runs the two most recent recordings as condition and body. Returns
    /// the flow to hand upwards when the body returned.
    fn native_loop(&mut self) -> Result<Option<Flow>> {
        let condition = self.pop_recording()?;
        let body = self.pop_recording()?;

        loop {
            match self.block(&condition, Units::Slots)? {
                Flow::Normal => {}
                Flow::Return(value) => return Ok(Some(Flow::Return(value))),
                Flow::Continue | Flow::Break => {
                    return Err(Error::runtime("jump inside a loop condition"));
                }
            }
            if !self.pop_value()?.to_boolean() {
                return Ok(None);
            }
            match self.block(&body, Units::Slots)? {
                Flow::Normal | Flow::Continue => {}
                Flow::Break => return Ok(None),
                Flow::Return(value) => return Ok(Some(Flow::Return(value))),
            }
        }
    }

    /// Executes an instruction that does not change control flow.
    fn step(&mut self, instruction: &Instruction) -> Result<()> {
        let operand = instruction.operand.as_ref();
        match instruction.opcode {
            OpCode::PUT => self.stack.push(Value::from_operand(operand)),
            OpCode::POP => {
                self.pop_value()?;
            }

            OpCode::GETVAR => {
                let value = self.read(operand)?;
                self.stack.push(value);
            }
            OpCode::SETVAR => {
                let value = self.pop_value()?;
                self.write(operand, value)?;
            }
            OpCode::GETPARAM => {
                let ordinal = int_operand(instruction)?;
                let value = self.read(Some(&Operand::Int(-ordinal)))?;
                self.stack.push(value);
            }
            OpCode::DELVAR => {
                let slot = local_slot(int_operand(instruction)?)?;
                if let Some(local) = self.locals.get_mut(slot) {
                    *local = Value::Null;
                }
            }

            OpCode::ADD
            | OpCode::SUB
            | OpCode::MUL
            | OpCode::DIV
            | OpCode::MOD
            | OpCode::POW
            | OpCode::EQ
            | OpCode::NEQ
            | OpCode::GT
            | OpCode::GE
            | OpCode::LT
            | OpCode::LE
            | OpCode::AND
            | OpCode::OR
            | OpCode::B_AND
            | OpCode::B_OR
            | OpCode::XOR
            | OpCode::LSHIFT
            | OpCode::RSHIFT => {
                let right = self.pop_value()?;
                let left = self.pop_value()?;
                self.stack.push(binary(instruction.opcode, left, right)?);
            }
            OpCode::INCREASE
            | OpCode::DECREASE
            | OpCode::INPLACE_MUL
            | OpCode::INPLACE_DIV
            | OpCode::INPLACE_MOD
            | OpCode::INPLACE_POW
            | OpCode::INPLACE_AND
            | OpCode::INPLACE_OR
            | OpCode::INPLACE_LSHIFT
            | OpCode::INPLACE_RSHIFT
            | OpCode::INPLACE_XOR => {
                let base = instruction
                    .opcode
                    .in_place_base()
                    .ok_or_else(|| Error::runtime("not an in-place opcode"))?;
                let right = self.pop_value()?;
                let current = self.read(operand)?;
                self.write(operand, binary(base, current, right)?)?;
            }
            OpCode::NEGATE => {
                let value = number(&self.pop_value()?, "-")?;
                self.stack.push(Value::Number(-value));
            }
            OpCode::NOT => {
                let value = self.pop_value()?;
                self.stack.push(Value::Boolean(!value.to_boolean()));
            }
            OpCode::B_NOT => {
                let value = number(&self.pop_value()?, "~")?;
                self.stack.push(Value::Number(!(value as i64) as f64));
            }

            OpCode::CREATE_ARR => {
                let count = int_operand(instruction)?;
                let mut items = Vec::new();
                for _ in 0..count {
                    items.push(self.pop_value()?);
                }
                self.stack.push(Value::list(items));
            }
            OpCode::CREATE_MAP => {
                let count = int_operand(instruction)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    let value = self.pop_value()?;
                    let key = self.pop_value()?;
                    entries.push((key, value));
                }
                entries.reverse();
                self.stack.push(Value::map(entries));
            }
            OpCode::GET => {
                let key = self.pop_value()?;
                let container = self.pop_value()?;
                self.stack.push(get(&container, &key)?);
            }
            OpCode::SET => {
                let value = self.pop_value()?;
                let key = self.pop_value()?;
                let container = self.pop_value()?;
                set(&container, key, value)?;
                self.stack.push(container);
            }

            OpCode::MKFUNC => {
                let name = text_operand(instruction)?;
                let arity = number(&self.pop_value()?, "MKFUNC")?;
                let body = self.pop_recording()?;
                let function = Rc::new(Function {
                    name: name.to_string(),
                    arity: arity as usize,
                    slots: declared_slots(&body),
                    body,
                });
                tracing::debug!(name, arity = function.arity, "defined function");
                self.functions.insert(name.to_string(), function.clone());
                self.last_function = Some(function);
            }
            OpCode::CALLFUNC => match operand {
                None => {
                    let value = self.pop_value()?;
                    self.output.push_str(&value.to_string());
                    self.output.push('\n');
                }
                Some(_) => {
                    let name = text_operand(instruction)?;
                    let function = self
                        .functions
                        .get(name)
                        .cloned()
                        .ok_or_else(|| Error::runtime(format!("undefined function {name:?}")))?;
                    let result = self.call(&function, None)?;
                    self.stack.push(result);
                }
            },
            OpCode::CALLMETHOD => {
                let key = text_operand(instruction)?;
                let receiver = self.pop_value()?;
                let (this, class) = match &receiver {
                    Value::Instance(this) => (this.clone(), this.class.clone()),
                    Value::Parent { this, class } => (this.clone(), class.clone()),
                    other => {
                        return Err(Error::runtime(format!(
                            "cannot call {key:?} on a {}",
                            other.type_of()
                        )));
                    }
                };
                let method = class.method(key).ok_or_else(|| {
                    Error::runtime(format!("class {} has no method {key:?}", class.name))
                })?;
                let result = self.call(&method, Some(this))?;
                self.stack.push(result);
            }
            OpCode::GETPTRTOLASTFUNC => {
                let function = self
                    .last_function
                    .clone()
                    .ok_or_else(|| Error::runtime("no function defined yet"))?;
                self.stack.push(Value::Function(function));
            }

            OpCode::CREATE_CLASS => {
                let name = text_operand(instruction)?;
                let class = self.create_class(name)?;
                self.classes.insert(name.to_string(), class);
            }
            OpCode::CREATE_INSTANCE => {
                let name = text_operand(instruction)?;
                let class = self
                    .classes
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::runtime(format!("undefined class {name:?}")))?;
                let instance = Rc::new(Instance {
                    fields: RefCell::new(class.fields()),
                    class: class.clone(),
                });
                if let Some(init) = class.method("<init>") {
                    self.call(&init, Some(instance.clone()))?;
                }
                self.stack.push(Value::Instance(instance));
            }
            OpCode::THIS => {
                let this = self
                    .frame()?
                    .this
                    .clone()
                    .ok_or_else(|| Error::runtime("this outside a method"))?;
                self.stack.push(Value::Instance(this));
            }

            other => {
                return Err(Error::runtime(format!("unsupported opcode {other}")));
            }
        }
        Ok(())
    }

    fn call(&mut self, function: &Function, this: Option<Rc<Instance>>) -> Result<Value> {
        if self.frames.len() > self.max_depth {
            return Err(Error::runtime(format!(
                "call depth exceeded in {}",
                function.name
            )));
        }
        let base = self
            .stack
            .len()
            .checked_sub(function.arity)
            .ok_or_else(|| Error::runtime(format!("missing arguments for {}", function.name)))?;
        let params = self.stack.split_off(base);
        let saved: Vec<Option<Value>> = function
            .slots
            .iter()
            .map(|&slot| self.locals.get(slot).cloned())
            .collect();

        self.frames.push(Frame { params, this });
        let body = function.body.clone();
        let flow = self.block(&body, Units::Slots);
        self.frames.pop();
        self.stack.truncate(base);
        for (&slot, value) in function.slots.iter().zip(saved) {
            if let Some(local) = self.locals.get_mut(slot) {
                *local = value.unwrap_or(Value::Null);
            }
        }

        match flow? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Null),
        }
    }

    fn create_class(&mut self, name: &str) -> Result<Rc<Class>> {
        let Value::Map(entries) = self.pop_value()? else {
            return Err(Error::runtime(format!("bad descriptor for class {name}")));
        };

        let mut parent = None;
        let mut members = Vec::new();
        for (key, value) in entries.borrow().iter() {
            match (key, value) {
                (Value::Boolean(false), Value::String(parent_name)) => {
                    let class = self.classes.get(parent_name).cloned().ok_or_else(|| {
                        Error::runtime(format!("undefined parent class {parent_name:?}"))
                    })?;
                    parent = Some(class);
                }
                (Value::String(member), value) => members.push((member.clone(), value.clone())),
                (other, _) => {
                    return Err(Error::runtime(format!(
                        "bad member key {other} in class {name}"
                    )));
                }
            }
        }

        Ok(Rc::new(Class {
            name: name.to_string(),
            members,
            parent,
        }))
    }

    /// Reads a variable addressed by a slot id, a negative parameter
    /// ordinal or a global name.
    fn read(&self, target: Option<&Operand>) -> Result<Value> {
        match target {
            Some(Operand::Int(id)) if *id < 0 => {
                let index = (-*id - 1) as usize;
                self.frame()?
                    .params
                    .get(index)
                    .cloned()
                    .ok_or_else(|| Error::runtime(format!("missing parameter {}", -id)))
            }
            Some(Operand::Int(id)) => self
                .locals
                .get(local_slot(*id)?)
                .cloned()
                .ok_or_else(|| Error::runtime(format!("unset local slot {id}"))),
            Some(Operand::Text(name)) => {
                if let Some(value) = self.globals.get(name) {
                    return Ok(value.clone());
                }
                self.functions
                    .get(name)
                    .map(|function| Value::Function(function.clone()))
                    .or_else(|| self.classes.get(name).map(|class| Value::Class(class.clone())))
                    .ok_or_else(|| Error::runtime(format!("undefined variable {name:?}")))
            }
            other => Err(Error::runtime(format!("bad variable operand {other:?}"))),
        }
    }

    fn write(&mut self, target: Option<&Operand>, value: Value) -> Result<()> {
        match target {
            Some(Operand::Int(id)) if *id < 0 => {
                let index = (-*id - 1) as usize;
                let param = self
                    .frame_mut()?
                    .params
                    .get_mut(index)
                    .ok_or_else(|| Error::runtime(format!("missing parameter {}", -id)))?;
                *param = value;
            }
            Some(Operand::Int(id)) => {
                let slot = local_slot(*id)?;
                if self.locals.len() <= slot {
                    self.locals.resize(slot + 1, Value::Null);
                }
                self.locals[slot] = value;
            }
            Some(Operand::Text(name)) => {
                self.globals.insert(name.clone(), value);
            }
            other => return Err(Error::runtime(format!("bad variable operand {other:?}"))),
        }
        Ok(())
    }

    fn frame(&self) -> Result<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| Error::runtime("no active frame"))
    }

    fn frame_mut(&mut self) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| Error::runtime("no active frame"))
    }

    fn pop_value(&mut self) -> Result<Value> {
        self.stack
            .pop()
            .ok_or_else(|| Error::runtime("stack underflow"))
    }

    fn pop_recording(&mut self) -> Result<Rc<[Instruction]>> {
        self.recordings
            .pop()
            .ok_or_else(|| Error::runtime("no recording to consume"))
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

/// Slots released by `DELVAR` anywhere in a body, nested recordings
/// included. These are the locals the body declares.
fn declared_slots(body: &[Instruction]) -> Vec<usize> {
    let mut slots: Vec<usize> = body
        .iter()
        .filter(|instruction| instruction.opcode == OpCode::DELVAR)
        .filter_map(|instruction| match instruction.operand {
            Some(Operand::Int(id)) => usize::try_from(id).ok(),
            _ => None,
        })
        .collect();
    slots.sort_unstable();
    slots.dedup();
    slots
}

/// Position of every instruction in `units`, plus the total length.
fn unit_offsets(code: &[Instruction], units: Units) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(code.len() + 1);
    let mut position = 0;
    for instruction in code {
        offsets.push(position);
        position += match units {
            Units::Instructions => 1,
            Units::Slots => instruction.width(),
        };
    }
    offsets.push(position);
    offsets
}

/// Index of the instruction `offset` units after the one at `pc`.
fn jump(offsets: &[usize], pc: usize, offset: i64) -> Result<usize> {
    let target = offsets[pc + 1] as i64 + offset;
    usize::try_from(target)
        .ok()
        .and_then(|target| offsets.binary_search(&target).ok())
        .ok_or_else(|| Error::runtime(format!("skip of {offset} lands outside an instruction")))
}

/// Index of the `END` closing the `REC` at `start`.
fn matching_end(code: &[Instruction], start: usize) -> Result<usize> {
    let mut depth = 0usize;
    for (index, instruction) in code.iter().enumerate().skip(start) {
        match instruction.opcode {
            OpCode::REC => depth += 1,
            OpCode::END => {
                depth -= 1;
                if depth == 0 {
                    return Ok(index);
                }
            }
            _ => {}
        }
    }
    Err(Error::runtime("REC without END"))
}

fn int_operand(instruction: &Instruction) -> Result<i64> {
    match instruction.operand {
        Some(Operand::Int(value)) => Ok(value),
        _ => Err(Error::runtime(format!(
            "{} needs an integer operand",
            instruction.opcode
        ))),
    }
}

fn text_operand(instruction: &Instruction) -> Result<&str> {
    match &instruction.operand {
        Some(Operand::Text(text)) => Ok(text),
        _ => Err(Error::runtime(format!(
            "{} needs a text operand",
            instruction.opcode
        ))),
    }
}

fn local_slot(id: i64) -> Result<usize> {
    usize::try_from(id).map_err(|_| Error::runtime(format!("bad slot id {id}")))
}

fn number(value: &Value, op: &str) -> Result<f64> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Boolean(b) => Ok(f64::from(u8::from(*b))),
        other => Err(Error::runtime(format!(
            "{op} expects a number, got {}",
            other.type_of()
        ))),
    }
}

fn binary(opcode: OpCode, left: Value, right: Value) -> Result<Value> {
    let name = opcode.name();
    let value = match opcode {
        OpCode::ADD => match (&left, &right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Value::String(format!("{left}{right}"))
            }
            (Value::List(a), Value::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                Value::list(items)
            }
            _ => Value::Number(number(&left, name)? + number(&right, name)?),
        },
        OpCode::SUB => Value::Number(number(&left, name)? - number(&right, name)?),
        OpCode::MUL => Value::Number(number(&left, name)? * number(&right, name)?),
        OpCode::DIV => Value::Number(number(&left, name)? / number(&right, name)?),
        OpCode::MOD => Value::Number(number(&left, name)? % number(&right, name)?),
        OpCode::POW => Value::Number(number(&left, name)?.powf(number(&right, name)?)),

        OpCode::EQ => Value::Boolean(loose_equals(&left, &right)),
        OpCode::NEQ => Value::Boolean(!loose_equals(&left, &right)),
        OpCode::GT | OpCode::GE | OpCode::LT | OpCode::LE => {
            let ordering = compare(&left, &right).ok_or_else(|| {
                Error::runtime(format!(
                    "cannot order {} and {}",
                    left.type_of(),
                    right.type_of()
                ))
            })?;
            Value::Boolean(match opcode {
                OpCode::GT => ordering == Ordering::Greater,
                OpCode::GE => ordering != Ordering::Less,
                OpCode::LT => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            })
        }
        OpCode::AND => Value::Boolean(left.to_boolean() && right.to_boolean()),
        OpCode::OR => Value::Boolean(left.to_boolean() || right.to_boolean()),

        OpCode::B_AND | OpCode::B_OR | OpCode::XOR | OpCode::LSHIFT | OpCode::RSHIFT => {
            let a = number(&left, name)? as i64;
            let b = number(&right, name)? as i64;
            let result = match opcode {
                OpCode::B_AND => a & b,
                OpCode::B_OR => a | b,
                OpCode::XOR => a ^ b,
                OpCode::LSHIFT => a.wrapping_shl(b as u32),
                _ => a.wrapping_shr(b as u32),
            };
            Value::Number(result as f64)
        }
        other => return Err(Error::runtime(format!("{other} is not a binary operator"))),
    };
    Ok(value)
}

fn index(key: &Value, len: usize) -> Result<usize> {
    match key {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && (*n as usize) < len => Ok(*n as usize),
        other => Err(Error::runtime(format!("index {other} out of range"))),
    }
}

fn get(container: &Value, key: &Value) -> Result<Value> {
    match (container, key) {
        (Value::List(items), Value::String(field)) if field == "length" => {
            Ok(Value::Number(items.borrow().len() as f64))
        }
        (Value::String(text), Value::String(field)) if field == "length" => {
            Ok(Value::Number(text.chars().count() as f64))
        }
        (Value::List(items), key) => {
            let items = items.borrow();
            Ok(items[index(key, items.len())?].clone())
        }
        (Value::String(text), key) => {
            let chars: Vec<char> = text.chars().collect();
            Ok(Value::String(chars[index(key, chars.len())?].to_string()))
        }
        (Value::Map(entries), key) => Ok(entries
            .borrow()
            .iter()
            .find(|(k, _)| loose_equals(k, key))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()),
        (Value::Instance(this), Value::Boolean(true)) => parent_view(this, &this.class),
        (Value::Parent { this, class }, Value::Boolean(true)) => parent_view(this, class),
        (Value::Instance(this) | Value::Parent { this, .. }, Value::String(field)) => {
            if let Some(value) = this.fields.borrow().get(field) {
                return Ok(value.clone());
            }
            this.class
                .method(&format!("#{field}"))
                .map(Value::Function)
                .ok_or_else(|| Error::runtime(format!("no field {field:?} on {}", this.class.name)))
        }
        (other, key) => Err(Error::runtime(format!(
            "cannot read {key} of a {}",
            other.type_of()
        ))),
    }
}

fn parent_view(this: &Rc<Instance>, class: &Class) -> Result<Value> {
    let parent = class
        .parent
        .clone()
        .ok_or_else(|| Error::runtime(format!("class {} has no parent", class.name)))?;
    Ok(Value::Parent {
        this: this.clone(),
        class: parent,
    })
}

fn set(container: &Value, key: Value, value: Value) -> Result<()> {
    match (container, key) {
        (Value::List(items), key) => {
            let mut items = items.borrow_mut();
            if matches!(key, Value::Number(n) if n == items.len() as f64) {
                items.push(value);
            } else {
                let slot = index(&key, items.len())?;
                items[slot] = value;
            }
        }
        (Value::Map(entries), key) => {
            let mut entries = entries.borrow_mut();
            match entries.iter_mut().find(|(k, _)| loose_equals(k, &key)) {
                Some((_, existing)) => *existing = value,
                None => entries.push((key, value)),
            }
        }
        (Value::Instance(this) | Value::Parent { this, .. }, Value::String(field)) => {
            this.fields.borrow_mut().insert(field, value);
        }
        (other, key) => {
            return Err(Error::runtime(format!(
                "cannot assign {key} of a {}",
                other.type_of()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: Vec<Instruction>) -> Machine {
        let mut machine = Machine::new();
        machine.run(&Bytecode::from(code)).unwrap();
        machine
    }

    fn put(value: i64) -> Instruction {
        Instruction::with_operand(OpCode::PUT, Operand::Int(value))
    }

    fn op(opcode: OpCode) -> Instruction {
        Instruction::simple(opcode)
    }

    fn with(opcode: OpCode, operand: Operand) -> Instruction {
        Instruction::with_operand(opcode, operand)
    }

    #[test]
    fn test_arithmetic() {
        let machine = run(vec![put(7), put(2), op(OpCode::SUB), put(3), op(OpCode::MUL)]);
        assert_eq!(machine.stack(), &[Value::Number(15.0)]);
    }

    #[test]
    fn test_top_level_skip_counts_instructions() {
        let machine = run(vec![
            with(OpCode::PUT, Operand::Bool(false)),
            with(OpCode::SKIPIFN, Operand::Int(2)),
            put(1),
            put(2),
            put(3),
        ]);
        assert_eq!(machine.stack(), &[Value::Number(3.0)]);
    }

    #[test]
    fn test_recorded_skip_counts_slots() {
        // f() { SKIP 2; PUT 1; PUT 2; RETURN }
        let machine = run(vec![
            op(OpCode::REC),
            with(OpCode::SKIP, Operand::Int(2)),
            put(1),
            put(2),
            op(OpCode::RETURN),
            op(OpCode::END),
            put(0),
            with(OpCode::MKFUNC, Operand::Text("f".into())),
            with(OpCode::CALLFUNC, Operand::Text("f".into())),
        ]);
        assert_eq!(machine.stack(), &[Value::Number(2.0)]);
    }

    #[test]
    fn test_skip_into_an_operand_fails() {
        let mut machine = Machine::new();
        let code = Bytecode::from(vec![
            op(OpCode::REC),
            with(OpCode::SKIP, Operand::Int(1)),
            put(1),
            op(OpCode::END),
            put(0),
            with(OpCode::MKFUNC, Operand::Text("f".into())),
            with(OpCode::CALLFUNC, Operand::Text("f".into())),
        ]);
        assert!(matches!(machine.run(&code), Err(Error::Runtime(_))));
    }

    #[test]
    fn test_native_loop() {
        // i = 0; while i < 3 { i; i += 1 }
        let machine = run(vec![
            put(0),
            with(OpCode::SETVAR, Operand::Text("i".into())),
            op(OpCode::REC),
            with(OpCode::GETVAR, Operand::Text("i".into())),
            put(1),
            with(OpCode::INCREASE, Operand::Text("i".into())),
            op(OpCode::END),
            op(OpCode::REC),
            with(OpCode::GETVAR, Operand::Text("i".into())),
            put(3),
            op(OpCode::LT),
            op(OpCode::END),
            op(OpCode::WHILE),
        ]);
        assert_eq!(
            machine.stack(),
            &[Value::Number(0.0), Value::Number(1.0), Value::Number(2.0)]
        );
        assert_eq!(machine.global("i"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn test_print_appends_output() {
        let mut machine = run(vec![
            with(OpCode::PUT, Operand::Text("hi".into())),
            op(OpCode::CALLFUNC),
        ]);
        assert_eq!(machine.output(), "hi\n");
        assert_eq!(machine.take_output(), "hi\n");
        assert!(machine.output().is_empty());
    }

    #[test]
    fn test_collections() {
        let machine = run(vec![
            put(2),
            put(1),
            with(OpCode::CREATE_ARR, Operand::Int(2)),
            put(1),
            op(OpCode::GET),
        ]);
        assert_eq!(machine.stack(), &[Value::Number(2.0)]);

        let machine = run(vec![
            with(OpCode::PUT, Operand::Text("a".into())),
            put(1),
            with(OpCode::CREATE_MAP, Operand::Int(1)),
            with(OpCode::PUT, Operand::Text("b".into())),
            put(2),
            op(OpCode::SET),
        ]);
        assert_eq!(machine.stack()[0].to_string(), "{\"a\": 1, \"b\": 2}");
    }

    #[test]
    fn test_locals_and_params() {
        // f(a) { var x = a * 10; return x + a }
        let machine = run(vec![
            op(OpCode::REC),
            with(OpCode::GETPARAM, Operand::Int(1)),
            put(10),
            op(OpCode::MUL),
            with(OpCode::SETVAR, Operand::Int(0)),
            with(OpCode::GETVAR, Operand::Int(0)),
            with(OpCode::GETPARAM, Operand::Int(1)),
            op(OpCode::ADD),
            op(OpCode::RETURN),
            op(OpCode::END),
            put(1),
            with(OpCode::MKFUNC, Operand::Text("f".into())),
            put(4),
            with(OpCode::CALLFUNC, Operand::Text("f".into())),
        ]);
        assert_eq!(machine.stack(), &[Value::Number(44.0)]);
    }

    #[test]
    fn test_calls_share_enclosing_slots() {
        // x = 5; f() { x = x + 1; var y = 9 }; f(); x; y
        let machine = run(vec![
            put(5),
            with(OpCode::SETVAR, Operand::Int(0)),
            put(7),
            with(OpCode::SETVAR, Operand::Int(1)),
            op(OpCode::REC),
            put(1),
            with(OpCode::INCREASE, Operand::Int(0)),
            put(9),
            with(OpCode::SETVAR, Operand::Int(1)),
            with(OpCode::DELVAR, Operand::Int(1)),
            op(OpCode::END),
            put(0),
            with(OpCode::MKFUNC, Operand::Text("f".into())),
            with(OpCode::CALLFUNC, Operand::Text("f".into())),
            op(OpCode::POP),
            with(OpCode::GETVAR, Operand::Int(0)),
            with(OpCode::GETVAR, Operand::Int(1)),
        ]);
        assert_eq!(machine.stack(), &[Value::Number(6.0), Value::Number(7.0)]);
    }

    #[test]
    fn test_runaway_recursion_is_an_error() {
        let mut machine = Machine::new().with_max_depth(8);
        let code = Bytecode::from(vec![
            op(OpCode::REC),
            with(OpCode::CALLFUNC, Operand::Text("f".into())),
            op(OpCode::END),
            put(0),
            with(OpCode::MKFUNC, Operand::Text("f".into())),
            with(OpCode::CALLFUNC, Operand::Text("f".into())),
        ]);
        assert!(matches!(machine.run(&code), Err(Error::Runtime(msg)) if msg.contains("depth")));
    }

    #[test]
    fn test_recover_keeps_globals() {
        let mut machine = Machine::new().with_max_depth(8);
        let code = Bytecode::from(vec![
            put(7),
            with(OpCode::SETVAR, Operand::Text("g".into())),
            op(OpCode::REC),
            with(OpCode::CALLFUNC, Operand::Text("f".into())),
            op(OpCode::END),
            put(0),
            with(OpCode::MKFUNC, Operand::Text("f".into())),
            with(OpCode::CALLFUNC, Operand::Text("f".into())),
        ]);
        assert!(machine.run(&code).is_err());

        machine.recover(0);
        let code = Bytecode::from(vec![with(OpCode::GETVAR, Operand::Text("g".into()))]);
        machine.run(&code).unwrap();
        assert_eq!(machine.stack(), &[Value::Number(7.0)]);
    }

    #[test]
    fn test_stray_break() {
        let mut machine = Machine::new();
        let code = Bytecode::from(vec![op(OpCode::BREAK)]);
        assert!(machine.run(&code).is_err());
    }

    #[test]
    fn test_unsupported_opcode() {
        let mut machine = Machine::new();
        let code = Bytecode::from(vec![op(OpCode::WHILET)]);
        assert!(matches!(machine.run(&code), Err(Error::Runtime(msg)) if msg.contains("WHILET")));
    }
}
