//! Bytecode definitions, the disassembler and its inverse.
//!
//! ## Disassembly Format
//!
//! One instruction per line. Operand-less opcodes are printed alone,
//! everything else as `NAME<tab>OPERAND`:
//!
//! ```text
//! PUT	NUM0
//! SETVAR	TXTi
//! CALLFUNC	null
//! POP
//! ```
//!
//! | Operand | Printed as |
//! |---------|------------|
//! | absent | `null` |
//! | `Bool` | `BOOLtrue` / `BOOLfalse` |
//! | `Int` | `NUM<int>` |
//! | `Decimal` | `DEC<decimal>` |
//! | `Text` | `TXT<text>`, with `\n`, `\t`, `\r` and `\\` escaped |

use std::fmt;

use crate::ast::BinaryOp;
use crate::decimal::Decimal;
use crate::error::{Error, Result};

/// A flat instruction array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    /// The instructions
    pub instructions: Vec<Instruction>,
}

impl Bytecode {
    /// Creates a new empty chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instruction and returns its index.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let index = self.instructions.len();
        self.instructions.push(instruction);
        index
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if there are no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Number of raw slots the instructions occupy.
    pub fn slot_len(&self) -> usize {
        self.instructions.iter().map(Instruction::width).sum()
    }

    /// Iterates over the instructions.
    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// Renders one line per instruction.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for instruction in &self.instructions {
            out.push_str(&instruction.to_string());
            out.push('\n');
        }
        out
    }

    /// Parses a listing produced by [`disassemble`](Self::disassemble).
    ///
    /// Blank lines are skipped.
    pub fn assemble(listing: &str) -> Result<Self> {
        let mut bytecode = Self::new();
        for (index, line) in listing.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            bytecode.emit(Instruction::parse(line, index + 1)?);
        }
        Ok(bytecode)
    }

    /// Flattens to the raw slot array the external machine reads.
    pub fn to_slots(&self) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(self.slot_len());
        for instruction in &self.instructions {
            slots.push(Slot::Op(instruction.opcode.code()));
            if instruction.width() == 2 {
                slots.push(Slot::Operand(instruction.operand.clone()));
            }
        }
        slots
    }
}

impl From<Vec<Instruction>> for Bytecode {
    fn from(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }
}

impl<'a> IntoIterator for &'a Bytecode {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.disassemble())
    }
}

/// One entry of the raw slot array.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// An opcode
    Op(u8),
    /// The operand of the opcode before it
    Operand(Option<Operand>),
}

/// A single bytecode instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation code
    pub opcode: OpCode,
    /// Optional operand
    pub operand: Option<Operand>,
}

impl Instruction {
    /// Creates a new instruction with no operand.
    pub fn simple(opcode: OpCode) -> Self {
        Self {
            opcode,
            operand: None,
        }
    }

    /// Creates a new instruction with an operand.
    pub fn with_operand(opcode: OpCode, operand: Operand) -> Self {
        Self {
            opcode,
            operand: Some(operand),
        }
    }

    /// Number of raw slots: the opcode plus an operand slot when the opcode
    /// is parameterized or an operand is present.
    pub fn width(&self) -> usize {
        if self.operand.is_some() || self.opcode.takes_operand() {
            2
        } else {
            1
        }
    }

    fn parse(line: &str, number: usize) -> Result<Self> {
        let (name, operand) = match line.split_once('\t') {
            Some((name, operand)) => (name, Some(operand)),
            None => (line, None),
        };
        let opcode = OpCode::from_name(name.trim())
            .ok_or_else(|| Error::disassembly(number, format!("unknown opcode {name:?}")))?;
        let operand = match operand {
            Some(text) => Operand::parse(text).map_err(|reason| Error::disassembly(number, reason))?,
            None => None,
        };
        Ok(Self { opcode, operand })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.name())?;
        match &self.operand {
            Some(operand) => write!(f, "\t{operand}"),
            None if self.opcode.takes_operand() => f.write_str("\tnull"),
            None => Ok(()),
        }
    }
}

/// Instruction operands. The machine infers the type from the tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Boolean literal
    Bool(bool),
    /// Counts, skip offsets, slot ids and integral number literals
    Int(i64),
    /// Non-integral number literals
    Decimal(Decimal),
    /// Names and string literals
    Text(String),
}

impl Operand {
    /// Parses a printed operand. `null` is the absent operand.
    fn parse(text: &str) -> std::result::Result<Option<Self>, String> {
        if text == "null" {
            return Ok(None);
        }
        let operand = if let Some(rest) = text.strip_prefix("BOOL") {
            match rest {
                "true" => Self::Bool(true),
                "false" => Self::Bool(false),
                _ => return Err(format!("bad boolean {rest:?}")),
            }
        } else if let Some(rest) = text.strip_prefix("NUM") {
            Self::Int(rest.parse().map_err(|_| format!("bad integer {rest:?}"))?)
        } else if let Some(rest) = text.strip_prefix("DEC") {
            Self::Decimal(rest.parse().map_err(|_| format!("bad decimal {rest:?}"))?)
        } else if let Some(rest) = text.strip_prefix("TXT") {
            Self::Text(unescape(rest))
        } else {
            return Err(format!("unknown operand {text:?}"));
        };
        Ok(Some(operand))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "BOOL{value}"),
            Self::Int(value) => write!(f, "NUM{value}"),
            Self::Decimal(value) => write!(f, "DEC{value}"),
            Self::Text(value) => write!(f, "TXT{}", escape(value)),
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $code:literal,)*) => {
        /// Operation codes of the external stack machine, with its numbering.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        #[allow(non_camel_case_types, clippy::upper_case_acronyms)]
        pub enum OpCode {
            $($(#[$doc])* $name = $code,)*
        }

        impl OpCode {
            /// Every opcode, in numeric order.
            pub const ALL: &'static [OpCode] = &[$(OpCode::$name,)*];

            /// Printed name.
            pub fn name(self) -> &'static str {
                match self {
                    $(OpCode::$name => stringify!($name),)*
                }
            }

            /// Looks an opcode up by its printed name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($name) => Some(OpCode::$name),)*
                    _ => None,
                }
            }

            /// Looks an opcode up by its numeric code.
            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(OpCode::$name),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    /// Push the operand
    PUT = 1,
    /// Add top two values
    ADD = 2,
    /// Subtract
    SUB = 3,
    /// Multiply
    MUL = 4,
    /// Divide
    DIV = 5,
    /// Modulo
    MOD = 6,
    /// Exponentiation
    POW = 7,
    /// Store to a slot, parameter or global
    SETVAR = 8,
    /// Load from a slot or global
    GETVAR = 9,
    /// Release a slot
    DELVAR = 10,
    /// Start recording
    REC = 11,
    /// Stop recording
    END = 12,
    /// Skip if true
    SKIPIF = 13,
    /// Skip if false
    SKIPIFN = 14,
    /// Replay the two last recordings as condition and body
    WHILE = 15,
    /// Not equal
    NEQ = 16,
    /// Equal
    EQ = 17,
    /// Greater than
    GT = 18,
    /// Greater or equal
    GE = 19,
    /// Less than
    LT = 20,
    /// Less or equal
    LE = 21,
    /// Less or equal, alternate encoding
    LEQ = 22,
    /// Logical and
    AND = 23,
    /// Logical or
    OR = 24,
    /// Bitwise and
    B_AND = 25,
    /// Bitwise or
    B_OR = 26,
    /// Bitwise not
    B_NOT = 27,
    /// Logical not
    NOT = 28,
    /// Left shift
    LSHIFT = 29,
    /// Right shift
    RSHIFT = 30,
    /// Bitwise xor
    XOR = 31,
    /// Arithmetic negation
    NEGATE = 32,
    /// Discard the top value
    POP = 33,
    /// Build a list from the top values
    CREATE_ARR = 34,
    /// Read a field, entry or element
    GET = 35,
    /// Write a field, entry or element
    SET = 36,
    /// Build a map from the top key/value pairs
    CREATE_MAP = 37,
    /// Install the last recording as a function
    MKFUNC = 38,
    /// Call a function by name; no name prints
    CALLFUNC = 39,
    /// Load a parameter
    GETPARAM = 40,
    /// Next loop iteration
    CONTINUE = 41,
    /// Leave the loop
    BREAK = 42,
    /// Leave the function
    RETURN = 43,
    /// Replay while true, condition first
    WHILET = 44,
    /// Unconditional skip
    SKIP = 45,
    /// Create a class from a descriptor map
    CREATE_CLASS = 46,
    /// Instantiate a class by name
    CREATE_INSTANCE = 47,
    /// Call a function stored in an instance
    CALLFUNCFROMINS = 48,
    /// Call a method on a receiver
    CALLMETHOD = 49,
    /// Push the current instance
    THIS = 50,
    /// Push a reference to the last installed function
    GETPTRTOLASTFUNC = 51,
    /// Instance-of test
    IS = 52,
    /// In-place add
    INCREASE = 53,
    /// In-place subtract
    DECREASE = 54,
    /// In-place multiply
    INPLACE_MUL = 55,
    /// In-place divide
    INPLACE_DIV = 56,
    /// In-place modulo
    INPLACE_MOD = 57,
    /// In-place exponentiation
    INPLACE_POW = 58,
    /// In-place bitwise and
    INPLACE_AND = 59,
    /// In-place bitwise or
    INPLACE_OR = 60,
    /// In-place left shift
    INPLACE_LSHIFT = 61,
    /// In-place right shift
    INPLACE_RSHIFT = 62,
    /// In-place xor
    INPLACE_XOR = 63,
    /// Call into a native library
    DLCALL = 64,
}

impl OpCode {
    /// Numeric code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns true if the opcode always occupies an operand slot.
    pub fn takes_operand(self) -> bool {
        use OpCode::*;
        matches!(
            self,
            PUT | GETVAR
                | SETVAR
                | DELVAR
                | CREATE_ARR
                | CREATE_MAP
                | INCREASE
                | DECREASE
                | MKFUNC
                | CALLFUNC
                | GETPARAM
                | SKIPIFN
                | SKIPIF
                | SKIP
                | CREATE_CLASS
                | CREATE_INSTANCE
                | CALLFUNCFROMINS
                | CALLMETHOD
                | IS
                | INPLACE_MUL
                | INPLACE_DIV
                | INPLACE_MOD
                | INPLACE_POW
                | INPLACE_AND
                | INPLACE_OR
                | INPLACE_LSHIFT
                | INPLACE_RSHIFT
                | INPLACE_XOR
                | DLCALL
        )
    }

    /// The opcode computing a binary operator.
    pub fn binary(op: BinaryOp) -> Self {
        match op {
            BinaryOp::Add => Self::ADD,
            BinaryOp::Sub => Self::SUB,
            BinaryOp::Mul => Self::MUL,
            BinaryOp::Div => Self::DIV,
            BinaryOp::Mod => Self::MOD,
            BinaryOp::Pow => Self::POW,
            BinaryOp::Equals => Self::EQ,
            BinaryOp::NotEquals => Self::NEQ,
            BinaryOp::Greater => Self::GT,
            BinaryOp::GreaterEquals => Self::GE,
            BinaryOp::Less => Self::LT,
            BinaryOp::LessEquals => Self::LE,
            BinaryOp::And => Self::AND,
            BinaryOp::Or => Self::OR,
            BinaryOp::BitwiseAnd => Self::B_AND,
            BinaryOp::BitwiseOr => Self::B_OR,
            BinaryOp::Xor => Self::XOR,
            BinaryOp::LeftShift => Self::LSHIFT,
            BinaryOp::RightShift => Self::RSHIFT,
        }
    }

    /// The compound opcode updating a variable in place, if the operator
    /// has one.
    pub fn in_place(op: BinaryOp) -> Option<Self> {
        Some(match op {
            BinaryOp::Add => Self::INCREASE,
            BinaryOp::Sub => Self::DECREASE,
            BinaryOp::Mul => Self::INPLACE_MUL,
            BinaryOp::Div => Self::INPLACE_DIV,
            BinaryOp::Mod => Self::INPLACE_MOD,
            BinaryOp::Pow => Self::INPLACE_POW,
            BinaryOp::BitwiseAnd => Self::INPLACE_AND,
            BinaryOp::BitwiseOr => Self::INPLACE_OR,
            BinaryOp::LeftShift => Self::INPLACE_LSHIFT,
            BinaryOp::RightShift => Self::INPLACE_RSHIFT,
            BinaryOp::Xor => Self::INPLACE_XOR,
            _ => return None,
        })
    }

    /// The plain operator behind an in-place opcode.
    pub fn in_place_base(self) -> Option<Self> {
        Some(match self {
            Self::INCREASE => Self::ADD,
            Self::DECREASE => Self::SUB,
            Self::INPLACE_MUL => Self::MUL,
            Self::INPLACE_DIV => Self::DIV,
            Self::INPLACE_MOD => Self::MOD,
            Self::INPLACE_POW => Self::POW,
            Self::INPLACE_AND => Self::B_AND,
            Self::INPLACE_OR => Self::B_OR,
            Self::INPLACE_LSHIFT => Self::LSHIFT,
            Self::INPLACE_RSHIFT => Self::RSHIFT,
            Self::INPLACE_XOR => Self::XOR,
            _ => return None,
        })
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbering() {
        assert_eq!(OpCode::PUT.code(), 1);
        assert_eq!(OpCode::WHILE.code(), 15);
        assert_eq!(OpCode::SKIP.code(), 45);
        assert_eq!(OpCode::DLCALL.code(), 64);
        assert_eq!(OpCode::ALL.len(), 64);
        for (i, op) in OpCode::ALL.iter().enumerate() {
            assert_eq!(op.code() as usize, i + 1);
            assert_eq!(OpCode::from_code(op.code()), Some(*op));
            assert_eq!(OpCode::from_name(op.name()), Some(*op));
        }
    }

    #[test]
    fn test_width() {
        assert_eq!(Instruction::simple(OpCode::POP).width(), 1);
        assert_eq!(Instruction::simple(OpCode::CALLFUNC).width(), 2);
        assert_eq!(
            Instruction::with_operand(OpCode::CONTINUE, Operand::Int(0)).width(),
            2
        );
    }

    #[test]
    fn test_disassembly_lines() {
        let code = Bytecode::from(vec![
            Instruction::with_operand(OpCode::PUT, Operand::Int(0)),
            Instruction::with_operand(OpCode::SETVAR, Operand::Text("i".into())),
            Instruction::simple(OpCode::CALLFUNC),
            Instruction::with_operand(OpCode::PUT, Operand::Bool(true)),
            Instruction::with_operand(OpCode::PUT, Operand::Decimal("2.5".parse().unwrap())),
            Instruction::simple(OpCode::POP),
        ]);
        assert_eq!(
            code.disassemble(),
            "PUT\tNUM0\nSETVAR\tTXTi\nCALLFUNC\tnull\nPUT\tBOOLtrue\nPUT\tDEC2.5\nPOP\n"
        );
    }

    #[test]
    fn test_text_escapes_survive_assembly() {
        let code = Bytecode::from(vec![Instruction::with_operand(
            OpCode::PUT,
            Operand::Text("a\tb\nc\\".into()),
        )]);
        let listing = code.disassemble();
        assert_eq!(listing.lines().count(), 1);
        assert_eq!(Bytecode::assemble(&listing).unwrap(), code);
    }

    #[test]
    fn test_assemble_errors() {
        assert!(matches!(
            Bytecode::assemble("PUT\tNUM1\nFROB"),
            Err(Error::Disassembly { line: 2, .. })
        ));
        assert!(matches!(
            Bytecode::assemble("PUT\tNUMx"),
            Err(Error::Disassembly { line: 1, .. })
        ));
    }

    #[test]
    fn test_to_slots() {
        let code = Bytecode::from(vec![
            Instruction::simple(OpCode::CALLFUNC),
            Instruction::simple(OpCode::POP),
        ]);
        assert_eq!(
            code.to_slots(),
            vec![Slot::Op(39), Slot::Operand(None), Slot::Op(33)]
        );
        assert_eq!(code.slot_len(), 3);
    }

    #[test]
    fn test_in_place_forms() {
        assert_eq!(OpCode::in_place(BinaryOp::Add), Some(OpCode::INCREASE));
        assert_eq!(OpCode::in_place(BinaryOp::Pow), Some(OpCode::INPLACE_POW));
        assert_eq!(OpCode::in_place(BinaryOp::Less), None);
        assert_eq!(OpCode::INPLACE_XOR.in_place_base(), Some(OpCode::XOR));
    }
}
