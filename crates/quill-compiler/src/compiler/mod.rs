//! Passes over the parsed tree and the bytecode they produce.
//!
//! # Module Structure
//!
//! - `scope`: Scope resolution and slot allocation
//! - `optimize`: In-place assignment tagging
//! - `codegen`: Code generation from the resolved tree
//! - `bytecode`: Instructions, opcodes and the disassembler

pub mod bytecode;
pub mod codegen;
pub mod optimize;
pub mod scope;

pub use bytecode::{Bytecode, Instruction, OpCode, Operand, Slot};
pub use codegen::{Generator, GeneratorConfig, Mode};
pub use optimize::{InPlace, Optimizer};
pub use scope::{Binding, Bindings, Resolver, SlotAllocator};
