//! A reference stack machine for generated bytecode.
//!
//! It follows the external interpreter's conventions: top-level skips count
//! instructions, skips inside recorded bodies count raw slots, `REC`/`END`
//! record a body for `WHILE` or `MKFUNC`, and `CALLFUNC null` prints.
//!
//! ## Structure
//!
//! - `interpreter` - The [`Machine`]
//! - `value` - Runtime values, functions, classes and instances
//! - `comparison` - Equality with coercion and ordering

mod interpreter;

pub mod comparison;
pub mod value;

pub use interpreter::{DEFAULT_MAX_DEPTH, Machine};
pub use value::{Class, Function, Instance, Value};
