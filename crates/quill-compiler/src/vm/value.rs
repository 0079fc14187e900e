//! Runtime values of the reference machine.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::compiler::bytecode::{Instruction, Operand};

/// A value on the machine's stack.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// null
    #[default]
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// List, shared by reference
    List(Rc<RefCell<Vec<Value>>>),
    /// Map in insertion order, shared by reference
    Map(Rc<RefCell<Vec<(Value, Value)>>>),
    /// Function
    Function(Rc<Function>),
    /// Class
    Class(Rc<Class>),
    /// Class instance
    Instance(Rc<Instance>),
    /// An instance seen as one of its ancestors, produced by `super`
    Parent {
        /// The instance
        this: Rc<Instance>,
        /// The ancestor whose methods are used
        class: Rc<Class>,
    },
}

/// A function recorded with `MKFUNC`.
#[derive(Debug)]
pub struct Function {
    /// Registered name
    pub name: String,
    /// Number of parameters popped by a call
    pub arity: usize,
    /// Local slots the body declares
    pub slots: Vec<usize>,
    /// Recorded body, executed in slot units
    pub body: Rc<[Instruction]>,
}

/// A class registered with `CREATE_CLASS`.
#[derive(Debug)]
pub struct Class {
    /// Class name
    pub name: String,
    /// Descriptor entries: fields by name, methods under `#name`, the
    /// constructor under `<init>`
    pub members: Vec<(String, Value)>,
    /// Parent class
    pub parent: Option<Rc<Class>>,
}

impl Class {
    /// Finds a method by descriptor key, searching ancestors.
    pub fn method(&self, key: &str) -> Option<Rc<Function>> {
        let own = self.members.iter().find_map(|(name, value)| match value {
            Value::Function(function) if name == key => Some(function.clone()),
            _ => None,
        });
        own.or_else(|| self.parent.as_ref().and_then(|parent| parent.method(key)))
    }

    /// Initial field values, ancestors first.
    pub fn fields(&self) -> FxHashMap<String, Value> {
        let mut fields = self
            .parent
            .as_ref()
            .map(|parent| parent.fields())
            .unwrap_or_default();
        for (name, value) in &self.members {
            if !name.starts_with('#') && name != "<init>" {
                fields.insert(name.clone(), value.clone());
            }
        }
        fields
    }
}

/// An object created with `CREATE_INSTANCE`.
#[derive(Debug)]
pub struct Instance {
    /// Its class
    pub class: Rc<Class>,
    /// Field values
    pub fields: RefCell<FxHashMap<String, Value>>,
}

impl Value {
    /// Creates a list value.
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Creates a map value.
    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    /// The constant an instruction operand stands for.
    pub fn from_operand(operand: Option<&Operand>) -> Self {
        match operand {
            None => Value::Null,
            Some(Operand::Bool(value)) => Value::Boolean(*value),
            Some(Operand::Int(value)) => Value::Number(*value as f64),
            Some(Operand::Decimal(value)) => Value::Number(value.to_f64()),
            Some(Operand::Text(text)) => Value::String(text.clone()),
        }
    }

    /// Truthiness used by conditions and logical operators.
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => !n.is_nan() && *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Map(entries) => !entries.borrow().is_empty(),
            Value::Function(_) | Value::Class(_) | Value::Instance(_) | Value::Parent { .. } => {
                true
            }
        }
    }

    /// Returns the type of this value as a string.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
            Value::Class(_) => "class",
            Value::Instance(_) | Value::Parent { .. } => "instance",
        }
    }

    fn repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.repr(f)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    key.repr(f)?;
                    write!(f, ": ")?;
                    value.repr(f)?;
                }
                write!(f, "}}")
            }
            Value::Function(function) => write!(f, "<func {}>", function.name),
            Value::Class(class) => write!(f, "<class {}>", class.name),
            Value::Instance(instance) | Value::Parent { this: instance, .. } => {
                write!(f, "<{} instance>", instance.class.name)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Decimal;

    #[test]
    fn test_to_boolean() {
        assert!(!Value::Null.to_boolean());
        assert!(!Value::Number(0.0).to_boolean());
        assert!(Value::Number(-1.0).to_boolean());
        assert!(!Value::from("").to_boolean());
        assert!(Value::list(vec![Value::Null]).to_boolean());
        assert!(!Value::map(Vec::new()).to_boolean());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(
            Value::list(vec![Value::from(1.0), Value::from("a")]).to_string(),
            "[1, \"a\"]"
        );
        assert_eq!(
            Value::map(vec![(Value::from("k"), Value::from(true))]).to_string(),
            "{\"k\": true}"
        );
    }

    #[test]
    fn test_from_operand() {
        assert_eq!(Value::from_operand(None), Value::Null);
        assert_eq!(Value::from_operand(Some(&Operand::Int(4))), Value::Number(4.0));
        let half: Decimal = "0.5".parse().unwrap();
        assert_eq!(
            Value::from_operand(Some(&Operand::Decimal(half))),
            Value::Number(0.5)
        );
    }

    #[test]
    fn test_method_lookup_walks_parents() {
        let function = Rc::new(Function {
            name: "A#get".into(),
            arity: 0,
            slots: Vec::new(),
            body: Rc::from(Vec::new()),
        });
        let parent = Rc::new(Class {
            name: "A".into(),
            members: vec![
                ("#get".into(), Value::Function(function.clone())),
                ("x".into(), Value::Number(1.0)),
            ],
            parent: None,
        });
        let child = Class {
            name: "B".into(),
            members: vec![("x".into(), Value::Number(2.0))],
            parent: Some(parent),
        };
        assert!(Rc::ptr_eq(&child.method("#get").unwrap(), &function));
        assert!(child.method("#missing").is_none());
        assert_eq!(child.fields().get("x"), Some(&Value::Number(2.0)));
    }
}
