//! Scope resolution.
//!
//! Bodies of `if`, `else`, `while` and functions open a scope frame. Locals
//! declared in a frame get a slot id from a shared free-list allocator and
//! give it back when the frame closes, after a `Free` node for each of them
//! has been appended to the body. Declarations outside every frame are
//! globals and are addressed by name. Function frames bind their parameters
//! to negative ordinals. Lookups walk outward through every open frame, so
//! a function body sees the locals of the blocks around its definition.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{Ast, Else, Node, NodeId, Visitor, walk};
use crate::diagnostics::Diagnostics;
use crate::error::CompileError;

/// What a variable reference resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// A local slot id
    Local(u32),
    /// A parameter ordinal, starting at 1
    Param(u32),
    /// A global, addressed by name
    Global,
}

impl Binding {
    /// The numeric id: the slot for locals, the negated ordinal for
    /// parameters. Globals have none.
    pub fn slot_id(&self) -> Option<i64> {
        match *self {
            Binding::Local(slot) => Some(i64::from(slot)),
            Binding::Param(ordinal) => Some(-i64::from(ordinal)),
            Binding::Global => None,
        }
    }
}

/// Resolution results keyed by `Variable` and `SetVariable` nodes, plus
/// the names known as globals after the pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    nodes: FxHashMap<NodeId, Binding>,
    globals: FxHashSet<String>,
}

impl Bindings {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binding of a node, if it was resolved.
    pub fn get(&self, node: NodeId) -> Option<Binding> {
        self.nodes.get(&node).copied()
    }

    /// Records a binding.
    pub fn insert(&mut self, node: NodeId, binding: Binding) {
        self.nodes.insert(node, binding);
    }

    /// Number of resolved nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if nothing was resolved.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Global names, including the ones the pass started with.
    pub fn globals(&self) -> impl Iterator<Item = &str> {
        self.globals.iter().map(String::as_str)
    }

    /// Returns true if `name` is a known global.
    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }
}

/// Hands out the smallest free slot id.
#[derive(Debug, Clone, Default)]
pub struct SlotAllocator {
    free: BTreeSet<u32>,
    next: u32,
}

impl SlotAllocator {
    /// Creates an allocator with no ids handed out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the smallest released id, or a fresh one.
    pub fn allocate(&mut self) -> u32 {
        if let Some(slot) = self.free.pop_first() {
            return slot;
        }
        let slot = self.next;
        self.next += 1;
        slot
    }

    /// Returns an id to the pool.
    pub fn release(&mut self, slot: u32) {
        self.free.insert(slot);
    }

    /// Number of ids currently handed out.
    pub fn live(&self) -> usize {
        self.next as usize - self.free.len()
    }

    /// Number of distinct ids ever handed out.
    pub fn high_water(&self) -> u32 {
        self.next
    }
}

/// How a node opens a frame.
#[derive(Debug, Clone)]
enum Boundary {
    Block,
    Function(Vec<String>),
}

#[derive(Debug)]
struct Frame {
    body: NodeId,
    function: bool,
    names: FxHashMap<String, Binding>,
    declared: Vec<(String, u32)>,
}

/// The resolution pass.
pub struct Resolver<'d> {
    frames: Vec<Frame>,
    boundaries: FxHashMap<NodeId, Boundary>,
    class_members: FxHashSet<NodeId>,
    globals: FxHashSet<String>,
    allocator: SlotAllocator,
    bindings: Bindings,
    diagnostics: &'d mut Diagnostics,
}

impl<'d> Resolver<'d> {
    /// Creates a resolver reporting to `diagnostics`.
    pub fn new(diagnostics: &'d mut Diagnostics) -> Self {
        Self {
            frames: Vec::new(),
            boundaries: FxHashMap::default(),
            class_members: FxHashSet::default(),
            globals: FxHashSet::default(),
            allocator: SlotAllocator::new(),
            bindings: Bindings::new(),
            diagnostics,
        }
    }

    /// Treats `names` as already declared globals, as in a shell session
    /// that compiles one input at a time.
    pub fn with_globals<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.globals.extend(names.into_iter().map(Into::into));
        self
    }

    /// Resolves the tree under `root` and returns the bindings.
    pub fn resolve(mut self, ast: &mut Ast, root: NodeId) -> Bindings {
        walk(ast, root, &mut self);
        tracing::debug!(
            bindings = self.bindings.len(),
            globals = self.globals.len(),
            slots = self.allocator.high_water(),
            "resolved scopes"
        );
        self.bindings.globals = self.globals;
        self.bindings
    }

    fn lookup(&self, name: &str) -> Option<Binding> {
        for frame in self.frames.iter().rev() {
            if let Some(binding) = frame.names.get(name) {
                return Some(*binding);
            }
        }
        self.globals.contains(name).then_some(Binding::Global)
    }

    fn declare(&mut self, name: &str) -> Binding {
        let Some(frame) = self.frames.last_mut() else {
            self.globals.insert(name.to_string());
            return Binding::Global;
        };
        if let Some((_, slot)) = frame.declared.iter().find(|(n, _)| n == name) {
            return Binding::Local(*slot);
        }

        let slot = self.allocator.allocate();
        tracing::debug!(name, slot, "allocated slot");
        frame.declared.push((name.to_string(), slot));
        frame.names.insert(name.to_string(), Binding::Local(slot));
        Binding::Local(slot)
    }

    fn push_frame(&mut self, body: NodeId, boundary: Boundary) {
        let mut frame = Frame {
            body,
            function: false,
            names: FxHashMap::default(),
            declared: Vec::new(),
        };
        if let Boundary::Function(params) = boundary {
            frame.function = true;
            for (ordinal, param) in (1u32..).zip(params) {
                frame.names.insert(param, Binding::Param(ordinal));
            }
        }
        tracing::debug!(depth = self.frames.len() + 1, function = frame.function, "enter scope");
        self.frames.push(frame);
    }

    fn pop_frame(&mut self, ast: &mut Ast) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let line = ast.line(frame.body);
        for (name, slot) in &frame.declared {
            let free = ast.add(
                Node::Free {
                    name: name.clone(),
                    slot: *slot,
                },
                line,
            );
            ast.push_statement(frame.body, free);
        }
        for (_, slot) in frame.declared {
            self.allocator.release(slot);
        }
        tracing::debug!(depth = self.frames.len(), "leave scope");
    }

    fn mark_boundaries(&mut self, node: &Node) {
        match node {
            Node::If {
                then_block,
                otherwise,
                ..
            } => {
                self.boundaries.insert(*then_block, Boundary::Block);
                if let Some(Else::Else(block)) = otherwise {
                    self.boundaries.insert(*block, Boundary::Block);
                }
            }
            Node::While { body, .. } => {
                self.boundaries.insert(*body, Boundary::Block);
            }
            Node::Function { params, body, .. } => {
                self.boundaries
                    .insert(*body, Boundary::Function(params.clone()));
            }
            Node::Class { members, .. } => {
                self.class_members.insert(*members);
            }
            _ => {}
        }
    }

    fn resolve_set(&mut self, ast: &Ast, node: NodeId, parent: Option<NodeId>) {
        let Node::SetVariable {
            name,
            declaration,
            receiver: None,
            ..
        } = &ast[node]
        else {
            return;
        };

        if *declaration {
            if parent.is_some_and(|p| self.class_members.contains(&p)) {
                return;
            }
            let binding = self.declare(name);
            self.bindings.insert(node, binding);
            return;
        }

        match self.lookup(name) {
            Some(binding) => self.bindings.insert(node, binding),
            None => self.diagnostics.push(CompileError::UndefinedMutation {
                name: name.clone(),
                line: ast.line(node),
            }),
        }
    }

    fn resolve_read(&mut self, ast: &Ast, node: NodeId) {
        let Node::Variable {
            name,
            receiver: None,
        } = &ast[node]
        else {
            return;
        };
        match self.lookup(name) {
            Some(binding) => self.bindings.insert(node, binding),
            None => self.diagnostics.push(CompileError::UndefinedAccess {
                name: name.clone(),
                line: ast.line(node),
            }),
        }
    }
}

impl Visitor for Resolver<'_> {
    fn enter(&mut self, ast: &mut Ast, node: NodeId, _parent: Option<NodeId>) {
        if let Some(boundary) = self.boundaries.remove(&node) {
            self.push_frame(node, boundary);
        }
        self.mark_boundaries(&ast[node]);
    }

    fn leave(&mut self, ast: &mut Ast, node: NodeId, parent: Option<NodeId>) {
        match ast[node].kind() {
            "Variable" => self.resolve_read(ast, node),
            // After its value, so `var x = x` reads the outer `x`.
            "SetVariable" => self.resolve_set(ast, node, parent),
            _ => {}
        }
        if self.frames.last().is_some_and(|f| f.body == node) {
            self.pop_frame(ast);
        }
    }
}
