//! End-to-end tests: source to bytecode to the reference machine.

use std::collections::BTreeSet;

use quill_compiler::ast::{Ast, BinaryOp, Node, NodeId};
use quill_compiler::vm::{Machine, Value};
use quill_compiler::{
    Bytecode, CompileError, Compiler, GeneratorConfig, OpCode, Operand, compile, generate,
};

/// Compile and run a program, return the machine
fn run_with(source: &str, config: GeneratorConfig) -> Machine {
    let compiler = Compiler::new().with_config(config);
    let compilation = compiler.compile(source);
    assert!(
        compilation.is_ok(),
        "compilation failed: {:?}",
        compilation.diagnostics.iter().collect::<Vec<_>>()
    );
    let bytecode = compiler.generate(&compilation).unwrap();
    let mut machine = Machine::new();
    machine.run(&bytecode).unwrap();
    machine
}

/// Compile and run, return printed output
fn output(source: &str) -> String {
    run_with(source, GeneratorConfig::default()).take_output()
}

fn statement(ast: &Ast, root: NodeId) -> NodeId {
    match &ast[root] {
        Node::Blocks(statements) => statements[0],
        _ => root,
    }
}

fn number(ast: &Ast, id: NodeId) -> String {
    match &ast[id] {
        Node::Number(value) => value.to_string(),
        other => panic!("expected a number, got {}", other.kind()),
    }
}

#[test]
fn test_top_level_loop_leaves_values() {
    let machine = run_with(
        "var i=0; while i<10 { i; i=i+1 }",
        GeneratorConfig::repl(),
    );
    let expected: Vec<Value> = (0..10).map(|i| Value::Number(f64::from(i))).collect();
    assert_eq!(machine.stack(), expected.as_slice());
}

#[test]
fn test_discarded_statement_values() {
    let machine = run_with("var i=0; while i<10 { i; i=i+1 }", GeneratorConfig::default());
    assert!(machine.stack().is_empty());
}

#[test]
fn test_nested_loop_continue_and_break() {
    let source = "\
func count() {
  var total = 0
  var i = 0
  while i < 10 {
    i = i + 1
    if i == 3 {
      continue
    }
    if i == 6 {
      break
    }
    total = total + i
  }
  return total
}
print count()";
    assert_eq!(output(source), "12\n");
}

#[test]
fn test_loop_inside_top_level_loop() {
    let source = "\
var rows = 0
var i = 0
while i < 3 {
  var j = 0
  while j < 3 {
    j = j + 1
    if j == 2 {
      break
    }
    rows = rows + 1
  }
  i = i + 1
}
print rows";
    assert_eq!(output(source), "3\n");
}

#[test]
fn test_top_level_break_and_continue() {
    let source = "\
var i = 0
var odd = 0
while true {
  i = i + 1
  if i > 7 {
    break
  }
  if i % 2 == 0 {
    continue
  }
  odd = odd + 1
}
print odd";
    assert_eq!(output(source), "4\n");
}

#[test]
fn test_recursion() {
    let source = "\
func fib(n) {
  if n < 2 {
    return n
  }
  return fib(n - 1) + fib(n - 2)
}
print fib(15)";
    assert_eq!(output(source), "610\n");
}

#[test]
fn test_else_if_chain() {
    let source = "\
func size(x) {
  if x < 3 {
    return \"small\"
  } else if x < 10 {
    return \"medium\"
  } else {
    return \"large\"
  }
}
print size(1)
print size(5)
print size(50)";
    assert_eq!(output(source), "small\nmedium\nlarge\n");
}

#[test]
fn test_classes() {
    let source = "\
class Animal {
  var sound = \"...\"
  func init(name) {
    this.name = name
  }
  func speak() {
    return this.name + \" says \" + this.sound
  }
}
class Dog extends Animal {
  var sound = \"woof\"
  func speak() {
    return super.speak() + \"!\"
  }
}
print new Dog(\"Rex\").speak()
print new Animal(\"Cat\").speak()";
    assert_eq!(output(source), "Rex says woof!\nCat says ...\n");
}

#[test]
fn test_collections() {
    let source = "\
var xs = [1, 2, 3]
print xs
print xs.length
var m = {\"a\": 1}
m.b = 2
print m
print m.a + m.b";
    assert_eq!(output(source), "[1, 2, 3]\n3\n{\"a\": 1, \"b\": 2}\n3\n");
}

#[test]
fn test_arithmetic_and_logic() {
    let source = "\
print 1.5 * 2
print 2 ** 3 ** 2
print -3 + 10 % 4
print 6 & 3 | 8
print 1 << 4
print !(1 < 2) or 2 >= 2
print \"a\" + 1";
    assert_eq!(output(source), "3\n512\n-1\n10\n16\ntrue\na1\n");
}

#[test]
fn test_block_locals_are_released() {
    let source = "\
var out = 0
if true {
  var a = 10
  out = out + a
}
if true {
  var b = 5
  out = out + b
}
print out";
    assert_eq!(output(source), "15\n");
}

#[test]
fn test_function_reads_enclosing_local() {
    let source = "if true {\n var x = 1\n func f() { return x }\n print f()\n}";
    assert_eq!(output(source), "1\n");
}

#[test]
fn test_function_assigns_enclosing_local() {
    let source = "\
if true {
  var x = 1
  func bump(by) {
    x = x + by
  }
  var unused = bump(2)
  print x
  var again = bump(4)
  print x
}";
    assert_eq!(output(source), "3\n7\n");
}

#[test]
fn test_recursion_keeps_each_call_locals() {
    let source = "\
func depth(n) {
  var mine = n
  if n > 0 {
    var inner = depth(n - 1)
  }
  return mine
}
print depth(3)";
    assert_eq!(output(source), "3\n");
}

#[test]
fn test_undefined_mutation() {
    let compilation = compile("a = 5");
    assert_eq!(compilation.diagnostics.len(), 1);
    assert!(matches!(
        compilation.diagnostics.iter().next(),
        Some(CompileError::UndefinedMutation { name, line: 1 }) if name == "a"
    ));
    assert!(compilation.bindings.is_empty());
    assert!(generate(&compilation).is_err());
}

#[test]
fn test_every_undefined_reference_is_reported() {
    let compilation = compile("print a\nb = 1\nif c {\n  print d\n}");
    let lines: Vec<usize> = compilation.diagnostics.iter().map(|e| e.line()).collect();
    assert_eq!(lines, vec![1, 2, 3, 4]);
}

#[test]
fn test_dangling_else() {
    let compilation = compile("else { }");
    assert!(
        compilation
            .diagnostics
            .iter()
            .any(|e| matches!(e, CompileError::DanglingElse { .. }))
    );
    let has_if = (0..compilation.ast.len())
        .any(|i| matches!(compilation.ast[NodeId::new(i)], Node::If { .. }));
    assert!(!has_if);
}

#[test]
fn test_precedence() {
    let compilation = compile("10 * 2 + 5 / 2");
    let ast = &compilation.ast;
    let Node::Binary {
        op: BinaryOp::Add,
        left,
        right,
    } = &ast[statement(ast, compilation.root)]
    else {
        panic!("expected an addition at the root");
    };
    assert!(matches!(&ast[*left], Node::Binary { op: BinaryOp::Mul, left: a, right: b }
        if number(ast, *a) == "10" && number(ast, *b) == "2"));
    assert!(matches!(&ast[*right], Node::Binary { op: BinaryOp::Div, left: a, right: b }
        if number(ast, *a) == "5" && number(ast, *b) == "2"));
}

#[test]
fn test_left_to_right_chaining() {
    let compilation = compile("100 == 200 != true");
    let ast = &compilation.ast;
    let Node::Binary {
        op: BinaryOp::NotEquals,
        left,
        right,
    } = &ast[statement(ast, compilation.root)]
    else {
        panic!("expected != at the root");
    };
    assert!(matches!(&ast[*left], Node::Binary { op: BinaryOp::Equals, .. }));
    assert!(matches!(&ast[*right], Node::Boolean(true)));
}

const PROGRAMS: &[&str] = &[
    "print 1",
    "var s = \"tab\\there\"\nprint s",
    "var x = 0.25\nx = x * 4\nprint x",
    "var i = 0\nwhile i < 3 {\n  i = i + 1\n}",
    "func f(a, b) {\n  var c = a\n  while c < b {\n    c = c + 1\n    if c == 2 {\n      continue\n    }\n  }\n  return c\n}\nprint f(0, 4)",
    "class A {\n  var v = null\n  func get() {\n    return this.v\n  }\n}\nprint new A().get()",
    "if false {\n  print [1, {\"k\": true}]\n} else if true {\n  print -1\n} else {\n  print ~1\n}",
];

#[test]
fn test_disassembly_round_trip() {
    for source in PROGRAMS {
        let bytecode = generate(&compile(source)).unwrap();
        let listing = bytecode.disassemble();
        let reassembled = Bytecode::assemble(&listing).unwrap();
        assert_eq!(reassembled, bytecode, "{source}");
        assert_eq!(reassembled.disassemble(), listing);
    }
}

/// Locals declared in one frame plus the deepest chain of frames below it.
fn max_concurrent_locals(ast: &Ast, id: NodeId) -> usize {
    let node = &ast[id];
    let own = match node {
        Node::Blocks(statements) => statements
            .iter()
            .filter(|s| matches!(ast[**s], Node::Free { .. }))
            .count(),
        _ => 0,
    };
    let nested = node
        .values()
        .into_iter()
        .chain(node.code_blocks())
        .map(|child| max_concurrent_locals(ast, child))
        .max()
        .unwrap_or(0);
    own + nested
}

fn nested_blocks(depth: usize) -> String {
    let mut source = String::new();
    for level in 0..depth {
        source.push_str(&format!("if true {{\nvar a{level} = {level}\n"));
        source.push_str(&format!("if false {{\nvar b{level} = 0\n}}\n"));
    }
    for _ in 0..depth {
        source.push_str("}\n");
    }
    source.push_str(&format!("while false {{\nvar w = {depth}\n}}\n"));
    source
}

#[test]
fn test_live_slots_never_exceed_declared_locals() {
    let mut sources: Vec<String> = PROGRAMS.iter().map(|s| s.to_string()).collect();
    sources.extend((1..6).map(nested_blocks));

    for source in &sources {
        let compilation = compile(source);
        assert!(compilation.is_ok(), "{source}");
        let bound = max_concurrent_locals(&compilation.ast, compilation.root);
        let bytecode = generate(&compilation).unwrap();

        let mut live = BTreeSet::new();
        let mut peak = 0;
        for instruction in &bytecode {
            match (instruction.opcode, &instruction.operand) {
                (OpCode::SETVAR, Some(Operand::Int(slot))) if *slot >= 0 => {
                    live.insert(*slot);
                    assert!((*slot as usize) < bound.max(1), "{source}");
                }
                (OpCode::DELVAR, Some(Operand::Int(slot))) => {
                    live.remove(slot);
                }
                _ => {}
            }
            peak = peak.max(live.len());
        }
        assert!(peak <= bound, "{source}: peak {peak} > {bound}");
        assert!(live.is_empty(), "{source}");
    }
}

#[test]
fn test_shell_session_keeps_state() {
    let compiler = Compiler::new().with_config(GeneratorConfig::repl());
    let mut machine = Machine::new();
    let mut globals: Vec<String> = Vec::new();

    for (line, expected) in [("var x = 40", None), ("x = x + 2", None), ("x", Some("42"))] {
        let compilation = compiler.compile_with_globals(line, globals.iter().map(String::as_str));
        assert!(compilation.is_ok(), "{line}");
        globals.extend(compilation.bindings.globals().map(str::to_string));
        machine.run(&compiler.generate(&compilation).unwrap()).unwrap();
        if let Some(expected) = expected {
            assert_eq!(machine.pop().unwrap().to_string(), expected);
        }
    }
}
