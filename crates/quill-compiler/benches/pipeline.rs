use criterion::{Criterion, black_box, criterion_group, criterion_main};
use quill_compiler::ast::Ast;
use quill_compiler::lexer::Lexer;
use quill_compiler::parser::Grammar;
use quill_compiler::vm::Machine;
use quill_compiler::{Diagnostics, compile, generate};

const FIB: &str = "\
func fib(n) {
  if n < 2 {
    return n
  }
  return fib(n - 1) + fib(n - 2)
}
print fib(12)
";

const LOOPS: &str = "\
var total = 0
var i = 0
while i < 50 {
  var j = 0
  while j < 10 {
    j = j + 1
    if j % 3 == 0 {
      continue
    }
    total = total + j
  }
  i = i + 1
}
print total
";

const CLASSES: &str = "\
class Point {
  var x = 0
  var y = 0
  func init(x, y) {
    this.x = x
    this.y = y
  }
  func norm() {
    return this.x * this.x + this.y * this.y
  }
}
class Point3 extends Point {
  var z = 0
  func norm() {
    return super.norm() + this.z * this.z
  }
}
var p = new Point3(3, 4)
print p.norm()
";

fn workloads() -> Vec<(&'static str, String)> {
    vec![
        ("fib", FIB.to_string()),
        ("loops", LOOPS.to_string()),
        ("classes", CLASSES.to_string()),
        ("long", LOOPS.repeat(20)),
    ]
}

fn bench_pipeline(c: &mut Criterion) {
    let lexer = Lexer::default();
    let grammar = Grammar::default();

    for (label, source) in workloads() {
        let tokens = lexer.tokenize(&source).expect("tokenize");
        let compilation = compile(&source);
        let bytecode = generate(&compilation).expect("generate");

        c.bench_function(&format!("tokenize_{label}"), |b| {
            b.iter(|| black_box(lexer.tokenize(black_box(&source)).expect("tokenize")))
        });

        c.bench_function(&format!("parse_{label}"), |b| {
            b.iter(|| {
                let mut ast = Ast::new();
                let mut diagnostics = Diagnostics::new();
                let root = grammar.parse(black_box(tokens.clone()), &mut ast, &mut diagnostics);
                black_box((ast, root));
            })
        });

        c.bench_function(&format!("compile_generate_{label}"), |b| {
            b.iter(|| {
                let compilation = compile(black_box(&source));
                black_box(generate(&compilation).expect("generate"));
            })
        });

        c.bench_function(&format!("run_{label}"), |b| {
            b.iter(|| {
                let mut machine = Machine::new();
                machine.run(black_box(&bytecode)).expect("run");
                black_box(machine.take_output());
            })
        });
    }
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
