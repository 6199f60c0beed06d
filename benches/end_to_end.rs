//! End-to-end latency benchmarks for the compiler pipeline: lexing,
//! parsing, the three semant phases, klass-table construction, and
//! both backends, each measured standalone and as one full run.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use coolc::ast::{Program, SourceMap};
use coolc::backend::{ir_backend, stack};
use coolc::data::Data;
use coolc::klass::{self, KlassTable};
use coolc::lexer::Lexer;
use coolc::parser::Parser;
use coolc::semant::{self, ClassTree};

/// A program with enough classes and dispatch depth to be representative:
/// a small inheritance chain, attributes, a loop, and a case expression.
fn sample_source() -> &'static str {
    r#"
class Animal {
    name : String <- "animal";
    sound() : String { "..." };
    speak() : String { name.concat(" says ").concat(sound()) };
};

class Dog inherits Animal {
    sound() : String { "Woof" };
};

class Cat inherits Animal {
    sound() : String { "Meow" };
};

class Counter {
    value : Int <- 0;
    bump() : Int { value <- value + 1 };
    run(n : Int) : Int {
        {
            while n > 0 loop {
                bump();
                n <- n - 1;
            } pool;
            value;
        }
    };
};

class Main inherits IO {
    main() : Object {
        {
            let a : Animal <- new Dog in out_string(a.speak());
            let a : Animal <- new Cat in out_string(a.speak());
            let c : Counter <- new Counter in out_int(c.run(20));
            case (new Animal) of
                d : Dog => out_string("dog");
                x : Animal => out_string("animal");
            esac;
        }
    };
};
"#
}

fn lex(source: &str) -> Vec<coolc::span::Spanned<coolc::lexeme::Lexeme>> {
    Lexer::new(source, 0).tokenize().0
}

fn parse(source: &str) -> Program {
    let tokens = lex(source);
    Parser::new(tokens, source, "bench.cl").parse_program().expect("sample program parses")
}

fn semant(source: &str) -> (ClassTree, std::collections::BTreeMap<String, coolc::ast::Class>) {
    let mut sources = SourceMap::new();
    sources.add("bench.cl", source);
    let program = parse(source);
    let tree = semant::build_inheritance_graph(&program, &sources).expect("no inheritance errors");
    let flat = semant::collect_features(&tree, &sources).expect("no feature errors");
    let typed = semant::type_check(&tree, &flat, &sources).expect("no type errors");
    (tree, typed)
}

fn klasses(source: &str) -> (ClassTree, std::collections::BTreeMap<String, coolc::ast::Class>, KlassTable) {
    let (tree, typed) = semant(source);
    let klasses = klass::build_klass_table(&tree, &typed);
    (tree, typed, klasses)
}

fn bench_lexer(c: &mut Criterion) {
    let source = sample_source();
    c.bench_function("lex_sample_program", |b| {
        b.iter(|| lex(black_box(source)));
    });
}

fn bench_parser(c: &mut Criterion) {
    let source = sample_source();
    c.bench_function("parse_sample_program", |b| {
        b.iter(|| parse(black_box(source)));
    });
}

fn bench_semant(c: &mut Criterion) {
    let source = sample_source();
    c.bench_function("semant_sample_program", |b| {
        b.iter(|| semant(black_box(source)));
    });
}

fn bench_klass_table(c: &mut Criterion) {
    let source = sample_source();
    let (tree, typed) = semant(source);
    c.bench_function("build_klass_table_sample_program", |b| {
        b.iter(|| klass::build_klass_table(black_box(&tree), black_box(&typed)));
    });
}

fn bench_stack_backend(c: &mut Criterion) {
    let source = sample_source();
    let (_, typed, klasses) = klasses(source);
    c.bench_function("stack_backend_sample_program", |b| {
        b.iter(|| {
            let mut data = Data::new();
            stack::emit_program(black_box(&typed), black_box(&klasses), &mut data)
        });
    });
}

fn bench_ir_backend(c: &mut Criterion) {
    let source = sample_source();
    let (_, typed, klasses) = klasses(source);
    c.bench_function("ir_backend_sample_program", |b| {
        b.iter(|| {
            let mut data = Data::new();
            ir_backend::emit_program(black_box(&typed), black_box(&klasses), &mut data)
        });
    });
}

fn bench_full_pipeline(c: &mut Criterion) {
    let source = sample_source();
    c.bench_function("full_pipeline_sample_program_stack_backend", |b| {
        b.iter(|| {
            let (tree, typed) = semant(black_box(source));
            let klasses = klass::build_klass_table(&tree, &typed);
            let mut data = Data::new();
            data.build_class_name_table(&klasses);
            data.build_class_obj_table(&klasses);
            stack::emit_program(&typed, &klasses, &mut data)
        });
    });
}

criterion_group!(
    benches,
    bench_lexer,
    bench_parser,
    bench_semant,
    bench_klass_table,
    bench_stack_backend,
    bench_ir_backend,
    bench_full_pipeline,
);
criterion_main!(benches);
