//! Tokenize/parse/evaluate a representative program under `criterion`.
//!
//! The teacher crate benchmarks its executor with the nightly `#[bench]`
//! harness; this crate targets stable Rust, so it uses `criterion` instead
//! (already a dev-dependency for exactly this purpose).

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rlang::{Interpreter, Parser};

const LOOP_MOD: &str = r#"
var total = 0
var i = 0
while (i < 500) {
  total = total + switch (i % 13) { case 0: { yield 1 } break; default: { yield 0 } break }
  i = i + 1
}
total
"#;

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse loop_mod", |b| {
        b.iter(|| {
            let parser = Parser::new(black_box(LOOP_MOD)).unwrap();
            black_box(parser.parse_program())
        });
    });
}

fn bench_run(c: &mut Criterion) {
    let parser = Parser::new(LOOP_MOD).unwrap();
    let (program, err) = parser.parse_program();
    assert!(err.is_none());

    c.bench_function("run loop_mod", |b| {
        b.iter(|| {
            let mut interp = Interpreter::new(std::env::temp_dir());
            black_box(interp.run_value(black_box(&program)).unwrap())
        });
    });
}

criterion_group!(benches, bench_parse, bench_run);
criterion_main!(benches);
