use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pytac::compiler::{compile, Options};
use pytac::diagnostics::Diagnostics;
use pytac::{lexer, parser};

/// Synthetic workload: `copies` distinct recursive functions with loops
/// that exercise every statement form the frontend knows.
fn workload(copies: usize) -> String {
    let mut source = String::new();
    for index in 0..copies {
        source.push_str(&format!("def fib{index}(n):\n"));
        source.push_str("    if n <= 1:\n");
        source.push_str("        return n\n");
        source.push_str(&format!(
            "    return fib{index}(n - 1) + fib{index}(n - 2)\n\n"
        ));
        source.push_str(&format!("total{index} = 0\n"));
        source.push_str(&format!("for step{index} in range(10):\n"));
        source.push_str(&format!(
            "    total{index} = total{index} + fib{index}(step{index})\n"
        ));
        source.push_str(&format!("print('total', total{index})\n\n"));
    }
    source
}

fn bench_frontend(c: &mut Criterion) {
    for (label, copies) in [("small", 1), ("large", 64)] {
        let source = workload(copies);

        c.bench_function(&format!("frontend_tokenize_{label}"), |b| {
            b.iter(|| {
                let mut diagnostics = Diagnostics::new();
                let tokens = lexer::tokenize(black_box(&source), &mut diagnostics);
                assert!(!diagnostics.has_errors());
                black_box(tokens);
            })
        });

        c.bench_function(&format!("frontend_tokenize_parse_{label}"), |b| {
            b.iter(|| {
                let mut diagnostics = Diagnostics::new();
                let tokens = lexer::tokenize(black_box(&source), &mut diagnostics);
                let program = parser::parse_tokens(&tokens, &mut diagnostics);
                assert!(!diagnostics.has_errors());
                black_box(program);
            })
        });

        c.bench_function(&format!("pipeline_compile_{label}"), |b| {
            b.iter(|| {
                let result = compile(black_box(&source), &Options::default());
                assert!(result.success);
                black_box(result);
            })
        });
    }
}

criterion_group!(benches, bench_frontend);
criterion_main!(benches);
