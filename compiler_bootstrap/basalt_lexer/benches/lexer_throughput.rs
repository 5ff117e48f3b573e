//! Lexer throughput benchmark

use basalt_lexer::Lexer;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn sample_source(repeats: usize) -> String {
    let unit = r#"
fib :: (n: s64) -> s64 {
    if n < 2 ret n;
    ret fib(n - 1) + fib(n - 2);
}

counter :: mut s64 = 0;

$public
main :: () -> s64 {
    let total: mut s64 = 0;
    let i: mut s64 = 0;
    until i >= 10 {
        total = total + fib(i);
        i = i + 1;
    }
    ret total;
}
"#;

    unit.repeat(repeats)
}

fn bench_lexer(c: &mut Criterion) {
    let source = sample_source(64);

    let mut group = c.benchmark_group("lexer");
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("tokenize", |b| {
        b.iter(|| {
            let mut diagnostics = basalt_common::Diagnostics::new();
            let tokens = Lexer::new(black_box(&source), "bench.bas", &mut diagnostics)
                .tokenize()
                .expect("benchmark source must lex");
            black_box(tokens.len())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_lexer);
criterion_main!(benches);
