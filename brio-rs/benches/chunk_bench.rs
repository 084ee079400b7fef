use std::io::BufReader;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use brio::context::ExecutionContext;
use brio::script::{eval_top, parse_statement, Engine, StatementReader};
use brio::task::CancelToken;

fn make_source(statements: usize) -> String {
    let mut src = String::new();
    for i in 0..statements {
        src.push_str(&format!("x{i} = {i} * 3 + (4 - 1); "));
    }
    src.push('\n');
    src
}

fn chunk_all(src: &str) -> usize {
    let mut reader = StatementReader::new(BufReader::new(src.as_bytes()));
    let mut count = 0;
    while let Ok(Some(chunk)) = reader.next_statement() {
        black_box(chunk);
        count += 1;
    }
    count
}

fn bench_chunking(c: &mut Criterion) {
    let small = make_source(10);
    let large = make_source(1000);

    let mut g = c.benchmark_group("statement_chunking");
    g.bench_function("chunk_10", |b| b.iter(|| chunk_all(black_box(&small))));
    g.bench_function("chunk_1000", |b| b.iter(|| chunk_all(black_box(&large))));
    g.finish();
}

fn bench_parse_eval(c: &mut Criterion) {
    let engine = Engine::new();
    let stmt_src = "1 + 2 * 3 - (4 / 2)";

    let mut g = c.benchmark_group("parse_eval");
    g.bench_function("parse", |b| {
        b.iter(|| parse_statement(black_box(stmt_src)))
    });
    g.bench_function("parse_and_eval", |b| {
        b.iter(|| {
            let stmt = parse_statement(black_box(stmt_src)).expect("parses");
            let mut ctx = ExecutionContext::new();
            eval_top(&engine, &stmt, &mut ctx, &CancelToken::new())
        })
    });
    g.finish();
}

criterion_group!(benches, bench_chunking, bench_parse_eval);
criterion_main!(benches);
