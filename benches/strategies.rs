//! Compares the two evaluation strategies on the transitive closure of a
//! seeded random graph. The simulated fetch latency is deliberately small
//! here so criterion measures evaluator work plus proportional I/O charge
//! rather than mostly busy-waiting.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use rexdb::datasets;
use rexdb::engine::Engine;
use rexdb::exec::{run_query, Strategy};
use rexdb::sql::parser::parse_query;

const CLOSURE: &str = "WITH RECURSIVE t(c1, c2) AS ( \
    SELECT * FROM a UNION \
    SELECT a.c1, t.c2 FROM a, t WHERE t.c1 = a.c2 \
  ) SELECT * INTO n FROM t;";

fn bench_closure(c: &mut Criterion) {
    let query = parse_query(CLOSURE).expect("benchmark query parses");
    let mut rng = StdRng::seed_from_u64(42);
    let edges = datasets::random_edge_graph(&mut rng, 24, 40);

    let mut group = c.benchmark_group("transitive_closure");
    for (name, strategy) in [
        ("standard", Strategy::Standard),
        ("optimized", Strategy::Optimized),
    ] {
        group.bench_function(name, |b| {
            b.iter_batched(
                || {
                    let engine = Engine::builder()
                        .page_fetch_micros(10)
                        .page_capacity(32)
                        .buffer_capacity(16)
                        .build();
                    datasets::load_pairs(&engine, "a", &edges).expect("load edges");
                    engine
                },
                |engine| {
                    run_query(&engine, &query, strategy).expect("query succeeds");
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_closure);
criterion_main!(benches);
