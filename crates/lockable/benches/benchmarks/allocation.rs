use criterion::{BatchSize, BenchmarkId, Criterion};

use lockable::WorkItemId;
use lockable::expand::EnvVars;
use lockable::requirement::ResolvedRequirement;

use crate::{create_pool, label_spec};

fn bench_allocate(c: &mut Criterion, name: &str, load_balancing: bool) {
    for resource_count in [10, 1_000, 10_000] {
        c.bench_with_input(
            BenchmarkId::new(name, resource_count),
            &resource_count,
            |b, &resource_count| {
                b.iter_batched_ref(
                    || {
                        let pool = create_pool(resource_count, 8, load_balancing);
                        let spec = label_spec("any", 4);
                        let groups: Vec<ResolvedRequirement> =
                            vec![pool.resolve_requirement(&spec, &EnvVars::new())];
                        (pool, groups)
                    },
                    |(pool, groups)| {
                        std::hint::black_box(pool.attempt_allocate(
                            WorkItemId::new(1),
                            "bench",
                            groups,
                        ));
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
}

fn bench_many_work_items(c: &mut Criterion) {
    for work_items in [10, 100] {
        c.bench_with_input(
            BenchmarkId::new("allocate for many work items", work_items),
            &work_items,
            |b, &work_items| {
                b.iter_batched_ref(
                    || {
                        let pool = create_pool(1_000, 8, true);
                        let spec = label_spec("rack-1", 2);
                        let groups: Vec<ResolvedRequirement> =
                            vec![pool.resolve_requirement(&spec, &EnvVars::new())];
                        (pool, groups)
                    },
                    |(pool, groups)| {
                        for id in 0..work_items {
                            std::hint::black_box(pool.attempt_allocate(
                                WorkItemId::new(id),
                                "bench",
                                groups,
                            ));
                        }
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
}

pub fn benchmark(c: &mut Criterion) {
    bench_allocate(c, "allocate", false);
    bench_allocate(c, "allocate with load balancing", true);
    bench_many_work_items(c);
}
