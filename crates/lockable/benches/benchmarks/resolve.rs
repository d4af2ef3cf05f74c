use criterion::{BenchmarkId, Criterion};

use lockable::expand::EnvVars;
use lockable::requirement::RequirementSpec;

use crate::{create_pool, label_spec};

fn bench_resolve(c: &mut Criterion, name: &str, spec: RequirementSpec) {
    for resource_count in [10, 1_000, 10_000] {
        let pool = create_pool(resource_count, 8, false);
        let env: EnvVars = [("RACK", "rack-3")].into_iter().collect();
        c.bench_with_input(
            BenchmarkId::new(name, resource_count),
            &resource_count,
            |b, _| {
                b.iter(|| std::hint::black_box(pool.resolve_requirement(&spec, &env)));
            },
        );
    }
}

pub fn benchmark(c: &mut Criterion) {
    bench_resolve(c, "resolve label", label_spec("${RACK} kind-1", 0));
    bench_resolve(c, "resolve exact labels", label_spec("label:any ${RACK}", 0));
    bench_resolve(
        c,
        "resolve expression",
        label_spec("expr: resourceLabels.hasLabel('${RACK}')", 0),
    );
}
