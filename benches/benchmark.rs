use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use liveload::diff::diff;
use liveload::migrate::migrate;
use liveload::modules::ModuleTable;
use liveload::namespace::{Bindings, NamespaceKind, NamespaceRef};
use liveload::propagate::{AliasRegistry, propagate};
use liveload::registry::InstanceRegistry;
use liveload::types::TypeDef;
use liveload::{Orchestrator, Runtime, ScriptEvaluator, Value};

fn populated(size: usize) -> NamespaceRef {
    let ns = NamespaceRef::new("bench", NamespaceKind::Context);
    for i in 0..size {
        ns.set(format!("name{i}"), Value::list(vec![Value::Int(i as i64)]));
    }
    ns
}

pub fn criterion_benchmark(c: &mut Criterion) {
    for size in [10usize, 1_000, 100_000] {
        let ns = populated(size);
        let before = ns.snapshot();
        ns.set("name0", Value::list(vec![]));
        let after = ns.snapshot();
        c.bench_function(&format!("diff {size}"), |b| {
            b.iter(|| diff(black_box(&before), black_box(&after)))
        });
    }

    for count in [1usize, 1_000, 100_000] {
        let registry = InstanceRegistry::new();
        let base = TypeDef::new("Base", vec![], Bindings::default(), None);
        let child = TypeDef::new("Child", vec![base.clone()], Bindings::default(), None);
        let instances: Vec<_> = (0..count)
            .map(|i| registry.instantiate(if i % 2 == 0 { &base } else { &child }))
            .collect();
        // alternate between two definitions so every iteration migrates
        let mut current = base;
        c.bench_function(&format!("migrate {count}"), |b| {
            b.iter(|| {
                let next = TypeDef::new("Base", vec![], Bindings::default(), None);
                let report = migrate(&current, &next, &registry);
                current = next;
                black_box(report)
            })
        });
        drop(instances);
    }

    let modules = ModuleTable::default();
    for m in 0..100 {
        let ns = modules.register(&format!("module{m}"));
        for i in 0..100 {
            ns.set(format!("name{i}"), Value::Int(i));
        }
    }
    let registry = AliasRegistry::new(&modules);
    c.bench_function("propagate 100x100", |b| {
        b.iter(|| {
            let old = Value::list(vec![]);
            let new = Value::list(vec![]);
            modules.main().set("held", old.clone());
            black_box(propagate(&old, &new, &registry))
        })
    });

    let mut engine = Orchestrator::new(Box::new(ScriptEvaluator::new()), Runtime::default());
    let setup = engine.run_unit("class Foo { fn get(self) { return 1 } }\nobjs = [Foo(), Foo(), Foo()]", None);
    black_box(setup.map(|outcome| outcome.value).unwrap_or_default());
    c.bench_function("redefine class unit", |b| {
        b.iter(|| engine.run_unit("class Foo { fn get(self) { return 2 } }", None).is_ok())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
