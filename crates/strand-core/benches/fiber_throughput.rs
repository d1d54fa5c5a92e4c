use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strand_core::{ExecutionContext, Fiber, Function, SchedulerConfig, Value};

fn create_context() -> ExecutionContext {
    ExecutionContext::new(SchedulerConfig::new().spare_workers(8)).unwrap()
}

fn bench_start_join(c: &mut Criterion) {
    let ctx = create_context();
    let body = Function::new("identity", |_, args| Ok(args[0].clone()));

    c.bench_function("start_join", |b| {
        b.iter(|| {
            let fiber = Fiber::new(&ctx, body.clone(), vec![Value::int(black_box(1))]);
            fiber.start().unwrap();
            fiber.join().unwrap()
        });
    });
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    let ctx = create_context();
    let body = Function::new("square", |_, args| {
        let n = args[0].as_int().unwrap_or(0);
        Ok(Value::int(n * n))
    });

    for count in [16usize, 128, 1024] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("fibers", count), &count, |b, &count| {
            b.iter(|| {
                let fibers: Vec<_> = (0..count)
                    .map(|i| {
                        let args = vec![Value::int(i as i64)];
                        let fiber = Fiber::new(&ctx, body.clone(), args);
                        fiber.start().unwrap();
                        fiber
                    })
                    .collect();
                for fiber in fibers {
                    black_box(fiber.join().unwrap());
                }
            });
        });
    }

    group.finish();
}

fn bench_run_root(c: &mut Criterion) {
    let ctx = create_context();
    let body = Function::new("main", |this, _| {
        let answer = Function::new("child", |_, _| Ok(Value::int(42)));
        let child = Fiber::new(this.context(), answer, vec![]);
        child.start()?;
        Ok(child.join()?)
    });

    c.bench_function("run_with_child", |b| {
        b.iter(|| ctx.run(body.clone(), vec![]).unwrap());
    });
}

criterion_group!(benches, bench_start_join, bench_fan_out, bench_run_root);
criterion_main!(benches);
