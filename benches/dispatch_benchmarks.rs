use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use phase_dispatch::{
    DispatchManager, DispatcherConfig, Event, EventHook, HandlerRegistry, Message, MessageHook,
};
use std::sync::Arc;

struct Subscriber;

fn benchmark_trigger_inline(c: &mut Criterion) {
    let manager = DispatchManager::new(DispatcherConfig::default()).expect("manager");
    manager
        .registry()
        .register_static(EventHook::<u64>::success(|_| Ok(())));
    manager
        .registry()
        .register_static(EventHook::<u64>::complete(|_| Ok(())));

    let event = Event::new(0_u64);
    c.bench_function("trigger_without_execute", |b| {
        b.iter(|| manager.trigger(black_box(&event)).expect("trigger").wait())
    });
}

fn benchmark_trigger_with_execute(c: &mut Criterion) {
    let manager = DispatchManager::new(DispatcherConfig::default()).expect("manager");
    manager
        .registry()
        .register_static(EventHook::<u64>::execute(|event| {
            *event.payload_mut() += 1;
            Ok(())
        }));

    let event = Event::new(0_u64);
    c.bench_function("trigger_with_execute", |b| {
        b.iter(|| manager.trigger(black_box(&event)).expect("trigger").wait())
    });
}

fn benchmark_attach(c: &mut Criterion) {
    let mut group = c.benchmark_group("attach_all");
    for handlers in [1_usize, 16, 128] {
        let registry = HandlerRegistry::new();
        let owners: Vec<_> = (0..handlers).map(|_| Arc::new(Subscriber)).collect();
        for (index, owner) in owners.iter().enumerate() {
            if index % 2 == 0 {
                registry.register_static(EventHook::<u32>::complete(|_| Ok(())));
            } else {
                registry.register_dynamic(
                    phase_dispatch::Phase::Complete,
                    owner,
                    |_owner: Arc<Subscriber>| EventHook::<u32>::complete(|_| Ok(())),
                );
            }
        }
        let manager = DispatchManager::builder(DispatcherConfig::default())
            .with_registry(Arc::new(registry))
            .build()
            .expect("manager");

        group.bench_with_input(BenchmarkId::from_parameter(handlers), &handlers, |b, _| {
            b.iter(|| {
                let event = Event::new(0_u32);
                black_box(manager.attach(&event))
            })
        });
    }
    group.finish();
}

fn benchmark_request(c: &mut Criterion) {
    let manager = DispatchManager::new(DispatcherConfig::default()).expect("manager");
    manager
        .registry()
        .register_static(MessageHook::<u32, u64>::sync_refresh(|msg| {
            msg.set_result(u64::from(*msg.payload()) * 2);
            Ok(())
        }));

    let message: Message<u32, u64> = Message::new(21);
    c.bench_function("request_sync_only", |b| {
        b.iter(|| black_box(manager.request(&message).expect("request")))
    });
}

criterion_group!(
    benches,
    benchmark_trigger_inline,
    benchmark_trigger_with_execute,
    benchmark_attach,
    benchmark_request
);
criterion_main!(benches);
