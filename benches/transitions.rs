use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use tokio_cofsm::{HookTable, StateId, StateMachine, StateMachineRunner, StateOwner, state_hooks};

// --- Defined machine ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StateId)]
pub enum Light {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Default)]
pub struct Crossing;

impl StateOwner for Crossing {}

#[state_hooks(state = Light)]
impl Crossing {
    #[hook]
    fn green_enter(&self) {}

    #[hook]
    fn green_tick(&self) {}

    #[hook]
    fn yellow_exit(&self) {}

    #[hook]
    async fn red_enter(&self) {
        tokio::task::yield_now().await;
    }
}

// --- Benchmark functions ---

fn benchmark_sync_transitions(c: &mut Criterion) {
    let registry = Arc::new(Crossing::registry().unwrap());
    let machine = StateMachine::new(Arc::new(Crossing), registry);

    c.bench_function("sync_transitions_1000_cycles", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                machine.transit(Light::Green).unwrap();
                machine.transit(Light::Yellow).unwrap();
            }
        })
    });
}

fn benchmark_async_transitions(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = Arc::new(Crossing::registry().unwrap());

    c.bench_function("async_enter_100_cycles", |b| {
        b.to_async(&rt).iter(|| async {
            let machine = StateMachine::new(Arc::new(Crossing), Arc::clone(&registry));
            for _ in 0..100 {
                machine.transit(Light::Red).unwrap();
                machine.wait_idle().await;
                machine.transit(Light::Green).unwrap();
            }
        })
    });
}

fn benchmark_runner_update(c: &mut Criterion) {
    let registry = Arc::new(Crossing::registry().unwrap());
    let runner = StateMachineRunner::new();
    // The runner holds machines weakly; keep them alive for the bench.
    let _machines: Vec<_> = (0..256)
        .map(|_| {
            runner
                .initialize_with(Arc::new(Crossing), Arc::clone(&registry), Light::Green)
                .unwrap()
        })
        .collect();

    c.bench_function("runner_update_256_machines", |b| {
        b.iter(|| runner.update())
    });
}

criterion_group!(
    benches,
    benchmark_sync_transitions,
    benchmark_async_transitions,
    benchmark_runner_update
);
criterion_main!(benches);
