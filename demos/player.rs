//! Example: a player character whose landing animation must finish before
//! it can run again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_cofsm::{
    HookTable, RunnerConfig, StateId, StateMachineRunner, StateOwner, state_hooks,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StateId)]
enum Stance {
    Idle,
    Run,
    Jump,
}

#[derive(Debug, Default)]
struct Player {
    steps: AtomicU32,
}

impl StateOwner for Player {}

#[state_hooks(state = Stance)]
impl Player {
    #[hook]
    fn idle_enter(&self) {
        tracing::info!("standing still");
    }

    #[hook]
    fn run_tick(&self) {
        self.steps.fetch_add(1, Ordering::Relaxed);
    }

    #[hook]
    fn run_exit(&self) {
        tracing::info!(steps = self.steps.load(Ordering::Relaxed), "stopped running");
    }

    #[hook]
    fn jump_enter(&self) {
        tracing::info!("jumped");
    }

    // Landing plays out before the next stance takes over.
    #[hook]
    async fn jump_exit(&self) {
        tracing::info!("landing");
        tokio::time::sleep(Duration::from_millis(100)).await;
        tracing::info!("landed");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio_cofsm=debug")),
        )
        .init();

    let config: RunnerConfig = serde_json::from_str(r#"{ "frame_interval": "10ms" }"#)?;
    let runner = Arc::new(StateMachineRunner::new());
    let machine = runner.initialize_with(
        Arc::new(Player::default()),
        Arc::new(Player::registry()?),
        Stance::Idle,
    )?;
    let driver = runner.drive(config)?;

    machine.subscribe(|change| {
        tracing::info!(from = ?change.from, to = ?change.to, "stance changed");
    });

    machine.transit(Stance::Run)?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    machine.transit(Stance::Jump)?;
    machine.transit(Stance::Run)?;
    // Run waits for the landing to finish.
    assert!(machine.is_in_transition());
    machine.wait_for_state(Stance::Run).await?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    machine.transit(Stance::Idle)?;

    driver.shutdown();
    driver.await?;
    Ok(())
}
