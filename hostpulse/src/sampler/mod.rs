pub mod process;
pub mod system;

pub use process::ProcessSampler;
pub use system::{OptionalSources, SystemSampler};

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Outcome of a single collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Published,
    /// Collection failed; the previous output stays on the bus.
    Skipped,
}

#[async_trait]
pub trait Sampler: Send {
    fn name(&self) -> &'static str;

    async fn tick(&mut self) -> TickOutcome;
}

/// Drives `sampler` every `period` until `stop` turns true or its sender is
/// dropped. The stop flag is checked before each tick; a tick that has
/// started always runs to completion. Returns the sampler so its state
/// can be inspected after shutdown.
pub async fn run_loop<S: Sampler>(
    mut sampler: S,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> S {
    let mut interval_timer = interval(period);
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Starting {} sampler every {:?}", sampler.name(), period);

    loop {
        if *stop.borrow() {
            break;
        }

        tokio::select! {
            _ = interval_timer.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
        }

        if *stop.borrow() {
            break;
        }

        let outcome = sampler.tick().await;
        debug!("{} tick: {:?}", sampler.name(), outcome);
    }

    info!("Stopped {} sampler", sampler.name());
    sampler
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        ticks: usize,
    }

    #[async_trait]
    impl Sampler for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn tick(&mut self) -> TickOutcome {
            self.ticks += 1;
            TickOutcome::Published
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_until_stopped() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            Counting { ticks: 0 },
            Duration::from_secs(1),
            stop_rx,
        ));

        // First tick fires immediately, then one per second.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        stop_tx.send_replace(true);

        let sampler = handle.await.unwrap();
        assert_eq!(sampler.ticks, 3);
    }

    #[tokio::test]
    async fn test_loop_exits_when_already_stopped() {
        let (_stop_tx, stop_rx) = watch::channel(true);

        let sampler = run_loop(Counting { ticks: 0 }, Duration::from_secs(60), stop_rx).await;

        assert_eq!(sampler.ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_exits_when_sender_dropped() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            Counting { ticks: 0 },
            Duration::from_secs(10),
            stop_rx,
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(stop_tx);

        let sampler = handle.await.unwrap();
        assert_eq!(sampler.ticks, 1);
    }
}
