//! Host time source.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

/// Time as seen by the host loop.
///
/// Wraps `tokio::time::Instant` for timestamps and carries the host's time
/// scale. A scale at or below zero means the host is paused; queued
/// transitions wait for it to resume.
#[derive(Debug, Clone)]
pub struct HostClock {
    scale: Arc<watch::Sender<f32>>,
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClock {
    #[must_use]
    pub fn new() -> Self {
        let (scale, _) = watch::channel(1.0);
        Self {
            scale: Arc::new(scale),
        }
    }

    #[must_use]
    pub fn now(&self) -> Instant {
        Instant::now()
    }

    #[must_use]
    pub fn time_scale(&self) -> f32 {
        *self.scale.borrow()
    }

    pub fn set_time_scale(&self, scale: f32) {
        self.scale.send_replace(scale);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.time_scale() <= 0.0
    }

    /// Completes once the time scale is positive.
    pub async fn resumed(&self) {
        let mut rx = self.scale.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|scale| *scale > 0.0).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn starts_running_at_unit_scale() {
        let clock = HostClock::new();
        assert_eq!(clock.time_scale(), 1.0);
        assert!(!clock.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn resumed_waits_for_positive_scale() {
        let clock = HostClock::new();
        clock.set_time_scale(0.0);
        assert!(clock.is_paused());

        let waiter = tokio::spawn({
            let clock = clock.clone();
            async move { clock.resumed().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        clock.set_time_scale(0.5);
        waiter.await.unwrap();
    }
}
