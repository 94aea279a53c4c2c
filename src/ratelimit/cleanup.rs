//! Background sweep that reclaims empty window records.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::limiter::RateLimiter;

/// Handle to the periodic cleanup task.
///
/// The sweep only bounds memory. Missing a tick delays reclamation but never
/// changes a rate limit decision.
pub struct CleanupTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CleanupTask {
    /// Spawn the sweep on the current tokio runtime.
    pub fn spawn(limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately and there is nothing to sweep yet
            ticker.tick().await;

            info!(interval_secs = interval.as_secs_f64(), "Rate limit cleanup task started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match limiter.sweep() {
                            Ok(removed) => debug!(
                                removed = removed,
                                remaining = limiter.record_count(),
                                "Rate limit cleanup sweep finished"
                            ),
                            Err(e) => error!(error = %e, "Rate limit cleanup sweep failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!("Rate limit cleanup task stopped");
        });

        Self { shutdown_tx, handle }
    }

    /// Stop the sweep and wait for the task to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "Rate limit cleanup task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ClientKey, ManualClock, PolicyEntry, RateLimiterBackend, RouteClass};

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_sweeps_periodically() {
        let clock = Arc::new(ManualClock::from_secs(1_000));
        let limiter = Arc::new(RateLimiter::with_clock(clock.clone()));
        let policy = PolicyEntry::new(5, 10).unwrap();

        limiter.check(&ClientKey::new("a"), RouteClass::Global, &policy).await.unwrap();
        limiter.check(&ClientKey::new("b"), RouteClass::Chat, &policy).await.unwrap();
        assert_eq!(limiter.record_count(), 2);

        let task = CleanupTask::spawn(limiter.clone(), Duration::from_secs(60));

        // Records are still live at the first sweep
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(limiter.record_count(), 2);

        clock.advance(Duration::from_secs(11));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(limiter.record_count(), 0);

        task.shutdown().await;
    }

    #[tokio::test]
    async fn test_cleanup_task_shutdown() {
        let limiter = Arc::new(RateLimiter::new());
        let task = CleanupTask::spawn(limiter, Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(1), task.shutdown())
            .await
            .expect("cleanup task should stop promptly");
    }
}
