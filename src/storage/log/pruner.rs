use std::{sync::Arc, time::Duration};

use tokio::{sync::Notify, task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, trace, warn};

use super::reader::ReaderPool;

/// Background task that periodically closes readers idle for longer than
/// `max_idle`.
pub struct ReaderPoolPruner {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ReaderPoolPruner {
    /// Must be called inside a tokio runtime.
    pub fn spawn(pool: Arc<ReaderPool>, max_idle: Duration, interval: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(Self::run(pool, max_idle, interval, shutdown.clone()));
        Self { shutdown, handle }
    }

    async fn run(pool: Arc<ReaderPool>, max_idle: Duration, interval: Duration, shutdown: Arc<Notify>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    trace!("Pruning readers idle for more than {:?}", max_idle);
                    pool.prune_idle(max_idle);
                }
                _ = shutdown.notified() => {
                    info!("Shutdown notified, exiting reader pool pruner");
                    return;
                }
            }
        }
    }

    /// Stop the task and wait for it to finish.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            warn!("Reader pool pruner task failed: {}", e);
        }
    }
}
