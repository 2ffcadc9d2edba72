use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::RecordStore;
use crate::error::StoreError;

/// Something that can be probed and, when the probe fails, rebuilt.
#[async_trait]
pub trait Liveness: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
    async fn reconnect(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl Liveness for RecordStore {
    async fn ping(&self) -> Result<(), StoreError> {
        RecordStore::ping(self).await
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        RecordStore::reconnect(self).await
    }
}

/// Handle to the running monitor task.
pub struct HealthMonitor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HealthMonitor {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the loop and waits for the task to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "health monitor task panicked");
        }
    }
}

/// Starts the background loop. Every `interval` it pings `target`; on failure it
/// tries one reconnect and logs the outcome. Failures never end the loop, only
/// cancellation does.
pub fn spawn<L>(target: Arc<L>, interval: Duration) -> HealthMonitor
where
    L: Liveness + ?Sized + 'static,
{
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(target, interval, cancel.clone()));
    HealthMonitor { cancel, task }
}

async fn run<L>(target: Arc<L>, interval: Duration, cancel: CancellationToken)
where
    L: Liveness + ?Sized,
{
    info!(?interval, "database health monitor started");
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("database health monitor stopped");
                break;
            }
            _ = ticker.tick() => {
                // cancellation also interrupts an in-flight ping or reconnect
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("database health monitor stopped during a check");
                        break;
                    }
                    _ = check(target.as_ref()) => {}
                }
            }
        }
    }
}

async fn check<L>(target: &L)
where
    L: Liveness + ?Sized,
{
    let Err(e) = target.ping().await else {
        debug!("database ping ok");
        return;
    };

    warn!(
        error = %e,
        connection_failure = e.is_connection_failure(),
        "database connection lost"
    );
    match target.reconnect().await {
        Ok(()) => info!("successfully reconnected to the database"),
        Err(e) => error!(error = %e, "failed to reconnect to the database"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeTarget {
        healthy: AtomicBool,
        reconnect_works: AtomicBool,
        pings: AtomicUsize,
        reconnects: AtomicUsize,
        reconnect_takes: Duration,
    }

    impl FakeTarget {
        fn new(healthy: bool, reconnect_works: bool) -> Arc<Self> {
            Arc::new(Self {
                healthy: AtomicBool::new(healthy),
                reconnect_works: AtomicBool::new(reconnect_works),
                ..Default::default()
            })
        }

        fn pings(&self) -> usize {
            self.pings.load(Ordering::SeqCst)
        }

        fn reconnects(&self) -> usize {
            self.reconnects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Liveness for FakeTarget {
        async fn ping(&self) -> Result<(), StoreError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(StoreError::connection("ping", sqlx::Error::PoolTimedOut))
            }
        }

        async fn reconnect(&self) -> Result<(), StoreError> {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.reconnect_takes).await;
            if self.reconnect_works.load(Ordering::SeqCst) {
                self.healthy.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(StoreError::connection("reconnect", sqlx::Error::PoolTimedOut))
            }
        }
    }

    const TICK: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn healthy_target_is_only_pinged() {
        let target = FakeTarget::new(true, true);
        let monitor = spawn(target.clone(), TICK);

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(target.pings(), 3);
        assert_eq!(target.reconnects(), 0);

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_check_waits_one_interval() {
        let target = FakeTarget::new(true, true);
        let monitor = spawn(target.clone(), TICK);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(target.pings(), 0);

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection_triggers_reconnect() {
        let target = FakeTarget::new(false, true);
        let monitor = spawn(target.clone(), TICK);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(target.pings(), 2);
        assert_eq!(target.reconnects(), 1);

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reconnects_are_retried_next_tick() {
        let target = FakeTarget::new(false, false);
        let monitor = spawn(target.clone(), TICK);

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(target.pings(), 3);
        assert_eq!(target.reconnects(), 3);
        assert!(!monitor.task.is_finished());

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_loop() {
        let target = FakeTarget::new(true, true);
        let monitor = spawn(target.clone(), TICK);
        monitor.cancellation_token().cancel();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(target.pings(), 0);
        assert!(monitor.task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_a_stalled_reconnect() {
        let target = Arc::new(FakeTarget {
            reconnect_takes: Duration::from_secs(60),
            ..Default::default()
        });
        let monitor = spawn(target.clone(), TICK);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(target.reconnects(), 1);

        tokio::time::timeout(Duration::from_secs(1), monitor.shutdown())
            .await
            .expect("monitor stopped while reconnect was pending");
    }
}
