//! Resilient driver wrapper
//!
//! [`DriverFacade::run`] retries `Driver::start` in the background with a fixed
//! interval. Until the first successful start the facade is not ready and
//! `accept` fails fast with [`DriverError::NotReady`]; retrying pushes is the
//! caller's job.
//!
//! Stopping cancels further start attempts. An attempt already in flight is
//! awaited; if it succeeds the driver is stopped right away.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::drivers::{Driver, DriverError, ItemResults, LogWithLedger};

struct Startup {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct DriverFacade {
    driver: Arc<dyn Driver>,
    retry_interval: Duration,
    ready: Arc<watch::Sender<bool>>,
    startup: Mutex<Option<Startup>>,
}

impl DriverFacade {
    pub fn new(driver: Arc<dyn Driver>, retry_interval: Duration) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            driver,
            retry_interval,
            ready: Arc::new(ready),
            startup: Mutex::new(None),
        }
    }

    /// Kick off the startup worker; later calls are no-ops
    pub async fn run(&self) {
        let mut startup = self.startup.lock().await;
        if startup.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(start_with_retry(
            self.driver.clone(),
            self.retry_interval,
            self.ready.clone(),
            cancel.clone(),
        ));
        *startup = Some(Startup { cancel, handle });
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolves once the driver started; never resolves for a facade stopped before that
    pub async fn ready(&self) {
        let mut ready = self.ready.subscribe();
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Cancel a pending startup, then stop the driver if it ever became ready
    pub async fn stop(&self) -> Result<(), DriverError> {
        let startup = self.startup.lock().await.take();
        if let Some(startup) = startup {
            startup.cancel.cancel();
            if let Err(err) = startup.handle.await {
                warn!(error = %err, "Driver startup worker terminated abnormally");
            }
        }

        if self.ready.send_replace(false) {
            return self.driver.stop().await;
        }
        Ok(())
    }

    pub async fn accept(&self, logs: Vec<LogWithLedger>) -> Result<ItemResults, DriverError> {
        if !self.is_ready() {
            return Err(DriverError::NotReady);
        }
        self.driver.accept(logs).await
    }
}

async fn start_with_retry(
    driver: Arc<dyn Driver>,
    retry_interval: Duration,
    ready: Arc<watch::Sender<bool>>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        attempt += 1;

        // An attempt in flight runs to completion so a driver that does start gets stopped
        match driver.start().await {
            Ok(()) => {
                ready.send_replace(true);
                info!(attempt, "Driver ready");
                return;
            }
            Err(DriverError::Cancelled) => return,
            Err(err) => {
                warn!(attempt, error = %err, retry_in = ?retry_interval, "Driver start failed");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(retry_interval) => {}
                }
            }
        }
    }
}

#[async_trait]
impl Driver for DriverFacade {
    async fn start(&self) -> Result<(), DriverError> {
        self.run().await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), DriverError> {
        DriverFacade::stop(self).await
    }

    async fn accept(&self, logs: Vec<LogWithLedger>) -> Result<ItemResults, DriverError> {
        DriverFacade::accept(self, logs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MockDriver;
    use crate::models::Log;
    use serde_json::json;

    fn logs() -> Vec<LogWithLedger> {
        vec![LogWithLedger::new("default", Log::new(1, "NEW_TRANSACTION", json!({})))]
    }

    #[tokio::test]
    async fn test_accept_fails_fast_before_ready() {
        let driver = Arc::new(MockDriver::new());
        driver.fail_next_starts(usize::MAX);
        let facade = DriverFacade::new(driver.clone(), Duration::from_millis(10));
        facade.run().await;

        let result = tokio::time::timeout(Duration::from_millis(100), facade.accept(logs()))
            .await
            .expect("accept must not block");

        assert_eq!(result.unwrap_err(), DriverError::NotReady);
        assert_eq!(driver.accept_count(), 0);
        facade.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_is_retried_until_ready() {
        let driver = Arc::new(MockDriver::new());
        driver.fail_next_starts(2);
        let facade = DriverFacade::new(driver.clone(), Duration::from_millis(10));
        facade.run().await;

        tokio::time::timeout(Duration::from_secs(2), facade.ready())
            .await
            .expect("facade should become ready");

        assert_eq!(driver.start_attempts(), 3);
        assert_eq!(driver.start_count(), 1);
        assert!(facade.accept(logs()).await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_before_ready_does_not_stop_driver() {
        let driver = Arc::new(MockDriver::new());
        driver.fail_next_starts(usize::MAX);
        let facade = DriverFacade::new(driver.clone(), Duration::from_secs(60));
        facade.run().await;

        facade.stop().await.unwrap();

        assert!(!facade.is_ready());
        assert_eq!(driver.stop_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_after_ready_stops_driver_once() {
        let driver = Arc::new(MockDriver::new());
        let facade = DriverFacade::new(driver.clone(), Duration::from_millis(10));
        facade.run().await;
        facade.ready().await;

        facade.stop().await.unwrap();
        facade.stop().await.unwrap();

        assert_eq!(driver.stop_count(), 1);
        assert_eq!(facade.accept(logs()).await.unwrap_err(), DriverError::NotReady);
    }

    /// Driver whose start blocks until released
    #[derive(Default)]
    struct SlowStart {
        inner: MockDriver,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl Driver for SlowStart {
        async fn start(&self) -> Result<(), DriverError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.start().await
        }

        async fn stop(&self) -> Result<(), DriverError> {
            self.inner.stop().await
        }

        async fn accept(&self, logs: Vec<LogWithLedger>) -> Result<ItemResults, DriverError> {
            self.inner.accept(logs).await
        }
    }

    #[tokio::test]
    async fn test_stop_during_start_stops_driver_once_started() {
        let driver = Arc::new(SlowStart::default());
        let facade = Arc::new(DriverFacade::new(driver.clone(), Duration::from_millis(10)));
        facade.run().await;
        driver.entered.notified().await;

        let stopping = tokio::spawn({
            let facade = facade.clone();
            async move { facade.stop().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!stopping.is_finished(), "stop waits for the attempt in flight");

        driver.release.notify_one();
        stopping.await.unwrap().unwrap();

        assert_eq!(driver.inner.start_count(), 1);
        assert_eq!(driver.inner.stop_count(), 1);
        assert!(!facade.is_ready());

        facade.stop().await.unwrap();
        assert_eq!(driver.inner.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_run_is_idempotent() {
        let driver = Arc::new(MockDriver::new());
        let facade = DriverFacade::new(driver.clone(), Duration::from_millis(10));
        facade.run().await;
        facade.run().await;
        facade.ready().await;

        assert_eq!(driver.start_attempts(), 1);
    }
}
