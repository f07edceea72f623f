use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::traits::{Driver, DriverError, ItemResults};
use super::types::LogWithLedger;

#[derive(Debug, Default)]
struct MockState {
    batches: Vec<Vec<LogWithLedger>>,
    rejected: HashSet<u64>,
    failing_starts: usize,
    failing_accepts: usize,
}

/// In-memory driver for tests and development
///
/// Records every accepted batch and can be scripted to fail starts, whole
/// calls, or individual logs.
#[derive(Debug, Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
    starts: AtomicUsize,
    start_attempts: AtomicUsize,
    stops: AtomicUsize,
    accept_calls: AtomicUsize,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next `count` calls to `start`
    pub fn fail_next_starts(&self, count: usize) {
        self.state().failing_starts = count;
    }

    /// Fail the next `count` calls to `accept` with a call-level error
    pub fn fail_next_accepts(&self, count: usize) {
        self.state().failing_accepts = count;
    }

    /// Report a per-item error for the log with this id until [`MockDriver::accept_log`]
    pub fn reject_log(&self, id: u64) {
        self.state().rejected.insert(id);
    }

    pub fn accept_log(&self, id: u64) {
        self.state().rejected.remove(&id);
    }

    /// Batches that were fully accepted, in call order
    pub fn accepted_batches(&self) -> Vec<Vec<LogWithLedger>> {
        self.state().batches.clone()
    }

    pub fn accepted_ids(&self) -> Vec<u64> {
        self.state()
            .batches
            .iter()
            .flatten()
            .map(LogWithLedger::id)
            .collect()
    }

    /// Successful starts
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn start_attempts(&self) -> usize {
        self.start_attempts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Every `accept` call, failed ones included
    pub fn accept_count(&self) -> usize {
        self.accept_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn start(&self) -> Result<(), DriverError> {
        self.start_attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state();
            if state.failing_starts > 0 {
                state.failing_starts -= 1;
                return Err(DriverError::Connection("mock start failure".to_string()));
            }
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), DriverError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn accept(&self, logs: Vec<LogWithLedger>) -> Result<ItemResults, DriverError> {
        self.accept_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state();
        if state.failing_accepts > 0 {
            state.failing_accepts -= 1;
            return Err(DriverError::Export("mock accept failure".to_string()));
        }

        let results: ItemResults = logs
            .iter()
            .map(|log| {
                if state.rejected.contains(&log.id()) {
                    Err(DriverError::Rejected(format!("log {} rejected", log.id())))
                } else {
                    Ok(())
                }
            })
            .collect();

        if results.iter().all(Result::is_ok) {
            state.batches.push(logs);
        }

        tracing::debug!(count = results.len(), "Mock accept");
        Ok(results)
    }
}
