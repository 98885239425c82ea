//! Processing-state polling
//!
//! Uploaded media is processed asynchronously by the provider. The poller
//! re-reads the file record on a Fibonacci-scaled delay until it leaves
//! `PROCESSING`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::api::files::FileService;
use crate::types::file::FileMetadata;
use crate::upload::UploadError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Delays of `interval * F(k)` for k = 1, 2, 3, ...
///
/// Never ends; the delay saturates instead of overflowing.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    interval: Duration,
    max_delay: Option<Duration>,
    current: u32,
    next: u32,
}

impl FibonacciBackoff {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_delay: None,
            current: 1,
            next: 1,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }
}

impl Iterator for FibonacciBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let factor = self.current;
        self.current = self.next;
        self.next = self.next.saturating_add(factor);
        let delay = self.interval.saturating_mul(factor);
        Some(match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        })
    }
}

/// Stops a running poll
#[derive(Debug, Clone, Default)]
pub struct PollHandle {
    stopped: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl PollHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // notify_one keeps a permit if the poller isn't waiting yet
        self.wake.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Polls file records until processing finishes
#[derive(Clone)]
pub struct StatusPoller {
    service: Arc<dyn FileService>,
    interval: Duration,
    max_delay: Option<Duration>,
}

impl StatusPoller {
    pub fn new(service: Arc<dyn FileService>) -> Self {
        Self {
            service,
            interval: DEFAULT_POLL_INTERVAL,
            max_delay: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Cap individual delays; uncapped by default
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn backoff(&self) -> FibonacciBackoff {
        FibonacciBackoff::new(self.interval).with_max_delay(self.max_delay)
    }

    /// Wait until `file_id` reaches a terminal state
    ///
    /// The first check happens one interval after the call. A failed check
    /// ends the wait with that error.
    pub async fn wait(
        &self,
        file_id: &str,
        handle: &PollHandle,
    ) -> Result<FileMetadata, UploadError> {
        for (attempt, delay) in self.backoff().enumerate() {
            if handle.is_stopped() {
                return Err(UploadError::Cancelled);
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = handle.wake.notified() => {}
            }
            if handle.is_stopped() {
                tracing::debug!("Polling of {} stopped", file_id);
                return Err(UploadError::Cancelled);
            }

            let metadata = self.service.get_metadata(file_id).await?;
            if metadata.state.is_terminal() {
                tracing::info!("File {} is {:?}", file_id, metadata.state);
                return Ok(metadata);
            }
            tracing::debug!(
                "File {} still processing after check {}",
                file_id,
                attempt + 1
            );
        }
        Err(UploadError::Cancelled)
    }

    /// Poll in the background and hand the outcome to `on_complete`
    ///
    /// `on_complete` is not called when the returned handle stops the poll.
    pub fn spawn(
        &self,
        file_id: impl Into<String>,
        on_complete: impl FnOnce(Result<FileMetadata, UploadError>) + Send + 'static,
    ) -> PollHandle {
        let handle = PollHandle::new();
        let poller = self.clone();
        let task_handle = handle.clone();
        let file_id = file_id.into();
        tokio::spawn(async move {
            match poller.wait(&file_id, &task_handle).await {
                Err(UploadError::Cancelled) => {}
                result => on_complete(result),
            }
        });
        handle
    }
}
