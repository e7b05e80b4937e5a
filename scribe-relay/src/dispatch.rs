//! Rate-limited dispatch queue for downstream task board writes
//!
//! A single worker drains a FIFO queue of asynchronous operations,
//! enforcing a sliding-window request ceiling and retrying throttled
//! failures with linear backoff. Submission order equals dispatch order:
//! notes and checklist entries for the same card must land in the order
//! they were produced.
//!
//! One task exhausting its retries never blocks or cancels the tasks
//! queued behind it; its error is surfaced to the submitting caller only.

use scribe_common::{Error, Result};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

use crate::config::DispatcherSettings;

/// Dispatcher tuning knobs
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sliding window span
    pub window: Duration,
    /// Request ceiling inside one window
    pub max_requests: usize,
    /// Retries after a throttled failure
    pub max_retries: u32,
    /// Base retry delay; attempt `n` waits `retry_delay * n`
    pub retry_delay: Duration,
    /// Capacity poll interval while the window is full
    pub poll_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(10),
            max_requests: 10,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl From<&DispatcherSettings> for DispatcherConfig {
    fn from(settings: &DispatcherSettings) -> Self {
        Self {
            window: Duration::from_secs(settings.window_secs),
            max_requests: settings.max_requests,
            max_retries: settings.max_retries,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            ..Self::default()
        }
    }
}

type OperationFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type Operation = Box<dyn FnMut() -> OperationFuture + Send>;

/// One queued unit of outbound work
struct DispatchTask {
    label: String,
    operation: Operation,
    respond: oneshot::Sender<Result<()>>,
}

/// Sliding set of recent dispatch timestamps
///
/// Mutated only by the single worker, so no locking beyond that
/// serialization is needed. Invariant: the count of timestamps younger
/// than `window` never exceeds `max_requests` at execution time.
struct RateWindow {
    window: Duration,
    max_requests: usize,
    stamps: VecDeque<Instant>,
}

impl RateWindow {
    fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            stamps: VecDeque::new(),
        }
    }

    /// Drop timestamps that have aged out of the window
    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.stamps.front() {
            if now.duration_since(front) >= self.window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn has_capacity(&mut self, now: Instant) -> bool {
        self.prune(now);
        self.stamps.len() < self.max_requests
    }

    fn record(&mut self, now: Instant) {
        self.stamps.push_back(now);
    }
}

/// Rate-limited FIFO dispatcher
///
/// Cheap to clone; all clones feed the same worker and therefore share
/// the same ordering and rate window.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<DispatchTask>,
}

impl Dispatcher {
    /// Create the dispatcher and spawn its worker
    pub fn new(config: DispatcherConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(config, rx));
        Self { tx }
    }

    /// Submit an operation and await its final outcome
    ///
    /// The operation is invoked by the worker once capacity allows; a
    /// throttled failure is retried (the closure is called again) up to
    /// the configured limit. The returned result is the operation's final
    /// success, or its final error after retries are exhausted, or the
    /// first non-retryable error.
    pub async fn execute<F, Fut>(&self, label: &str, mut operation: F) -> Result<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (respond_tx, respond_rx) = oneshot::channel();
        let task = DispatchTask {
            label: label.to_string(),
            operation: Box::new(move || -> OperationFuture { Box::pin(operation()) }),
            respond: respond_tx,
        };

        self.tx
            .send(task)
            .map_err(|_| Error::Dispatch("Dispatcher worker stopped".to_string()))?;

        respond_rx
            .await
            .map_err(|_| Error::Dispatch("Dispatcher dropped task".to_string()))?
    }
}

/// Single drain loop: parks on the channel when the queue is empty,
/// picks up concurrent enqueues without ever starting a second loop.
async fn run_worker(config: DispatcherConfig, mut rx: mpsc::UnboundedReceiver<DispatchTask>) {
    let mut window = RateWindow::new(config.window, config.max_requests);

    while let Some(mut task) = rx.recv().await {
        let result = execute_with_retries(&config, &mut window, &mut task.operation, &task.label).await;

        if let Err(ref e) = result {
            tracing::error!(label = %task.label, error = %e, "Dispatch task failed terminally");
        }
        if task.respond.send(result).is_err() {
            tracing::debug!(label = %task.label, "Dispatch caller dropped before completion");
        }
    }

    tracing::debug!("Dispatch queue closed, worker exiting");
}

async fn execute_with_retries(
    config: &DispatcherConfig,
    window: &mut RateWindow,
    operation: &mut Operation,
    label: &str,
) -> Result<()> {
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        // Every invocation, retries included, consumes window capacity
        wait_for_capacity(config, window).await;
        window.record(Instant::now());

        match operation().await {
            Ok(()) => {
                if attempt > 1 {
                    tracing::info!(label, attempt, "Dispatch succeeded after retry");
                }
                return Ok(());
            }
            Err(err) if err.is_retryable() && attempt <= config.max_retries => {
                let delay = config.retry_delay * attempt;
                tracing::warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Throttled by downstream, will retry"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn wait_for_capacity(config: &DispatcherConfig, window: &mut RateWindow) {
    loop {
        if window.has_capacity(Instant::now()) {
            return;
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_rate_window_capacity() {
        let mut window = RateWindow::new(Duration::from_secs(1), 2);
        let now = Instant::now();

        assert!(window.has_capacity(now));
        window.record(now);
        assert!(window.has_capacity(now));
        window.record(now);
        assert!(!window.has_capacity(now));
    }

    #[test]
    fn test_rate_window_prunes_aged_stamps() {
        let mut window = RateWindow::new(Duration::from_millis(100), 1);
        let start = Instant::now();

        window.record(start);
        assert!(!window.has_capacity(start));
        // Same stamp viewed from past the window edge has aged out
        assert!(window.has_capacity(start + Duration::from_millis(150)));
        assert!(window.stamps.is_empty());
    }

    #[tokio::test]
    async fn test_execute_returns_operation_result() {
        let dispatcher = Dispatcher::new(DispatcherConfig {
            window: Duration::from_millis(100),
            max_requests: 10,
            max_retries: 0,
            retry_delay: Duration::from_millis(10),
            poll_interval: Duration::from_millis(5),
        });

        let ok = dispatcher.execute("ok", || async { Ok(()) }).await;
        assert!(ok.is_ok());

        let err = dispatcher
            .execute("bad", || async {
                Err(Error::Validation("nope".to_string()))
            })
            .await;
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_non_retryable_error_invokes_once() {
        let dispatcher = Dispatcher::new(DispatcherConfig {
            window: Duration::from_millis(100),
            max_requests: 10,
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
            poll_interval: Duration::from_millis(5),
        });

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result = dispatcher
            .execute("fatal", move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Dispatch("permanent".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
