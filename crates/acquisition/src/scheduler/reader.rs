//! Scheduled source reader.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::locks::SourceLocks;
use super::state::{CycleCounters, SchedulerState, SchedulerStats};
use crate::Result;
use crate::adapter::ProtocolAdapter;
use crate::config::ScheduleConfig;
use crate::data::{ChannelFilter, ReadResult, SourceReadOutcome};
use crate::error::AdapterError;
use crate::worker_pool::WorkerPool;

/// Stream of cycle results produced by a schedule.
///
/// Single consumer, ends when the schedule stops and cannot be restarted.
pub type ReadResultStream = ReceiverStream<ReadResult>;

type ContinueFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Reads all sources of a schedule periodically.
///
/// Every cycle fans out one read per source over a fresh [`WorkerPool`],
/// waits for all of them under the cycle timeout, emits one [`ReadResult`]
/// and then sleeps for the remainder of the interval. A cycle that misses
/// its deadline emits nothing.
pub struct SourceReadScheduler {
    config: ScheduleConfig,
    adapter: Arc<dyn ProtocolAdapter>,
    locks: SourceLocks,
    cancellation_token: CancellationToken,
}

impl SourceReadScheduler {
    /// Create a scheduler for a validated schedule configuration.
    pub fn new(adapter: Arc<dyn ProtocolAdapter>, config: ScheduleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            adapter,
            locks: SourceLocks::new(),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Share per-source locks with other schedules reading through the same adapter.
    pub fn with_locks(mut self, locks: SourceLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Stop the schedule when `parent` is cancelled.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancellation_token = parent.child_token();
        self
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn locks(&self) -> &SourceLocks {
        &self.locks
    }

    /// Start reading.
    ///
    /// `should_continue` is polled at every cycle boundary and before pacing;
    /// once it returns `false` the schedule stops. Must be called from within
    /// a Tokio runtime.
    pub fn start<F>(self, should_continue: F) -> (ScheduleHandle, ReadResultStream)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let (result_tx, result_rx) = mpsc::channel(self.config.result_channel_size);
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
        let counters = Arc::new(CycleCounters::default());

        let runner = CycleRunner {
            schedule: self.config.name.clone(),
            interval: self.config.interval(),
            timeout: self.config.timeout(),
            max_concurrent_reads: self.config.max_concurrent_source_reads,
            sources: self.config.channel_filters().into_iter().collect(),
            adapter: self.adapter.clone(),
            locks: self.locks.clone(),
            token: self.cancellation_token.clone(),
            should_continue: Arc::new(should_continue),
            result_tx,
            state_tx,
            counters: counters.clone(),
        };

        info!(
            schedule = %self.config.name,
            "Starting schedule with {} sources, interval {:?}, timeout {:?}",
            self.config.sources.len(),
            self.config.interval(),
            self.config.timeout()
        );

        let task = tokio::spawn(runner.run());

        let handle = ScheduleHandle {
            stop_timeout: self.config.stop_timeout(),
            schedule: self.config.name,
            adapter: self.adapter,
            cancellation_token: self.cancellation_token,
            state_rx,
            counters,
            task: Some(task),
        };

        (handle, ReceiverStream::new(result_rx))
    }
}

/// Handle to a running schedule.
///
/// Dropping the handle does not stop the schedule; use [`close`](Self::close)
/// or drop the result stream.
pub struct ScheduleHandle {
    schedule: String,
    adapter: Arc<dyn ProtocolAdapter>,
    stop_timeout: Duration,
    cancellation_token: CancellationToken,
    state_rx: watch::Receiver<SchedulerState>,
    counters: Arc<CycleCounters>,
    task: Option<JoinHandle<()>>,
}

impl ScheduleHandle {
    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        *self.state_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        !self.state().is_terminal() && !self.cancellation_token.is_cancelled()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }

    /// Request the schedule to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    /// Wait until the schedule has stopped.
    ///
    /// Returns `true` if it stopped within `timeout`.
    pub async fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let mut state_rx = self.state_rx.clone();
        tokio::time::timeout(timeout, state_rx.wait_for(|s| s.is_terminal()))
            .await
            .is_ok()
    }

    /// Stop the schedule, wait for the run loop to finish and stop the adapter.
    pub async fn close(mut self) {
        debug!(schedule = %self.schedule, "Closing schedule");
        self.cancellation_token.cancel();

        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            error!(schedule = %self.schedule, "Schedule task failed: {}", e);
        }

        self.adapter.stop(self.stop_timeout).await;
        info!(schedule = %self.schedule, "Schedule closed");
    }
}

/// State owned by the run loop of one schedule.
struct CycleRunner {
    schedule: String,
    interval: Duration,
    timeout: Duration,
    max_concurrent_reads: usize,
    sources: Vec<(String, ChannelFilter)>,
    adapter: Arc<dyn ProtocolAdapter>,
    locks: SourceLocks,
    token: CancellationToken,
    should_continue: ContinueFn,
    result_tx: mpsc::Sender<ReadResult>,
    state_tx: watch::Sender<SchedulerState>,
    counters: Arc<CycleCounters>,
}

impl CycleRunner {
    fn set_state(&self, state: SchedulerState) {
        self.state_tx.send_replace(state);
    }

    fn keep_running(&self) -> bool {
        !self.token.is_cancelled() && !self.result_tx.is_closed() && (self.should_continue)()
    }

    async fn run(self) {
        self.set_state(SchedulerState::Initializing);
        self.locks.ensure(self.sources.iter().map(|(id, _)| id));

        // Set until the first cycle has been paced; suppresses overrun warnings.
        let initial_cycle = Arc::new(AtomicBool::new(true));

        loop {
            if !self.keep_running() {
                self.token.cancel();
                break;
            }

            self.set_state(SchedulerState::CycleRunning);
            let start = Instant::now();
            let Some(result) = self.run_cycle(&initial_cycle).await else {
                break;
            };

            if let Some(result) = result {
                let sent = tokio::select! {
                    _ = self.token.cancelled() => break,
                    sent = self.result_tx.send(result) => sent,
                };
                if sent.is_err() {
                    info!(schedule = %self.schedule, "Result consumer dropped, stopping schedule");
                    break;
                }
                self.counters.record_emitted();
            }

            let duration = start.elapsed();
            let first = initial_cycle.load(Ordering::SeqCst);

            if duration >= self.interval {
                if !first {
                    warn!(
                        schedule = %self.schedule,
                        "Read cycle took {:?}, which is more than the read interval of {:?}",
                        duration, self.interval
                    );
                }
            } else {
                trace!(schedule = %self.schedule, "Read cycle took {:?}", duration);
                if !self.keep_running() {
                    break;
                }
                self.set_state(SchedulerState::Pacing);
                tokio::select! {
                    _ = self.token.cancelled() => break,
                    _ = tokio::time::sleep(self.interval - duration) => {}
                }
            }

            initial_cycle.store(false, Ordering::SeqCst);
        }

        self.set_state(SchedulerState::Stopped);
        info!(schedule = %self.schedule, "Schedule stopped");
    }

    /// Run one cycle.
    ///
    /// Returns `None` if the schedule was cancelled during the cycle,
    /// `Some(None)` if the cycle missed its deadline.
    async fn run_cycle(&self, initial_cycle: &Arc<AtomicBool>) -> Option<Option<ReadResult>> {
        let mut pool = self.build_pool(initial_cycle.clone());
        for (source_id, filter) in &self.sources {
            pool.submit((source_id.clone(), filter.clone()));
        }

        let collected = tokio::select! {
            _ = self.token.cancelled() => {
                pool.reset();
                return None;
            }
            collected = tokio::time::timeout(self.timeout, pool.await_all()) => collected,
        };

        match collected {
            Ok(outcomes) => Some(Some(outcomes.into_iter().collect())),
            Err(_) => {
                pool.reset();
                self.counters.record_timed_out();
                warn!(
                    schedule = %self.schedule,
                    "Timeout reading from sources after {:?}, no result for this cycle",
                    self.timeout
                );
                Some(None)
            }
        }
    }

    fn build_pool(
        &self,
        initial_cycle: Arc<AtomicBool>,
    ) -> WorkerPool<(String, ChannelFilter), (String, SourceReadOutcome)> {
        let adapter = self.adapter.clone();
        let locks = self.locks.clone();
        let schedule: Arc<str> = Arc::from(self.schedule.as_str());
        let interval = self.interval;

        WorkerPool::new(
            format!("schedule-{}", self.schedule),
            self.max_concurrent_reads,
            move |(source_id, filter): (String, ChannelFilter)| {
                let adapter = adapter.clone();
                let locks = locks.clone();
                let schedule = schedule.clone();
                let initial_cycle = initial_cycle.clone();
                async move {
                    let _guard = locks.acquire(&source_id).await;
                    trace!(
                        schedule = %schedule,
                        "Start reading {} channels from source \"{}\"",
                        filter
                            .channels()
                            .map_or_else(|| "all".to_string(), |c| c.len().to_string()),
                        source_id
                    );

                    let start = Instant::now();
                    let read = AssertUnwindSafe(adapter.read(&source_id, &filter))
                        .catch_unwind()
                        .await;
                    let elapsed = start.elapsed();

                    let outcome = match read {
                        Ok(Ok(outcome)) => outcome,
                        Ok(Err(AdapterError::Cancelled)) => SourceReadOutcome::cancelled(),
                        Ok(Err(e)) => {
                            error!(schedule = %schedule, "Error reading from source \"{}\": {}", source_id, e);
                            SourceReadOutcome::error(e.to_string())
                        }
                        Err(panic) => {
                            let message = panic_message(panic.as_ref());
                            error!(schedule = %schedule, "Reading from source \"{}\" panicked: {}", source_id, message);
                            SourceReadOutcome::error(message)
                        }
                    };

                    debug!(
                        schedule = %schedule,
                        "Finished reading from source \"{}\" in {:?}, success: {}",
                        source_id,
                        elapsed,
                        outcome.is_success()
                    );

                    if !initial_cycle.load(Ordering::SeqCst) && elapsed > interval {
                        warn!(
                            schedule = %schedule,
                            "Reading from source \"{}\" took {:?}, which is {:?} more than the read interval of {:?}",
                            source_id,
                            elapsed,
                            elapsed - interval,
                            interval
                        );
                    }

                    (source_id, outcome)
                }
            },
        )
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "Source read panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio_stream::StreamExt;

    struct EchoAdapter;

    #[async_trait]
    impl ProtocolAdapter for EchoAdapter {
        async fn read(
            &self,
            source_id: &str,
            filter: &ChannelFilter,
        ) -> std::result::Result<SourceReadOutcome, AdapterError> {
            let mut values = HashMap::new();
            values.insert(
                "filter".to_string(),
                crate::ChannelValue::new(format!("{}:{}", source_id, filter.is_all())),
            );
            Ok(SourceReadOutcome::success(values))
        }

        async fn stop(&self, _timeout: Duration) {}
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ScheduleConfig::new("bad").with_interval(Duration::ZERO);
        assert!(SourceReadScheduler::new(Arc::new(EchoAdapter), config).is_err());
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "Source read panicked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_passed_to_adapter() {
        let config = ScheduleConfig::new("echo")
            .with_source("all", ["*"])
            .with_source("some", ["a", "b"]);
        let scheduler = SourceReadScheduler::new(Arc::new(EchoAdapter), config).unwrap();
        assert!(scheduler.locks().is_empty());

        let (handle, mut results) = scheduler.start(|| true);
        let result = results.next().await.unwrap();

        let all = result.get("all").unwrap().values().unwrap();
        assert_eq!(all["filter"].value, serde_json::json!("all:true"));
        let some = result.get("some").unwrap().values().unwrap();
        assert_eq!(some["filter"].value, serde_json::json!("some:false"));

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_continue_false_stops_immediately() {
        let config = ScheduleConfig::new("never").with_source("a", Vec::<String>::new());
        let scheduler = SourceReadScheduler::new(Arc::new(EchoAdapter), config).unwrap();

        let (handle, mut results) = scheduler.start(|| false);
        assert!(results.next().await.is_none());
        assert!(handle.wait_until_stopped(Duration::from_secs(1)).await);
        assert_eq!(handle.state(), SchedulerState::Stopped);
        assert!(!handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_schedule() {
        let parent = CancellationToken::new();
        let config = ScheduleConfig::new("child").with_source("a", ["x"]);
        let scheduler = SourceReadScheduler::new(Arc::new(EchoAdapter), config)
            .unwrap()
            .with_cancellation(&parent);

        let (handle, mut results) = scheduler.start(|| true);
        assert!(results.next().await.is_some());

        parent.cancel();
        assert!(handle.wait_until_stopped(Duration::from_secs(5)).await);
        assert!(results.next().await.is_none());
    }
}
