//! Multi-value channel store with count and age retention.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use super::limit::{LimitCallback, LimitEvent, LimitKind};
use super::{SourceDataStore, selected};

struct QueueState<T> {
    values: HashMap<String, VecDeque<(T, Instant)>>,
    full_channels: HashSet<String>,
    expired_channels: HashSet<String>,
}

/// Per-channel FIFO buffer.
///
/// Retention is enforced before each insertion rather than continuously:
/// values older than `max_retain_period` are dropped first, then the oldest
/// values are dropped until there is room under `max_retain_size`. A zero
/// limit disables the corresponding policy.
///
/// The limit callback fires once when a channel enters a limit and once when
/// it leaves it. It is invoked after the store lock has been released, so it
/// may call back into the store.
pub struct ChannelQueueStore<T> {
    max_retain_size: usize,
    max_retain_period: Duration,
    on_limit: Option<LimitCallback>,
    state: Mutex<QueueState<T>>,
}

impl<T> ChannelQueueStore<T> {
    /// Create a store without retention limits.
    pub fn new() -> Self {
        Self::with_limits(0, Duration::ZERO, None)
    }

    /// Create a store with retention limits and an optional limit callback.
    pub fn with_limits(
        max_retain_size: usize,
        max_retain_period: Duration,
        on_limit: Option<LimitCallback>,
    ) -> Self {
        Self {
            max_retain_size,
            max_retain_period,
            on_limit,
            state: Mutex::new(QueueState {
                values: HashMap::new(),
                full_channels: HashSet::new(),
                expired_channels: HashSet::new(),
            }),
        }
    }

    pub fn max_retain_size(&self) -> usize {
        self.max_retain_size
    }

    pub fn max_retain_period(&self) -> Duration {
        self.max_retain_period
    }

    /// Number of values buffered for a channel.
    pub fn len(&self, channel_id: &str) -> usize {
        self.state
            .lock()
            .values
            .get(channel_id)
            .map_or(0, VecDeque::len)
    }

    fn enforce_retention(
        &self,
        state: &mut QueueState<T>,
        channel_id: &str,
        now: Instant,
        events: &mut Vec<LimitEvent>,
    ) {
        let QueueState {
            values,
            full_channels,
            expired_channels,
        } = state;
        let queue = values.entry(channel_id.to_string()).or_default();

        if !self.max_retain_period.is_zero() {
            let period = self.max_retain_period;
            let is_expired =
                |captured: &Instant| now.saturating_duration_since(*captured) > period;

            if queue.front().is_some_and(|(_, captured)| is_expired(captured)) {
                while queue.front().is_some_and(|(_, captured)| is_expired(captured)) {
                    queue.pop_front();
                }
                if expired_channels.insert(channel_id.to_string()) {
                    events.push(LimitEvent {
                        channel_id: channel_id.to_string(),
                        kind: LimitKind::MaxAge(period),
                        entering: true,
                    });
                }
            } else if expired_channels.remove(channel_id) {
                events.push(LimitEvent {
                    channel_id: channel_id.to_string(),
                    kind: LimitKind::MaxAge(period),
                    entering: false,
                });
            }
        }

        if self.max_retain_size > 0 {
            let max = self.max_retain_size;
            if queue.len() >= max {
                if full_channels.insert(channel_id.to_string()) {
                    events.push(LimitEvent {
                        channel_id: channel_id.to_string(),
                        kind: LimitKind::MaxCount(max),
                        entering: true,
                    });
                }
                let excess = queue.len() + 1 - max;
                queue.drain(..excess);
            } else if full_channels.remove(channel_id) {
                events.push(LimitEvent {
                    channel_id: channel_id.to_string(),
                    kind: LimitKind::MaxCount(max),
                    entering: false,
                });
            }
        }
    }

    fn notify(&self, events: Vec<LimitEvent>) {
        if let Some(on_limit) = &self.on_limit {
            for event in &events {
                on_limit(event);
            }
        }
    }
}

impl<T> Default for ChannelQueueStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> SourceDataStore<T> for ChannelQueueStore<T> {
    fn add(&self, channel_id: &str, value: T) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            let now = Instant::now();
            self.enforce_retention(&mut state, channel_id, now, &mut events);
            state
                .values
                .entry(channel_id.to_string())
                .or_default()
                .push_back((value, now));
        }
        self.notify(events);
    }

    fn read(&self, channels: Option<&[String]>) -> Vec<(String, Vec<T>)> {
        let mut state = self.state.lock();

        let drained: Vec<(String, VecDeque<(T, Instant)>)> = match channels {
            None => state.values.drain().collect(),
            Some(_) => {
                let keys: Vec<String> = state
                    .values
                    .keys()
                    .filter(|k| selected(channels, k))
                    .cloned()
                    .collect();
                keys.into_iter()
                    .filter_map(|k| state.values.remove_entry(&k))
                    .collect()
            }
        };
        drop(state);

        let mut result: Vec<(String, Vec<T>)> = drained
            .into_iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(channel, queue)| (channel, queue.into_iter().map(|(v, _)| v).collect()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));

        trace!("Read {} channels from queue store", result.len());
        result
    }

    fn clear(&self) {
        self.state.lock().values.clear();
    }

    fn size(&self) -> usize {
        self.state.lock().values.len()
    }
}
