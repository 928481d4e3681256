//! Retention limit notifications.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

/// Which retention limit a notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// Values older than the retention period were dropped.
    MaxAge(Duration),
    /// The queue reached the maximum number of retained values.
    MaxCount(usize),
}

/// A hysteresis crossing for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitEvent {
    pub channel_id: String,
    pub kind: LimitKind,
    /// `true` when the limit is entered, `false` when it is left.
    pub entering: bool,
}

impl LimitEvent {
    pub fn max_age(&self) -> Option<Duration> {
        match self.kind {
            LimitKind::MaxAge(period) => Some(period),
            LimitKind::MaxCount(_) => None,
        }
    }

    pub fn max_count(&self) -> Option<usize> {
        match self.kind {
            LimitKind::MaxCount(count) => Some(count),
            LimitKind::MaxAge(_) => None,
        }
    }
}

/// Callback invoked on limit crossings.
pub type LimitCallback = Arc<dyn Fn(&LimitEvent) + Send + Sync>;

/// Log a limit crossing for a channel of a source.
///
/// Entering a limit means data is being dropped and is logged as a warning.
pub fn log_limit_event(source_id: &str, event: &LimitEvent) {
    let channel = event.channel_id.as_str();
    match (event.kind, event.entering) {
        (LimitKind::MaxCount(count), true) => warn!(
            source = source_id,
            channel,
            "Number of kept values reached maximum of {} values, oldest values are dropped; \
             consider a larger max retain size or a faster read interval",
            count
        ),
        (LimitKind::MaxAge(period), true) => warn!(
            source = source_id,
            channel,
            "Values older than the retain period of {:?} are being dropped; \
             consider a faster read interval",
            period
        ),
        (LimitKind::MaxCount(count), false) => info!(
            source = source_id,
            channel, "Number of kept values is again below maximum of {} values", count
        ),
        (LimitKind::MaxAge(period), false) => info!(
            source = source_id,
            channel, "No more values older than {:?} are being dropped", period
        ),
    }
}
