//! Data model shared by the scheduler, the stores and adapters.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel filter entry that selects every channel a source exposes.
pub const WILDCARD: &str = "*";

/// A single captured channel value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelValue {
    /// The opaque value as delivered by the adapter.
    pub value: serde_json::Value,
    /// When the value was captured.
    pub captured_at: DateTime<Utc>,
}

impl ChannelValue {
    /// Create a value captured now.
    pub fn new(value: impl Into<serde_json::Value>) -> Self {
        Self::captured_at(value, Utc::now())
    }

    /// Create a value with an explicit capture timestamp.
    pub fn captured_at(value: impl Into<serde_json::Value>, captured_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            captured_at,
        }
    }
}

/// Channels requested from a source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChannelFilter {
    /// All channels the adapter currently exposes.
    #[default]
    All,
    /// An explicit, de-duplicated set of channel IDs.
    Channels(BTreeSet<String>),
}

impl ChannelFilter {
    /// Build a filter from a configured channel list.
    ///
    /// An empty list, or a list whose first entry is the wildcard, selects all
    /// channels.
    pub fn from_list<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = channels.into_iter().map(Into::into).peekable();
        match iter.peek() {
            None => Self::All,
            Some(first) if first == WILDCARD => Self::All,
            Some(_) => Self::Channels(iter.collect()),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Check whether a channel is selected by this filter.
    pub fn matches(&self, channel_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Channels(set) => set.contains(channel_id),
        }
    }

    /// The selected channels, or `None` for all channels.
    pub fn channels(&self) -> Option<Vec<String>> {
        match self {
            Self::All => None,
            Self::Channels(set) => Some(set.iter().cloned().collect()),
        }
    }
}

/// Outcome of reading one source in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceReadOutcome {
    Success {
        values: HashMap<String, ChannelValue>,
        completed_at: DateTime<Utc>,
    },
    Error {
        message: String,
        occurred_at: DateTime<Utc>,
    },
    /// The read was cancelled before it produced anything.
    Cancelled { occurred_at: DateTime<Utc> },
}

impl SourceReadOutcome {
    pub fn success(values: HashMap<String, ChannelValue>) -> Self {
        Self::Success {
            values,
            completed_at: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn cancelled() -> Self {
        Self::Cancelled {
            occurred_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Values of a successful read.
    pub fn values(&self) -> Option<&HashMap<String, ChannelValue>> {
        match self {
            Self::Success { values, .. } => Some(values),
            _ => None,
        }
    }

    /// Message of a failed read.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Timestamp at which the outcome was produced.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Success { completed_at, .. } => *completed_at,
            Self::Error { occurred_at, .. } | Self::Cancelled { occurred_at } => *occurred_at,
        }
    }
}

/// Result of one completed read cycle, keyed by source ID.
///
/// Only sources whose read finished before the cycle deadline are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadResult {
    outcomes: HashMap<String, SourceReadOutcome>,
}

impl ReadResult {
    pub fn new(outcomes: HashMap<String, SourceReadOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn get(&self, source_id: &str) -> Option<&SourceReadOutcome> {
        self.outcomes.get(source_id)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.outcomes.contains_key(source_id)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SourceReadOutcome)> {
        self.outcomes.iter()
    }

    /// Sources that were read successfully.
    pub fn successes(&self) -> impl Iterator<Item = (&String, &HashMap<String, ChannelValue>)> {
        self.outcomes
            .iter()
            .filter_map(|(id, outcome)| outcome.values().map(|values| (id, values)))
    }

    /// Sources whose read failed, with the error message.
    pub fn errors(&self) -> impl Iterator<Item = (&String, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(id, outcome)| outcome.error_message().map(|msg| (id, msg)))
    }

    pub fn into_inner(self) -> HashMap<String, SourceReadOutcome> {
        self.outcomes
    }
}

impl FromIterator<(String, SourceReadOutcome)> for ReadResult {
    fn from_iter<T: IntoIterator<Item = (String, SourceReadOutcome)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for ReadResult {
    type Item = (String, SourceReadOutcome);
    type IntoIter = std::collections::hash_map::IntoIter<String, SourceReadOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}
