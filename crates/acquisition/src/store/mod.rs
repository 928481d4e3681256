//! Buffered channel value stores.
//!
//! Event-driven adapters push values into a store as they arrive; target-facing
//! drain logic removes them again with a destructive [`SourceDataStore::read`].
//!
//! - [`ChannelQueueStore`] keeps every value per channel, bounded by a maximum
//!   count and a maximum age, with hysteresis notifications when a limit is
//!   entered or left.
//! - [`LatestValueStore`] keeps only the most recent value per channel.
//! - [`SourceStores`] builds one store per source from a [`StoreConfig`](crate::StoreConfig).

mod latest;
mod limit;
mod queue;
mod sources;

pub use latest::LatestValueStore;
pub use limit::{LimitCallback, LimitEvent, LimitKind, log_limit_event};
pub use queue::ChannelQueueStore;
pub use sources::SourceStores;

/// Common interface of the channel value stores.
pub trait SourceDataStore<T>: Send + Sync {
    /// Store a value for a channel.
    fn add(&self, channel_id: &str, value: T);

    /// Remove and return buffered values.
    ///
    /// `None` drains every channel; `Some(channels)` drains only the listed
    /// channels and leaves the rest untouched. Channels without data are
    /// absent from the result.
    fn read(&self, channels: Option<&[String]>) -> Vec<(String, Vec<T>)>;

    /// Remove all buffered values.
    fn clear(&self);

    /// Number of channels currently holding data.
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

/// Check whether a channel is selected by an optional channel list.
fn selected(channels: Option<&[String]>, channel_id: &str) -> bool {
    channels.is_none_or(|list| list.iter().any(|c| c == channel_id))
}
