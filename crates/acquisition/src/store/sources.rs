//! Per-source store construction.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::limit::{LimitEvent, log_limit_event};
use super::{ChannelQueueStore, LatestValueStore, SourceDataStore};
use crate::config::{ReadMode, StoreConfig};
use crate::data::ChannelValue;

type ChannelStore = Arc<dyn SourceDataStore<ChannelValue>>;

/// One value store per source, built according to a [`StoreConfig`].
///
/// `KeepLast` sources get a [`LatestValueStore`]; `KeepAll` sources get a
/// [`ChannelQueueStore`] whose limit crossings are logged with the source ID.
#[derive(Clone)]
pub struct SourceStores {
    read_mode: ReadMode,
    stores: HashMap<String, ChannelStore>,
}

impl SourceStores {
    pub fn new<I, S>(source_ids: I, config: &StoreConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stores = source_ids
            .into_iter()
            .map(Into::into)
            .map(|source_id: String| {
                let store = Self::build_store(&source_id, config);
                (source_id, store)
            })
            .collect::<HashMap<_, _>>();

        debug!(
            "Created {} {} value stores",
            stores.len(),
            config.read_mode
        );

        Self {
            read_mode: config.read_mode,
            stores,
        }
    }

    fn build_store(source_id: &str, config: &StoreConfig) -> ChannelStore {
        match config.read_mode {
            ReadMode::KeepLast => Arc::new(LatestValueStore::<ChannelValue>::new()),
            ReadMode::KeepAll => {
                let source = source_id.to_string();
                Arc::new(ChannelQueueStore::<ChannelValue>::with_limits(
                    config.max_retain_size,
                    config.max_retain_period(),
                    Some(Arc::new(move |event: &LimitEvent| {
                        log_limit_event(&source, event)
                    })),
                ))
            }
        }
    }

    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    /// The store of a source.
    pub fn store(&self, source_id: &str) -> Option<&ChannelStore> {
        self.stores.get(source_id)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.stores.contains_key(source_id)
    }

    /// Store a value for a channel of a source.
    ///
    /// Returns `false` if the source has no store.
    pub fn add(&self, source_id: &str, channel_id: &str, value: ChannelValue) -> bool {
        match self.stores.get(source_id) {
            Some(store) => {
                store.add(channel_id, value);
                true
            }
            None => false,
        }
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &String> {
        self.stores.keys()
    }

    /// Clear every store.
    pub fn clear(&self) {
        for store in self.stores.values() {
            store.clear();
        }
    }
}
