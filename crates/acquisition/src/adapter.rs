//! Protocol adapter interface.
//!
//! Adapters are the narrow seam between the acquisition core and the
//! protocol-specific code that talks to devices. The scheduler only ever calls
//! [`ProtocolAdapter::read`] and [`ProtocolAdapter::stop`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::config::ReadMode;
use crate::data::{ChannelFilter, ChannelValue, SourceReadOutcome};
use crate::error::AdapterError;
use crate::store::SourceStores;

/// Reads channel values from sources.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync + 'static {
    /// Read the selected channels of a source.
    ///
    /// Must not block indefinitely. A returned error is reported as the
    /// source's outcome for the cycle; [`AdapterError::Cancelled`] is
    /// reported as a cancelled read rather than a failure.
    async fn read(
        &self,
        source_id: &str,
        filter: &ChannelFilter,
    ) -> Result<SourceReadOutcome, AdapterError>;

    /// Stop the adapter, waiting at most `timeout` for it to release its resources.
    async fn stop(&self, timeout: Duration);
}

/// Adapter serving reads from values buffered by event-driven producers.
///
/// Producers push values into the per-source stores as they arrive; every
/// read drains the selected channels of the source. With
/// [`ReadMode::KeepAll`] all buffered values of a channel are returned as a
/// JSON array carrying the capture time of the newest value.
pub struct BufferedSourceAdapter {
    stores: SourceStores,
}

impl BufferedSourceAdapter {
    pub fn new(stores: SourceStores) -> Self {
        Self { stores }
    }

    pub fn stores(&self) -> &SourceStores {
        &self.stores
    }

    fn collapse(&self, mut values: Vec<ChannelValue>) -> Option<ChannelValue> {
        match self.stores.read_mode() {
            ReadMode::KeepLast => values.pop(),
            ReadMode::KeepAll => {
                let captured_at = values.last()?.captured_at;
                let array = values.into_iter().map(|v| v.value).collect::<Vec<_>>();
                Some(ChannelValue::captured_at(
                    serde_json::Value::Array(array),
                    captured_at,
                ))
            }
        }
    }
}

#[async_trait]
impl ProtocolAdapter for BufferedSourceAdapter {
    async fn read(
        &self,
        source_id: &str,
        filter: &ChannelFilter,
    ) -> Result<SourceReadOutcome, AdapterError> {
        let Some(store) = self.stores.store(source_id) else {
            return Ok(SourceReadOutcome::error(format!(
                "Source \"{}\" is not configured",
                source_id
            )));
        };

        let channels = filter.channels();
        let data = store.read(channels.as_deref());
        let values: HashMap<String, ChannelValue> = data
            .into_iter()
            .filter_map(|(channel, values)| self.collapse(values).map(|v| (channel, v)))
            .collect();

        trace!(
            "Read {} buffered channels from source \"{}\"",
            values.len(),
            source_id
        );
        Ok(SourceReadOutcome::success(values))
    }

    async fn stop(&self, _timeout: Duration) {
        debug!("Stopping buffered source adapter, clearing stores");
        self.stores.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_keep_last() {
        let stores = SourceStores::new(["plc"], &StoreConfig::default());
        stores.add("plc", "temp", ChannelValue::new(20));
        stores.add("plc", "temp", ChannelValue::new(21));
        stores.add("plc", "pressure", ChannelValue::new(3));
        let adapter = BufferedSourceAdapter::new(stores);

        let filter = ChannelFilter::from_list(["temp"]);
        let outcome = adapter.read("plc", &filter).await.unwrap();
        let values = outcome.values().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values["temp"].value, json!(21));

        // Unselected channel is still buffered.
        let rest = adapter.read("plc", &ChannelFilter::All).await.unwrap();
        assert_eq!(rest.values().unwrap()["pressure"].value, json!(3));
    }

    #[tokio::test]
    async fn test_read_keep_all_returns_array() {
        let stores = SourceStores::new(
            ["plc"],
            &StoreConfig::keep_all(0, Duration::ZERO),
        );
        stores.add("plc", "temp", ChannelValue::new(1));
        stores.add("plc", "temp", ChannelValue::new(2));
        let adapter = BufferedSourceAdapter::new(stores);

        let outcome = adapter.read("plc", &ChannelFilter::All).await.unwrap();
        assert_eq!(outcome.values().unwrap()["temp"].value, json!([1, 2]));

        let empty = adapter.read("plc", &ChannelFilter::All).await.unwrap();
        assert!(empty.values().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_unknown_source_is_error() {
        let adapter =
            BufferedSourceAdapter::new(SourceStores::new(["plc"], &StoreConfig::default()));
        let outcome = adapter.read("other", &ChannelFilter::All).await.unwrap();
        assert!(outcome.is_error());
    }

    #[tokio::test]
    async fn test_stop_clears_stores() {
        let stores = SourceStores::new(["plc"], &StoreConfig::default());
        stores.add("plc", "temp", ChannelValue::new(1));
        let adapter = BufferedSourceAdapter::new(stores);

        adapter.stop(Duration::from_secs(1)).await;
        assert!(adapter.stores().store("plc").unwrap().is_empty());
    }
}
