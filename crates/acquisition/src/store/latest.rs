//! Single-slot channel store.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{SourceDataStore, selected};

/// Keeps only the most recent value per channel.
///
/// Every `add` overwrites the previous value; there is no retention policy
/// and no limit notification.
pub struct LatestValueStore<T> {
    values: Mutex<HashMap<String, T>>,
}

impl<T> LatestValueStore<T> {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
        }
    }

    /// Remove and return the latest value of the selected channels.
    pub fn read_latest(&self, channels: Option<&[String]>) -> Vec<(String, T)> {
        let mut values = self.values.lock();
        if values.is_empty() {
            return Vec::new();
        }

        let mut result: Vec<(String, T)> = match channels {
            None => values.drain().collect(),
            Some(_) => {
                let keys: Vec<String> = values
                    .keys()
                    .filter(|k| selected(channels, k))
                    .cloned()
                    .collect();
                keys.into_iter()
                    .filter_map(|k| values.remove_entry(&k))
                    .collect()
            }
        };
        drop(values);

        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl<T> Default for LatestValueStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> SourceDataStore<T> for LatestValueStore<T> {
    fn add(&self, channel_id: &str, value: T) {
        self.values.lock().insert(channel_id.to_string(), value);
    }

    fn read(&self, channels: Option<&[String]>) -> Vec<(String, Vec<T>)> {
        self.read_latest(channels)
            .into_iter()
            .map(|(channel, value)| (channel, vec![value]))
            .collect()
    }

    fn clear(&self) {
        self.values.lock().clear();
    }

    fn size(&self) -> usize {
        self.values.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_overwrites() {
        let store = LatestValueStore::new();
        store.add("a", 1);
        store.add("a", 2);
        store.add("b", 3);

        assert_eq!(store.size(), 2);
        assert_eq!(
            store.read_latest(None),
            vec![("a".to_string(), 2), ("b".to_string(), 3)]
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_read_subset() {
        let store = LatestValueStore::new();
        store.add("a", 1);
        store.add("b", 2);

        assert_eq!(
            store.read(Some(&["b".to_string()])),
            vec![("b".to_string(), vec![2])]
        );
        assert_eq!(store.read(None), vec![("a".to_string(), vec![1])]);
        assert!(store.read(None).is_empty());
    }

    #[test]
    fn test_read_cleared_channel_yields_nothing() {
        let store = LatestValueStore::new();
        store.add("a", 1);
        store.clear();
        assert!(store.read(Some(&["a".to_string()])).is_empty());
        assert_eq!(store.size(), 0);
    }
}
