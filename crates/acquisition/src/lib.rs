//! Acquisition core: scheduled source reads and buffered channel value stores.
//!
//! This crate collects telemetry from many sources and hands it to downstream
//! consumers. Protocol-specific code plugs in through [`ProtocolAdapter`].
//!
//! ## Poll path
//!
//! - [`SourceReadScheduler`] - Reads all sources of a schedule every interval
//!   and emits one [`ReadResult`] per completed cycle
//! - [`WorkerPool`] - Bounded-concurrency executor used for each cycle
//! - [`SourceLocks`] - Keeps reads of the same source from overlapping
//!
//! ## Push path
//!
//! - [`ChannelQueueStore`] - Per-channel FIFO with count and age retention
//! - [`LatestValueStore`] - Latest value per channel
//! - [`SourceStores`] / [`BufferedSourceAdapter`] - Drain buffered values
//!   through the scheduled poll cycle
//!
//! ## License
//!
//! This project is licensed under the [MIT](./LICENSE.MIT) or
//! [Apache-2.0](./LICENSE.Apache-2.0) license. You can choose between one of
//! them if you use this work.
//!
//! `SPDX-License-Identifier: MIT OR Apache-2.0`

pub mod adapter;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod store;
pub mod worker_pool;

pub use adapter::{BufferedSourceAdapter, ProtocolAdapter};
pub use config::{ReadMode, ScheduleConfig, StoreConfig};
pub use data::{ChannelFilter, ChannelValue, ReadResult, SourceReadOutcome, WILDCARD};
pub use error::{AdapterError, Error, Result};
pub use scheduler::{
    ReadResultStream, ScheduleHandle, SchedulerState, SchedulerStats, SourceLocks,
    SourceReadScheduler,
};
pub use store::{ChannelQueueStore, LatestValueStore, SourceDataStore, SourceStores};
pub use worker_pool::WorkerPool;
