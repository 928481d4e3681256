//! Periodic source reading.
//!
//! A [`SourceReadScheduler`] drives one schedule: every interval it reads all
//! configured sources through a [`ProtocolAdapter`](crate::ProtocolAdapter)
//! with bounded concurrency and emits one [`ReadResult`](crate::ReadResult)
//! per completed cycle on a stream.
//!
//! ```text
//!   Idle -> Initializing -> CycleRunning <-> Pacing
//!                                 |            |
//!                                 +--> Stopped <+
//! ```

mod locks;
mod reader;
mod state;

pub use locks::SourceLocks;
pub use reader::{ReadResultStream, ScheduleHandle, SourceReadScheduler};
pub use state::{SchedulerState, SchedulerStats};
