//! Logging bootstrap with a reloadable filter.
//!
//! The crate itself only emits `tracing` events. Embedding applications that
//! do not install their own subscriber can call [`init_logging`].

use tracing::info;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "acquisition_core=info";

/// Type alias for the reload handle.
pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Handle to the installed subscriber's filter.
#[derive(Clone)]
pub struct LoggingHandle {
    handle: FilterHandle,
}

impl LoggingHandle {
    /// Get the current filter directive string.
    pub fn filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Replace the filter directive, e.g. `"acquisition_core=debug"`.
    pub fn set_filter(&self, directive: &str) -> Result<()> {
        let new_filter = parse_filter(directive)?;
        self.handle
            .reload(new_filter)
            .map_err(|e| Error::Logging(format!("Failed to reload filter: {}", e)))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }
}

fn parse_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| Error::Logging(format!("Invalid filter directive: {}", e)))
}

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `filter` is used, falling back to
/// [`DEFAULT_LOG_FILTER`]. Fails if a global subscriber is already set.
pub fn init_logging(filter: Option<&str>) -> Result<LoggingHandle> {
    let initial_filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => parse_filter(filter.unwrap_or(DEFAULT_LOG_FILTER))?,
    };
    let (filter_layer, handle) = reload::Layer::new(initial_filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| Error::Logging(format!("Failed to set global default subscriber: {}", e)))?;

    Ok(LoggingHandle { handle })
}
