//! # Utility Modules
//!
//! Supporting utilities shared by the relay and its client.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup from [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: per-relay atomic counters
//! - **Time**: injectable clock for expiry checks
//! - **Timeout**: async timeout wrappers

pub mod logging;
pub mod metrics;
pub mod time;
pub mod timeout;

pub use metrics::{MetricsSnapshot, RelayMetrics};
pub use time::{Clock, ManualClock, SystemClock};
