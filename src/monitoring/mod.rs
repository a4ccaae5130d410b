pub mod events;
pub mod latency;
pub mod metrics;
pub mod types;

pub use latency::*;
pub use metrics::{prometheus_enabled, try_init_prometheus};
pub use types::*;
