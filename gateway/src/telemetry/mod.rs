//! Observability: structured audit logging (`log.rs`) and Prometheus metrics
//! (`metrics.rs`), kept separate since the admin/metrics servers expose only
//! the latter.

pub mod log;
pub mod metrics;
