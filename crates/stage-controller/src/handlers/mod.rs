//! HTTP handlers for the operational endpoints.

mod health;
mod metrics;

pub use health::{health_check, HealthResponse};
pub use metrics::metrics_handler;
