//! Health probes and metrics collection

pub mod health;
pub mod metrics;
#[cfg(any(test, feature = "test"))]
pub mod scripted;
