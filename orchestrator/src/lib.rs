//! deployctl Library
//!
//! Deployment orchestration: blue-green, rolling and canary rollouts gated
//! by health probes and error-rate metrics, with automatic rollback.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod exec;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod probe;
pub mod storage;
pub mod telemetry;
pub mod utils;
pub mod validation;
