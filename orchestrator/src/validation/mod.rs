//! Pre-flight validation

pub mod runner;
pub mod steps;
