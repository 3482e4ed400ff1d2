//! Command execution seam

pub mod command;
#[cfg(any(test, feature = "test"))]
pub mod scripted;
