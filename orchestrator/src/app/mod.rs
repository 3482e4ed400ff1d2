//! Binary wiring

pub mod options;
pub mod run;
