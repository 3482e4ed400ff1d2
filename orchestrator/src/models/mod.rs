//! Data model shared by all components

pub mod event;
pub mod request;
pub mod status;
