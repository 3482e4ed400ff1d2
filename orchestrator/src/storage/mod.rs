//! Persistent storage: settings, layout and reports

pub mod layout;
pub mod reports;
pub mod settings;
