//! Integration tests for deployctl

mod common;
mod test_fsm;
mod test_http;
mod test_reports;
mod test_scenarios;
