//! Deployment module

pub mod backup;
pub mod context;
pub mod fsm;
pub mod notify;
pub mod orchestrator;
pub mod pacer;
pub mod rollback;
pub mod strategies;
pub mod strategy;
