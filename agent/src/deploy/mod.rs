//! Deployment module

pub mod config;
pub mod envfile;
pub mod fsm;
pub mod orchestrator;
pub mod releases;
pub mod slots;
