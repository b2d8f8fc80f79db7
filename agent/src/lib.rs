//! Dockyard Library
//!
//! Single-host container deployment: blue/green and standard releases,
//! a disk-backed registry of scaled units, port allocation, health gating,
//! scaling and rollback.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod health;
pub mod lock;
pub mod logs;
pub mod plugins;
pub mod ports;
pub mod process;
pub mod registry;
pub mod rollback;
pub mod runtime;
pub mod scale;
pub mod storage;
pub mod utils;
