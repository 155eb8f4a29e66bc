//! I/O helpers for missionctl commands.

pub mod agent;
pub mod config;
pub mod invoker;
pub mod mission_store;
pub mod process;
pub mod target;
