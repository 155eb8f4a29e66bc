//! Resumable multi-agent mission controller.
//!
//! A mission runs a fixed, ordered list of steps against one target. Each step is
//! delegated to an agent (usually an external program) that reports its result as a
//! marker-delimited envelope on stdout. Progress is persisted per mission id so a
//! failed mission can be resumed without re-running completed steps.
//!
//! - **[`core`]**: Pure, deterministic logic (envelope codec, data model, step
//!   planning). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (mission files, config, child processes).
//!
//! Orchestration modules ([`mission`], [`run`], [`status`]) coordinate core logic with
//! I/O to implement CLI commands. [`entrypoint`] is the shared adapter that turns a
//! command handler into envelope output and an exit code.

pub mod core;
pub mod entrypoint;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod mission;
pub mod report;
pub mod run;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
