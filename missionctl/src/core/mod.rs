//! Deterministic, pure logic shared by the controller.
//!
//! Core modules must be free of filesystem and process side effects. They operate on
//! in-memory data and return deterministic outputs suitable for tests.

pub mod envelope;
pub mod ids;
pub mod plan;
pub mod types;
