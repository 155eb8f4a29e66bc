//! Error taxonomy for mission execution.
//!
//! Step-level errors (agent lookup, spawn, timeout, exit status, output decoding,
//! agent-reported failures) are recorded on the failed step before they propagate.
//! Storage-level errors abort the mission without touching step state.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::core::envelope::EnvelopeError;
use crate::exit_codes;

/// Result alias for mission operations.
pub type Result<T> = std::result::Result<T, MissionError>;

#[derive(Debug, Error)]
pub enum MissionError {
    #[error("agent '{role}' not found: cannot start '{entrypoint}' ({reason})")]
    AgentNotFound {
        role: String,
        entrypoint: String,
        reason: String,
    },

    #[error("agent '{role}' timed out after {}s", timeout.as_secs())]
    AgentTimeout { role: String, timeout: Duration },

    #[error(
        "agent '{role}' failed with {}{}: {stderr}",
        describe_exit(*code),
        describe_reported(reported.as_deref())
    )]
    AgentExecutionFailed {
        role: String,
        code: Option<i32>,
        /// The `error` of an error envelope printed before the failing exit.
        reported: Option<String>,
        stderr: String,
    },

    #[error("invalid output from agent '{role}': {source}")]
    InvalidAgentOutput {
        role: String,
        #[source]
        source: EnvelopeError,
    },

    #[error("agent '{role}' reported an error: {message}")]
    AgentReportedError {
        role: String,
        message: String,
        details: Value,
    },

    #[error("no agent registered for role '{0}'")]
    UnknownRole(String),

    #[error("mission storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt mission state {}: {source}", path.display())]
    CorruptMissionState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "mission '{id}' was modified by another writer (expected revision {expected}, found {found})"
    )]
    ConcurrentModification { id: String, expected: u64, found: u64 },

    #[error("invalid mission id '{id}': {reason}")]
    InvalidMissionId { id: String, reason: String },

    #[error("mission '{id}' was started for target '{recorded}', not '{requested}'")]
    TargetMismatch {
        id: String,
        recorded: String,
        requested: String,
    },
}

impl MissionError {
    /// Persistence-layer faults. These abort the mission without step recording.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. }
                | Self::CorruptMissionState { .. }
                | Self::ConcurrentModification { .. }
        )
    }

    /// Errors raised before any step was attempted because the request itself is bad.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::InvalidMissionId { .. } | Self::TargetMismatch { .. }
        )
    }

    /// Process exit code for a mission aborted by this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_storage() {
            exit_codes::STORAGE
        } else if self.is_invalid_request() {
            exit_codes::INVALID
        } else {
            exit_codes::STEP_FAILED
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn describe_reported(reported: Option<&str>) -> String {
    reported
        .map(|message| format!(" ({message})"))
        .unwrap_or_default()
}
