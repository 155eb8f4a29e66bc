//! Invoke one agent process and classify its outcome.
//!
//! The invoker's job ends at a decoded envelope. Whether that envelope reports
//! `success` or `error` is for the caller to interpret.

use std::path::{MAIN_SEPARATOR, Path};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::envelope::{Envelope, decode};
use crate::error::{MissionError, Result};
use crate::io::process::{SpawnError, StderrSink, run_command_with_timeout};

/// One agent call. Built per step attempt and dropped when the call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInvocation {
    /// Agent family, used in errors and logs.
    pub role: String,
    /// Program followed by any fixed leading arguments.
    pub entrypoint: Vec<String>,
    pub arguments: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeOptions {
    pub output_limit_bytes: usize,
    /// Copy agent stderr to our stderr while the agent runs.
    pub forward_stderr: bool,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            output_limit_bytes: 1_000_000,
            forward_stderr: true,
        }
    }
}

/// Run the agent to completion (or timeout) and decode its envelope.
#[instrument(
    skip_all,
    fields(role = %invocation.role, timeout_secs = invocation.timeout.as_secs())
)]
pub fn invoke(invocation: &AgentInvocation, options: &InvokeOptions) -> Result<Envelope> {
    let role = invocation.role.clone();
    let Some((program, leading)) = invocation.entrypoint.split_first() else {
        return Err(MissionError::AgentNotFound {
            role,
            entrypoint: String::new(),
            reason: "empty entrypoint".to_string(),
        });
    };
    if is_path_like(program) && !Path::new(program).exists() {
        return Err(MissionError::AgentNotFound {
            role,
            entrypoint: program.clone(),
            reason: "no such file".to_string(),
        });
    }

    let mut cmd = Command::new(program);
    cmd.args(leading).args(&invocation.arguments);
    info!(program = %program, args = ?invocation.arguments, "invoking agent");

    let sink: Option<StderrSink> = if options.forward_stderr {
        Some(Box::new(std::io::stderr()))
    } else {
        None
    };
    let output = run_command_with_timeout(
        cmd,
        invocation.timeout,
        options.output_limit_bytes,
        sink,
    )
    .map_err(|err| match err.downcast::<SpawnError>() {
        Ok(spawn) => MissionError::AgentNotFound {
            role: role.clone(),
            entrypoint: spawn.program,
            reason: spawn.source.to_string(),
        },
        Err(err) => MissionError::AgentExecutionFailed {
            role: role.clone(),
            code: None,
            reported: None,
            stderr: format!("{err:#}"),
        },
    })?;

    if output.timed_out {
        warn!(timeout_secs = invocation.timeout.as_secs(), "agent timed out");
        return Err(MissionError::AgentTimeout {
            role,
            timeout: invocation.timeout,
        });
    }
    if !output.status.success() {
        let reported = match decode(&output.stdout_text()) {
            Ok(Envelope::Error { error, .. }) => Some(error),
            _ => None,
        };
        warn!(
            exit_code = ?output.status.code(),
            reported = reported.as_deref(),
            "agent exited with failure"
        );
        return Err(MissionError::AgentExecutionFailed {
            role,
            code: output.status.code(),
            reported,
            stderr: output.stderr_text(),
        });
    }
    if output.stdout_truncated > 0 {
        warn!(
            stdout_truncated = output.stdout_truncated,
            "agent stdout truncated; envelope may be incomplete"
        );
    }

    let envelope = decode(&output.stdout_text())
        .map_err(|source| MissionError::InvalidAgentOutput { role, source })?;
    debug!(success = envelope.is_success(), "agent envelope decoded");
    Ok(envelope)
}

fn is_path_like(program: &str) -> bool {
    program.contains('/') || program.contains(MAIN_SEPARATOR)
}
