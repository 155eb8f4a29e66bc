//! Shared adapter that runs a command handler and emits its result as an envelope.
//!
//! Every machine-readable command goes through [`run_entrypoint`], so a caller that
//! orchestrates `missionctl` sees the same envelope contract as the controller sees
//! from its own agents: one marker-delimited block on stdout, diagnostics on stderr,
//! and an exit code that separates "ran and reported" from "could not run".

use std::io::Write;

use serde_json::{Value, json};
use tracing::error;

use crate::core::envelope::{Envelope, encode};
use crate::error::MissionError;
use crate::exit_codes;

/// A handled command failure: what goes into the error envelope, and the exit code.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub message: String,
    pub details: Value,
    pub exit_code: i32,
}

impl Failure {
    pub fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            details: json!({}),
            exit_code,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

impl From<MissionError> for Failure {
    fn from(err: MissionError) -> Self {
        Self::new(err.to_string(), err.exit_code())
    }
}

/// Setup errors (config, usage) before any mission work started.
impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"), exit_codes::INVALID)
    }
}

/// A command with parsed options that produces a JSON payload.
pub trait CommandHandler {
    type Options;

    fn handle(&self, options: &Self::Options) -> Result<Value, Failure>;
}

/// Run `handler`, write exactly one envelope to `out`, and return the exit code.
pub fn run_entrypoint<H, W>(handler: &H, options: &H::Options, out: &mut W) -> i32
where
    H: CommandHandler,
    W: Write,
{
    let (envelope, code) = match handler.handle(options) {
        Ok(data) => (Envelope::success(data), exit_codes::OK),
        Err(failure) => {
            error!(exit_code = failure.exit_code, "{}", failure.message);
            (
                Envelope::error(failure.message, failure.details),
                failure.exit_code,
            )
        }
    };
    if let Err(err) = write_envelope(&envelope, out) {
        error!(err = %err, "failed to write result envelope");
        if code == exit_codes::OK {
            return exit_codes::STORAGE;
        }
    }
    code
}

fn write_envelope<W: Write>(envelope: &Envelope, out: &mut W) -> anyhow::Result<()> {
    let encoded = encode(envelope)?;
    out.write_all(encoded.as_bytes())?;
    out.flush()?;
    Ok(())
}
