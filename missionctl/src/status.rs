//! `missionctl status`: show a persisted mission without running anything.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use serde_json::{Value, json};
use tracing::error;

use crate::core::plan::{StepSpec, default_plan, is_complete};
use crate::core::types::MissionReport;
use crate::entrypoint::{CommandHandler, Failure};
use crate::exit_codes;
use crate::io::mission_store::{DEFAULT_STATE_DIR, MissionStore};
use crate::report::render_text;
use crate::run::write_text;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusOptions {
    pub mission_id: String,
    pub state_dir: PathBuf,
}

impl StatusOptions {
    pub fn new(mission_id: impl Into<String>) -> Self {
        Self {
            mission_id: mission_id.into(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShowStatus {
    plan: Vec<StepSpec>,
}

impl Default for ShowStatus {
    fn default() -> Self {
        Self {
            plan: default_plan(),
        }
    }
}

impl ShowStatus {
    pub fn plan(&self) -> &[StepSpec] {
        &self.plan
    }

    /// Report for the persisted mission. An unknown id is a usage error.
    pub fn load(&self, options: &StatusOptions) -> Result<MissionReport, Failure> {
        let store = MissionStore::new(&options.state_dir);
        let mission = store.load(&options.mission_id)?.ok_or_else(|| {
            Failure::new(
                format!(
                    "no mission '{}' under {}",
                    options.mission_id,
                    options.state_dir.display()
                ),
                exit_codes::INVALID,
            )
            .with_details(json!({ "mission_id": options.mission_id }))
        })?;
        Ok(MissionReport::new(&mission, is_complete(&self.plan, &mission)))
    }
}

impl CommandHandler for ShowStatus {
    type Options = StatusOptions;

    fn handle(&self, options: &StatusOptions) -> Result<Value, Failure> {
        let report = self.load(options)?;
        let data = serde_json::to_value(&report).context("serialize mission report")?;
        Ok(data)
    }
}

/// Text-mode `status`. Exits `OK` for any mission that could be read.
pub fn status_text<W: Write>(command: &ShowStatus, options: &StatusOptions, out: &mut W) -> i32 {
    match command.load(options) {
        Ok(report) => write_text(out, render_text(command.plan(), &report, None), exit_codes::OK),
        Err(failure) => {
            error!("{}", failure.message);
            failure.exit_code
        }
    }
}
