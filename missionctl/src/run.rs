//! `missionctl run`: start or resume a mission and report the outcome.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::core::plan::{StepSpec, default_plan, is_complete};
use crate::core::types::MissionReport;
use crate::entrypoint::{CommandHandler, Failure};
use crate::error::MissionError;
use crate::exit_codes;
use crate::io::agent::{AgentRegistry, TransportOptions};
use crate::io::config::load_config;
use crate::io::mission_store::{DEFAULT_STATE_DIR, MissionStore, mint_mission_id};
use crate::io::target::resolve_target;
use crate::mission::run_mission;
use crate::report::render_text;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub target: String,
    /// Continue this mission instead of minting a new id.
    pub resume: Option<String>,
    pub state_dir: PathBuf,
    /// Defaults to `<state_dir>/config.toml`.
    pub config_path: Option<PathBuf>,
    /// Disable certificate verification for network agents on this invocation.
    pub insecure: bool,
}

impl RunOptions {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            resume: None,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            config_path: None,
            insecure: false,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join("config.toml"))
    }
}

/// Why a run did not produce a report.
#[derive(Debug)]
pub enum RunError {
    /// Config or usage problem; no mission state was touched.
    Setup(anyhow::Error),
    /// The mission aborted. `report` is the persisted state, when it can be read back.
    Mission {
        id: String,
        error: MissionError,
        report: Option<MissionReport>,
    },
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Setup(_) => exit_codes::INVALID,
            Self::Mission { error, .. } => error.exit_code(),
        }
    }
}

impl From<RunError> for Failure {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Setup(err) => Failure::from(err),
            RunError::Mission { id, error, report } => {
                let details = match report {
                    Some(report) => json!({
                        "mission_id": id,
                        "status": report.status,
                        "steps": report.steps,
                    }),
                    None => json!({ "mission_id": id }),
                };
                Failure::from(error).with_details(details)
            }
        }
    }
}

/// The `run` command over a fixed step plan.
#[derive(Debug, Clone)]
pub struct RunMission {
    plan: Vec<StepSpec>,
}

impl Default for RunMission {
    fn default() -> Self {
        Self {
            plan: default_plan(),
        }
    }
}

impl RunMission {
    pub fn plan(&self) -> &[StepSpec] {
        &self.plan
    }

    /// Load config, build the agent registry and run the mission.
    pub fn execute(&self, options: &RunOptions) -> Result<MissionReport, RunError> {
        let config_path = options.config_path();
        let cfg = load_config(&config_path)
            .with_context(|| format!("load config {}", config_path.display()))
            .map_err(RunError::Setup)?;
        let transport = TransportOptions {
            verify_certificates: cfg.verify_certificates && !options.insecure,
        };
        if !transport.verify_certificates {
            warn!("certificate verification disabled for network agents");
        }
        let registry = AgentRegistry::from_config(&cfg, transport);
        self.execute_with(options, &registry)
    }

    /// Run the mission against an already-built registry.
    pub fn execute_with(
        &self,
        options: &RunOptions,
        registry: &AgentRegistry<'_>,
    ) -> Result<MissionReport, RunError> {
        let store = MissionStore::new(&options.state_dir);
        let mission_id = options.resume.clone().unwrap_or_else(mint_mission_id);
        let target = resolve_target(&options.target);
        info!(
            mission_id = %mission_id,
            raw_target = target.raw(),
            local = target.is_local(),
            resume = options.resume.is_some(),
            "starting mission"
        );

        run_mission(&store, registry, &self.plan, &target, &mission_id).map_err(|error| {
            let report = match store.load(&mission_id) {
                Ok(Some(mission)) => {
                    Some(MissionReport::new(&mission, is_complete(&self.plan, &mission)))
                }
                _ => None,
            };
            RunError::Mission {
                id: mission_id.clone(),
                error,
                report,
            }
        })
    }
}

impl CommandHandler for RunMission {
    type Options = RunOptions;

    fn handle(&self, options: &RunOptions) -> Result<Value, Failure> {
        let report = self.execute(options)?;
        let data = serde_json::to_value(&report).context("serialize mission report")?;
        Ok(data)
    }
}

/// Text-mode `run`: per-step summary on `out`, exit code returned.
pub fn run_text<W: Write>(command: &RunMission, options: &RunOptions, out: &mut W) -> i32 {
    let (rendered, code) = match command.execute(options) {
        Ok(report) => {
            let code = if report.complete {
                exit_codes::OK
            } else {
                exit_codes::STEP_FAILED
            };
            (render_text(command.plan(), &report, None), code)
        }
        Err(RunError::Setup(err)) => {
            error!("{err:#}");
            return exit_codes::INVALID;
        }
        Err(RunError::Mission {
            id,
            error,
            report: Some(report),
        }) => {
            error!(mission_id = %id, "{error}");
            let message = error.to_string();
            (
                render_text(command.plan(), &report, Some(&message)),
                error.exit_code(),
            )
        }
        Err(RunError::Mission {
            id,
            error,
            report: None,
        }) => {
            error!(mission_id = %id, "{error}");
            return error.exit_code();
        }
    };
    write_text(out, rendered, code)
}

/// Write a rendered report; rendering or write failures only affect a clean exit.
pub(crate) fn write_text<W: Write>(
    out: &mut W,
    rendered: anyhow::Result<String>,
    code: i32,
) -> i32 {
    let written = rendered.and_then(|text| {
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    });
    match written {
        Ok(()) => code,
        Err(err) => {
            error!("write report: {err:#}");
            if code == exit_codes::OK {
                exit_codes::INVALID
            } else {
                code
            }
        }
    }
}
