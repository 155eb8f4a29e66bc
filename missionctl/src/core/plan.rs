//! Declared step order and per-step gating decisions.

use crate::core::types::{Mission, StepStatus, Target};

/// When a step may be attempted at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Always,
    /// Needs filesystem access to the target; recorded `skipped` for remote targets.
    LocalTarget,
}

/// How the target is passed to the step's agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetArg {
    Raw,
    /// Resolved absolute path of a local target.
    LocalPath,
}

/// One declared step of a mission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    pub name: String,
    /// Registry role of the agent that performs this step.
    pub role: String,
    pub precondition: Precondition,
    pub target_arg: TargetArg,
}

impl StepSpec {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            precondition: Precondition::Always,
            target_arg: TargetArg::Raw,
        }
    }

    pub fn requires_local_target(mut self) -> Self {
        self.precondition = Precondition::LocalTarget;
        self.target_arg = TargetArg::LocalPath;
        self
    }

    /// Step-specific arguments; the agent's configured arguments are appended later.
    pub fn arguments(&self, target: &Target) -> Vec<String> {
        let arg = match (self.target_arg, target.local_path()) {
            (TargetArg::LocalPath, Some(path)) => path.display().to_string(),
            _ => target.raw().to_string(),
        };
        vec![arg]
    }
}

/// Security audit: recon, then static analysis of local sources.
pub fn default_plan() -> Vec<StepSpec> {
    vec![
        StepSpec::new("recon", "recon"),
        StepSpec::new("analyze", "analyze").requires_local_target(),
    ]
}

/// What the controller does with a step on this invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Persisted `done`; never re-run.
    AlreadyDone,
    /// Persisted `skipped`; the skip decision is not re-evaluated.
    AlreadySkipped,
    /// Record `skipped` with this note instead of attempting.
    Skip { note: String },
    /// Run the agent. `retry` is set when a previous attempt failed.
    Attempt { retry: bool },
}

pub fn next_action(spec: &StepSpec, mission: &Mission, target: &Target) -> StepAction {
    match mission.step_status(&spec.name) {
        StepStatus::Done => StepAction::AlreadyDone,
        StepStatus::Skipped => StepAction::AlreadySkipped,
        status => {
            if spec.precondition == Precondition::LocalTarget && !target.is_local() {
                return StepAction::Skip {
                    note: format!(
                        "target '{}' is not a local path; {} requires filesystem access",
                        target.raw(),
                        spec.name
                    ),
                };
            }
            StepAction::Attempt {
                retry: status == StepStatus::Failed,
            }
        }
    }
}

/// Every declared step is `done` or `skipped`.
pub fn is_complete(plan: &[StepSpec], mission: &Mission) -> bool {
    plan.iter()
        .all(|spec| mission.step_status(&spec.name).is_terminal())
}
