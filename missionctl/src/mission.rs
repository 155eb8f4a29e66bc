//! Mission controller: run the declared steps in order against one target.
//!
//! Each step is gated on its persisted status. `done` and `skipped` steps are never
//! revisited, so re-invoking a mission id resumes at the first step that is missing or
//! failed. A failed step is recorded before the error is returned, and no later step
//! is attempted.

use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::core::envelope::Envelope;
use crate::core::plan::{StepAction, StepSpec, is_complete, next_action};
use crate::core::types::{Mission, MissionReport, MissionStatus, StepStatus, Target};
use crate::error::{MissionError, Result};
use crate::io::agent::AgentRegistry;
use crate::io::mission_store::MissionStore;

/// Run (or resume) mission `mission_id` against `target`.
///
/// Returns the aggregated report when every step ends `done` or `skipped`. Any step
/// error is persisted as `failed` and then returned; storage errors are returned
/// without touching step state.
#[instrument(skip_all, fields(mission_id = %mission_id, raw_target = %target.raw()))]
pub fn run_mission(
    store: &MissionStore,
    registry: &AgentRegistry<'_>,
    plan: &[StepSpec],
    target: &Target,
    mission_id: &str,
) -> Result<MissionReport> {
    let mut mission = store.load_or_create(mission_id)?;
    pin_target(&mut mission, target)?;

    for spec in plan {
        match next_action(spec, &mission, target) {
            StepAction::AlreadyDone => {
                info!(step = %spec.name, "already done, skipping");
            }
            StepAction::AlreadySkipped => {
                info!(step = %spec.name, "previously skipped, not re-evaluating");
            }
            StepAction::Skip { note } => {
                info!(step = %spec.name, note = %note, "skipping step");
                store.update_step(
                    &mut mission,
                    &spec.name,
                    StepStatus::Skipped,
                    json!({ "note": note }),
                )?;
            }
            StepAction::Attempt { retry } => {
                if mission.status != MissionStatus::Running {
                    store.update_status(&mut mission, MissionStatus::Running)?;
                }
                info!(step = %spec.name, role = %spec.role, retry, "running step");

                match attempt_step(registry, spec, target) {
                    Ok(data) => {
                        store.update_step(&mut mission, &spec.name, StepStatus::Done, data)?;
                        info!(step = %spec.name, "step done");
                    }
                    Err(err) => {
                        warn!(step = %spec.name, err = %err, "step failed, aborting mission");
                        store.update_step(
                            &mut mission,
                            &spec.name,
                            StepStatus::Failed,
                            Value::String(err.to_string()),
                        )?;
                        store.update_status(&mut mission, MissionStatus::Failed)?;
                        return Err(err);
                    }
                }
            }
        }
    }

    let complete = is_complete(plan, &mission);
    if complete && mission.status != MissionStatus::Completed {
        store.update_status(&mut mission, MissionStatus::Completed)?;
    }
    info!(complete, steps = mission.steps.len(), "mission finished");
    Ok(MissionReport::new(&mission, complete))
}

fn pin_target(mission: &mut Mission, target: &Target) -> Result<()> {
    match &mission.target {
        Some(recorded) if recorded != target.raw() => Err(MissionError::TargetMismatch {
            id: mission.id.clone(),
            recorded: recorded.clone(),
            requested: target.raw().to_string(),
        }),
        Some(_) => Ok(()),
        // Persisted together with the first step or status write.
        None => {
            mission.target = Some(target.raw().to_string());
            Ok(())
        }
    }
}

/// Invoke the step's agent and turn its envelope into a payload or an error.
fn attempt_step(registry: &AgentRegistry<'_>, spec: &StepSpec, target: &Target) -> Result<Value> {
    let agent = registry.get(&spec.role)?;
    match agent.invoke(&spec.arguments(target))? {
        Envelope::Success { data, .. } => Ok(data),
        Envelope::Error { error, details, .. } => {
            warn!(step = %spec.name, details = %details, "agent reported an error");
            Err(MissionError::AgentReportedError {
                role: spec.role.clone(),
                message: error,
                details,
            })
        }
    }
}
