//! Mission lifecycle scenarios against scripted in-process agents.
//!
//! Covers fresh runs for local and remote targets, resume after failure, idempotent
//! re-runs and fail-fast behavior.

use missionctl::core::envelope::EnvelopeError;
use missionctl::core::plan::default_plan;
use missionctl::core::types::{MissionStatus, StepStatus, Target};
use missionctl::error::MissionError;
use missionctl::io::agent::AgentRegistry;
use missionctl::io::mission_store::MissionStore;
use missionctl::mission::run_mission;
use missionctl::test_support::{ScriptedAgent, ScriptedReply};
use serde_json::json;

fn local_target() -> Target {
    Target::local("./src", "/work/src")
}

#[test]
fn remote_target_skips_analyze_with_note() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = MissionStore::new(temp.path());
    let recon = ScriptedAgent::new(vec![ScriptedReply::success(
        json!({"ip": "93.184.216.34", "open_ports": [80, 443]}),
    )]);
    let analyze = ScriptedAgent::new(Vec::new());
    let mut registry = AgentRegistry::new();
    registry.register("recon", &recon);
    registry.register("analyze", &analyze);

    let target = Target::remote("example.com");
    let report = run_mission(&store, &registry, &default_plan(), &target, "remote-1")
        .expect("mission");

    assert!(report.complete);
    assert_eq!(report.target.as_deref(), Some("example.com"));
    assert_eq!(report.steps["recon"].status, StepStatus::Done);
    assert_eq!(report.steps["analyze"].status, StepStatus::Skipped);
    assert!(
        report.steps["analyze"].output["note"]
            .as_str()
            .expect("note")
            .contains("example.com")
    );
    assert!(analyze.calls().is_empty());
}

#[test]
fn resume_after_failure_runs_only_the_failed_step() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = MissionStore::new(temp.path());
    let target = local_target();

    let recon = ScriptedAgent::new(vec![ScriptedReply::success(json!({"ip": null}))]);
    let flaky = ScriptedAgent::new(vec![ScriptedReply::Timeout]);
    let mut registry = AgentRegistry::new();
    registry.register("recon", &recon);
    registry.register("analyze", &flaky);
    let err = run_mission(&store, &registry, &default_plan(), &target, "resume-1").unwrap_err();
    assert!(matches!(err, MissionError::AgentTimeout { .. }));

    let persisted = store.load("resume-1").expect("load").expect("exists");
    assert_eq!(persisted.step_status("recon"), StepStatus::Done);
    assert_eq!(persisted.step_status("analyze"), StepStatus::Failed);

    let recon_again = ScriptedAgent::new(Vec::new());
    let analyze = ScriptedAgent::new(vec![ScriptedReply::success(
        json!({"total_findings": 1, "findings": [{"type": "hardcoded_secret"}]}),
    )]);
    let mut registry = AgentRegistry::new();
    registry.register("recon", &recon_again);
    registry.register("analyze", &analyze);
    let report =
        run_mission(&store, &registry, &default_plan(), &target, "resume-1").expect("resume");

    assert!(report.complete);
    assert_eq!(report.status, MissionStatus::Completed);
    assert!(recon_again.calls().is_empty());
    assert_eq!(analyze.calls().len(), 1);
    assert_eq!(report.steps["analyze"].output["total_findings"], 1);
}

#[test]
fn completed_mission_rerun_invokes_nothing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = MissionStore::new(temp.path());
    let target = local_target();

    let recon = ScriptedAgent::new(vec![ScriptedReply::success(json!({}))]);
    let analyze = ScriptedAgent::new(vec![ScriptedReply::success(json!({}))]);
    let mut registry = AgentRegistry::new();
    registry.register("recon", &recon);
    registry.register("analyze", &analyze);
    let first = run_mission(&store, &registry, &default_plan(), &target, "idem-1").expect("first");
    let revision = store.load("idem-1").expect("load").expect("exists").revision;

    let second =
        run_mission(&store, &registry, &default_plan(), &target, "idem-1").expect("second");
    assert_eq!(second.steps, first.steps);
    assert_eq!(recon.calls().len(), 1);
    assert_eq!(analyze.calls().len(), 1);
    assert_eq!(
        store.load("idem-1").expect("load").expect("exists").revision,
        revision
    );
}

#[test]
fn missing_envelope_fails_step_and_stops_mission() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = MissionStore::new(temp.path());
    let recon = ScriptedAgent::new(vec![ScriptedReply::NoEnvelope]);
    let analyze = ScriptedAgent::new(Vec::new());
    let mut registry = AgentRegistry::new();
    registry.register("recon", &recon);
    registry.register("analyze", &analyze);

    let err =
        run_mission(&store, &registry, &default_plan(), &local_target(), "banner-1").unwrap_err();
    assert!(matches!(
        err,
        MissionError::InvalidAgentOutput {
            source: EnvelopeError::NoEnvelopeFound { .. },
            ..
        }
    ));

    let persisted = store.load("banner-1").expect("load").expect("exists");
    assert_eq!(persisted.status, MissionStatus::Failed);
    let output = persisted.steps["recon"].output.as_str().expect("error string");
    assert!(output.contains("no envelope found"), "{output}");
    assert!(persisted.step("analyze").is_none());
    assert!(analyze.calls().is_empty());
}

#[test]
fn agent_reported_error_fails_the_step() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = MissionStore::new(temp.path());
    let recon = ScriptedAgent::new(vec![ScriptedReply::error("could not resolve host")]);
    let mut registry = AgentRegistry::new();
    registry.register("recon", &recon);

    let target = Target::remote("unreachable.invalid");
    let err = run_mission(&store, &registry, &default_plan(), &target, "reported-1").unwrap_err();
    match &err {
        MissionError::AgentReportedError { message, .. } => {
            assert_eq!(message, "could not resolve host");
        }
        other => panic!("unexpected error: {other}"),
    }
    let persisted = store.load("reported-1").expect("load").expect("exists");
    assert_eq!(persisted.step_status("recon"), StepStatus::Failed);
    assert_eq!(persisted.steps["recon"].output, json!(err.to_string()));
}

#[test]
fn resume_with_different_target_leaves_state_untouched() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = MissionStore::new(temp.path());
    let recon = ScriptedAgent::new(vec![ScriptedReply::ExitCode(1)]);
    let mut registry = AgentRegistry::new();
    registry.register("recon", &recon);

    let target = Target::remote("a.example.com");
    run_mission(&store, &registry, &default_plan(), &target, "pin-1").unwrap_err();
    let before = store.load("pin-1").expect("load").expect("exists");

    let other = Target::remote("b.example.com");
    let err = run_mission(&store, &registry, &default_plan(), &other, "pin-1").unwrap_err();
    assert!(matches!(err, MissionError::TargetMismatch { .. }), "{err}");
    assert_eq!(store.load("pin-1").expect("load").expect("exists"), before);
    assert_eq!(recon.calls().len(), 1);
}
