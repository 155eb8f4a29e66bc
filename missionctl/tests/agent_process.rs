//! Missions driven by real agent processes (small `/bin/sh` scripts).
#![cfg(unix)]

use std::path::Path;
use std::time::{Duration, Instant};

use missionctl::core::envelope::EnvelopeError;
use missionctl::core::plan::default_plan;
use missionctl::core::types::{StepStatus, Target};
use missionctl::error::MissionError;
use missionctl::io::agent::{AgentRegistry, NO_VERIFY_TLS_FLAG, TransportOptions};
use missionctl::io::config::AgentConfig;
use missionctl::io::target::resolve_target;
use missionctl::mission::run_mission;
use missionctl::test_support::{MissionWorkspace, envelope_block};

const ECHO_ARGS_AGENT: &str = r#"echo "recon: starting" >&2
echo "=== RECON v2 ==="
echo '<<<LEGION_JSON_START>>>'
printf '{"status":"success","data":{"args":"%s"},"meta":{"ts":"2026-01-01T00:00:00Z"}}\n' "$*"
echo '<<<LEGION_JSON_END>>>'
echo "done."
"#;

#[test]
fn local_target_runs_both_agents_through_banners() {
    let ws = MissionWorkspace::new();
    let recon = ws.agent("recon.sh", ECHO_ARGS_AGENT);
    let analyze = ws.agent(
        "analyze.sh",
        &format!(
            "echo 'scanning...'\n{}",
            envelope_block(r#"{"status":"success","data":{"total_findings":0,"findings":[]}}"#)
        ),
    );
    let cfg = ws.config_for(&[("recon", &recon), ("analyze", &analyze)]);
    let registry = AgentRegistry::from_config(&cfg, TransportOptions::default());

    let raw = ws.root().display().to_string();
    let target = resolve_target(&raw);
    assert!(target.is_local());
    let report =
        run_mission(&ws.store(), &registry, &default_plan(), &target, "proc-1").expect("mission");

    assert!(report.complete);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.steps["recon"].output["args"], raw);
    assert_eq!(report.steps["analyze"].output["total_findings"], 0);
}

#[test]
fn banner_without_envelope_is_recorded_as_failed() {
    let ws = MissionWorkspace::new();
    let recon = ws.agent("recon.sh", "echo '=== RECON ==='\necho 'all good'\n");
    let cfg = ws.config_for(&[("recon", &recon)]);
    let registry = AgentRegistry::from_config(&cfg, TransportOptions::default());

    let err = run_mission(
        &ws.store(),
        &registry,
        &default_plan(),
        &Target::remote("example.invalid"),
        "proc-2",
    )
    .unwrap_err();
    assert!(matches!(
        err,
        MissionError::InvalidAgentOutput {
            source: EnvelopeError::NoEnvelopeFound { .. },
            ..
        }
    ));
    let mission = ws.store().load("proc-2").expect("load").expect("exists");
    assert_eq!(mission.step_status("recon"), StepStatus::Failed);
    assert!(
        mission.steps["recon"]
            .output
            .as_str()
            .expect("error string")
            .contains("no envelope found")
    );
}

#[test]
fn broken_marker_body_is_malformed() {
    let ws = MissionWorkspace::new();
    let recon = ws.agent("recon.sh", &envelope_block("{\"status\": \"success\", "));
    let cfg = ws.config_for(&[("recon", &recon)]);
    let registry = AgentRegistry::from_config(&cfg, TransportOptions::default());

    let err = run_mission(
        &ws.store(),
        &registry,
        &default_plan(),
        &Target::remote("example.invalid"),
        "proc-3",
    )
    .unwrap_err();
    assert!(matches!(
        err,
        MissionError::InvalidAgentOutput {
            source: EnvelopeError::MalformedEnvelope { .. },
            ..
        }
    ));
}

#[test]
fn non_zero_exit_carries_code_and_stderr() {
    let ws = MissionWorkspace::new();
    let recon = ws.agent("recon.sh", "echo 'connection refused' >&2\nexit 3\n");
    let cfg = ws.config_for(&[("recon", &recon)]);
    let registry = AgentRegistry::from_config(&cfg, TransportOptions::default());

    let err = run_mission(
        &ws.store(),
        &registry,
        &default_plan(),
        &Target::remote("example.invalid"),
        "proc-4",
    )
    .unwrap_err();
    match err {
        MissionError::AgentExecutionFailed { code, stderr, .. } => {
            assert_eq!(code, Some(3));
            assert!(stderr.contains("connection refused"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn error_envelope_with_failing_exit_is_recorded_with_its_message() {
    let ws = MissionWorkspace::new();
    let recon = ws.agent(
        "recon.sh",
        &format!(
            "echo '[ERROR] CRITICAL: Name or service not known' >&2\n{}exit 1\n",
            envelope_block(
                r#"{"status":"error","error":"Name or service not known","details":{"trace":"..."}}"#
            )
        ),
    );
    let cfg = ws.config_for(&[("recon", &recon)]);
    let registry = AgentRegistry::from_config(&cfg, TransportOptions::default());

    let err = run_mission(
        &ws.store(),
        &registry,
        &default_plan(),
        &Target::remote("no-such-host.invalid"),
        "proc-8",
    )
    .unwrap_err();
    match &err {
        MissionError::AgentExecutionFailed { code, reported, .. } => {
            assert_eq!(*code, Some(1));
            assert_eq!(reported.as_deref(), Some("Name or service not known"));
        }
        other => panic!("unexpected error: {other}"),
    }
    let mission = ws.store().load("proc-8").expect("load").expect("exists");
    assert_eq!(mission.step_status("recon"), StepStatus::Failed);
    assert!(
        mission.steps["recon"]
            .output
            .as_str()
            .expect("error string")
            .contains("(Name or service not known)")
    );
}

#[test]
fn hung_agent_times_out_and_is_recorded() {
    let ws = MissionWorkspace::new();
    let recon = ws.agent("recon.sh", "exec sleep 30\n");
    let mut cfg = ws.config_for(&[("recon", &recon)]);
    cfg.default_timeout_secs = 1;
    let registry = AgentRegistry::from_config(&cfg, TransportOptions::default());

    let start = Instant::now();
    let err = run_mission(
        &ws.store(),
        &registry,
        &default_plan(),
        &Target::remote("example.invalid"),
        "proc-5",
    )
    .unwrap_err();
    assert!(matches!(err, MissionError::AgentTimeout { .. }), "{err}");
    assert!(start.elapsed() < Duration::from_secs(10));

    let mission = ws.store().load("proc-5").expect("load").expect("exists");
    assert_eq!(mission.step_status("recon"), StepStatus::Failed);
}

#[test]
fn missing_agent_script_is_not_found() {
    let ws = MissionWorkspace::new();
    let missing = ws.root().join("agents").join("nope.sh");
    let mut cfg = ws.config_for::<&Path>(&[]);
    cfg.agents.insert(
        "recon".to_string(),
        AgentConfig::new([missing.display().to_string()]),
    );
    let registry = AgentRegistry::from_config(&cfg, TransportOptions::default());

    let err = run_mission(
        &ws.store(),
        &registry,
        &default_plan(),
        &Target::remote("example.invalid"),
        "proc-6",
    )
    .unwrap_err();
    assert!(matches!(err, MissionError::AgentNotFound { .. }), "{err}");
    let mission = ws.store().load("proc-6").expect("load").expect("exists");
    assert_eq!(mission.step_status("recon"), StepStatus::Failed);
}

#[test]
fn insecure_transport_reaches_network_agent_arguments() {
    let ws = MissionWorkspace::new();
    let recon = ws.agent("recon.sh", ECHO_ARGS_AGENT);
    let mut cfg = ws.config_for(&[("recon", &recon)]);
    if let Some(agent) = cfg.agents.get_mut("recon") {
        agent.network = true;
    }
    let registry = AgentRegistry::from_config(
        &cfg,
        TransportOptions {
            verify_certificates: false,
        },
    );

    let report = run_mission(
        &ws.store(),
        &registry,
        &default_plan(),
        &Target::remote("example.invalid"),
        "proc-7",
    )
    .expect("mission");
    assert_eq!(
        report.steps["recon"].output["args"],
        format!("example.invalid {NO_VERIFY_TLS_FLAG}")
    );
}
