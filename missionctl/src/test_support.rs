//! Test-only helpers: scripted in-process agents and throwaway mission workspaces.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

use crate::core::envelope::{END_MARKER, Envelope, START_MARKER, decode};
use crate::error::{MissionError, Result};
use crate::io::agent::Agent;
use crate::io::config::{AgentConfig, MissionConfig, write_config};
use crate::io::mission_store::MissionStore;

/// What a [`ScriptedAgent`] does on its next call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Envelope(Envelope),
    /// Process-level failure with this exit code.
    ExitCode(i32),
    Timeout,
    /// Exit 0 with banner text and no envelope.
    NoEnvelope,
}

impl ScriptedReply {
    pub fn success(data: Value) -> Self {
        Self::Envelope(Envelope::success(data))
    }

    pub fn error(message: &str) -> Self {
        Self::Envelope(Envelope::error(message, json!({})))
    }
}

/// In-process agent that replays scripted replies and records its arguments.
///
/// Panics when called more often than it has replies; an unexpected call is a test bug.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    replies: RefCell<VecDeque<ScriptedReply>>,
    calls: RefCell<Vec<Vec<String>>>,
}

impl ScriptedAgent {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Arguments of every call so far, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl Agent for ScriptedAgent {
    fn invoke(&self, arguments: &[String]) -> Result<Envelope> {
        self.calls.borrow_mut().push(arguments.to_vec());
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected agent call with {arguments:?}"));
        let role = "scripted".to_string();
        match reply {
            ScriptedReply::Envelope(envelope) => Ok(envelope),
            ScriptedReply::ExitCode(code) => Err(MissionError::AgentExecutionFailed {
                role,
                code: Some(code),
                reported: None,
                stderr: format!("exit {code}"),
            }),
            ScriptedReply::Timeout => Err(MissionError::AgentTimeout {
                role,
                timeout: Duration::from_secs(1),
            }),
            ScriptedReply::NoEnvelope => {
                let source = decode("=== RECON BANNER ===\nscanning...\n")
                    .expect_err("banner text is not an envelope");
                Err(MissionError::InvalidAgentOutput { role, source })
            }
        }
    }
}

/// Shell snippet that prints `json` between the envelope markers.
pub fn envelope_block(json: &str) -> String {
    format!("cat <<'ENVELOPE'\n{START_MARKER}\n{json}\n{END_MARKER}\nENVELOPE\n")
}

/// Temp directory with a state dir, a config file and agent scripts.
pub struct MissionWorkspace {
    temp: TempDir,
}

impl MissionWorkspace {
    pub fn new() -> Self {
        Self {
            temp: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root().join("missions")
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir().join("config.toml")
    }

    pub fn store(&self) -> MissionStore {
        MissionStore::new(self.state_dir())
    }

    /// Write an executable `/bin/sh` agent script and return its path.
    #[cfg(unix)]
    pub fn agent(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let dir = self.root().join("agents");
        std::fs::create_dir_all(&dir).expect("create agents dir");
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write agent script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod agent script");
        path
    }

    /// Config that maps each `(role, script)` pair to a local agent, with short timeouts.
    ///
    /// Scripts run through `sh` so rewriting one between runs never races an exec.
    pub fn config_for<P: AsRef<Path>>(&self, agents: &[(&str, P)]) -> MissionConfig {
        let mut cfg = MissionConfig {
            default_timeout_secs: 5,
            forward_agent_stderr: false,
            ..MissionConfig::default()
        };
        for (role, script) in agents {
            cfg.agents.insert(
                (*role).to_string(),
                AgentConfig::new(["sh".to_string(), script.as_ref().display().to_string()]),
            );
        }
        cfg
    }

    /// Persist `cfg` where `run` finds it by default.
    pub fn write_config(&self, cfg: &MissionConfig) {
        write_config(&self.config_path(), cfg).expect("write config");
    }
}

impl Default for MissionWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
