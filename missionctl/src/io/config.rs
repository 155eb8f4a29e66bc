//! Controller configuration stored under `<state_dir>/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Controller configuration (TOML).
///
/// Missing fields default to values that work with agents installed on `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MissionConfig {
    /// Per-agent timeout when the agent entry does not set its own.
    pub default_timeout_secs: u64,

    /// Keep at most this many bytes of each agent stream in memory.
    pub output_limit_bytes: usize,

    /// Copy agent stderr to the controller's stderr while the agent runs.
    pub forward_agent_stderr: bool,

    /// Certificate verification for network-capable agents. Overridden per
    /// invocation by `--insecure`.
    pub verify_certificates: bool,

    /// Agent registry, keyed by role.
    pub agents: BTreeMap<String, AgentConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Program and leading arguments (e.g. `["python3", "agents/recon.py"]`).
    pub command: Vec<String>,

    /// Extra arguments appended after the step arguments.
    pub args: Vec<String>,

    pub timeout_secs: Option<u64>,

    /// The agent talks to the network and honors `--no-verify-tls`.
    pub network: bool,
}

impl AgentConfig {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

impl Default for MissionConfig {
    fn default() -> Self {
        let mut agents = BTreeMap::new();
        agents.insert(
            "recon".to_string(),
            AgentConfig {
                network: true,
                ..AgentConfig::new(["recon-agent"])
            },
        );
        agents.insert("analyze".to_string(), AgentConfig::new(["analyze-agent"]));
        Self {
            default_timeout_secs: 300,
            output_limit_bytes: 1_000_000,
            forward_agent_stderr: true,
            verify_certificates: true,
            agents,
        }
    }
}

impl MissionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_secs == 0 {
            return Err(anyhow!("default_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        for (role, agent) in &self.agents {
            if agent.command.is_empty() || agent.command[0].trim().is_empty() {
                return Err(anyhow!("agents.{role}.command must be a non-empty array"));
            }
            if agent.timeout_secs == Some(0) {
                return Err(anyhow!("agents.{role}.timeout_secs must be > 0"));
            }
        }
        Ok(())
    }

    pub fn timeout_for(&self, agent: &AgentConfig) -> Duration {
        Duration::from_secs(agent.timeout_secs.unwrap_or(self.default_timeout_secs))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MissionConfig::default()`. Roles the file does not
/// mention keep their default agent entry.
pub fn load_config(path: &Path) -> Result<MissionConfig> {
    if !path.exists() {
        let cfg = MissionConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut cfg: MissionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    for (role, agent) in MissionConfig::default().agents {
        cfg.agents.entry(role).or_insert(agent);
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename). Only tests write configs.
#[cfg(any(test, feature = "test-support"))]
pub fn write_config(path: &Path, cfg: &MissionConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(any(test, feature = "test-support"))]
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
