//! Mission data model shared by the store, the controller and the CLI.
//!
//! `Mission` is the persisted record (`<state_dir>/<id>.json`). Its step map is the
//! single source of truth for resumption.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted status of one step. Absence from the step map means `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Done,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// `Done` and `Skipped` are never revisited on resume.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Skipped)
    }
}

/// Informational overall status. Control flow never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionStatus {
    Started,
    Running,
    Completed,
    Failed,
}

impl MissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub status: StepStatus,
    /// RFC 3339 time of the last write to this entry.
    pub timestamp: String,
    /// Agent payload when done, error string when failed, note object when skipped.
    #[serde(default)]
    pub output: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub start_time: String,
    pub status: MissionStatus,
    /// Target the mission was started for. Absent until the first write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Number of successful writes; used to detect a second writer.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub steps: BTreeMap<String, Step>,
}

impl Mission {
    /// Fresh, unpersisted mission.
    pub fn new(id: impl Into<String>, start_time: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            start_time: start_time.into(),
            status: MissionStatus::Started,
            target: None,
            revision: 0,
            steps: BTreeMap::new(),
        }
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    pub fn step_status(&self, name: &str) -> StepStatus {
        self.step(name).map_or(StepStatus::Pending, |step| step.status)
    }
}

/// Mission target after resolution against the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    raw: String,
    local_path: Option<PathBuf>,
}

impl Target {
    /// A target that is not a path on this machine (host, URL, ...).
    pub fn remote(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            local_path: None,
        }
    }

    /// A target that names an existing local path.
    pub fn local(raw: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            raw: raw.into(),
            local_path: Some(path.into()),
        }
    }

    /// The target exactly as given by the user. This is what gets pinned on the mission.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    pub fn is_local(&self) -> bool {
        self.local_path.is_some()
    }
}

/// Final result of a mission invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionReport {
    pub mission_id: String,
    pub target: Option<String>,
    pub status: MissionStatus,
    /// Every declared step is `done` or `skipped`.
    pub complete: bool,
    pub steps: BTreeMap<String, Step>,
}

impl MissionReport {
    pub fn new(mission: &Mission, complete: bool) -> Self {
        Self {
            mission_id: mission.id.clone(),
            target: mission.target.clone(),
            status: mission.status,
            complete,
            steps: mission.steps.clone(),
        }
    }
}
