//! File-backed mission state (`<state_dir>/<id>.json`).
//!
//! Every mutation rewrites the whole record atomically (temp file, fsync, rename), so
//! a crash leaves either the previous or the new complete record on disk.
//!
//! The store assumes a single writer per mission id. It does not lock; instead each
//! write compares the on-disk `revision` with the one this process loaded and refuses
//! to overwrite a record that someone else has written in the meantime.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::ids::{format_mission_id, validate_mission_id};
use crate::core::types::{Mission, MissionStatus, Step, StepStatus};
use crate::error::{MissionError, Result};

pub const DEFAULT_STATE_DIR: &str = ".missions";

/// RFC 3339 UTC timestamp used for `start_time` and step timestamps.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// New unique-enough mission id: `mission-<YYYYMMDD_HHMMSS>-<6 alphanumerics>`.
pub fn mint_mission_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let mut rng = rand::thread_rng();
    let short_id = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase();
    format_mission_id(&timestamp, &short_id)
}

#[derive(Debug, Clone)]
pub struct MissionStore {
    state_dir: PathBuf,
}

impl MissionStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn mission_path(&self, id: &str) -> PathBuf {
        self.state_dir.join(format!("{id}.json"))
    }

    /// Load the persisted mission, or build a fresh one that is not written until its
    /// first mutation.
    pub fn load_or_create(&self, id: &str) -> Result<Mission> {
        if let Some(mission) = self.load(id)? {
            info!(mission_id = id, steps = mission.steps.len(), "resuming mission");
            return Ok(mission);
        }
        debug!(mission_id = id, "creating mission");
        Ok(Mission::new(id, timestamp_now()))
    }

    /// Load the persisted mission if its file exists.
    pub fn load(&self, id: &str) -> Result<Option<Mission>> {
        validate_mission_id(id)?;
        let path = self.mission_path(id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(MissionError::StorageUnavailable { path, source }),
        };
        let mission: Mission = serde_json::from_str(&contents)
            .map_err(|source| MissionError::CorruptMissionState { path, source })?;
        debug!(mission_id = id, revision = mission.revision, "mission loaded");
        Ok(Some(mission))
    }

    pub fn get_step<'m>(&self, mission: &'m Mission, name: &str) -> Option<&'m Step> {
        mission.step(name)
    }

    /// Overwrite the entry for `name` and persist the whole mission.
    pub fn update_step(
        &self,
        mission: &mut Mission,
        name: &str,
        status: StepStatus,
        output: Value,
    ) -> Result<()> {
        debug!(mission_id = %mission.id, step = name, status = status.as_str(), "updating step");
        mission.steps.insert(
            name.to_string(),
            Step {
                status,
                timestamp: timestamp_now(),
                output,
            },
        );
        self.persist(mission)
    }

    pub fn update_status(&self, mission: &mut Mission, status: MissionStatus) -> Result<()> {
        debug!(mission_id = %mission.id, status = status.as_str(), "updating mission status");
        mission.status = status;
        self.persist(mission)
    }

    fn persist(&self, mission: &mut Mission) -> Result<()> {
        let path = self.mission_path(&mission.id);
        self.check_revision(mission, &path)?;

        mission.revision += 1;
        let written = serialize(mission).and_then(|buf| self.write_atomic(&path, &buf));
        if written.is_err() {
            mission.revision -= 1;
        }
        written
    }

    fn check_revision(&self, mission: &Mission, path: &Path) -> Result<()> {
        let found = match fs::read_to_string(path) {
            Ok(contents) => {
                let on_disk: Mission = serde_json::from_str(&contents).map_err(|source| {
                    MissionError::CorruptMissionState {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                on_disk.revision
            }
            Err(err) if err.kind() == ErrorKind::NotFound => 0,
            Err(source) => {
                return Err(MissionError::StorageUnavailable {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if found != mission.revision {
            return Err(MissionError::ConcurrentModification {
                id: mission.id.clone(),
                expected: mission.revision,
                found,
            });
        }
        Ok(())
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> Result<()> {
        let storage = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| MissionError::StorageUnavailable { path, source }
        };
        fs::create_dir_all(&self.state_dir).map_err(storage(&self.state_dir))?;

        let tmp_path = path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path).map_err(storage(&tmp_path))?;
        file.write_all(contents.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(storage(&tmp_path))?;
        fs::rename(&tmp_path, path).map_err(storage(path))?;
        debug!(path = %path.display(), "mission written");
        Ok(())
    }
}

fn serialize(mission: &Mission) -> Result<String> {
    let mut buf = serde_json::to_string_pretty(mission).map_err(|err| {
        MissionError::StorageUnavailable {
            path: PathBuf::from(format!("{}.json", mission.id)),
            source: std::io::Error::other(err),
        }
    })?;
    buf.push('\n');
    Ok(buf)
}
