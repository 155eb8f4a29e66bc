//! Mission id format and validation.
//!
//! Ids double as file names under the state directory, so they are restricted to a
//! conservative character set.

use crate::error::{MissionError, Result};

const MAX_ID_LEN: usize = 128;

pub fn validate_mission_id(id: &str) -> Result<()> {
    let invalid = |reason: &str| MissionError::InvalidMissionId {
        id: id.to_string(),
        reason: reason.to_string(),
    };
    if id.is_empty() {
        return Err(invalid("id must not be empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(invalid("id must be at most 128 characters"));
    }
    if id.starts_with('.') {
        return Err(invalid("id must not start with '.'"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(invalid("id must be [A-Za-z0-9._-] only"));
    }
    Ok(())
}

/// `mission-<timestamp>-<short_id>`.
pub fn format_mission_id(timestamp: &str, short_id: &str) -> String {
    format!("mission-{timestamp}-{short_id}")
}
