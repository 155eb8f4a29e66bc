//! Target resolution against the local filesystem.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::core::types::Target;

/// Classify `raw` as a local path or a remote identifier.
///
/// Anything with a URL scheme is remote even if a same-named path happens to exist.
pub fn resolve_target(raw: &str) -> Target {
    if raw.contains("://") {
        return Target::remote(raw);
    }
    match fs::canonicalize(Path::new(raw)) {
        Ok(path) => {
            debug!(raw, path = %path.display(), "target is a local path");
            Target::local(raw, path)
        }
        Err(_) => Target::remote(raw),
    }
}
