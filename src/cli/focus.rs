//! Focused session between invocations
//!
//! The library keeps the active session in an explicit [`SessionContext`];
//! the CLI persists it as a `.active` marker file in the storage root so that
//! `datalab use` carries over to the next command.
//!
//! [`SessionContext`]: crate::core::SessionContext

use crate::core::SessionId;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const MARKER_FILENAME: &str = ".active";

fn marker_path(root: &Path) -> PathBuf {
    root.join(MARKER_FILENAME)
}

/// Read the focused session, if any
pub async fn load(root: &Path) -> Result<Option<SessionId>> {
    let path = marker_path(root);
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    match SessionId::parse(raw.trim()) {
        Ok(id) => Ok(Some(id)),
        Err(e) => {
            warn!("Ignoring {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Persist the focused session; `None` removes the marker
pub async fn save(root: &Path, active: Option<&SessionId>) -> Result<()> {
    let path = marker_path(root);
    match active {
        Some(id) => {
            tokio::fs::write(&path, id.as_str())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            debug!("Focused session {}", id);
        }
        None => match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Cleared focused session"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        },
    }
    Ok(())
}
