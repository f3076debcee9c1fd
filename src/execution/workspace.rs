//! Disposable per-run workspace

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Local name of the generated entry point
pub const HARNESS_FILENAME: &str = "harness.ts";

/// Local name of the bundled artifact
pub const BUNDLE_FILENAME: &str = "bundle.js";

const INPUT_STEM: &str = "input";
const USER_SCRIPT_STEM: &str = "userTransform";

/// Local name for a materialized input, keeping its suffix
pub fn input_filename(artifact: &str) -> String {
    with_extension_of(INPUT_STEM, artifact, "")
}

/// Local name for a materialized user script, keeping its suffix
pub fn user_script_filename(artifact: &str) -> String {
    with_extension_of(USER_SCRIPT_STEM, artifact, "ts")
}

fn with_extension_of(stem: &str, artifact: &str, fallback: &str) -> String {
    let ext = Path::new(artifact)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(fallback);
    if ext.is_empty() {
        stem.to_string()
    } else {
        format!("{}.{}", stem, ext)
    }
}

/// Temporary directory holding one run's inputs, harness and bundle
///
/// Removed on [`Workspace::close`] or on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("datalab-").tempdir()?;
        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file directly inside the workspace
    pub async fn write(&self, name: &str, contents: &[u8]) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    /// Remove the workspace; failures are logged and swallowed
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Removed workspace {}", path.display()),
            Err(e) => warn!("Failed to remove workspace {}: {}", path.display(), e),
        }
    }
}
