//! Datalab configuration from YAML

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded from `config.yaml`
///
/// Every field is optional; an absent file means all defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatalabConfig {
    /// Directory holding one subdirectory per session
    pub storage_root: Option<PathBuf>,

    /// Bundler used to compile harness + transform into one artifact
    pub compiler: CompilerConfig,

    /// Runtime that executes the compiled artifact
    pub runtime: RuntimeConfig,

    /// Run history
    pub history: HistoryConfig,
}

/// Compiler (bundler) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Bundler executable, a bare name is looked up on PATH
    pub program: String,

    /// Extra arguments appended to every build
    pub extra_args: Vec<String>,

    /// Timeout for a single build (in seconds)
    pub timeout_secs: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: "esbuild".to_string(),
            extra_args: Vec::new(),
            timeout_secs: 60,
        }
    }
}

/// Runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Runtime executable, a bare name is looked up on PATH
    pub program: String,

    /// Kill the transform after this many seconds (unbounded if unset)
    pub timeout_secs: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
    pub enabled: bool,

    /// SQLite database path
    pub database: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: None,
        }
    }
}

impl DatalabConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as a mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: DatalabConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `explicit`, else from the default location if it exists,
    /// else fall back to defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config_dir>/datalab/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("datalab").join("config.yaml"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.compiler.program.trim().is_empty() {
            anyhow::bail!("compiler.program must not be empty");
        }
        if self.runtime.program.trim().is_empty() {
            anyhow::bail!("runtime.program must not be empty");
        }
        if self.compiler.timeout_secs == 0 {
            anyhow::bail!("compiler.timeout_secs must be greater than zero");
        }
        if self.runtime.timeout_secs == Some(0) {
            anyhow::bail!("runtime.timeout_secs must be greater than zero when set");
        }
        Ok(())
    }

    /// Directory holding the sessions
    pub fn storage_root(&self) -> PathBuf {
        self.storage_root
            .clone()
            .unwrap_or_else(|| data_dir().join("sessions"))
    }

    /// SQLite database for run history
    pub fn history_database(&self) -> PathBuf {
        self.history
            .database
            .clone()
            .unwrap_or_else(|| data_dir().join("runs.db"))
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("datalab")
}

/// Resolve a configured program to an executable path
///
/// Bare names are searched on PATH; anything containing a separator is taken
/// as a path and must exist. `setting` names the key to fix in the error.
pub fn resolve_program(program: &str, setting: &str) -> Result<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        if candidate.exists() {
            return Ok(candidate.to_path_buf());
        }
        anyhow::bail!("{} points to '{}', which does not exist", setting, program);
    }

    which::which(program).with_context(|| {
        format!(
            "'{}' was not found on PATH; install it or set {} in the config file",
            program, setting
        )
    })
}
