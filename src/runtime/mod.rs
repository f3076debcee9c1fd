//! External capabilities used to run a transform: a compiler that bundles the
//! harness and user script into one artifact, and a process runner that
//! executes that artifact.

pub mod compiler;
pub mod runner;
pub mod streaming;

pub use compiler::EsbuildCompiler;
pub use runner::SubprocessRunner;
pub use streaming::{NoopCallback, OutputCallback, OutputStream};

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error types for the compiler capability
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compiler unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),

    #[error("compilation timed out after {0} seconds")]
    Timeout(u64),

    #[error("I/O error during compilation: {0}")]
    Io(#[from] std::io::Error),
}

/// Error types for the process runner capability
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running process: {0}")]
    Io(#[from] std::io::Error),

    #[error("process timed out after {0} seconds")]
    Timeout(u64),

    #[error("process was cancelled")]
    Cancelled,
}

/// What to bundle
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Generated harness; the single entry point of the bundle
    pub entry: PathBuf,

    /// User script imported by the harness
    pub user_script: PathBuf,

    /// Where the bundled artifact must be written
    pub outfile: PathBuf,

    /// Directory the compiler runs in
    pub working_dir: PathBuf,
}

/// What to execute
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Compiled artifact
    pub artifact: PathBuf,

    /// Positional arguments after the artifact
    pub args: Vec<String>,

    pub working_dir: PathBuf,
}

/// Fully buffered result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Bundles a harness and user script into one standalone artifact
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Build the artifact, returning its path
    async fn build(&self, request: &BuildRequest) -> Result<PathBuf, CompileError>;
}

/// Executes a compiled artifact as a child process
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion, killing the child if `cancel` fires first
    ///
    /// Output chunks are passed to `output` as they arrive and are also
    /// accumulated in the returned [`ProcessOutput`].
    async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
        output: Option<&dyn OutputCallback>,
    ) -> Result<ProcessOutput, RunnerError>;
}
