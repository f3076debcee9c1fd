//! Run error taxonomy

use crate::persistence::StorageError;
use crate::runtime::{CompileError, RunnerError};
use thiserror::Error;

/// Why a transform run did not produce output
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no active session")]
    NoActiveSession,

    #[error("invalid transform node: {0}")]
    InvalidNode(String),

    #[error("parent node '{0}' not found")]
    ParentNotFound(String),

    #[error("compilation failed: {0}")]
    Compilation(String),

    /// Non-zero exit; carries the captured stderr
    #[error("{0}")]
    Runtime(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("run timed out after {0} seconds")]
    Timeout(u64),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("workspace error: {0}")]
    Workspace(#[source] std::io::Error),
}

impl RunError {
    /// Cancellation is user-initiated, not a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunError::Cancelled)
    }
}

impl From<CompileError> for RunError {
    fn from(e: CompileError) -> Self {
        match e {
            CompileError::Failed(message) => RunError::Compilation(message),
            other => RunError::Compilation(other.to_string()),
        }
    }
}

impl From<RunnerError> for RunError {
    fn from(e: RunnerError) -> Self {
        match e {
            RunnerError::Cancelled => RunError::Cancelled,
            RunnerError::Timeout(secs) => RunError::Timeout(secs),
            other => RunError::Runtime(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_errors_map_to_run_errors() {
        assert!(RunError::from(RunnerError::Cancelled).is_cancelled());
        assert!(matches!(RunError::from(RunnerError::Timeout(5)), RunError::Timeout(5)));

        let io = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
        assert!(matches!(RunError::from(RunnerError::Io(io)), RunError::Runtime(_)));
    }

    #[test]
    fn test_compile_failure_keeps_diagnostic() {
        let err = RunError::from(CompileError::Failed("x.ts:1:1: ERROR: Unexpected \"}\"".to_string()));
        assert_eq!(err.to_string(), "compilation failed: x.ts:1:1: ERROR: Unexpected \"}\"");
    }
}
