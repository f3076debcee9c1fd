//! esbuild compiler - bundles the harness into a single node script

use crate::runtime::{BuildRequest, CompileError, Compiler};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Compiler that shells out to `esbuild`
#[derive(Debug, Clone)]
pub struct EsbuildCompiler {
    /// Path to the esbuild executable
    program: PathBuf,

    /// Extra flags appended after the defaults
    extra_args: Vec<String>,

    /// Timeout for a build in seconds
    timeout_secs: u64,
}

impl EsbuildCompiler {
    pub fn new(program: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
            timeout_secs,
        }
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn args(&self, request: &BuildRequest) -> Vec<String> {
        let mut args = vec![
            request.entry.display().to_string(),
            "--bundle".to_string(),
            "--platform=node".to_string(),
            "--format=cjs".to_string(),
            "--log-level=error".to_string(),
            format!("--outfile={}", request.outfile.display()),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl Compiler for EsbuildCompiler {
    async fn build(&self, request: &BuildRequest) -> Result<PathBuf, CompileError> {
        debug!("Bundling {} with {}", request.entry.display(), self.program.display());

        let result = timeout(
            Duration::from_secs(self.timeout_secs),
            Command::new(&self.program)
                .args(self.args(request))
                .current_dir(&request.working_dir)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| CompileError::Timeout(self.timeout_secs))?;

        let output = result.map_err(|e| {
            CompileError::Unavailable(format!("failed to execute {}: {}", self.program.display(), e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!("esbuild exited with code {}", exit_code);

            let message = if !stderr.is_empty() {
                stderr
            } else if !stdout.is_empty() {
                stdout
            } else {
                format!("compiler exited with code {}", exit_code)
            };
            return Err(CompileError::Failed(message));
        }

        if !tokio::fs::try_exists(&request.outfile).await? {
            return Err(CompileError::Failed(format!(
                "compiler produced no output at {}",
                request.outfile.display()
            )));
        }

        debug!("Bundle written to {}", request.outfile.display());
        Ok(request.outfile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(temp: &TempDir) -> BuildRequest {
        BuildRequest {
            entry: temp.path().join("harness.ts"),
            user_script: temp.path().join("userTransform.ts"),
            outfile: temp.path().join("bundle.js"),
            working_dir: temp.path().to_path_buf(),
        }
    }

    #[test]
    fn test_default_args_then_extra_args() {
        let temp = TempDir::new().unwrap();
        let compiler = EsbuildCompiler::new("esbuild", 60).with_extra_args(vec!["--minify".to_string()]);
        let args = compiler.args(&request(&temp));

        assert_eq!(args[0], temp.path().join("harness.ts").display().to_string());
        assert!(args.contains(&"--bundle".to_string()));
        assert!(args.contains(&"--platform=node".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--minify"));
    }

    #[tokio::test]
    async fn test_missing_compiler_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let compiler = EsbuildCompiler::new("/nonexistent/datalab-esbuild", 5);
        let result = compiler.build(&request(&temp)).await;
        assert!(matches!(result, Err(CompileError::Unavailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let temp = TempDir::new().unwrap();
        let compiler = EsbuildCompiler::new("false", 5);
        let result = compiler.build(&request(&temp)).await;
        assert!(matches!(result, Err(CompileError::Failed(_))));
    }

    #[tokio::test]
    #[ignore] // Requires esbuild to be installed
    async fn test_bundles_typescript() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("harness.ts"), "const x: number = 1;\nconsole.log(x);\n").unwrap();
        let compiler = EsbuildCompiler::new("esbuild", 60);
        let artifact = compiler.build(&request(&temp)).await.unwrap();
        assert!(artifact.exists());
    }
}
