//! Subprocess runner - executes a compiled artifact with a script runtime

use crate::runtime::{OutputCallback, OutputStream, ProcessOutput, ProcessRunner, RunRequest, RunnerError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs `<program> <artifact> <args...>` as a child process
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    /// Runtime executable (e.g. `node`)
    program: PathBuf,

    /// Kill the child after this many seconds
    timeout_secs: Option<u64>,
}

impl SubprocessRunner {
    pub fn new(program: impl Into<PathBuf>, timeout_secs: Option<u64>) -> Self {
        Self {
            program: program.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl ProcessRunner for SubprocessRunner {
    async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
        output: Option<&dyn OutputCallback>,
    ) -> Result<ProcessOutput, RunnerError> {
        debug!(
            "Spawning {} {}",
            self.program.display(),
            request.artifact.display()
        );

        let mut child = Command::new(&self.program)
            .arg(&request.artifact)
            .args(&request.args)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr was not captured"))?;

        let deadline = async {
            match self.timeout_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };

        let stopped = tokio::select! {
            result = wait_with_output(&mut child, stdout, stderr, output) => {
                let result = result?;
                debug!("Process exited with code {:?}", result.code);
                return Ok(result);
            }
            _ = cancel.cancelled() => RunnerError::Cancelled,
            _ = deadline => RunnerError::Timeout(self.timeout_secs.unwrap_or_default()),
        };

        kill(&mut child).await;
        Err(stopped)
    }
}

/// Drain both pipes concurrently, then reap the child
async fn wait_with_output(
    child: &mut Child,
    stdout: impl AsyncRead + Unpin,
    stderr: impl AsyncRead + Unpin,
    callback: Option<&dyn OutputCallback>,
) -> Result<ProcessOutput, RunnerError> {
    let (stdout, stderr) = tokio::try_join!(
        drain(stdout, OutputStream::Stdout, callback),
        drain(stderr, OutputStream::Stderr, callback),
    )?;
    let status = child.wait().await?;

    Ok(ProcessOutput {
        code: status.code(),
        stdout,
        stderr,
    })
}

async fn drain(
    mut reader: impl AsyncRead + Unpin,
    stream: OutputStream,
    callback: Option<&dyn OutputCallback>,
) -> std::io::Result<Vec<u8>> {
    let mut collected = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if let Some(cb) = callback {
            cb.on_output(stream, &buf[..n]);
        }
        collected.extend_from_slice(&buf[..n]);
    }
    Ok(collected)
}

async fn kill(child: &mut Child) {
    match child.kill().await {
        Ok(()) => debug!("Killed child process"),
        Err(e) => warn!("Failed to kill child process: {}", e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Writes `body` as a shell script and returns a request that runs it
    /// through `sh`
    fn script(temp: &TempDir, body: &str) -> RunRequest {
        let path = temp.path().join("artifact.sh");
        std::fs::write(&path, body).unwrap();
        RunRequest {
            artifact: path,
            args: vec!["first-arg".to_string()],
            working_dir: temp.path().to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_captures_stdout_stderr_and_code() {
        let temp = TempDir::new().unwrap();
        let request = script(&temp, "echo \"$1\"\necho oops >&2\nexit 3\n");
        let runner = SubprocessRunner::new("sh", None);

        let output = runner
            .run(&request, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, b"first-arg\n");
        assert_eq!(output.stderr_text(), "oops");
    }

    #[tokio::test]
    async fn test_reports_chunks_to_callback() {
        let temp = TempDir::new().unwrap();
        let request = script(&temp, "printf hello\n");
        let runner = SubprocessRunner::new("sh", None);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback = move |stream: OutputStream, chunk: &[u8]| {
            sink.lock().unwrap().push((stream, chunk.to_vec()));
        };

        let output = runner
            .run(&request, &CancellationToken::new(), Some(&callback))
            .await
            .unwrap();

        assert!(output.success());
        let collected: Vec<u8> = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(stream, _)| *stream == OutputStream::Stdout)
            .flat_map(|(_, chunk)| chunk.clone())
            .collect();
        assert_eq!(collected, b"hello");
    }

    #[tokio::test]
    async fn test_cancel_kills_child() {
        let temp = TempDir::new().unwrap();
        let request = script(&temp, "sleep 30\n");
        let runner = SubprocessRunner::new("sh", None);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = runner.run(&request, &cancel, None).await;

        assert!(matches!(result, Err(RunnerError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let temp = TempDir::new().unwrap();
        let request = script(&temp, "sleep 30\n");
        let runner = SubprocessRunner::new("sh", Some(1));

        let result = runner.run(&request, &CancellationToken::new(), None).await;
        assert!(matches!(result, Err(RunnerError::Timeout(1))));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let temp = TempDir::new().unwrap();
        let request = script(&temp, "true\n");
        let runner = SubprocessRunner::new("/nonexistent/datalab-runtime", None);

        let result = runner.run(&request, &CancellationToken::new(), None).await;
        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
    }
}
