//! Test doubles for the compiler and process runner
//!
//! "Transform scripts" in these tests are one-line directives that the
//! scripted runner interprets against the classified input:
//!
//! - `data` / `raw`: return the classified data / the raw text
//! - `key:<name>`: return `data[name]`
//! - `const:<json>`: return a literal value
//! - `fail:<message>`: write `message` to stderr and exit 1
//! - `exit-silently`: exit 1 with nothing on stderr
//! - `hang`: block until cancelled
//!
//! A script containing `syntax error` fails to compile.
//!
//! The runner classifies input with `datalab::core::classify`, which follows
//! the same rules the generated harness emits (see `execution::harness`).
//! Only the ignored smoke test exercises the harness under a real runtime.

#![allow(dead_code)]

use async_trait::async_trait;
use datalab::core::{classify, InputFormat, NodeKind, PipelineNode, SessionContext, SessionId};
use datalab::persistence::{InMemoryArtifactStore, PipelineStore};
use datalab::runtime::{
    BuildRequest, CompileError, Compiler, OutputCallback, OutputStream, ProcessOutput, ProcessRunner, RunRequest,
    RunnerError,
};
use datalab::TransformEngine;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// "Bundles" by copying the user script to the output file
#[derive(Debug, Clone, Default)]
pub struct FakeCompiler {
    pub builds: Arc<AtomicUsize>,
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn build(&self, request: &BuildRequest) -> Result<PathBuf, CompileError> {
        self.builds.fetch_add(1, Ordering::SeqCst);

        let harness = tokio::fs::read_to_string(&request.entry).await?;
        if !harness.contains("userTransform") {
            return Err(CompileError::Failed("harness does not import the user script".to_string()));
        }

        let script = tokio::fs::read_to_string(&request.user_script).await?;
        if script.contains("syntax error") {
            return Err(CompileError::Failed(format!(
                "{}:1:1: ERROR: syntax error",
                request.user_script.display()
            )));
        }

        tokio::fs::copy(&request.user_script, &request.outfile).await?;
        Ok(request.outfile.clone())
    }
}

/// Interprets the bundled directive instead of spawning a process
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    pub runs: Arc<AtomicUsize>,
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
        output: Option<&dyn OutputCallback>,
    ) -> Result<ProcessOutput, RunnerError> {
        self.runs.fetch_add(1, Ordering::SeqCst);

        let script = tokio::fs::read_to_string(&request.artifact).await?;
        let input_path = request
            .args
            .first()
            .ok_or_else(|| std::io::Error::other("missing input argument"))?;
        let raw = tokio::fs::read_to_string(input_path).await?;
        let input = classify(InputFormat::from_filename(input_path), &raw);

        let directive = script.trim();
        let result: Result<Value, String> = if directive == "data" {
            Ok(input.data.clone())
        } else if directive == "raw" {
            Ok(Value::String(input.raw.clone()))
        } else if directive == "hang" {
            cancel.cancelled().await;
            return Err(RunnerError::Cancelled);
        } else if directive == "exit-silently" {
            return Ok(ProcessOutput {
                code: Some(1),
                ..ProcessOutput::default()
            });
        } else if let Some(key) = directive.strip_prefix("key:") {
            Ok(input.data.get(key).cloned().unwrap_or(Value::Null))
        } else if let Some(literal) = directive.strip_prefix("const:") {
            serde_json::from_str(literal).map_err(|e| e.to_string())
        } else if let Some(message) = directive.strip_prefix("fail:") {
            Err(message.to_string())
        } else {
            Err(format!("unknown directive '{}'", directive))
        };

        match result {
            Ok(value) => {
                let mut stdout = serde_json::to_string_pretty(&value).map_err(std::io::Error::other)?;
                stdout.push('\n');
                if let Some(cb) = output {
                    cb.on_output(OutputStream::Stdout, stdout.as_bytes());
                }
                Ok(ProcessOutput {
                    code: Some(0),
                    stdout: stdout.into_bytes(),
                    stderr: Vec::new(),
                })
            }
            Err(message) => {
                if let Some(cb) = output {
                    cb.on_output(OutputStream::Stderr, message.as_bytes());
                }
                Ok(ProcessOutput {
                    code: Some(1),
                    stdout: Vec::new(),
                    stderr: message.into_bytes(),
                })
            }
        }
    }
}

pub type TestEngine = TransformEngine<FakeCompiler, ScriptedRunner>;

/// In-memory store with one focused session
pub async fn store_with_session() -> (Arc<PipelineStore>, SessionId) {
    let store = Arc::new(PipelineStore::new(
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(SessionContext::new()),
    ));
    let session_id = store.create_session(Some("test")).await.unwrap();
    (store, session_id)
}

pub fn engine(store: Arc<PipelineStore>) -> (TestEngine, FakeCompiler, ScriptedRunner) {
    let compiler = FakeCompiler::default();
    let runner = ScriptedRunner::default();
    let engine = TransformEngine::new(store, compiler.clone(), runner.clone());
    (engine, compiler, runner)
}

/// Add a transform with `script` under `parent_id`
pub async fn add_script(
    store: &PipelineStore,
    session_id: &SessionId,
    filename: &str,
    parent_id: &str,
    script: &str,
) -> PipelineNode {
    store
        .create_node(session_id, PipelineNode::transform(filename, parent_id), script.as_bytes())
        .await
        .unwrap()
}

/// Output nodes parented to `transform_id`
pub async fn outputs_of(store: &PipelineStore, session_id: &SessionId, transform_id: &str) -> Vec<PipelineNode> {
    store
        .get_metadata(session_id)
        .await
        .children_of(transform_id)
        .filter(|n| n.kind == NodeKind::Output)
        .cloned()
        .collect()
}

pub async fn read_text(store: &PipelineStore, session_id: &SessionId, filename: &str) -> String {
    let bytes = store.read_artifact(session_id, filename).await.unwrap();
    String::from_utf8(bytes).unwrap()
}
