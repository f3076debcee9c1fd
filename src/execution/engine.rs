//! Transform execution engine - runs one transform and reconciles its output

use crate::{
    core::{InputFormat, NodeKind, PipelineNode, RunState, SessionId},
    execution::{
        harness::HarnessBuilder,
        workspace::{input_filename, user_script_filename, Workspace, BUNDLE_FILENAME, HARNESS_FILENAME},
        RunError,
    },
    persistence::PipelineStore,
    runtime::{BuildRequest, Compiler, OutputStream, ProcessRunner, RunRequest},
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        transform_id: String,
    },
    WorkspaceReady {
        path: PathBuf,
    },
    Compiled {
        artifact: PathBuf,
    },
    ProcessStarted,
    /// Progress only; the buffered stdout is what gets written
    ProcessOutput {
        stream: OutputStream,
        chunk: Vec<u8>,
    },
    RunCompleted {
        output: PipelineNode,
        created: bool,
    },
    RunFailed {
        error: String,
    },
    RunCancelled,
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// How the transform to run is identified
#[derive(Debug, Clone)]
pub enum TransformRef {
    /// Looked up again by id, so a node no longer in the session is rejected
    Node(PipelineNode),
    Id(String),
    /// Artifact filename, for callers that only know the file
    Filename(String),
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub session_id: SessionId,
    pub transform: PipelineNode,
    pub output: PipelineNode,
    /// Whether the output node was created by this run
    pub created: bool,
    pub state: RunState,
}

/// Runs transform nodes through a [`Compiler`] and a [`ProcessRunner`]
pub struct TransformEngine<C, R> {
    store: Arc<PipelineStore>,
    compiler: C,
    runner: R,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl<C: Compiler, R: ProcessRunner> TransformEngine<C, R> {
    pub fn new(store: Arc<PipelineStore>, compiler: C, runner: R) -> Self {
        Self {
            store,
            compiler,
            runner,
            event_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn store(&self) -> &Arc<PipelineStore> {
        &self.store
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        lock(&self.event_handlers).push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        emit(&self.event_handlers, event);
    }

    /// Run a transform in the active session
    pub async fn run(&self, target: TransformRef, cancel: &CancellationToken) -> Result<RunOutcome, RunError> {
        let session_id = self
            .store
            .context()
            .active()
            .ok_or(RunError::NoActiveSession)?;
        self.run_in(&session_id, target, cancel).await
    }

    /// Run a transform in `session_id`
    pub async fn run_in(
        &self,
        session_id: &SessionId,
        target: TransformRef,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        let mut state = RunState::new();
        self.run_tracked(session_id, target, &mut state, cancel).await
    }

    /// Run a transform, recording its lifecycle in `state`
    ///
    /// `state` is left pending when the target cannot be resolved, and ends
    /// completed, failed or cancelled otherwise.
    pub async fn run_tracked(
        &self,
        session_id: &SessionId,
        target: TransformRef,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        let transform = self.resolve_transform(session_id, target).await?;
        let parent_id = transform
            .parent_id
            .clone()
            .ok_or_else(|| RunError::InvalidNode(format!("'{}' has no parent", transform.id)))?;
        let parent = self
            .store
            .get_node(session_id, &parent_id)
            .await
            .ok_or(RunError::ParentNotFound(parent_id))?;

        state.start();
        info!(
            "Running transform {} ({}) on {} in session {}",
            transform.label, transform.id, parent.filename, session_id
        );
        self.emit_event(ExecutionEvent::RunStarted {
            run_id: state.run_id,
            transform_id: transform.id.clone(),
        });

        let result = match Workspace::create() {
            Ok(workspace) => {
                let result = self
                    .execute_in(&workspace, session_id, &transform, &parent, cancel)
                    .await;
                workspace.close();
                result
            }
            Err(e) => Err(RunError::Workspace(e)),
        };

        match result {
            Ok((output, created)) => {
                state.complete();
                info!(
                    "Transform {} wrote {} ({})",
                    transform.id,
                    output.filename,
                    if created { "new" } else { "updated" }
                );
                self.emit_event(ExecutionEvent::RunCompleted {
                    output: output.clone(),
                    created,
                });
                Ok(RunOutcome {
                    session_id: session_id.clone(),
                    transform,
                    output,
                    created,
                    state: state.clone(),
                })
            }
            Err(e) if e.is_cancelled() => {
                state.cancel();
                info!("Transform {} cancelled", transform.id);
                self.emit_event(ExecutionEvent::RunCancelled);
                Err(e)
            }
            Err(e) => {
                state.fail();
                error!("Transform {} failed: {}", transform.id, e);
                self.emit_event(ExecutionEvent::RunFailed { error: e.to_string() });
                Err(e)
            }
        }
    }

    async fn resolve_transform(&self, session_id: &SessionId, target: TransformRef) -> Result<PipelineNode, RunError> {
        let node = match target {
            TransformRef::Node(node) => self.store.get_node(session_id, &node.id).await,
            TransformRef::Id(id) => self.store.get_node(session_id, &id).await,
            TransformRef::Filename(filename) => self
                .store
                .get_metadata(session_id)
                .await
                .node_by_filename(&filename)
                .cloned(),
        };

        let node = node.ok_or_else(|| RunError::InvalidNode("no matching node in session".to_string()))?;
        if node.kind != NodeKind::Transform {
            return Err(RunError::InvalidNode(format!("'{}' is an {} node", node.id, node.kind)));
        }
        Ok(node)
    }

    /// Materialize, compile, execute and reconcile inside `workspace`
    async fn execute_in(
        &self,
        workspace: &Workspace,
        session_id: &SessionId,
        transform: &PipelineNode,
        parent: &PipelineNode,
        cancel: &CancellationToken,
    ) -> Result<(PipelineNode, bool), RunError> {
        let input_bytes = self.store.read_artifact(session_id, &parent.filename).await?;
        let script = self.store.read_artifact(session_id, &transform.filename).await?;

        let input_path = workspace
            .write(&input_filename(&parent.filename), &input_bytes)
            .await
            .map_err(RunError::Workspace)?;
        let user_script = workspace
            .write(&user_script_filename(&transform.filename), &script)
            .await
            .map_err(RunError::Workspace)?;

        let format = InputFormat::from_filename(&parent.filename);
        let harness = HarnessBuilder::new(format).build();
        let entry = workspace
            .write(HARNESS_FILENAME, harness.as_bytes())
            .await
            .map_err(RunError::Workspace)?;
        debug!("Materialized {} input in {}", format.name(), workspace.path().display());
        self.emit_event(ExecutionEvent::WorkspaceReady {
            path: workspace.path().to_path_buf(),
        });

        let request = BuildRequest {
            entry,
            user_script,
            outfile: workspace.path().join(BUNDLE_FILENAME),
            working_dir: workspace.path().to_path_buf(),
        };
        let artifact = self.compiler.build(&request).await?;
        self.emit_event(ExecutionEvent::Compiled {
            artifact: artifact.clone(),
        });

        let request = RunRequest {
            artifact,
            args: vec![input_path.display().to_string()],
            working_dir: workspace.path().to_path_buf(),
        };
        let handlers = self.event_handlers.clone();
        let forward = move |stream: OutputStream, chunk: &[u8]| {
            emit(
                &handlers,
                ExecutionEvent::ProcessOutput {
                    stream,
                    chunk: chunk.to_vec(),
                },
            );
        };

        self.emit_event(ExecutionEvent::ProcessStarted);
        let output = self.runner.run(&request, cancel, Some(&forward)).await?;

        if !output.success() {
            let stderr = output.stderr_text();
            warn!("Transform {} exited with code {:?}", transform.id, output.code);
            return Err(RunError::Runtime(if stderr.is_empty() {
                "Unknown error".to_string()
            } else {
                stderr
            }));
        }

        let (node, created) = self
            .store
            .upsert_output(session_id, &transform.id, &output.stdout)
            .await?;
        Ok((node, created))
    }
}

fn lock(handlers: &Mutex<Vec<EventHandler>>) -> std::sync::MutexGuard<'_, Vec<EventHandler>> {
    handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn emit(handlers: &Mutex<Vec<EventHandler>>, event: ExecutionEvent) {
    let handlers: Vec<EventHandler> = lock(handlers).clone();
    for handler in &handlers {
        handler(event.clone());
    }
}
