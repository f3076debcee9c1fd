//! datalab - ad-hoc data transformation pipelines
//!
//! A session holds a forest of nodes: user-supplied inputs, transform scripts
//! applied to a parent node, and the outputs those scripts produce. The
//! [`PipelineStore`] keeps that forest and its files consistent; the
//! [`TransformEngine`] runs a transform in a throwaway workspace and writes
//! the result back as the transform's output node.

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runtime;

// Re-export commonly used types
pub use core::{NodeKind, PipelineNode, RunState, RunStatus, Session, SessionContext, SessionEvent, SessionId};
pub use execution::{ExecutionEvent, RunError, RunOutcome, TransformEngine, TransformRef};
pub use persistence::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore, PipelineStore, StorageError};
pub use runtime::{Compiler, EsbuildCompiler, ProcessRunner, SubprocessRunner};
