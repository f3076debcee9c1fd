//! Transform execution: workspace, harness, compile, run, reconcile

pub mod engine;
pub mod error;
pub mod harness;
pub mod template;
pub mod workspace;

pub use engine::{EventHandler, ExecutionEvent, RunOutcome, TransformEngine, TransformRef};
pub use error::RunError;
pub use harness::HarnessBuilder;
pub use template::add_transform;
pub use workspace::Workspace;
