//! Core domain models for datalab
//!
//! Sessions, pipeline nodes and the rules that keep the node forest
//! consistent, plus input classification and configuration.

pub mod config;
pub mod context;
pub mod format;
pub mod graph;
pub mod node;
pub mod session;
pub mod state;

pub use context::*;
pub use format::{classify, ClassifiedInput, InputFormat};
pub use graph::GraphError;
pub use node::*;
pub use session::*;
pub use state::*;
