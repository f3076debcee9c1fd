//! Pipeline node model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Role of a node in the pipeline forest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A data file supplied by the user (always a root)
    Input,
    /// A user-authored script applied to its parent's artifact
    Transform,
    /// The materialized result of running a transform
    Output,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Input => "input",
            NodeKind::Transform => "transform",
            NodeKind::Output => "output",
        };
        f.write_str(name)
    }
}

/// A vertex in a session's pipeline forest
///
/// The node holds no content; `filename` is the join key to its artifact
/// inside the session's storage directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineNode {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: NodeKind,

    pub label: String,

    pub filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl PipelineNode {
    /// Create an input node; the label defaults to the filename
    pub fn input(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            id: new_node_id(),
            kind: NodeKind::Input,
            label: filename.clone(),
            filename,
            parent_id: None,
        }
    }

    /// Create a transform node parented to `parent_id`
    pub fn transform(filename: impl Into<String>, parent_id: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            id: new_node_id(),
            kind: NodeKind::Transform,
            label: filename.clone(),
            filename,
            parent_id: Some(parent_id.into()),
        }
    }

    /// Create an output node parented to the transform `parent_id`
    pub fn output(filename: impl Into<String>, parent_id: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            id: new_node_id(),
            kind: NodeKind::Output,
            label: filename.clone(),
            filename,
            parent_id: Some(parent_id.into()),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

fn new_node_id() -> String {
    Uuid::new_v4().to_string()
}
