//! Run history: one record per transform run

use crate::core::{RunState, RunStatus, SessionId};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary of a finished transform run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run ID
    pub run_id: Uuid,

    pub session_id: SessionId,

    /// Transform node that was run
    pub transform_id: String,

    pub status: RunStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Output node written by the run, when it completed
    pub output_node_id: Option<String>,

    /// Failure message, when it did not
    pub error: Option<String>,
}

impl RunRecord {
    /// Create a record from a run's state
    pub fn from_state(session_id: &SessionId, transform_id: &str, state: &RunState) -> Self {
        Self {
            run_id: state.run_id,
            session_id: session_id.clone(),
            transform_id: transform_id.to_string(),
            status: state.status,
            started_at: state.started_at.unwrap_or_else(Utc::now),
            completed_at: state.completed_at,
            output_node_id: None,
            error: None,
        }
    }

    pub fn with_output(mut self, node_id: impl Into<String>) -> Self {
        self.output_node_id = Some(node_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Trait for run history backends
#[async_trait::async_trait]
pub trait RunHistory: Send + Sync {
    /// Save a run
    async fn record(&self, run: &RunRecord) -> Result<()>;

    /// Most recent runs first, optionally for one session only
    async fn list_runs(&self, session_id: Option<&SessionId>, limit: usize) -> Result<Vec<RunRecord>>;
}

/// In-memory history (for testing or when history is disabled)
#[derive(Default)]
pub struct InMemoryRunHistory {
    runs: tokio::sync::RwLock<Vec<RunRecord>>,
}

impl InMemoryRunHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RunHistory for InMemoryRunHistory {
    async fn record(&self, run: &RunRecord) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.retain(|r| r.run_id != run.run_id);
        runs.push(run.clone());
        Ok(())
    }

    async fn list_runs(&self, session_id: Option<&SessionId>, limit: usize) -> Result<Vec<RunRecord>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunRecord> = runs
            .iter()
            .filter(|r| session_id.map_or(true, |id| &r.session_id == id))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result.truncate(limit);
        Ok(result)
    }
}
