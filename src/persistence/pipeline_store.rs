//! Pipeline graph store
//!
//! Owns the per-session metadata document (`pipeline.json`) and keeps the node
//! forest and the session's files consistent across create and delete. The
//! document is the single source of truth and is read-modify-written whole on
//! every mutation.
//!
//! Mutations made through this store are serialized by an internal lock.
//! [`PipelineStore::save_metadata`] is still a blind overwrite: a caller doing
//! its own load/modify/save cycle next to other writers can lose updates.

use crate::core::graph::{descendants_of, unique_filename, validate_filename, validate_insert};
use crate::core::{PipelineNode, Session, SessionContext, SessionEvent, SessionId, METADATA_FILENAME};
use crate::persistence::{ArtifactStore, EntryKind, StorageError, WriteOptions};
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Graph operations over sessions kept in an [`ArtifactStore`]
pub struct PipelineStore {
    artifacts: Arc<dyn ArtifactStore>,
    context: Arc<SessionContext>,
    write_lock: Mutex<()>,
}

impl PipelineStore {
    pub fn new(artifacts: Arc<dyn ArtifactStore>, context: Arc<SessionContext>) -> Self {
        Self {
            artifacts,
            context,
            write_lock: Mutex::new(()),
        }
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Store path of a session's directory
    pub fn session_path(session_id: &SessionId) -> PathBuf {
        PathBuf::from(session_id.as_str())
    }

    /// Store path of a node's artifact
    pub fn artifact_path(session_id: &SessionId, filename: &str) -> PathBuf {
        Self::session_path(session_id).join(filename)
    }

    fn metadata_path(session_id: &SessionId) -> PathBuf {
        Self::artifact_path(session_id, METADATA_FILENAME)
    }

    /// Allocate a new session, write its empty document and focus it
    pub async fn create_session(&self, name: Option<&str>) -> Result<SessionId, StorageError> {
        let _guard = self.write_lock.lock().await;

        let taken = self.session_dir_names().await?;
        let now = Utc::now();
        let session_id = SessionId::allocate(now, |candidate| taken.contains(candidate.as_str()));

        self.artifacts.create_dir(&Self::session_path(&session_id)).await?;

        let name = match name {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => session_id.to_string(),
        };
        let session = Session {
            id: session_id.clone(),
            created: now,
            name: Some(name),
            nodes: Vec::new(),
        };
        self.save_metadata(&session_id, &session).await?;

        self.context.set_active(Some(session_id.clone()));
        self.context.notify(SessionEvent::Created(session_id.clone()));
        info!("Created session {}", session_id);

        Ok(session_id)
    }

    /// Focus an existing session
    pub async fn set_session(&self, session_id: &SessionId) -> Result<(), StorageError> {
        if !self.artifacts.exists(&Self::session_path(session_id)).await? {
            return Err(StorageError::NotFound(Self::session_path(session_id)));
        }
        self.context.activate(session_id.clone());
        Ok(())
    }

    /// All sessions with a readable document, newest first
    ///
    /// Directories whose metadata is missing or does not parse are skipped.
    pub async fn list_sessions(&self) -> Result<Vec<Session>, StorageError> {
        let mut sessions = Vec::new();
        for name in self.session_dir_names().await? {
            let Ok(session_id) = SessionId::parse(&name) else {
                continue;
            };
            match self.load_metadata(&session_id).await {
                Ok(session) => sessions.push(session),
                Err(e) => debug!("Skipping directory {}: {}", name, e),
            }
        }

        sessions.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| b.id.cmp(&a.id)));
        Ok(sessions)
    }

    async fn session_dir_names(&self) -> Result<HashSet<String>, StorageError> {
        let entries = match self.artifacts.list(Path::new("")).await {
            Ok(entries) => entries,
            Err(StorageError::NotFound(_)) => return Ok(HashSet::new()),
            Err(e) => return Err(e),
        };
        Ok(entries
            .into_iter()
            .filter(|e| e.kind == EntryKind::Directory)
            .map(|e| e.name)
            .collect())
    }

    /// Remove a session and everything in it
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        self.artifacts
            .delete(&Self::session_path(session_id), true)
            .await?;

        if self.context.deactivate_if(session_id) {
            debug!("Cleared active session {}", session_id);
        }
        self.context.notify(SessionEvent::Deleted(session_id.clone()));
        info!("Deleted session {}", session_id);
        Ok(())
    }

    /// Remove every session; returns how many were deleted
    pub async fn clear_sessions(&self) -> Result<usize, StorageError> {
        let sessions = self.list_sessions().await?;
        for session in &sessions {
            self.delete_session(&session.id).await?;
        }
        Ok(sessions.len())
    }

    /// Load a session's document, failing if it is absent or malformed
    pub async fn load_metadata(&self, session_id: &SessionId) -> Result<Session, StorageError> {
        let bytes = self.artifacts.read(&Self::metadata_path(session_id)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Load a session's document, synthesizing an empty session if it is
    /// absent or unreadable
    pub async fn get_metadata(&self, session_id: &SessionId) -> Session {
        match self.load_metadata(session_id).await {
            Ok(session) => session,
            Err(e) => {
                if !e.is_not_found() {
                    warn!("Unreadable metadata for session {}: {}", session_id, e);
                }
                Session::empty(session_id.clone())
            }
        }
    }

    /// Overwrite a session's document and notify subscribers
    pub async fn save_metadata(&self, session_id: &SessionId, session: &Session) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(session)?;
        self.artifacts
            .write(&Self::metadata_path(session_id), &json, WriteOptions::UPSERT)
            .await?;
        self.context
            .notify(SessionEvent::MetadataSaved(session_id.clone()));
        Ok(())
    }

    /// Document for a mutation: absent is empty, malformed is an error so
    /// that a corrupt document is never silently replaced
    async fn metadata_for_update(&self, session_id: &SessionId) -> Result<Session, StorageError> {
        match self.load_metadata(session_id).await {
            Ok(session) => Ok(session),
            Err(StorageError::NotFound(_)) => Ok(Session::empty(session_id.clone())),
            Err(e) => Err(e),
        }
    }

    /// Append a node after checking the forest invariants
    pub async fn add_node(&self, session_id: &SessionId, node: PipelineNode) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut session = self.metadata_for_update(session_id).await?;
        validate_insert(&session.nodes, &node)?;
        debug!("Adding {} node {} ({}) to {}", node.kind, node.id, node.filename, session_id);
        session.nodes.push(node);
        self.save_metadata(session_id, &session).await
    }

    pub async fn get_node(&self, session_id: &SessionId, node_id: &str) -> Option<PipelineNode> {
        self.get_metadata(session_id).await.node(node_id).cloned()
    }

    /// Delete a node together with all of its descendants, files included
    ///
    /// Files that are already gone are ignored. Returns the removed nodes;
    /// an unknown id removes nothing.
    pub async fn delete_node(&self, session_id: &SessionId, node_id: &str) -> Result<Vec<PipelineNode>, StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut session = self.metadata_for_update(session_id).await?;
        let doomed = descendants_of(&session.nodes, node_id);
        if doomed.is_empty() {
            debug!("Node {} not found in {}, nothing to delete", node_id, session_id);
            return Ok(Vec::new());
        }

        for node in session.nodes.iter().filter(|n| doomed.contains(&n.id)) {
            let path = Self::artifact_path(session_id, &node.filename);
            match self.artifacts.delete(&path, false).await {
                Ok(()) => {}
                Err(StorageError::NotFound(_)) => debug!("Artifact {} already gone", path.display()),
                Err(e) => return Err(e),
            }
        }

        let (removed, kept): (Vec<_>, Vec<_>) = session
            .nodes
            .into_iter()
            .partition(|n| doomed.contains(&n.id));
        session.nodes = kept;
        self.save_metadata(session_id, &session).await?;

        info!("Deleted {} node(s) under {} in {}", removed.len(), node_id, session_id);
        Ok(removed)
    }

    /// Write a new artifact and register `node` for it
    ///
    /// The node is checked against the forest before any bytes are written,
    /// and the file must not exist yet.
    pub async fn create_node(
        &self,
        session_id: &SessionId,
        node: PipelineNode,
        contents: &[u8],
    ) -> Result<PipelineNode, StorageError> {
        self.create_node_with(session_id, contents, |_| node).await
    }

    /// Like [`create_node`](Self::create_node), but `make` builds the node
    /// from the current document while the store is locked, so a filename
    /// chosen there cannot be taken by a concurrent create
    pub async fn create_node_with<F>(
        &self,
        session_id: &SessionId,
        contents: &[u8],
        make: F,
    ) -> Result<PipelineNode, StorageError>
    where
        F: FnOnce(&Session) -> PipelineNode + Send,
    {
        let _guard = self.write_lock.lock().await;

        let mut session = self.metadata_for_update(session_id).await?;
        let node = make(&session);
        validate_insert(&session.nodes, &node)?;

        let path = Self::artifact_path(session_id, &node.filename);
        self.artifacts
            .write(&path, contents, WriteOptions::CREATE_NEW)
            .await?;

        session.nodes.push(node.clone());
        if let Err(e) = self.save_metadata(session_id, &session).await {
            if let Err(cleanup) = self.artifacts.delete(&path, false).await {
                warn!("Failed to remove {} after failed save: {}", path.display(), cleanup);
            }
            return Err(e);
        }

        debug!("Created {} node {} ({}) in {}", node.kind, node.id, node.filename, session_id);
        Ok(node)
    }

    /// Add an input node backed by `contents`
    pub async fn create_input(
        &self,
        session_id: &SessionId,
        filename: &str,
        contents: &[u8],
    ) -> Result<PipelineNode, StorageError> {
        self.create_node(session_id, PipelineNode::input(filename), contents)
            .await
    }

    /// Write `contents` as the output of `transform_id`
    ///
    /// Reuses the transform's existing output node (overwriting its file) or
    /// creates one with a fresh filename. Returns the node and whether it was
    /// newly created.
    pub async fn upsert_output(
        &self,
        session_id: &SessionId,
        transform_id: &str,
        contents: &[u8],
    ) -> Result<(PipelineNode, bool), StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut session = self.metadata_for_update(session_id).await?;
        if let Some(existing) = session.output_of(transform_id).cloned() {
            let path = Self::artifact_path(session_id, &existing.filename);
            self.artifacts
                .write(&path, contents, WriteOptions::UPSERT)
                .await?;
            debug!("Refreshed output {} of {}", existing.filename, transform_id);
            return Ok((existing, false));
        }

        let filename = unique_filename("output", Utc::now().timestamp_millis(), ".json", |f| {
            session.has_filename(f)
        });
        let node = PipelineNode::output(filename, transform_id);
        validate_insert(&session.nodes, &node)?;

        let path = Self::artifact_path(session_id, &node.filename);
        self.artifacts
            .write(&path, contents, WriteOptions::UPSERT)
            .await?;
        session.nodes.push(node.clone());
        self.save_metadata(session_id, &session).await?;

        debug!("Created output {} for {}", node.filename, transform_id);
        Ok((node, true))
    }

    pub async fn read_artifact(&self, session_id: &SessionId, filename: &str) -> Result<Vec<u8>, StorageError> {
        self.artifacts
            .read(&Self::artifact_path(session_id, filename))
            .await
    }

    /// Copy a node's artifact out of storage to a local path
    pub async fn export_node(
        &self,
        session_id: &SessionId,
        node_id: &str,
        destination: &Path,
    ) -> Result<PipelineNode, StorageError> {
        let node = self
            .get_node(session_id, node_id)
            .await
            .ok_or_else(|| StorageError::NotFound(PathBuf::from(node_id)))?;
        let contents = self.read_artifact(session_id, &node.filename).await?;
        tokio::fs::write(destination, &contents)
            .await
            .map_err(|e| StorageError::from_io(destination, e))?;

        info!("Exported {} to {}", node.filename, destination.display());
        Ok(node)
    }

    pub async fn write_artifact(
        &self,
        session_id: &SessionId,
        filename: &str,
        contents: &[u8],
        options: WriteOptions,
    ) -> Result<(), StorageError> {
        validate_filename(filename)?;
        self.artifacts
            .write(&Self::artifact_path(session_id, filename), contents, options)
            .await
    }
}
