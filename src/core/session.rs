//! Session model

use crate::core::node::{NodeKind, PipelineNode};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Name of the metadata document inside each session directory
pub const METADATA_FILENAME: &str = "pipeline.json";

/// Identifier of a session
///
/// Derived from the creation instant (`2026-10-19T08-15-30-123Z`), so ids
/// sort chronologically. It doubles as the session's storage directory name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid session id '{0}'")]
pub struct InvalidSessionId(pub String);

impl SessionId {
    /// Build the id for a session created at `at`
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(at.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string())
    }

    /// Accept an existing id, rejecting anything that is not a single
    /// directory name
    pub fn parse(raw: &str) -> Result<Self, InvalidSessionId> {
        let valid = !raw.is_empty()
            && raw != "."
            && raw != ".."
            && !raw.starts_with('.')
            && !raw.contains(['/', '\\', '\0']);
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidSessionId(raw.to_string()))
        }
    }

    /// Allocate an id for `now` that is not in `taken`, bumping by a
    /// millisecond on collision
    pub fn allocate(now: DateTime<Utc>, taken: impl Fn(&SessionId) -> bool) -> Self {
        let mut at = now;
        loop {
            let id = Self::from_timestamp(at);
            if !taken(&id) {
                return id;
            }
            at += Duration::milliseconds(1);
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A session's metadata document (`pipeline.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    pub created: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub nodes: Vec<PipelineNode>,
}

impl Session {
    /// A session with no nodes, created now
    pub fn empty(id: SessionId) -> Self {
        Self {
            id,
            created: Utc::now(),
            name: None,
            nodes: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn node(&self, node_id: &str) -> Option<&PipelineNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn node_by_filename(&self, filename: &str) -> Option<&PipelineNode> {
        self.nodes.iter().find(|n| n.filename == filename)
    }

    /// The output node materialized for `transform_id`, if any
    pub fn output_of(&self, transform_id: &str) -> Option<&PipelineNode> {
        self.nodes
            .iter()
            .find(|n| n.kind == NodeKind::Output && n.parent_id.as_deref() == Some(transform_id))
    }

    pub fn children_of<'a>(&'a self, parent_id: &'a str) -> impl Iterator<Item = &'a PipelineNode> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.parent_id.as_deref() == Some(parent_id))
    }

    pub fn roots(&self) -> impl Iterator<Item = &PipelineNode> {
        self.nodes.iter().filter(|n| n.is_root())
    }

    pub fn has_filename(&self, filename: &str) -> bool {
        self.node_by_filename(filename).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_id_format_sorts_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let later = earlier + Duration::milliseconds(1);

        let a = SessionId::from_timestamp(earlier);
        let b = SessionId::from_timestamp(later);

        assert_eq!(a.as_str(), "2026-01-02T03-04-05-000Z");
        assert_eq!(b.as_str(), "2026-01-02T03-04-05-001Z");
        assert!(a < b);
    }

    #[test]
    fn test_allocate_skips_taken_ids() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let taken = SessionId::from_timestamp(now);

        let id = SessionId::allocate(now, |candidate| candidate == &taken);
        assert_eq!(id.as_str(), "2026-01-02T03-04-05-001Z");
    }

    #[test]
    fn test_parse_rejects_path_like_ids() {
        assert!(SessionId::parse("2026-01-02T03-04-05-000Z").is_ok());
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("..").is_err());
        assert!(SessionId::parse("a/b").is_err());
        assert!(SessionId::parse(".active").is_err());
    }

    #[test]
    fn test_metadata_document_round_trip() {
        let id = SessionId::parse("2026-01-02T03-04-05-000Z").unwrap();
        let mut session = Session::empty(id).with_name("analysis");
        let input = PipelineNode::input("data.json").with_id("in");
        let transform = PipelineNode::transform("t.ts", "in").with_id("t");
        session.nodes.push(input);
        session.nodes.push(transform);

        let json = serde_json::to_string_pretty(&session).unwrap();
        let reloaded: Session = serde_json::from_str(&json).unwrap();

        assert_eq!(reloaded, session);
    }

    #[test]
    fn test_parses_document_with_fields_in_any_order() {
        let raw = r#"{
            "nodes": [{"parentId": "in", "filename": "t.ts", "label": "t.ts", "type": "transform", "id": "t"},
                      {"label": "data.json", "id": "in", "filename": "data.json", "type": "input"}],
            "created": "2026-01-02T03:04:05.000Z",
            "id": "2026-01-02T03-04-05-000Z"
        }"#;

        let session: Session = serde_json::from_str(raw).unwrap();
        assert_eq!(session.nodes.len(), 2);
        assert!(session.name.is_none());
        assert_eq!(session.output_of("t"), None);
        assert_eq!(session.children_of("in").count(), 1);
        assert_eq!(session.roots().count(), 1);
    }
}
