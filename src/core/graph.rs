//! Structural rules of the pipeline forest

use crate::core::node::{NodeKind, PipelineNode};
use crate::core::session::METADATA_FILENAME;
use std::collections::{HashSet, VecDeque};
use std::path::{Component, Path};
use thiserror::Error;

/// Violations of the node invariants
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node id '{0}' already exists")]
    DuplicateId(String),

    #[error("filename '{0}' is already used in this session")]
    DuplicateFilename(String),

    #[error("invalid filename '{0}'")]
    InvalidFilename(String),

    #[error("input node '{0}' cannot have a parent")]
    UnexpectedParent(String),

    #[error("{kind} node '{id}' requires a parent")]
    MissingParent { id: String, kind: NodeKind },

    #[error("parent '{parent}' of node '{id}' does not exist")]
    UnknownParent { id: String, parent: String },

    #[error("output node '{id}' must be parented to a transform, not '{parent}'")]
    OutputParentNotTransform { id: String, parent: String },

    #[error("transform '{0}' already has an output node")]
    DuplicateOutput(String),
}

/// Check that `candidate` may be appended to `nodes`
///
/// Parents must already exist, which is what keeps the structure acyclic.
pub fn validate_insert(nodes: &[PipelineNode], candidate: &PipelineNode) -> Result<(), GraphError> {
    validate_filename(&candidate.filename)?;

    if nodes.iter().any(|n| n.id == candidate.id) {
        return Err(GraphError::DuplicateId(candidate.id.clone()));
    }
    if nodes.iter().any(|n| n.filename == candidate.filename) {
        return Err(GraphError::DuplicateFilename(candidate.filename.clone()));
    }

    match (candidate.kind, candidate.parent_id.as_deref()) {
        (NodeKind::Input, None) => Ok(()),
        (NodeKind::Input, Some(_)) => Err(GraphError::UnexpectedParent(candidate.id.clone())),
        (kind, None) => Err(GraphError::MissingParent {
            id: candidate.id.clone(),
            kind,
        }),
        (kind, Some(parent_id)) => {
            let parent = nodes
                .iter()
                .find(|n| n.id == parent_id)
                .ok_or_else(|| GraphError::UnknownParent {
                    id: candidate.id.clone(),
                    parent: parent_id.to_string(),
                })?;

            if kind == NodeKind::Output {
                if parent.kind != NodeKind::Transform {
                    return Err(GraphError::OutputParentNotTransform {
                        id: candidate.id.clone(),
                        parent: parent_id.to_string(),
                    });
                }
                let has_output = nodes
                    .iter()
                    .any(|n| n.kind == NodeKind::Output && n.parent_id.as_deref() == Some(parent_id));
                if has_output {
                    return Err(GraphError::DuplicateOutput(parent_id.to_string()));
                }
            }
            Ok(())
        }
    }
}

/// A filename must be one plain path component inside the session directory
pub fn validate_filename(filename: &str) -> Result<(), GraphError> {
    let mut components = Path::new(filename).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );

    if !single_normal
        || filename.contains('\\')
        || filename.starts_with('.')
        || filename == METADATA_FILENAME
    {
        return Err(GraphError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Ids of `root_id` and every node reachable from it through parent links
///
/// Returns an empty set when `root_id` is not among `nodes`.
pub fn descendants_of(nodes: &[PipelineNode], root_id: &str) -> HashSet<String> {
    let mut found = HashSet::new();
    if !nodes.iter().any(|n| n.id == root_id) {
        return found;
    }

    let mut queue = VecDeque::from([root_id.to_string()]);
    while let Some(current) = queue.pop_front() {
        if !found.insert(current.clone()) {
            continue;
        }
        queue.extend(
            nodes
                .iter()
                .filter(|n| n.parent_id.as_deref() == Some(current.as_str()))
                .map(|n| n.id.clone()),
        );
    }
    found
}

/// Pick `<stem>-<stamp><ext>`, adding `-2`, `-3`, ... until it is free
pub fn unique_filename(stem: &str, stamp: i64, ext: &str, taken: impl Fn(&str) -> bool) -> String {
    let base = format!("{}-{}", stem, stamp);
    let mut candidate = format!("{}{}", base, ext);
    let mut n = 2;
    while taken(&candidate) {
        candidate = format!("{}-{}{}", base, n, ext);
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest() -> Vec<PipelineNode> {
        vec![
            PipelineNode::input("a.json").with_id("in-a"),
            PipelineNode::transform("t1.ts", "in-a").with_id("t1"),
            PipelineNode::output("o1.json", "t1").with_id("o1"),
            PipelineNode::transform("t2.ts", "o1").with_id("t2"),
            PipelineNode::output("o2.json", "t2").with_id("o2"),
            PipelineNode::input("b.csv").with_id("in-b"),
            PipelineNode::transform("t3.ts", "in-b").with_id("t3"),
        ]
    }

    #[test]
    fn test_descendants_cover_transitive_children() {
        let nodes = forest();
        let removed = descendants_of(&nodes, "t1");

        let expected: HashSet<String> = ["t1", "o1", "t2", "o2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(removed, expected);
    }

    #[test]
    fn test_descendants_of_root_leave_other_trees() {
        let nodes = forest();
        let removed = descendants_of(&nodes, "in-b");

        assert_eq!(removed.len(), 2);
        assert!(removed.contains("t3"));
        assert!(!removed.contains("in-a"));
    }

    #[test]
    fn test_descendants_of_unknown_node_is_empty() {
        assert!(descendants_of(&forest(), "missing").is_empty());
    }

    #[test]
    fn test_every_survivor_has_no_removed_ancestor() {
        let nodes = forest();
        for node in &nodes {
            let removed = descendants_of(&nodes, &node.id);
            for survivor in nodes.iter().filter(|n| !removed.contains(&n.id)) {
                let mut parent = survivor.parent_id.clone();
                while let Some(p) = parent {
                    assert!(!removed.contains(&p), "{} survived under removed {}", survivor.id, p);
                    parent = nodes.iter().find(|n| n.id == p).and_then(|n| n.parent_id.clone());
                }
            }
        }
    }

    #[test]
    fn test_insert_rules() {
        let nodes = forest();

        let orphan = PipelineNode::transform("x.ts", "nope").with_id("x");
        assert!(matches!(validate_insert(&nodes, &orphan), Err(GraphError::UnknownParent { .. })));

        let parented_input = PipelineNode::input("c.json").with_id("c");
        let parented_input = PipelineNode { parent_id: Some("in-a".into()), ..parented_input };
        assert!(matches!(validate_insert(&nodes, &parented_input), Err(GraphError::UnexpectedParent(_))));

        let second_output = PipelineNode::output("o1b.json", "t1").with_id("o1b");
        assert_eq!(
            validate_insert(&nodes, &second_output),
            Err(GraphError::DuplicateOutput("t1".to_string()))
        );

        let output_of_input = PipelineNode::output("bad.json", "in-a").with_id("bad");
        assert!(matches!(
            validate_insert(&nodes, &output_of_input),
            Err(GraphError::OutputParentNotTransform { .. })
        ));

        let same_file = PipelineNode::input("a.json").with_id("dup");
        assert!(matches!(validate_insert(&nodes, &same_file), Err(GraphError::DuplicateFilename(_))));

        let output_of_t3 = PipelineNode::output("o3.json", "t3").with_id("o3");
        assert!(validate_insert(&nodes, &output_of_t3).is_ok());
    }

    #[test]
    fn test_filename_must_stay_in_session_directory() {
        assert!(validate_filename("data.json").is_ok());
        assert!(validate_filename("../data.json").is_err());
        assert!(validate_filename("/etc/passwd").is_err());
        assert!(validate_filename("nested/data.json").is_err());
        assert!(validate_filename("pipeline.json").is_err());
        assert!(validate_filename(".active").is_err());
        assert!(validate_filename("").is_err());
    }

    #[test]
    fn test_unique_filename_appends_counter() {
        let taken = ["output-5.json", "output-5-2.json"];
        let name = unique_filename("output", 5, ".json", |f| taken.contains(&f));
        assert_eq!(name, "output-5-3.json");
    }
}
