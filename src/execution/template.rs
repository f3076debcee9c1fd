//! Transform scaffolding
//!
//! New transforms start from a script that returns their input unchanged,
//! with an `InputData` declaration whose `data` type is inferred from the
//! parent artifact.

use crate::core::graph::unique_filename;
use crate::core::{GraphError, InputFormat, PipelineNode, SessionId};
use crate::persistence::{PipelineStore, StorageError};
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Structural TypeScript type of a JSON value
///
/// Arrays take the type of their first element; `null` and empty arrays
/// widen to `any`. `indent` is the indentation of the line the type starts on.
pub fn infer_type(value: &Value, indent: &str) -> String {
    match value {
        Value::Null => "any".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => match items.first() {
            Some(first) => format!("{}[]", infer_type(first, indent)),
            None => "any[]".to_string(),
        },
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Object(map) => {
            let nested = format!("{}    ", indent);
            let props: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{}{}: {};", nested, property_key(key), infer_type(value, &nested)))
                .collect();
            format!("{{\n{}\n{}}}", props.join("\n"), indent)
        }
    }
}

fn property_key(key: &str) -> String {
    static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();
    let is_identifier = IDENTIFIER
        .get_or_init(|| Regex::new(r"^[a-zA-Z_$][a-zA-Z0-9_$]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(key));

    if is_identifier {
        key.to_string()
    } else {
        serde_json::to_string(key).unwrap_or_else(|_| format!("\"{}\"", key))
    }
}

/// Type of `input.data` for an artifact named `filename`
pub fn data_type_for(filename: &str, contents: &[u8]) -> String {
    match InputFormat::from_filename(filename) {
        InputFormat::Json => match serde_json::from_slice::<Value>(contents) {
            Ok(value) => infer_type(&value, "    "),
            Err(e) => {
                debug!("Parent {} is not valid JSON ({}), typing as any", filename, e);
                "any".to_string()
            }
        },
        InputFormat::Csv => "string[][]".to_string(),
        InputFormat::Lines => "string[]".to_string(),
        InputFormat::Raw => "any".to_string(),
    }
}

/// Default body of a new transform script
pub fn default_script(data_type: &str) -> String {
    format!(
        r#"// Shape of the value passed to `transform`
interface InputData {{
    raw: string;
    data: {data_type};
}}

/**
 * Transformation script
 *
 * Whatever this returns is serialized as JSON and becomes the output.
 */
export function transform(input: InputData): any {{
    // Example: return input.data.map((item: any) => item.id);
    return input.data;
}}
"#
    )
}

/// Scaffold a transform script under `parent_id` and register its node
pub async fn add_transform(
    store: &PipelineStore,
    session_id: &SessionId,
    parent_id: &str,
) -> Result<PipelineNode, StorageError> {
    let session = store.get_metadata(session_id).await;
    let parent = session.node(parent_id).ok_or_else(|| GraphError::UnknownParent {
        id: "<new transform>".to_string(),
        parent: parent_id.to_string(),
    })?;

    let data_type = match store.read_artifact(session_id, &parent.filename).await {
        Ok(contents) => data_type_for(&parent.filename, &contents),
        Err(e) => {
            debug!("Could not read {} for type inference: {}", parent.filename, e);
            "any".to_string()
        }
    };

    let script = default_script(&data_type);
    let node = store
        .create_node_with(session_id, script.as_bytes(), |current| {
            let filename = unique_filename("transform", Utc::now().timestamp_millis(), ".ts", |f| {
                current.has_filename(f)
            });
            PipelineNode::transform(filename, parent_id)
        })
        .await?;

    info!("Scaffolded transform {} under {}", node.filename, parent_id);
    Ok(node)
}
