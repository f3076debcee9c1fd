//! Smoke test - runs transforms through the real esbuild and node binaries
//!
//! Run with: cargo test --test smoke_test -- --ignored

use datalab::core::{SessionContext, SessionId};
use datalab::persistence::{InMemoryArtifactStore, PipelineStore};
use datalab::{EsbuildCompiler, PipelineNode, SubprocessRunner, TransformEngine, TransformRef};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn run_script(script: &str, input_name: &str, input: &[u8]) -> Value {
    let store = Arc::new(PipelineStore::new(
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(SessionContext::new()),
    ));
    let session_id: SessionId = store.create_session(Some("smoke")).await.expect("session");
    let input = store
        .create_input(&session_id, input_name, input)
        .await
        .expect("input");
    let transform = store
        .create_node(
            &session_id,
            PipelineNode::transform("transform.ts", &input.id),
            script.as_bytes(),
        )
        .await
        .expect("transform");

    let engine = TransformEngine::new(
        store.clone(),
        EsbuildCompiler::new("esbuild", 60),
        SubprocessRunner::new("node", Some(60)),
    );

    let outcome = tokio::time::timeout(
        Duration::from_secs(120),
        engine.run(TransformRef::Node(transform), &CancellationToken::new()),
    )
    .await
    .expect("run timed out")
    .expect("run failed");

    let bytes = store
        .read_artifact(&session_id, &outcome.output.filename)
        .await
        .expect("output");
    serde_json::from_slice(&bytes).expect("output is JSON")
}

#[tokio::test]
#[ignore] // Requires esbuild and node on PATH
async fn smoke_test_explicit_input_parameter() {
    let script = r#"
interface InputData { raw: string; data: { items: number[] } }

export function transform(input: InputData) {
    return input.data.items.map((n) => n * 2);
}
"#;
    let value = run_script(script, "data.json", br#"{"items":[1,2,3]}"#).await;
    assert_eq!(value, json!([2, 4, 6]));
}

#[tokio::test]
#[ignore] // Requires esbuild and node on PATH
async fn smoke_test_global_input() {
    let script = r#"
declare const input: { raw: string; data: string[][] };

export function transform() {
    return input.data.length;
}
"#;
    let value = run_script(script, "rows.csv", b"a,b\n1,2\n3,4").await;
    assert_eq!(value, json!(3));
}
