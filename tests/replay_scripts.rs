use std::io::Write;
use std::sync::Arc;

use graphsync::application::session::{EditorSession, SessionConfig};
use graphsync::domain::types::ParamValue;
use graphsync::infra::error::InfraError;
use graphsync::infra::replay;
use graphsync::infra::sim::InMemoryServer;

const SCRIPT: &str = r#"
[[action]]
action = "create"
type = "Source"
name = "src"

[[action]]
action = "create"
type = "Viewer"
name = "view"
at = [6.0, 0.0]

[[action]]
action = "connect"
from = "src:out"
to = "view:in"

[[action]]
action = "set"
op = "src"
param = "count"
value = 8

[[action]]
action = "set"
op = "src"
param = "warp"
value = 1.5

[[action]]
action = "step"
count = 2

[[action]]
action = "frame"
frame = 1

[[action]]
action = "undo"
"#;

fn write_script(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp script");
    file.write_all(contents.as_bytes()).expect("write script");
    file
}

#[tokio::test]
async fn replay_runs_every_action_and_records_failures() {
    let file = write_script(SCRIPT);
    let script = replay::load(file.path()).await.expect("script");
    assert_eq!(script.actions.len(), 8);

    let server = Arc::new(InMemoryServer::new());
    let mut session = EditorSession::attach(server.clone(), SessionConfig::default());
    let report = replay::run(&script, &mut session).await;

    assert_eq!(report.actions, 8);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 4);
    assert_eq!(report.failures[0].action, "set");

    assert_eq!(
        report.history,
        vec![
            "Create src".to_string(),
            "Create view".to_string(),
            "Connect src:out -> view:in".to_string(),
            "Set src:count".to_string(),
        ]
    );
    assert_eq!(report.undo_index, 3);
    assert_eq!(report.visible_frame, 1);
    assert_eq!(
        report.graph.ops["src"].params.get("count"),
        Some(&ParamValue::Int(4))
    );
    assert_eq!(report.graph.feeds.len(), 1);

    let json = serde_json::to_value(&report).expect("report serializes");
    assert_eq!(json["failures"][0]["action"], "set");
}

#[tokio::test]
async fn missing_script_is_an_io_error() {
    let error = replay::load(std::path::Path::new("/nonexistent/script.toml"))
        .await
        .expect_err("missing file");
    assert!(matches!(error, InfraError::Io(_)));
}

#[tokio::test]
async fn malformed_script_is_rejected_before_running() {
    let file = write_script("[[action]]\naction = \"connect\"\nfrom = \"src:out\"\n");
    let error = replay::load(file.path()).await.expect_err("missing field");
    assert!(matches!(error, InfraError::Script { .. }));
}
