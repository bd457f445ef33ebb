use std::collections::BTreeSet;
use std::sync::Arc;

use graphsync::application::commands::{CommandError, Dispatched};
use graphsync::application::ports::{CreateOpParams, RequestError, RequestKind};
use graphsync::application::session::{EditorSession, SessionConfig};
use graphsync::domain::types::{Feed, ParamValue, PlugName, Position};
use graphsync::graph::GraphSnapshot;
use graphsync::infra::sim::InMemoryServer;

fn session() -> (Arc<InMemoryServer>, EditorSession) {
    let server = Arc::new(InMemoryServer::new());
    let session = EditorSession::attach(server.clone(), SessionConfig::default());
    (server, session)
}

fn feed(from: &str, to: &str) -> Feed {
    Feed::new(
        PlugName::split(from).expect("valid plug"),
        PlugName::split(to).expect("valid plug"),
    )
}

async fn build_chain(session: &mut EditorSession) {
    session
        .create_op(CreateOpParams::new("Source", "src"))
        .await
        .expect("create source");
    session
        .create_op(CreateOpParams::new("Transform", "xf"))
        .await
        .expect("create transform");
    session
        .connect(feed("src:out", "xf:in"))
        .await
        .expect("connect");
    session
        .set_param("xf", "scale", ParamValue::Float(2.5), false)
        .await
        .expect("set scale");
    session
        .move_ops(vec![("xf".to_string(), Position::new(4.0, 2.0))], false)
        .await
        .expect("move");
    session
        .select(BTreeSet::from(["xf".to_string()]), false)
        .await
        .expect("select");
}

#[tokio::test]
async fn undo_everything_then_redo_everything_round_trips() {
    let (_server, mut session) = session();
    let initial = session.snapshot();
    assert_eq!(initial, GraphSnapshot::default());

    build_chain(&mut session).await;
    let built = session.snapshot();
    let depth = session.history().len();
    assert_eq!(depth, 6);

    for _ in 0..depth {
        session.undo().await.expect("undo");
    }
    assert_eq!(session.snapshot(), initial);
    assert!(session.history().can_redo());

    for _ in 0..depth {
        session.redo().await.expect("redo");
    }
    assert_eq!(session.snapshot(), built);
    assert!(!session.history().can_redo());
}

#[tokio::test]
async fn push_never_reissues_the_confirmed_request() {
    let (server, mut session) = session();
    session
        .create_op(CreateOpParams::new("Source", "src"))
        .await
        .expect("create");
    assert_eq!(server.request_count(), 1);
    assert_eq!(server.op_names(), vec!["src".to_string()]);
    assert_eq!(session.history().text_for_undo().as_deref(), Some("Create src"));
}

#[tokio::test]
async fn failed_request_changes_nothing() {
    let (server, mut session) = session();
    build_chain(&mut session).await;
    let before = session.snapshot();
    let depth = session.history().len();

    server.fail_next(RequestKind::SetParam);
    let error = session
        .set_param("xf", "scale", ParamValue::Float(9.0), false)
        .await
        .expect_err("injected failure");

    assert!(matches!(
        error,
        CommandError::Request(RequestError::Rejected {
            kind: RequestKind::SetParam,
            ..
        })
    ));
    assert_eq!(session.snapshot(), before);
    assert_eq!(session.history().len(), depth);
}

#[tokio::test]
async fn rejected_connection_is_never_recorded() {
    let (_server, mut session) = session();
    session
        .create_op(CreateOpParams::new("Source", "src"))
        .await
        .expect("create");
    let depth = session.history().len();

    let error = session
        .connect(feed("src:out", "src:out"))
        .await
        .expect_err("output cannot feed output");
    assert!(matches!(error, CommandError::Request(RequestError::Rejected { .. })));
    assert_eq!(session.history().len(), depth);
    assert!(session.store().feeds().is_empty());
}

#[tokio::test]
async fn mergeable_edits_collapse_into_one_entry() {
    let (_server, mut session) = session();
    session
        .create_op(CreateOpParams::new("Source", "src"))
        .await
        .expect("create");

    for count in [5, 6, 7] {
        session
            .set_param("src", "count", ParamValue::Int(count), true)
            .await
            .expect("set");
    }
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.history().text_for_undo().as_deref(), Some("Set src:count"));

    session.undo().await.expect("undo");
    let src = session.store().query_const_op("src").expect("src");
    assert_eq!(src.param("count"), Some(&ParamValue::Int(4)));
}

#[tokio::test]
async fn reply_for_a_vanished_target_is_dropped() {
    let (server, mut session) = session();
    session
        .create_op(CreateOpParams::new("Source", "src"))
        .await
        .expect("create");
    let depth = session.history().len();

    server.erase_after_next_request("src");
    let dispatched = session
        .set_param("src", "count", ParamValue::Int(9), false)
        .await
        .expect("request itself succeeded");

    assert_eq!(dispatched, Dispatched::Stale);
    assert_eq!(session.history().len(), depth);
    assert!(!session.store().contains("src"));
}

#[tokio::test]
async fn undoing_an_erase_restores_its_feeds() {
    let (_server, mut session) = session();
    session
        .create_op(CreateOpParams::new("Source", "src"))
        .await
        .expect("create");
    session
        .create_op(CreateOpParams::new("Viewer", "view"))
        .await
        .expect("create");
    session
        .connect(feed("src:out", "view:in"))
        .await
        .expect("connect");
    let connected = session.snapshot();

    session.erase_op("src").await.expect("erase");
    assert!(session.store().feeds().is_empty());

    session.undo().await.expect("undo erase");
    assert_eq!(session.snapshot(), connected);
}

#[tokio::test]
async fn paste_is_one_undo_entry() {
    let (_server, mut session) = session();
    let items = vec![
        CreateOpParams::new("Source", "src").at(Position::new(1.0, 1.0)),
        CreateOpParams::new("Viewer", "view").at(Position::new(2.0, 1.0)),
    ];
    let created = session
        .paste(items, Position::new(10.0, 0.0))
        .await
        .expect("paste");

    assert_eq!(created, vec!["src".to_string(), "view".to_string()]);
    assert_eq!(session.history().len(), 1);
    assert_eq!(
        session.history().text_for_undo().as_deref(),
        Some("Paste 2 operations")
    );
    let snapshot = session.snapshot();
    assert_eq!(snapshot.ops["src"].position, Position::new(11.0, 1.0));
    assert_eq!(snapshot.selected, BTreeSet::from(["src".to_string(), "view".to_string()]));

    session.undo().await.expect("undo paste");
    assert!(session.snapshot().ops.is_empty());
}

#[tokio::test]
async fn clearing_the_graph_is_undoable() {
    let (_server, mut session) = session();
    build_chain(&mut session).await;
    let built = session.snapshot();

    session.clear_graph().await.expect("clear");
    assert!(session.store().is_empty());
    assert!(session.store().contains("Global"));

    session.undo().await.expect("undo clear");
    assert_eq!(session.snapshot(), built);
}

#[tokio::test]
async fn disconnected_server_fails_every_request() {
    let (server, mut session) = session();
    server.disconnect();
    let error = session
        .create_op(CreateOpParams::new("Source", "src"))
        .await
        .expect_err("disconnected");
    assert!(matches!(error, CommandError::Request(RequestError::Disconnected)));
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn frame_requests_never_enter_the_history() {
    let (_server, mut session) = session();
    session
        .create_op(CreateOpParams::new("Source", "src"))
        .await
        .expect("create");
    session.step().await.expect("step");
    session.set_visible_frame(0).await.expect("frame");
    session
        .set_project_path("/tmp/project".into())
        .await
        .expect("project");
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.store().visible_frame(), 0);
    assert_eq!(session.store().computing_frame(), 1);
}
