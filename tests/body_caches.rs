use std::sync::{Arc, Mutex};

use graphsync::application::ports::CreateOpParams;
use graphsync::application::session::{EditorSession, SessionConfig};
use graphsync::cache::{CacheConfig, SourceKind};
use graphsync::domain::types::{Activation, CachePolicy, Feed, ParamValue, PlugName};
use graphsync::graph::GraphEvent;
use graphsync::infra::sim::{InMemoryServer, QueryKind};

fn plug(long_name: &str) -> PlugName {
    PlugName::split(long_name).expect("valid plug")
}

fn feed(from: &str, to: &str) -> Feed {
    Feed::new(plug(from), plug(to))
}

async fn session_with(config: SessionConfig, ops: &[(&str, &str)]) -> (Arc<InMemoryServer>, EditorSession) {
    let server = Arc::new(InMemoryServer::new());
    let mut session = EditorSession::attach(server.clone(), config);
    for (type_name, name) in ops {
        session
            .create_op(CreateOpParams::new(*type_name, *name))
            .await
            .expect("create");
    }
    (server, session)
}

async fn viewed_source() -> (Arc<InMemoryServer>, EditorSession) {
    let (server, mut session) =
        session_with(SessionConfig::default(), &[("Source", "src"), ("Viewer", "view")]).await;
    session
        .connect(feed("src:out", "view:in"))
        .await
        .expect("connect");
    (server, session)
}

fn live_policy(session: &EditorSession, long_name: &str) -> CachePolicy {
    session
        .store()
        .plug_cache(&plug(long_name))
        .expect("body output")
        .policy()
}

#[tokio::test]
async fn placeholder_consumer_switches_producer_to_full_cache_once() {
    let (_server, mut session) =
        session_with(SessionConfig::default(), &[("Source", "src"), ("Viewer", "view")]).await;
    assert_eq!(live_policy(&session, "src:out"), CachePolicy::NoCache);
    session.drain_events();

    session
        .connect(feed("src:out", "view:in"))
        .await
        .expect("connect");

    let events: Vec<GraphEvent> = session.drain_events().into_iter().map(|notice| notice.kind).collect();
    let rebuilt = events
        .iter()
        .filter(|event| {
            matches!(
                event,
                GraphEvent::LiveBodyCacheChanged { plug: target, .. } if target == &plug("src:out")
            )
        })
        .count();
    assert_eq!(rebuilt, 1);
    assert!(events.contains(&GraphEvent::CachePolicyChanged {
        op: "src".to_string(),
        plug: Some(plug("src:out")),
        from: CachePolicy::NoCache,
        to: CachePolicy::FullCache,
    }));

    let controller = session.store().plug_cache(&plug("src:out")).expect("controller");
    assert_eq!(controller.policy(), CachePolicy::FullCache);
    assert_eq!(controller.cache().len(), 2);
    assert!(controller.cache().iter().all(|body| body.renderable().is_some()));
}

#[tokio::test]
async fn regular_consumer_keeps_only_summaries() {
    let (_server, mut session) =
        session_with(SessionConfig::default(), &[("Source", "src"), ("Transform", "xf")]).await;
    session
        .connect(feed("src:out", "xf:in"))
        .await
        .expect("connect");

    let controller = session.store().plug_cache(&plug("src:out")).expect("controller");
    assert_eq!(controller.policy(), CachePolicy::StatsOnly);
    let body = controller.cache().get("src.0").expect("cached body");
    assert!(body.elements().is_none());
    assert_eq!(body.summary().element_count, 4);
    assert_eq!(live_policy(&session, "xf:out"), CachePolicy::NoCache);
}

#[tokio::test]
async fn erasing_the_viewer_reverts_to_no_cache() {
    let (_server, mut session) = viewed_source().await;
    session.erase_op("view").await.expect("erase");

    let controller = session.store().plug_cache(&plug("src:out")).expect("controller");
    assert_eq!(controller.policy(), CachePolicy::NoCache);
    assert!(controller.cache().is_empty());
    let historical = session.store().op_cache("src").expect("bearing op");
    assert_eq!(historical.policy(), CachePolicy::NoCache);
}

#[tokio::test]
async fn unchanged_policy_does_not_rebuild() {
    let (server, mut session) = viewed_source().await;
    session
        .create_op(CreateOpParams::new("Merge", "merge"))
        .await
        .expect("create");
    server.reset_counters();

    session
        .connect(feed("src:out", "merge:in"))
        .await
        .expect("connect second consumer");

    assert_eq!(live_policy(&session, "src:out"), CachePolicy::FullCache);
    assert_eq!(server.query_count(QueryKind::LiveBodies), 0);
}

#[tokio::test]
async fn switching_to_a_past_frame_fetches_history_once_per_cached_op() {
    let (server, mut session) = viewed_source().await;
    session.step().await.expect("step");
    session.step().await.expect("step");
    server.reset_counters();

    session.set_visible_frame(0).await.expect("frame");
    assert_eq!(server.query_count(QueryKind::HistoricalBodies), 2);

    let source = session.bodies("src", "out").expect("bodies");
    assert_eq!(source.kind(), SourceKind::Historical);
    assert_eq!(source.cache().len(), 2);
    let body = source.cache().get("src.0").expect("body");
    assert_eq!(body.elements().map(|elements| elements[0][1]), Some(0.0));

    session.set_visible_frame(0).await.expect("same frame again");
    assert_eq!(server.query_count(QueryKind::HistoricalBodies), 2);
}

#[tokio::test]
async fn live_frame_reads_the_live_cache() {
    let (_server, mut session) = viewed_source().await;
    let source = session.bodies("src", "out").expect("bodies");
    assert_eq!(source.kind(), SourceKind::Live);
    assert!(source.is_live());
    assert_eq!(source.cache().len(), 2);
}

#[tokio::test]
async fn inactive_operation_reads_history_even_at_the_live_frame() {
    let (_server, mut session) = viewed_source().await;
    session
        .set_activation("src", Activation::Inactive)
        .await
        .expect("deactivate");

    let source = session.bodies("src", "out").expect("bodies");
    assert_eq!(source.kind(), SourceKind::Historical);
    assert_eq!(source.cache().len(), 2);
}

#[tokio::test]
async fn frame_without_history_yields_an_empty_cache() {
    let (_server, mut session) = viewed_source().await;
    session.step().await.expect("step");
    session.set_visible_frame(0).await.expect("frame");
    session.drain_events();

    session
        .create_op(CreateOpParams::new("Source", "late"))
        .await
        .expect("create");
    session
        .create_op(CreateOpParams::new("Viewer", "late_view"))
        .await
        .expect("create");
    session
        .connect(feed("late:out", "late_view:in"))
        .await
        .expect("connect");

    let events: Vec<GraphEvent> = session.drain_events().into_iter().map(|notice| notice.kind).collect();
    assert!(events.contains(&GraphEvent::HistoricalBodyCacheChanged {
        op: "late".to_string(),
        ok: false,
    }));
    let source = session.bodies("late", "out").expect("bodies");
    assert_eq!(source.kind(), SourceKind::Historical);
    assert!(source.cache().is_empty());
}

#[tokio::test]
async fn step_end_rebuilds_live_caches_for_the_new_frame() {
    let (_server, mut session) = viewed_source().await;
    session.step().await.expect("step");

    let controller = session.store().plug_cache(&plug("src:out")).expect("controller");
    let body = controller.cache().get("src.0").expect("body");
    assert_eq!(body.elements().map(|elements| elements[0][1]), Some(1.0));
}

#[tokio::test]
async fn poisoned_body_is_kept_without_a_renderable() {
    let server = Arc::new(InMemoryServer::new());
    let mut session = EditorSession::attach(server.clone(), SessionConfig::default());
    session
        .create_op(CreateOpParams::new("Source", "src"))
        .await
        .expect("create");
    session
        .create_op(CreateOpParams::new("Viewer", "view"))
        .await
        .expect("create");
    server.poison("src");

    session
        .connect(feed("src:out", "view:in"))
        .await
        .expect("connect");

    let cache = session
        .store()
        .plug_cache(&plug("src:out"))
        .expect("controller")
        .cache();
    assert_eq!(cache.len(), 2);
    assert!(cache.get("src.0").expect("poisoned").renderable().is_none());
    assert!(cache.get("src.1").expect("healthy").renderable().is_some());
}

#[tokio::test]
async fn disabled_live_cache_never_queries_the_server() {
    let config = SessionConfig {
        cache: CacheConfig {
            enable_live_cache: false,
            ..CacheConfig::default()
        },
        ..SessionConfig::default()
    };
    let (server, mut session) = session_with(config, &[("Source", "src"), ("Viewer", "view")]).await;
    session
        .connect(feed("src:out", "view:in"))
        .await
        .expect("connect");
    session.step().await.expect("step");

    assert!(
        session
            .store()
            .plug_cache(&plug("src:out"))
            .expect("controller")
            .cache()
            .is_empty()
    );
    assert_eq!(server.query_count(QueryKind::LiveBodies), 0);
}

#[tokio::test]
async fn listeners_see_events_in_publish_order() {
    let (_server, mut session) =
        session_with(SessionConfig::default(), &[("Source", "src"), ("Viewer", "view")]).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session.subscribe(Box::new(move |notice| {
        sink.lock().expect("listener lock").push(notice.epoch);
    }));

    session
        .connect(feed("src:out", "view:in"))
        .await
        .expect("connect");

    let epochs = seen.lock().expect("listener lock").clone();
    assert!(!epochs.is_empty());
    assert!(epochs.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn optional_plug_is_omitted_from_the_mirror() {
    let (_server, session) = session_with(SessionConfig::default(), &[("Transform", "xf")]).await;
    let xf = session.store().query_const_op("xf").expect("xf");
    assert!(xf.plug("aux").is_none());
    assert!(xf.plug("out").is_some());
    assert_eq!(session.store().ops_by_family("modifiers").len(), 1);
}

async fn viewed_chain() -> (Arc<InMemoryServer>, EditorSession) {
    let (server, mut session) = session_with(
        SessionConfig::default(),
        &[("Source", "src"), ("Transform", "xf"), ("Viewer", "view")],
    )
    .await;
    session
        .connect(feed("src:out", "xf:in"))
        .await
        .expect("connect source");
    session
        .connect(feed("xf:out", "view:in"))
        .await
        .expect("connect viewer");
    (server, session)
}

fn first_x(session: &EditorSession, op: &str, body: &str) -> Option<f32> {
    session
        .store()
        .op_cache(op)
        .and_then(|controller| controller.cache().get(body))
        .and_then(|body| body.elements().map(|elements| elements[1][0]))
}

#[tokio::test]
async fn upstream_edit_refreshes_downstream_history() {
    let (_server, mut session) = viewed_chain().await;
    session.step().await.expect("step");
    session.step().await.expect("step");
    session.set_visible_frame(0).await.expect("rewind");
    assert_eq!(first_x(&session, "xf", "xf/src.0"), Some(1.0));
    session.drain_events();

    session
        .set_param("src", "scale", ParamValue::Float(5.0), false)
        .await
        .expect("set scale");

    let events: Vec<GraphEvent> = session.drain_events().into_iter().map(|notice| notice.kind).collect();
    for op in ["src", "xf", "view"] {
        assert!(
            events.contains(&GraphEvent::HistoricalBodyCacheChanged {
                op: op.to_string(),
                ok: true,
            }),
            "no historical refresh for {op}"
        );
    }
    assert_eq!(first_x(&session, "xf", "xf/src.0"), Some(5.0));
}

#[tokio::test]
async fn live_edit_leaves_history_alone() {
    let (server, mut session) = viewed_chain().await;
    server.reset_counters();
    session
        .set_param("src", "scale", ParamValue::Float(5.0), false)
        .await
        .expect("set scale");
    assert_eq!(server.query_count(QueryKind::HistoricalStatus), 0);
}

#[tokio::test]
async fn policy_does_not_depend_on_connection_order() {
    let (_server, downstream_first) = {
        let (server, mut session) = session_with(
            SessionConfig::default(),
            &[("Source", "src"), ("Transform", "xf"), ("Viewer", "view")],
        )
        .await;
        session
            .connect(feed("xf:out", "view:in"))
            .await
            .expect("connect viewer");
        session
            .connect(feed("src:out", "xf:in"))
            .await
            .expect("connect source");
        (server, session)
    };
    let (_server, mut upstream_first) = viewed_chain().await;

    assert_eq!(live_policy(&downstream_first, "src:out"), CachePolicy::FullCache);
    assert_eq!(live_policy(&upstream_first, "src:out"), CachePolicy::FullCache);
    assert_eq!(
        downstream_first.store().op_cache("src").map(|cache| cache.policy()),
        upstream_first.store().op_cache("src").map(|cache| cache.policy()),
    );

    upstream_first
        .disconnect(feed("xf:out", "view:in"))
        .await
        .expect("disconnect viewer");
    assert_eq!(live_policy(&upstream_first, "src:out"), CachePolicy::StatsOnly);
}

#[tokio::test]
async fn erasing_a_two_hop_viewer_downgrades_the_producer() {
    let (_server, mut session) = viewed_chain().await;
    session.erase_op("view").await.expect("erase");
    assert_eq!(live_policy(&session, "src:out"), CachePolicy::StatsOnly);
    assert_eq!(live_policy(&session, "xf:out"), CachePolicy::NoCache);
}

#[tokio::test]
async fn event_backlog_is_bounded() {
    let config = SessionConfig {
        event_backlog_limit: 16,
        ..SessionConfig::default()
    };
    let (_server, mut session) = session_with(config, &[("Source", "src")]).await;
    for step in 0..50 {
        session
            .set_param("src", "scale", ParamValue::Float(f64::from(step)), true)
            .await
            .expect("drag");
    }

    assert_eq!(session.history().len(), 2);
    let backlog = session.drain_events();
    assert_eq!(backlog.len(), 16);
    assert!(backlog.windows(2).all(|pair| pair[0].epoch + 1 == pair[1].epoch));
}
