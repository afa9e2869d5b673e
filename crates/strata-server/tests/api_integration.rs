//! HTTP API integration tests: every route against a bridged agent with a mock LLM.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use strata_config::{AgentConfig, ServerConfig};
use strata_llm::{HashEmbedding, MockProvider};
use strata_memory::MemoryStore;
use strata_runtime::{Agent, AsyncBridge, BridgeConfig, PatentTools};
use strata_server::{AppState, build_router};

fn bridge_with(mock: MockProvider) -> Arc<strata_runtime::AgentBridge> {
    let bridge = AsyncBridge::start(BridgeConfig::default(), move || async move {
        let memory = MemoryStore::in_memory(Arc::new(HashEmbedding::new(64)))?;
        let mut agent = Agent::new(
            memory,
            Arc::new(mock),
            Arc::new(PatentTools::new("http://127.0.0.1:9")),
            AgentConfig::default(),
        );
        agent.connect().await?;
        Ok(agent)
    })
    .unwrap();
    Arc::new(bridge)
}

fn setup_with_timeout(mock: MockProvider, timeout: Duration) -> axum::Router {
    let state = Arc::new(AppState::new(bridge_with(mock), timeout));
    build_router(&ServerConfig::default(), state)
}

fn setup(responses: Vec<&str>) -> axum::Router {
    let mut mock = MockProvider::new("mock");
    for r in responses {
        mock = mock.with_response(r);
    }
    setup_with_timeout(mock, Duration::from_secs(5))
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ── Health ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup(vec![]);
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "strata-agent");
    assert!(json["version"].is_string());
}

// ── Chat ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_endpoint() {
    let app = setup(vec!["Hello from Strata!"]);
    let resp = app
        .oneshot(post_json("/chat", r#"{"query":"Hi","user_id":"alice","mode":"react"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["answer"], "[ReAct]\nHello from Strata!");
    assert_eq!(json["query"], "Hi");
}

#[tokio::test]
async fn test_chat_bad_mode() {
    let app = setup(vec![]);
    let resp = app
        .oneshot(post_json("/chat", r#"{"query":"Hi","mode":"brainstorm"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert!(json["error"].as_str().unwrap().contains("brainstorm"));
}

#[tokio::test]
async fn test_chat_missing_query() {
    let app = setup(vec![]);
    let resp = app.oneshot(post_json("/chat", "{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_chat_simple_decodes_plus_in_mode() {
    let app = setup(vec![r#"{"thoughts":"t","plan":"p"}"#, "done"]);
    let resp = app
        .oneshot(
            Request::post("/chat/simple?query=hello&user_id=bob&mode=cot+react")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["answer"], "[Reasoning]\nt\n[Plan]\np\n[ReAct]\ndone");
    assert_eq!(json["query"], "hello");
}

#[tokio::test]
async fn test_chat_timeout_maps_to_504() {
    let mock = MockProvider::new("mock")
        .with_response("too late")
        .with_delay(Duration::from_secs(2));
    let app = setup_with_timeout(mock, Duration::from_millis(100));
    let resp = app
        .oneshot(post_json("/chat", r#"{"query":"slow please","mode":"react"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_chat_llm_failure_maps_to_500() {
    let app = setup_with_timeout(MockProvider::new("mock").with_error("quota"), Duration::from_secs(5));
    let resp = app
        .oneshot(post_json("/chat", r#"{"query":"Hi","mode":"cot"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "agent request failed");
}

// ── Memory ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_memory_update_and_clear() {
    let app = setup(vec![]);
    let resp = app
        .clone()
        .oneshot(
            Request::put("/users/alice/memory/drink")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"value":"coffee"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["memory_type"], "semantic");

    let resp = app
        .oneshot(Request::delete("/users/alice/memory").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["removed"], 1);
}

#[tokio::test]
async fn test_memory_update_bad_type() {
    let app = setup(vec![]);
    let resp = app
        .oneshot(
            Request::put("/users/alice/memory/drink")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"value":"coffee","memory_type":"procedural"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_clear_session() {
    let app = setup(vec![]);
    let resp = app
        .oneshot(Request::delete("/sessions/session_alice").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["session_id"], "session_alice");
}
