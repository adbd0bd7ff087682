//! Request/response attempts through an axum router.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use axum::Json;
use serde_json::{Value, json};

use replay_client::{MockOrchestrator, MockReply};
use replay_core::errors::{INTERNAL, TaskError};
use replay_core::events::{ApiRequest, ApiStartEvent};
use replay_core::protocol::endpoints;
use replay_runtime::{ApiError, Dispatcher, TaskContext, TaskRegistry};

async fn approve(ctx: TaskContext, Json(body): Json<Value>) -> Result<Json<Value>, ApiError> {
    let decision = ctx.signal("approval").wait().await?;
    Ok(Json(json!({"order": body["order"], "approved": decision.output()})))
}

async fn quote(ctx: TaskContext) -> Result<String, ApiError> {
    let price = ctx.memo(|| async { Ok::<_, TaskError>(120) }).await?;
    Ok(price.output().to_string())
}

async fn crash() -> &'static str {
    panic!("controller bug")
}

fn dispatcher(mock: &Arc<MockOrchestrator>) -> Dispatcher {
    let router = Router::new()
        .route("/approve", post(approve))
        .route("/quote", get(quote))
        .route("/crash", get(crash));
    Dispatcher::new(mock.clone(), Arc::new(TaskRegistry::builder().build())).with_api(router)
}

fn start(method: &str, path: &str, body: &str) -> ApiStartEvent {
    let mut request = ApiRequest {
        method: method.into(),
        path: path.into(),
        body: body.into(),
        ..ApiRequest::default()
    };
    let _ = request.header.insert("content-type".into(), "application/json".into());
    ApiStartEvent {
        session_id: "sess-api".into(),
        request,
        ..ApiStartEvent::default()
    }
}

#[tokio::test]
async fn handler_response_is_relayed() {
    let mock = Arc::new(MockOrchestrator::new().reply(endpoints::SIGNAL_AWAIT, MockReply::signal_value(json!(true))));
    let done = dispatcher(&mock).run_api(start("POST", "/approve", r#"{"order": 7}"#)).await;

    assert_eq!(done.response.status_code, 200);
    let body: Value = serde_json::from_str(&done.response.body).unwrap();
    assert_eq!(body, json!({"order": 7, "approved": true}));
    assert_eq!(mock.calls_to(endpoints::SIGNAL_AWAIT)[0].session_id.as_deref(), Some("sess-api"));
}

#[tokio::test]
async fn suspended_handler_answers_accepted() {
    let mock = Arc::new(MockOrchestrator::new().reply(endpoints::SIGNAL_AWAIT, MockReply::signal_pending()));
    let done = dispatcher(&mock).run_api(start("POST", "/approve", r#"{"order": 7}"#)).await;

    assert!(done.response.is_accepted());
    assert!(done.response.body.is_empty());
}

#[tokio::test]
async fn memo_inside_api_handler() {
    let mock = Arc::new(MockOrchestrator::new());
    let done = dispatcher(&mock).run_api(start("GET", "/quote", "")).await;

    assert_eq!(done.response.status_code, 200);
    assert_eq!(done.response.body, "120");
    assert_eq!(mock.calls_to(endpoints::FUNC_RESULT).len(), 1);
}

#[tokio::test]
async fn handler_panic_is_internal_500() {
    let mock = Arc::new(MockOrchestrator::new());
    let done = dispatcher(&mock).run_api(start("GET", "/crash", "")).await;

    assert_eq!(done.response.status_code, 500);
    let body: Value = serde_json::from_str(&done.response.body).unwrap();
    assert_eq!(body["error"]["code"], INTERNAL.code());
    assert!(body["error"]["message"].as_str().unwrap().contains("controller bug"));
}

#[tokio::test]
async fn unknown_route_is_404() {
    let mock = Arc::new(MockOrchestrator::new());
    let done = dispatcher(&mock).run_api(start("GET", "/nope", "")).await;
    assert_eq!(done.response.status_code, 404);
}

#[tokio::test]
async fn malformed_request_is_400() {
    let mock = Arc::new(MockOrchestrator::new());
    let mut event = start("GET", "/quote", "");
    let _ = event.request.header.insert("bad header".into(), "x".into());
    let done = dispatcher(&mock).run_api(event).await;
    assert_eq!(done.response.status_code, 400);
}
