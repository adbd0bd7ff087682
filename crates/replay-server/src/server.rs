use std::future::Future;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use bytes::Bytes;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use replay_core::errors::INTERNAL;
use replay_core::events::{
    ApiCompleteEvent, ApiResponse, ApiStartEvent, AttemptOutcome, ServiceCompleteEvent,
    ServiceStartEvent,
};
use replay_runtime::Dispatcher;

use crate::errors::ServerError;

/// Route paths served to the orchestrator.
pub mod paths {
    /// Liveness probe.
    pub const HEALTH: &str = "/v1/health";
    /// Service-style attempt.
    pub const INVOKE_SERVICE: &str = "/v1/invoke/service";
    /// Request/response-style attempt.
    pub const INVOKE_API: &str = "/v1/invoke/api";
}

/// Shared state passed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Runs each received attempt.
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(paths::HEALTH, get(health_handler))
        .route(paths::INVOKE_SERVICE, post(invoke_service))
        .route(paths::INVOKE_API, post(invoke_api))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<S>(listener: TcpListener, router: Router, shutdown: S) -> Result<(), ServerError>
where
    S: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "runtime server listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("runtime server stopped");
    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "tasks": state.dispatcher.registry().len(),
    }))
}

/// Always answers 200; an undecodable start event becomes a failed completion.
async fn invoke_service(State(state): State<AppState>, body: Bytes) -> Json<ServiceCompleteEvent> {
    let event: ServiceStartEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "undecodable service start event");
            let error = INTERNAL.with(format!("invalid start event: {e}"));
            return Json(AttemptOutcome::failed(error).into());
        }
    };
    Json(state.dispatcher.run_service(event).await)
}

async fn invoke_api(State(state): State<AppState>, body: Bytes) -> Json<ApiCompleteEvent> {
    let event: ApiStartEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "undecodable api start event");
            let error = INTERNAL.with(format!("invalid start event: {e}"));
            return Json(ApiCompleteEvent {
                response: ApiResponse::from_error(500, error),
            });
        }
    };
    Json(state.dispatcher.run_api(event).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use replay_client::{MockOrchestrator, MockReply};
    use replay_core::errors::TaskError;
    use replay_core::protocol::endpoints;
    use replay_runtime::{TaskContext, TaskDef, TaskRegistry};
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    async fn charge(ctx: TaskContext, _input: Value) -> Result<Value, TaskError> {
        let charged = ctx.memo(|| async { Ok::<_, TaskError>(42) }).await?;
        Ok(charged.output().clone())
    }

    fn router(mock: Arc<MockOrchestrator>) -> Router {
        let mut builder = TaskRegistry::builder();
        let _ = builder.register("billing", "charge", TaskDef::handler(charge)).unwrap();
        let dispatcher = Dispatcher::new(mock, Arc::new(builder.build()));
        build_router(AppState {
            dispatcher: Arc::new(dispatcher),
        })
    }

    async fn post_json<T: DeserializeOwned>(router: Router, path: &str, body: String) -> (StatusCode, T) {
        let req = Request::post(path)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_task_count() {
        let req = Request::get(paths::HEALTH).body(Body::empty()).unwrap();
        let resp = router(Arc::new(MockOrchestrator::new())).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"status": "ok", "tasks": 1}));
    }

    #[tokio::test]
    async fn service_attempt_round_trip() {
        let mock = Arc::new(MockOrchestrator::new());
        let start = json!({"sessionId": "s-9", "service": "billing", "method": "charge", "input": {"amount": 500}});
        let (status, done): (_, ServiceCompleteEvent) =
            post_json(router(mock.clone()), paths::INVOKE_SERVICE, start.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!done.is_error);
        assert_eq!(done.output, json!(42));
        assert_eq!(mock.calls_to(endpoints::FUNC_RESULT).len(), 1);
    }

    #[tokio::test]
    async fn suspended_attempt_is_still_200() {
        let mock = Arc::new(MockOrchestrator::new().reply(endpoints::FUNC_EXEC, MockReply::Suspend));
        let start = json!({"sessionId": "s-9", "service": "billing", "method": "charge"});
        let (status, done): (_, Value) = post_json(router(mock), paths::INVOKE_SERVICE, start.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["isError"], false);
        assert!(done["output"].is_null());
        assert!(done["error"].is_null());
    }

    #[tokio::test]
    async fn undecodable_body_is_failed_completion() {
        let (status, done): (_, ServiceCompleteEvent) =
            post_json(router(Arc::new(MockOrchestrator::new())), paths::INVOKE_SERVICE, "{not json".into()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(done.is_error);
        assert!(INTERNAL.is(done.error.as_ref().unwrap()));
    }

    #[tokio::test]
    async fn api_attempt_without_router_is_500_response() {
        let start = json!({"sessionId": "s-9", "request": {"method": "GET", "path": "/"}});
        let (status, done): (_, ApiCompleteEvent) =
            post_json(router(Arc::new(MockOrchestrator::new())), paths::INVOKE_API, start.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(done.response.status_code, 500);
    }
}
