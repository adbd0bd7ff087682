//! Bridge between relayed [`ApiRequest`]s and an axum [`Router`](axum::Router).
//!
//! The dispatcher turns the relayed request into an `http::Request`, stores
//! the attempt's [`TaskContext`] in its extensions, and drives the router.
//! Handlers receive the context as an extractor:
//!
//! ```ignore
//! async fn approve(ctx: TaskContext, Json(body): Json<Approval>) -> Result<Json<Value>, ApiError> {
//!     let resp = ctx.signal("approval").wait().await?;
//!     Ok(Json(resp.output().clone()))
//! }
//! ```

use axum::Json;
use axum::body::{Body, to_bytes};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use replay_core::errors::{API_EXEC, BAD_REQUEST, INTERNAL, StructuredError, Suspended, TaskError};
use replay_core::events::{ApiRequest, ApiResponse};
use replay_core::protocol::ErrorEvent;

use crate::context::TaskContext;

/// Largest response body relayed back to the orchestrator.
pub const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Build the request handed to the router.
pub fn to_http_request(req: ApiRequest, ctx: TaskContext) -> Result<Request<Body>, StructuredError> {
    let method = if req.method.is_empty() {
        Method::GET
    } else {
        Method::from_bytes(req.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| BAD_REQUEST.with(format!("method {:?}: {e}", req.method)))?
    };

    let mut uri = if req.path.starts_with('/') {
        req.path.clone()
    } else {
        format!("/{}", req.path)
    };
    if !req.query.is_empty() {
        let query: Vec<String> = req
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        uri.push('?');
        uri.push_str(&query.join("&"));
    }

    let body = if req.is_base64_encoded {
        STANDARD
            .decode(&req.body)
            .map_err(|e| BAD_REQUEST.with(format!("body is not base64: {e}")))?
    } else {
        req.body.into_bytes()
    };

    let mut builder = Request::builder().method(method).uri(&uri);
    for (name, value) in &req.header {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| BAD_REQUEST.with(format!("header {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| BAD_REQUEST.with(format!("header {name}: {e}")))?;
        builder = builder.header(name, value);
    }

    let mut request = builder
        .body(Body::from(body))
        .map_err(|e| BAD_REQUEST.with(format!("uri {uri:?}: {e}")))?;
    let _ = request.extensions_mut().insert(ctx);
    Ok(request)
}

/// Collect the router's response into an [`ApiResponse`].
///
/// Bodies that are not UTF-8 are base64-encoded.
pub async fn from_http_response(resp: Response) -> Result<ApiResponse, StructuredError> {
    let (parts, body) = resp.into_parts();

    let mut out = ApiResponse {
        status_code: parts.status.as_u16(),
        ..ApiResponse::default()
    };
    for (name, value) in &parts.headers {
        let Ok(value) = value.to_str() else { continue };
        let _ = out
            .header
            .entry(name.as_str().to_owned())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_owned());
    }

    let bytes = to_bytes(body, MAX_RESPONSE_BYTES)
        .await
        .map_err(|e| INTERNAL.with(format!("reading response body: {e}")))?;
    match String::from_utf8(bytes.to_vec()) {
        Ok(text) => out.body = text,
        Err(_) => {
            out.body = STANDARD.encode(&bytes);
            out.is_base64_encoded = true;
        }
    }
    Ok(out)
}

impl<S: Send + Sync> FromRequestParts<S> for TaskContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TaskContext>()
            .cloned()
            .ok_or_else(|| ApiError(TaskError::Application(API_EXEC.with("no task context on request"))))
    }
}

/// Error type for API handlers.
///
/// A suspend becomes `202 Accepted` with an empty body; everything else is
/// a `500` carrying the structured error.
#[derive(Debug)]
pub struct ApiError(pub TaskError);

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        Self(err)
    }
}

impl From<Suspended> for ApiError {
    fn from(_: Suspended) -> Self {
        Self(TaskError::Suspend)
    }
}

impl From<StructuredError> for ApiError {
    fn from(err: StructuredError) -> Self {
        Self(TaskError::Application(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0.to_structured() {
            None => StatusCode::ACCEPTED.into_response(),
            Some(error) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorEvent { error })).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::test_support::context;
    use axum::Router;
    use axum::routing::{get, post};
    use replay_client::MockOrchestrator;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn request(method: &str, path: &str) -> ApiRequest {
        ApiRequest {
            method: method.into(),
            path: path.into(),
            ..ApiRequest::default()
        }
    }

    #[tokio::test]
    async fn builds_method_uri_headers_and_body() {
        let mock = Arc::new(MockOrchestrator::new());
        let mut req = request("post", "orders");
        let _ = req.query.insert("q".into(), "a b&c".into());
        let _ = req.header.insert("x-tenant".into(), "acme".into());
        req.body = STANDARD.encode(b"{\"n\":1}");
        req.is_base64_encoded = true;

        let http = to_http_request(req, context(&mock)).unwrap();
        assert_eq!(http.method(), Method::POST);
        assert_eq!(http.uri().path(), "/orders");
        assert_eq!(http.uri().query(), Some("q=a%20b%26c"));
        assert_eq!(http.headers()["x-tenant"], "acme");
        assert!(http.extensions().get::<TaskContext>().is_some());

        let body = to_bytes(http.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"{\"n\":1}");
    }

    #[test]
    fn bad_header_is_bad_request() {
        let mock = Arc::new(MockOrchestrator::new());
        let mut req = request("GET", "/");
        let _ = req.header.insert("bad header".into(), "x".into());
        let err = to_http_request(req, context(&mock)).unwrap_err();
        assert!(BAD_REQUEST.is(&err));
    }

    #[test]
    fn bad_base64_is_bad_request() {
        let mock = Arc::new(MockOrchestrator::new());
        let mut req = request("POST", "/");
        req.body = "***".into();
        req.is_base64_encoded = true;
        assert!(BAD_REQUEST.is(&to_http_request(req, context(&mock)).unwrap_err()));
    }

    #[tokio::test]
    async fn binary_body_is_base64() {
        let resp = (StatusCode::CREATED, vec![0xff_u8, 0xfe]).into_response();
        let out = from_http_response(resp).await.unwrap();
        assert_eq!(out.status_code, 201);
        assert!(out.is_base64_encoded);
        assert_eq!(STANDARD.decode(&out.body).unwrap(), [0xff, 0xfe]);
    }

    #[tokio::test]
    async fn extractor_sees_session() {
        async fn whoami(ctx: TaskContext) -> String {
            ctx.session_id().to_string()
        }
        let mock = Arc::new(MockOrchestrator::new());
        let router: Router = Router::new().route("/whoami", get(whoami));
        let http = to_http_request(request("", "/whoami"), context(&mock)).unwrap();
        let out = from_http_response(router.oneshot(http).await.unwrap()).await.unwrap();
        assert_eq!(out.body, "s-test");
    }

    #[tokio::test]
    async fn missing_context_is_500() {
        async fn needs_ctx(_ctx: TaskContext) -> &'static str {
            "unreachable"
        }
        let router: Router = Router::new().route("/", post(needs_ctx));
        let http = Request::post("/").body(Body::empty()).unwrap();
        let resp = router.oneshot(http).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn api_error_statuses() {
        let suspended = ApiError::from(Suspended).into_response();
        assert_eq!(suspended.status(), StatusCode::ACCEPTED);

        let failed = ApiError::from(API_EXEC.with("boom")).into_response();
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let out = from_http_response(failed).await.unwrap();
        let body: Value = serde_json::from_str(&out.body).unwrap();
        assert_eq!(body["error"]["code"], json!(4));
        assert_eq!(out.header["content-type"], "application/json");
    }
}
