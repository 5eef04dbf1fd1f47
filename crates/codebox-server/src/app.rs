//! HTTP routes
//!
//! Every sandbox route answers with the `{code, message, data}` envelope.
//! Only admission rejection and authentication failures change the HTTP
//! status; everything else is reported through the envelope code.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use codebox::service::{
    HealthResponse, ListDependenciesQuery, RunRequest, UpdateDependenciesRequest,
};
use codebox::{ApiResponse, SandboxService, ServiceError};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::auth::require_api_key;

/// Envelope code for a body or query string that does not parse
const BAD_REQUEST_CODE: i32 = -400;

#[derive(Debug, Clone)]
pub struct AppState {
    service: SandboxService,
    api_key: Arc<str>,
}

impl AppState {
    pub fn new(service: SandboxService, api_key: &str) -> Self {
        Self {
            service,
            api_key: Arc::from(api_key),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

/// A service error rendered as an envelope
pub struct ApiError(ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_overloaded() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        };
        (status, Json(ApiResponse::<()>::from(&self.0))).into_response()
    }
}

fn respond<T: Serialize>(result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(data) => Json(ApiResponse::success(data)).into_response(),
        Err(err) => {
            debug!(code = err.code(), error = %err, "request failed");
            ApiError(err).into_response()
        }
    }
}

fn malformed(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse::<()>::error(BAD_REQUEST_CODE, message))).into_response()
}

pub fn router(state: AppState) -> Router {
    let sandbox = Router::new()
        .route("/run", post(run_code))
        .route("/dependencies", get(list_dependencies))
        .route("/dependencies/update", post(update_dependencies))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .nest("/v1/sandbox", sandbox)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

async fn run_code(
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => respond(state.service.run(request).await),
        Err(rejection) => malformed(rejection.status(), rejection.body_text()),
    }
}

async fn list_dependencies(
    State(state): State<AppState>,
    query: Result<Query<ListDependenciesQuery>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(query)) => respond(state.service.list_dependencies(&query.language).await),
        Err(rejection) => malformed(rejection.status(), rejection.body_text()),
    }
}

async fn update_dependencies(
    State(state): State<AppState>,
    payload: Result<Json<UpdateDependenciesRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => respond(state.service.update_dependencies(request).await),
        Err(rejection) => malformed(rejection.status(), rejection.body_text()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use codebox::runner::ExecuteError;
    use codebox::sandbox::{IsolationLibrary, SandboxRoot};
    use codebox::{
        CodeExecutor, ConcurrencyGate, Config, DependencyManager, ExecutionResult, Executors,
        Language, RunnerOptions,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    const KEY: &str = "test-key";

    struct EchoExecutor {
        delay: Duration,
    }

    #[async_trait]
    impl CodeExecutor for EchoExecutor {
        fn language(&self) -> Language {
            Language::Python3
        }

        async fn run(
            &self,
            code: &str,
            _options: RunnerOptions,
            _preload: &str,
            _timeout: Option<Duration>,
        ) -> Result<ExecutionResult, ExecuteError> {
            let source = codebox::runner::decode_code(code)?;
            tokio::time::sleep(self.delay).await;
            Ok(ExecutionResult {
                stdout: String::from_utf8_lossy(&source).into_owned(),
                stderr: String::new(),
                exit_code: 0,
                timed_out: false,
            })
        }
    }

    fn state(config: Config, delay: Duration) -> AppState {
        let config = Arc::new(config);
        let library = IsolationLibrary::from_bytes("lib.so", b"lib".to_vec());
        let python = Arc::new(SandboxRoot::new(Language::Python3, "/nonexistent/py", library.clone()));
        let nodejs = Arc::new(SandboxRoot::new(Language::Nodejs, "/nonexistent/js", library));
        let deps = Arc::new(DependencyManager::new(config.clone(), python, nodejs));
        let gate = ConcurrencyGate::new(config.max_workers, config.max_requests);
        let executors = Executors::new().register(Arc::new(EchoExecutor { delay }));
        AppState::new(SandboxService::new(config, executors, deps, gate), KEY)
    }

    fn app() -> Router {
        router(state(Config::default(), Duration::ZERO))
    }

    fn run_request(body: Value, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/v1/sandbox/run")
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("X-Api-Key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_key() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn missing_or_wrong_key_rejected() {
        let body = json!({"language": "python3", "code": "aGk="});
        for key in [None, Some("wrong")] {
            let response = app().oneshot(run_request(body.clone(), key)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let body = body_json(response).await;
            assert_eq!(body["code"], -401);
            assert_eq!(body["message"], "Invalid API key");
        }
    }

    #[tokio::test]
    async fn run_returns_output_envelope() {
        let response = app()
            .oneshot(run_request(
                json!({"language": "python3", "code": "aGkK", "options": {"enable_network": false}}),
                Some(KEY),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"code": 0, "message": "success", "data": {"stdout": "hi\n", "stderr": ""}})
        );
    }

    #[tokio::test]
    async fn unsupported_language_on_every_route() {
        let response = app()
            .oneshot(run_request(json!({"language": "ruby", "code": "aGk="}), Some(KEY)))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["code"], -400);

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/v1/sandbox/dependencies?language=ruby")
                    .header("X-Api-Key", KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["code"], -400);
        assert_eq!(body["message"], "unsupported language");

        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/sandbox/dependencies/update")
                    .header("X-Api-Key", KEY)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"language":"ruby"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(response).await["code"], -400);
    }

    #[tokio::test]
    async fn malformed_body_gets_envelope() {
        let response = app()
            .oneshot(run_request(json!({"language": "python3"}), Some(KEY)))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        let body = body_json(response).await;
        assert_eq!(body["code"], -400);
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn overload_is_http_503() {
        let config = Config {
            max_workers: 1,
            max_requests: 1,
            ..Config::default()
        };
        let state = state(config, Duration::from_millis(300));
        let gate = state.service.gate().clone();
        let app = router(state);

        let body = json!({"language": "python3", "code": "aGk="});
        let first = tokio::spawn(app.clone().oneshot(run_request(body.clone(), Some(KEY))));
        while gate.in_flight() < 1 {
            tokio::task::yield_now().await;
        }

        let response = app.oneshot(run_request(body, Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["code"], -503);
        assert_eq!(body["message"], "Too many requests");

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.status(), StatusCode::OK);
    }
}
