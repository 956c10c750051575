use crate::config::{ApiCredential, ProxyConfig};
use crate::error::{ProxyError, Result};
use crate::logging::{LogLevel, SharedLogger};
use crate::proxy::{self, ProxyResult, Upstream};
use crate::translate::body::InboundBody;
use crate::translate::chat_types::{ChatRequest, ErrorBody};
use crate::translate::{adapter_for, ChatAdapter};

use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ALLOW, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, post};
use axum::{Json, Router};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const ALLOWED_METHODS: &str = "POST, OPTIONS";

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub credential: ApiCredential,
    pub base_url: String,
    pub adapter: Arc<dyn ChatAdapter>,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
}

impl AppState {
    /// Fails only when the provider cannot be resolved to a base URL.
    pub fn new(
        config: ProxyConfig,
        credential: ApiCredential,
        client: reqwest::Client,
        logger: SharedLogger,
    ) -> Result<Self> {
        let base_url = config.effective_base_url()?;
        let adapter = adapter_for(config.api_format());
        Ok(Self {
            config,
            credential,
            base_url,
            adapter,
            client,
            logger,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub ok: bool,
    pub has_key: bool,
    pub time: String,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route(
            "/chat",
            post(handle_chat)
                .options(handle_preflight)
                .fallback(handle_method_not_allowed),
        )
        .route("/health", any(handle_health));

    with_middleware(routes, state.config.max_body_bytes).with_state(state)
}

/// Body limit, panic recovery, CORS headers and request tracing, applied to every route.
fn with_middleware<S>(router: Router<S>, max_body_bytes: usize) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(TraceLayer::new_for_http())
}

async fn handle_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    let request_id = Uuid::new_v4();

    let body = match body {
        Ok(body) => body,
        Err(rejection) => return body_rejection_response(&state, request_id, &rejection),
    };

    match run_chat(&state, request_id, &headers, &body).await {
        Ok(ProxyResult::Success(resp)) => Json(resp).into_response(),
        Ok(ProxyResult::Error(err, status_code)) => {
            let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(err)).into_response()
        }
        Err(e) => error_response(&state, request_id, &e),
    }
}

/// Credential check, body normalization, validation, then the upstream call.
async fn run_chat(
    state: &AppState,
    request_id: Uuid,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<ProxyResult> {
    let api_key = state.credential.require()?;

    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let value = InboundBody::from_bytes(content_type, body).resolve();
    let request = ChatRequest::from_value(value, state.adapter.messages_rule())?;
    let chat = request.resolve(&state.config.defaults, &state.config.default_model());

    state.logger.request(
        request_id,
        LogLevel::Info,
        "server",
        "Chat request",
        json!({
            "provider": state.adapter.name(),
            "model": chat.model,
            "turns": chat.messages.len(),
            "system": chat.system.is_some(),
        }),
    );

    let upstream = Upstream {
        adapter: state.adapter.as_ref(),
        client: &state.client,
        base_url: &state.base_url,
        api_key,
    };

    proxy::proxy_chat(request_id, &chat, &upstream, &state.logger).await
}

fn error_response(state: &AppState, request_id: Uuid, err: &ProxyError) -> Response {
    match err {
        ProxyError::InvalidRequest { .. } => {
            tracing::warn!(%request_id, "Rejected request: {}", err);
            (StatusCode::BAD_REQUEST, Json(ErrorBody::new(err.to_string()))).into_response()
        }
        ProxyError::MissingApiKey { .. } => {
            tracing::error!(%request_id, "{}", err);
            state.logger.request(
                request_id,
                LogLevel::Error,
                "server",
                err.to_string(),
                json!({ "env_var": state.credential.env_var }),
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(err.to_string())),
            )
                .into_response()
        }
        _ => {
            tracing::error!(%request_id, "Server error: {}", err);
            state.logger.request(
                request_id,
                LogLevel::Error,
                "server",
                "Server error",
                json!({ "details": err.to_string() }),
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::server(err.to_string())),
            )
                .into_response()
        }
    }
}

/// Unreadable or oversized bodies get the JSON envelope instead of axum's plain text.
fn body_rejection_response(
    state: &AppState,
    request_id: Uuid,
    rejection: &BytesRejection,
) -> Response {
    let status = rejection.status();
    let details = rejection.body_text();

    tracing::warn!(%request_id, status = status.as_u16(), "Rejected body: {}", details);
    state.logger.request(
        request_id,
        LogLevel::Warn,
        "server",
        "Rejected body",
        json!({ "status": status.as_u16(), "details": details }),
    );

    let error = status.canonical_reason().unwrap_or("Invalid request body");
    (status, Json(ErrorBody::new(error).with_details(details))).into_response()
}

async fn handle_preflight() -> StatusCode {
    StatusCode::OK
}

async fn handle_method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(ALLOW, ALLOWED_METHODS)],
        Json(ErrorBody::method_not_allowed()),
    )
        .into_response()
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(HealthReport {
        ok: true,
        has_key: state.credential.is_present(),
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "handler panicked".to_string()
    };

    tracing::error!("Handler panicked: {}", details);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::server(details)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_method_not_allowed_response() {
        let resp = handle_method_not_allowed().await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers().get(ALLOW).unwrap(), "POST, OPTIONS");

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"error": "Method Not Allowed"}));
    }

    #[tokio::test]
    async fn test_panic_becomes_server_error() {
        let resp = handle_panic(Box::new("boom"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"error": "Server error", "details": "boom"}));
    }

    async fn explode() -> &'static str {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_middleware_catches_panics() {
        let app = with_middleware(Router::new().route("/boom", post(explode)), 1024);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let resp = client
            .post(format!("http://{addr}/boom"))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 500);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        assert_eq!(resp.headers()["access-control-allow-methods"], "POST, OPTIONS");
        let value: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(value, json!({"error": "Server error", "details": "boom"}));
    }

    #[test]
    fn test_app_state_rejects_unresolvable_provider() {
        let dir = tempfile::tempdir().unwrap();
        let logger = SharedLogger::new(dir.path().join("j.log")).unwrap();
        let mut config = ProxyConfig::default();
        config.provider.name = "nowhere".to_string();

        let result = AppState::new(
            config,
            ApiCredential::new("OPENAI_API_KEY", None),
            reqwest::Client::new(),
            logger,
        );
        assert!(matches!(result, Err(ProxyError::Config { .. })));
    }
}
