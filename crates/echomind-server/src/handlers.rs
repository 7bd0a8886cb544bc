//! HTTP handlers. Each one authenticates, delegates to the orchestrator and
//! maps the outcome onto a JSON body.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use echomind_core::ConversationId;
use echomind_engine::ChatRequest;
use echomind_store::UsageRecord;

use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::health::{self, HealthResponse};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    pub conversation_id: ConversationId,
}

#[derive(Debug, Serialize)]
pub struct ModelsReply {
    pub models: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UsageReply {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

impl From<UsageRecord> for UsageReply {
    fn from(record: UsageRecord) -> Self {
        Self {
            used: record.used,
            limit: record.limit,
            remaining: record.remaining(),
        }
    }
}

/// POST /chat
pub async fn chat(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(body) = body?;
    let request = ChatRequest {
        message: body.message,
        conversation_id: body.conversation_id,
        model: body.model,
    };

    match state.orchestrator.handle(&principal, request).await {
        Ok(outcome) => Ok(Json(ChatReply {
            reply: outcome.reply,
            conversation_id: outcome.conversation_id,
        })),
        Err(failure) => Err(ApiError::chat(failure.error, failure.conversation_id)),
    }
}

/// GET /models
pub async fn models(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<ModelsReply>, ApiError> {
    let models = state.orchestrator.list_models(&principal).await?;
    Ok(Json(ModelsReply { models }))
}

/// GET /usage
pub async fn usage(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<UsageReply>, ApiError> {
    let record = state.orchestrator.usage(&principal)?;
    Ok(Json(record.into()))
}

/// POST /users: 201 when the profile is new, 200 when it already existed.
pub async fn provision(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<(StatusCode, Json<UsageReply>), ApiError> {
    let (record, created) = state.orchestrator.provision(&principal)?;
    let status = if created {
        info!(principal = %principal, "profile created");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(record.into())))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, &state.environment))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use echomind_core::{GatewayError, Principal};
    use echomind_engine::{
        ChatDeps, ChatOrchestrator, OrchestratorConfig, PromptAssembler, QuotaLedger, RateLimiter,
    };
    use echomind_llm::{MockGenerationClient, MockReply, ModelCatalog};
    use echomind_safety::{SafetyClassifier, CRISIS_RESPONSE_TEXT};
    use echomind_store::{
        MemoryConversationStore, MemoryQuotaStore, MemoryRateLimitStore, QuotaStore, UsageRecord,
    };

    use crate::auth::StaticTokenVerifier;
    use crate::config::ServerConfig;
    use crate::server::{build_router, AppState};

    const TOKEN: &str = "tok-alice";

    struct TestApp {
        router: Router,
        quota: Arc<MemoryQuotaStore>,
        client: Arc<MockGenerationClient>,
    }

    fn app_with(replies: Vec<MockReply>, capacity: u32, max_body_bytes: usize) -> TestApp {
        let client = Arc::new(
            MockGenerationClient::new(replies)
                .with_models(vec!["allowed-model".into(), "other-model".into()]),
        );
        let quota = Arc::new(MemoryQuotaStore::new());
        let deps = ChatDeps {
            rate_limiter: RateLimiter::new(
                Arc::new(MemoryRateLimitStore::new()),
                Duration::from_secs(60),
                capacity,
            ),
            classifier: Arc::new(SafetyClassifier::new().unwrap()),
            ledger: QuotaLedger::new(quota.clone(), 25),
            assembler: PromptAssembler::default(),
            client: client.clone(),
            conversations: Arc::new(MemoryConversationStore::new()),
            catalog: ModelCatalog::new(vec!["allowed-model".into()]),
        };
        let orchestrator = Arc::new(ChatOrchestrator::new(deps, OrchestratorConfig::default()));
        let state = AppState::new(
            orchestrator,
            Arc::new(StaticTokenVerifier::new([(TOKEN, "alice")])),
            "test",
        );
        let config = ServerConfig {
            max_body_bytes,
            ..ServerConfig::default()
        };
        TestApp {
            router: build_router(state, &config),
            quota,
            client,
        }
    }

    fn app(replies: Vec<MockReply>) -> TestApp {
        app_with(replies, 10, 64 * 1024)
    }

    fn seed(app: &TestApp, used: u32, limit: u32) {
        app.quota.insert(UsageRecord {
            principal: Principal::from_raw("alice"),
            used,
            limit,
        });
    }

    fn chat_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn authed(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-api-key", TOKEN)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    #[tokio::test]
    async fn health_needs_no_credentials() {
        let app = app(vec![]);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, _, body) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["environment"], "test");
        assert!(body["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn chat_requires_credentials() {
        let app = app(vec![]);
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"message": "hi"}).to_string()))
            .unwrap();
        let (status, _, body) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthenticated");

        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::AUTHORIZATION, "Bearer wrong")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"message": "hi"}).to_string()))
            .unwrap();
        let (status, _, _) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn chat_returns_reply_and_conversation_id() {
        let app = app(vec![MockReply::text("Hello! How are you feeling?")]);
        seed(&app, 0, 25);

        let (status, _, body) = send(&app.router, chat_request(json!({"message": "Hi"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "Hello! How are you feeling?");
        assert!(body["conversationId"].as_str().unwrap().starts_with("conv_"));
        assert_eq!(app.quota.get(&Principal::from_raw("alice")).unwrap().unwrap().used, 1);
    }

    #[tokio::test]
    async fn supplied_conversation_id_is_echoed() {
        let app = app(vec![MockReply::text("ok")]);
        seed(&app, 0, 25);
        let (status, _, body) = send(
            &app.router,
            chat_request(json!({"message": "Hi", "conversationId": "conv_mine"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["conversationId"], "conv_mine");
    }

    #[tokio::test]
    async fn crisis_message_gets_safety_text() {
        let app = app(vec![]);
        seed(&app, 0, 25);

        let (status, _, body) = send(
            &app.router,
            chat_request(json!({"message": "I want to end my life"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], CRISIS_RESPONSE_TEXT);
        assert!(body["conversationId"].is_string());
        assert_eq!(app.quota.get(&Principal::from_raw("alice")).unwrap().unwrap().used, 0);
        assert_eq!(app.client.call_count(), 0);
    }

    #[tokio::test]
    async fn exhausted_quota_is_429() {
        let app = app(vec![MockReply::text("unused")]);
        seed(&app, 25, 25);

        let (status, headers, body) =
            send(&app.router, chat_request(json!({"message": "Hello"}))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "quota_exceeded");
        assert_eq!(body["message"], "You have reached your usage limit");
        assert!(body["conversationId"].is_string());
        assert!(headers.get(header::RETRY_AFTER).is_none());
        assert_eq!(app.client.call_count(), 0);
    }

    #[tokio::test]
    async fn rate_limited_is_429_with_retry_after() {
        let app = app_with(vec![MockReply::text("ok")], 1, 64 * 1024);
        seed(&app, 0, 25);

        let (status, _, _) = send(&app.router, chat_request(json!({"message": "one"}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, headers, body) =
            send(&app.router, chat_request(json!({"message": "two"}))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "rate_limited");
        let retry: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
        assert!((1..=60).contains(&retry));
    }

    #[tokio::test]
    async fn missing_profile_is_404() {
        let app = app(vec![MockReply::text("unused")]);
        let (status, _, body) = send(&app.router, chat_request(json!({"message": "Hello"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "profile_not_found");
        assert_eq!(body["message"], "User profile not found");
    }

    #[tokio::test]
    async fn upstream_failure_is_502_and_generic() {
        let app = app(vec![MockReply::Error(GatewayError::NetworkError(
            "connect ECONNREFUSED 10.1.2.3:8001".into(),
        ))]);
        seed(&app, 0, 25);

        let (status, _, body) = send(&app.router, chat_request(json!({"message": "Hello"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "upstream_failure");
        assert!(!body["message"].as_str().unwrap().contains("10.1.2.3"));
        assert!(body["conversationId"].is_string());
        assert_eq!(app.quota.get(&Principal::from_raw("alice")).unwrap().unwrap().used, 1);
    }

    #[tokio::test]
    async fn malformed_and_empty_bodies_are_400() {
        let app = app(vec![]);
        seed(&app, 0, 25);

        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _, body) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let (status, _, _) = send(&app.router, chat_request(json!({"conversationId": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, body) = send(&app.router, chat_request(json!({"message": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert!(body["conversationId"].is_string());
    }

    #[tokio::test]
    async fn disallowed_model_is_400() {
        let app = app(vec![]);
        seed(&app, 0, 25);
        let (status, _, body) = send(
            &app.router,
            chat_request(json!({"message": "Hello", "model": "other-model"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn crisis_message_with_disallowed_model_is_200() {
        let app = app(vec![]);
        seed(&app, 0, 25);
        let (status, _, body) = send(
            &app.router,
            chat_request(json!({
                "message": format!("I want to end my life {}", "x".repeat(5000)),
                "model": "other-model"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], CRISIS_RESPONSE_TEXT);
        assert_eq!(app.client.call_count(), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = app_with(vec![], 10, 256);
        seed(&app, 0, 25);
        let (status, _, _) = send(
            &app.router,
            chat_request(json!({"message": "x".repeat(1024)})),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn models_are_filtered() {
        let app = app(vec![]);
        let (status, _, body) = send(&app.router, authed("GET", "/models")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["models"], json!(["allowed-model"]));
    }

    #[tokio::test]
    async fn provision_then_usage() {
        let app = app(vec![]);

        let (status, _, body) = send(&app.router, authed("GET", "/usage")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "profile_not_found");

        let (status, _, body) = send(&app.router, authed("POST", "/users")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"used": 0, "limit": 25, "remaining": 25}));

        let (status, _, _) = send(&app.router, authed("POST", "/users")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, body) = send(&app.router, authed("GET", "/usage")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["remaining"], 25);
    }
}
