//! HTTP API gateway for VaultGate.
//!
//! Every route except the health checks requires a bearer token. A verified
//! caller can ask questions over a vault or a team server's documents, or
//! preview the context that would be sent to the language model.
//!
//! Built on Axum.

pub mod api;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::{
    Router,
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use vaultgate_auth::{AuditLogger, TokenVerifier, bearer_token, resolve_authority_url, verifier_from_config};
use vaultgate_config::AppConfig;
use vaultgate_context::ContextBuilder;
use vaultgate_core::auth::Claims;
use vaultgate_core::provider::Provider;
use vaultgate_documents::RestDocumentStore;
use vaultgate_providers::OpenAiCompatProvider;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub verifier: Arc<TokenVerifier>,
    pub builder: Arc<ContextBuilder>,
    /// `None` when no language-model key is configured; chat routes then fail
    /// with a configuration error while context previews keep working.
    pub provider: Option<Arc<dyn Provider>>,
}

pub type SharedState = Arc<GatewayState>;

/// The verified caller, inserted into request extensions by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    /// The raw bearer token, forwarded to the document store.
    pub token: String,
}

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - Bearer token verification on every non-health route
/// - Request body size limit (`gateway.body_limit_bytes`)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(api::me_handler))
        .route("/vaults/{vault_id}/chat", post(api::vault_chat_handler))
        .route("/vaults/{vault_id}/context", post(api::vault_context_handler))
        .route("/servers/{server_id}/chat", post(api::server_chat_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/health", get(health_handler))
        .merge(protected)
        .layer(DefaultBodyLimit::max(state.config.gateway.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire the verifier, document store, and language model from `config`.
pub fn build_state(config: AppConfig) -> Result<SharedState, Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let audit = Arc::new(AuditLogger::tracing());
    let verifier = verifier_from_config(&config.authority, client.clone(), audit)?;

    let store_url = match config.store.url.clone().filter(|u| !u.trim().is_empty()) {
        Some(url) => url,
        None => resolve_authority_url(&config.authority)?,
    };
    let store = RestDocumentStore::from_config(
        store_url,
        config.authority.public_api_key.clone(),
        &config.store,
        client.clone(),
    );
    let builder = ContextBuilder::new(Arc::new(store)).with_concurrency(config.store.fetch_concurrency);

    let provider: Option<Arc<dyn Provider>> = match OpenAiCompatProvider::from_config(&config.llm, client) {
        Ok(provider) => Some(Arc::new(provider)),
        Err(e) => {
            warn!(error = %e, "Language model not configured; chat routes will fail");
            None
        }
    };

    Ok(Arc::new(GatewayState {
        config,
        verifier: Arc::new(verifier),
        builder: Arc::new(builder),
        provider,
    }))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = build_state(config)?;
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Middleware ---

/// Verify the `Authorization: Bearer` header and attach an [`AuthContext`].
async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Result<Response, api::ApiError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let claims = state.verifier.verify_bearer_header(&header).await.map_err(|e| {
        warn!(path = %req.uri().path(), error = %e, "Request rejected");
        api::core_error(&e)
    })?;

    let token = bearer_token(&header).unwrap_or_default().to_string();
    req.extensions_mut().insert(AuthContext { claims, token });
    Ok(next.run(req).await)
}

// --- Handlers ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    use vaultgate_auth::KeySetCache;
    use vaultgate_core::auth::{Introspector, KeySet, KeySource};
    use vaultgate_core::document::{Collection, DocumentRecord, DocumentStore, StoredObject};
    use vaultgate_core::error::{AuthError, KeySetError, ProviderError, UnavailableError, UpstreamError};
    use vaultgate_core::message::{Message, Role};
    use vaultgate_core::provider::{ProviderRequest, ProviderResponse};

    // Header `{"alg":"HS256","typ":"JWT"}`; no published key matches, so these
    // go through introspection.
    const GOOD_TOKEN: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyJzdWIiOiJ1c2VyLTEifQ.good";
    const BAD_TOKEN: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyJzdWIiOiJ1c2VyLTEifQ.bad";

    // ── Mocks ───────────────────────────────────────────────────

    struct Keys {
        available: bool,
    }

    #[async_trait]
    impl KeySource for Keys {
        async fn fetch_key_set(&self) -> Result<KeySet, KeySetError> {
            if self.available {
                Ok(KeySet::default())
            } else {
                Err(UnavailableError {
                    url: "https://auth.test/jwks".into(),
                    status: Some(503),
                    reason: "Service Unavailable".into(),
                }
                .into())
            }
        }
    }

    struct Users;

    #[async_trait]
    impl Introspector for Users {
        async fn introspect(&self, token: &str) -> Result<Claims, AuthError> {
            if token.ends_with(".good") {
                Ok(Claims::new("user-1", Some("user@example.com".into())))
            } else {
                Err(AuthError::IntrospectionRejected {
                    status: 401,
                    reason: "Unauthorized".into(),
                })
            }
        }
    }

    #[derive(Default)]
    struct Store {
        bearers: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DocumentStore for Store {
        async fn list(
            &self,
            collection: &Collection,
            scope: &str,
            _limit: usize,
            bearer: &str,
        ) -> Result<Vec<DocumentRecord>, UpstreamError> {
            self.bearers.lock().unwrap().push(bearer.to_string());
            if scope == "broken" {
                return Err(UpstreamError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            if scope == "empty" {
                return Ok(Vec::new());
            }
            Ok(vec![DocumentRecord {
                id: Some(format!("{}-1", collection.name)),
                name: Some("notes.txt".into()),
                storage_path: Some(format!("{scope}/notes.txt")),
                declared_mime: Some("text/plain".into()),
                cached_text: Some("the launch is on friday".into()),
                ..Default::default()
            }])
        }

        async fn fetch_bytes(
            &self,
            _bucket: &str,
            _path: &str,
            _bearer: &str,
        ) -> Result<Option<StoredObject>, UpstreamError> {
            Ok(Some(StoredObject {
                bytes: b"server file body".to_vec(),
                content_type: Some("text/plain".into()),
            }))
        }

        async fn store_cached_text(
            &self,
            _collection: &Collection,
            _document_id: &str,
            _text: &str,
            _bearer: &str,
        ) -> Result<(), UpstreamError> {
            Ok(())
        }

        async fn channel_server_id(&self, channel_id: &str, _bearer: &str) -> Result<Option<String>, UpstreamError> {
            match channel_id {
                "chan-1" => Ok(Some("srv-1".into())),
                "chan-empty" => Ok(Some("empty".into())),
                "chan-denied" => Err(UpstreamError::Status {
                    status: 403,
                    body: "denied".into(),
                }),
                _ => Ok(None),
            }
        }
    }

    struct Model {
        fail: bool,
        seen: Mutex<Vec<ProviderRequest>>,
    }

    impl Model {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> ProviderRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Provider for Model {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.seen.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "model down".into(),
                });
            }
            Ok(ProviderResponse {
                message: Message::assistant("  It is on Friday.\n"),
                usage: None,
                model: request.model,
            })
        }
    }

    fn state_with(keys_available: bool, provider: Option<Arc<dyn Provider>>, store: Arc<Store>) -> SharedState {
        let cache = Arc::new(KeySetCache::new(
            Arc::new(Keys {
                available: keys_available,
            }),
            Duration::from_secs(300),
        ));
        Arc::new(GatewayState {
            config: AppConfig::default(),
            verifier: Arc::new(TokenVerifier::new(cache, Arc::new(Users))),
            builder: Arc::new(ContextBuilder::new(store)),
            provider,
        })
    }

    fn test_state(model: Arc<Model>) -> SharedState {
        state_with(true, Some(model as Arc<dyn Provider>), Arc::new(Store::default()))
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(state: SharedState, req: axum::http::Request<Body>) -> (StatusCode, Value) {
        let resp = build_router(state).oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    // ── Health and identity ─────────────────────────────────────

    #[tokio::test]
    async fn health_endpoint_needs_no_token() {
        let req = axum::http::Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(test_state(Model::new(false)), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn me_returns_verified_identity() {
        let req = axum::http::Request::builder()
            .uri("/auth/me")
            .header("Authorization", format!("Bearer {GOOD_TOKEN}"))
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(test_state(Model::new(false)), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sub"], "user-1");
        assert_eq!(json["email"], "user@example.com");
    }

    #[tokio::test]
    async fn missing_or_rejected_token_is_unauthorized() {
        let req = axum::http::Request::builder()
            .uri("/auth/me")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(test_state(Model::new(false)), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(json["error"].as_str().unwrap().contains("Missing bearer token"));

        let req = post_json("/vaults/v1/chat", Some(BAD_TOKEN), json!({"message": "hi"}));
        let (status, _) = send(test_state(Model::new(false)), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let req = post_json("/vaults/v1/chat", Some("not-a-jwt"), json!({"message": "hi"}));
        let (status, _) = send(test_state(Model::new(false)), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn key_authority_outage_is_bad_gateway() {
        let state = state_with(false, None, Arc::new(Store::default()));
        let req = post_json("/vaults/v1/context", Some(GOOD_TOKEN), json!({}));
        let (status, _) = send(state, req).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    // ── Vault routes ────────────────────────────────────────────

    #[tokio::test]
    async fn vault_chat_answers_from_context() {
        let model = Model::new(false);
        let store = Arc::new(Store::default());
        let state = state_with(true, Some(model.clone() as Arc<dyn Provider>), store.clone());

        let req = post_json("/vaults/v1/chat", Some(GOOD_TOKEN), json!({"message": "  When is launch? "}));
        let (status, json) = send(state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["answer"], "It is on Friday.");
        assert_eq!(json["included_files"], json!(["notes.txt"]));
        assert!(json["used_chars"].as_u64().unwrap() > 0);

        let request = model.last();
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.max_tokens, None);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].role, Role::User);
        assert!(request.messages[1].content.starts_with("User question:\nWhen is launch?\n\n"));
        assert!(request.messages[1].content.contains("===== FILE: notes.txt =====\nthe launch is on friday"));

        assert_eq!(store.bearers.lock().unwrap().as_slice(), [GOOD_TOKEN.to_string()]);
    }

    #[tokio::test]
    async fn vault_chat_uses_requested_model() {
        let model = Model::new(false);
        let req = post_json(
            "/vaults/v1/chat",
            Some(GOOD_TOKEN),
            json!({"message": "hi", "model": "gpt-4o", "include_filenames": false}),
        );
        let (status, _) = send(test_state(model.clone()), req).await;
        assert_eq!(status, StatusCode::OK);
        let request = model.last();
        assert_eq!(request.model, "gpt-4o");
        assert!(!request.messages[1].content.contains("===== FILE"));
    }

    #[tokio::test]
    async fn vault_chat_rejects_bad_bodies() {
        let cases = [
            json!({"message": "   "}),
            json!({"message": "hi", "max_chars": 0}),
            json!({"text": "wrong field"}),
        ];
        for body in cases {
            let model = Model::new(false);
            let req = post_json("/vaults/v1/chat", Some(GOOD_TOKEN), body.clone());
            let (status, _) = send(test_state(model.clone()), req).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
            assert!(model.seen.lock().unwrap().is_empty());
        }

        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/vaults/v1/chat")
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {GOOD_TOKEN}"))
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _) = send(test_state(Model::new(false)), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn listing_failure_is_failed_dependency() {
        let req = post_json("/vaults/broken/chat", Some(GOOD_TOKEN), json!({"message": "hi"}));
        let (status, json) = send(test_state(Model::new(false)), req).await;
        assert_eq!(status, StatusCode::FAILED_DEPENDENCY);
        assert!(json["error"].as_str().unwrap().starts_with("Failed to list files"));
    }

    #[tokio::test]
    async fn model_failure_is_bad_gateway() {
        let req = post_json("/vaults/v1/chat", Some(GOOD_TOKEN), json!({"message": "hi"}));
        let (status, _) = send(test_state(Model::new(true)), req).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn chat_without_model_is_server_error() {
        let state = state_with(true, None, Arc::new(Store::default()));
        let req = post_json("/vaults/v1/chat", Some(GOOD_TOKEN), json!({"message": "hi"}));
        let (status, _) = send(state, req).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn context_preview_skips_the_model() {
        let model = Model::new(false);
        let req = post_json("/vaults/v1/context", Some(GOOD_TOKEN), json!({"max_chars": 40}));
        let (status, json) = send(test_state(model.clone()), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["used_chars"], 40);
        assert_eq!(json["included_files"], json!(["notes.txt (truncated)"]));
        assert_eq!(json["context"], "===== FILE: notes.txt =====\nthe launch");
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn context_preview_of_empty_vault() {
        let req = post_json("/vaults/empty/context", Some(GOOD_TOKEN), json!({}));
        let (status, json) = send(test_state(Model::new(false)), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["context"], "");
        assert_eq!(json["used_chars"], 0);
        assert_eq!(json["included_files"], json!([]));
    }

    // ── Server route ────────────────────────────────────────────

    #[tokio::test]
    async fn server_chat_checks_channel_and_strips_mentions() {
        let model = Model::new(false);
        let req = post_json(
            "/servers/srv-1/chat",
            Some(GOOD_TOKEN),
            json!({"message": "@Claude what's in the files?", "channel_id": "chan-1"}),
        );
        let (status, json) = send(test_state(model.clone()), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["answer"], "It is on Friday.");

        let request = model.last();
        assert_eq!(request.max_tokens, Some(1000));
        assert_eq!(
            request.messages[1].content,
            "Question: what's in the files?\n\nContext from server files:\n===== FILE: notes.txt =====\nserver file body"
        );
    }

    #[tokio::test]
    async fn server_chat_rejects_foreign_channels() {
        for (channel, message) in [("chan-2", "Channel not in server"), ("chan-denied", "Cannot access channel")] {
            let model = Model::new(false);
            let req = post_json(
                "/servers/srv-1/chat",
                Some(GOOD_TOKEN),
                json!({"message": "hi", "channel_id": channel}),
            );
            let (status, json) = send(test_state(model.clone()), req).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(json["error"], message);
            assert!(model.seen.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn server_chat_with_no_files_sends_bare_question() {
        let model = Model::new(false);
        let req = post_json(
            "/servers/empty/chat",
            Some(GOOD_TOKEN),
            json!({"message": "hello @claude", "channel_id": "chan-empty"}),
        );
        let (status, json) = send(test_state(model.clone()), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["included_files"], json!([]));
        assert_eq!(model.last().messages[1].content, "Question: hello");
    }

    #[tokio::test]
    async fn channel_must_belong_to_routed_server() {
        let model = Model::new(false);
        let req = post_json(
            "/servers/empty/chat",
            Some(GOOD_TOKEN),
            json!({"message": "hello", "channel_id": "chan-1"}),
        );
        let (status, _) = send(test_state(model.clone()), req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found_without_auth() {
        let req = axum::http::Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(test_state(Model::new(false)), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
