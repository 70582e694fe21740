//! Authenticated API handlers: identity, vault chat, vault context preview,
//! and server chat.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vaultgate_config::CollectionConfig;
use vaultgate_core::context::{AssemblyResult, ContextBudget};
use vaultgate_core::error::{Error, ProviderError, UpstreamError};
use vaultgate_core::message::Message;
use vaultgate_core::provider::ProviderRequest;

use crate::{AuthContext, SharedState};

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map a domain error to its HTTP status.
pub(crate) fn core_error(err: &Error) -> ApiError {
    let status = match err {
        Error::Auth(_) => StatusCode::UNAUTHORIZED,
        Error::Unavailable(_) => StatusCode::BAD_GATEWAY,
        Error::Upstream(_) => StatusCode::FAILED_DEPENDENCY,
        Error::Provider(ProviderError::NotConfigured(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Provider(_) => StatusCode::BAD_GATEWAY,
        Error::Config(_) | Error::Serialization(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

fn listing_error(err: UpstreamError) -> ApiError {
    warn!(error = %err, "Failed to list documents");
    error_response(StatusCode::FAILED_DEPENDENCY, format!("Failed to list files: {err}"))
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, rejection.body_text())
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VaultChatRequest {
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_chars: Option<usize>,
    #[serde(default)]
    pub include_filenames: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContextRequest {
    #[serde(default)]
    pub max_chars: Option<usize>,
    #[serde(default)]
    pub include_filenames: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ServerChatRequest {
    pub message: String,
    pub channel_id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_chars: Option<usize>,
    #[serde(default)]
    pub include_filenames: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub used_chars: usize,
    pub included_files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContextResponse {
    pub context: String,
    pub used_chars: usize,
    pub included_files: Vec<String>,
}

// ── Prompts ───────────────────────────────────────────────────────────────

pub fn vault_prompt(message: &str, context: &str) -> String {
    format!("User question:\n{message}\n\nContext from vault files (may be truncated):\n{context}\n")
}

pub fn server_prompt(message: &str, context: &str) -> String {
    let mut prompt = format!("Question: {message}");
    if !context.is_empty() {
        prompt.push_str("\n\nContext from server files:\n");
        prompt.push_str(context);
    }
    prompt
}

/// Remove `@name` mentions (ASCII case-insensitive) and surrounding whitespace.
pub fn strip_mentions(message: &str, name: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;

    while let Some(pos) = rest.find('@') {
        let after = &rest[pos + 1..];
        let mentioned = after
            .get(..name.len())
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name));
        if mentioned {
            out.push_str(&rest[..pos]);
            rest = &after[name.len()..];
        } else {
            out.push_str(&rest[..=pos]);
            rest = after;
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn budget_for(
    collection: &CollectionConfig,
    max_chars: Option<usize>,
    include_filenames: Option<bool>,
) -> Result<ContextBudget, ApiError> {
    ContextBudget::new(
        max_chars.unwrap_or(collection.default_max_chars),
        include_filenames.unwrap_or(true),
    )
    .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
}

async fn build_context(
    state: &SharedState,
    name: &str,
    collection: &CollectionConfig,
    scope: &str,
    budget: &ContextBudget,
    token: &str,
) -> Result<AssemblyResult, ApiError> {
    state
        .builder
        .build_context(&collection.to_collection(name), scope, budget, token)
        .await
        .map_err(listing_error)
}

async fn ask(
    state: &SharedState,
    collection: &CollectionConfig,
    model: Option<String>,
    prompt: String,
) -> Result<String, ApiError> {
    let provider = state
        .provider
        .as_ref()
        .ok_or_else(|| core_error(&Error::from(ProviderError::NotConfigured("llm.api_key is not set".into()))))?;

    let request = ProviderRequest {
        model: model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| state.config.llm.default_model.clone()),
        messages: vec![
            Message::system(collection.system_prompt.clone()),
            Message::user(prompt),
        ],
        temperature: state.config.llm.temperature,
        max_tokens: collection.max_answer_tokens,
    };

    let response = provider.complete(request).await.map_err(|e| {
        warn!(provider = %provider.name(), error = %e, "Language model call failed");
        core_error(&Error::from(e))
    })?;

    Ok(response.message.content.trim().to_string())
}

// ── Handlers ──────────────────────────────────────────────────────────────

pub async fn me_handler(Extension(auth): Extension<AuthContext>) -> Json<MeResponse> {
    Json(MeResponse {
        sub: auth.claims.subject,
        email: auth.claims.email,
    })
}

pub async fn vault_chat_handler(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthContext>,
    Path(vault_id): Path<String>,
    payload: Result<Json<VaultChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(payload) = payload.map_err(bad_body)?;
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "message is required"));
    }

    let collection = &state.config.collections.vault;
    let budget = budget_for(collection, payload.max_chars, payload.include_filenames)?;
    info!(vault = %vault_id, user = %auth.claims.subject, max_chars = budget.max_chars(), "Vault chat request");

    let result = build_context(&state, "vault", collection, &vault_id, &budget, &auth.token).await?;
    let answer = ask(&state, collection, payload.model, vault_prompt(message, &result.context)).await?;

    Ok(Json(ChatResponse {
        answer,
        used_chars: result.used_chars,
        included_files: result.included_labels(),
    }))
}

pub async fn vault_context_handler(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthContext>,
    Path(vault_id): Path<String>,
    payload: Result<Json<ContextRequest>, JsonRejection>,
) -> Result<Json<ContextResponse>, ApiError> {
    let Json(payload) = payload.map_err(bad_body)?;
    let collection = &state.config.collections.vault;
    let budget = budget_for(collection, payload.max_chars, payload.include_filenames)?;

    let result = build_context(&state, "vault", collection, &vault_id, &budget, &auth.token).await?;
    let included_files = result.included_labels();

    Ok(Json(ContextResponse {
        context: result.context,
        used_chars: result.used_chars,
        included_files,
    }))
}

pub async fn server_chat_handler(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthContext>,
    Path(server_id): Path<String>,
    payload: Result<Json<ServerChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(payload) = payload.map_err(bad_body)?;
    let message = strip_mentions(&payload.message, &state.config.gateway.assistant_name);
    if message.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "message is required"));
    }

    match state
        .builder
        .store()
        .channel_server_id(&payload.channel_id, &auth.token)
        .await
    {
        Ok(Some(owner)) if owner == server_id => {}
        Ok(_) => return Err(error_response(StatusCode::FORBIDDEN, "Channel not in server")),
        Err(e) => {
            warn!(channel = %payload.channel_id, error = %e, "Channel lookup failed");
            return Err(error_response(StatusCode::FORBIDDEN, "Cannot access channel"));
        }
    }

    let collection = &state.config.collections.server;
    let budget = budget_for(collection, payload.max_chars, payload.include_filenames)?;
    info!(server = %server_id, channel = %payload.channel_id, user = %auth.claims.subject, "Server chat request");

    let result = build_context(&state, "server", collection, &server_id, &budget, &auth.token).await?;
    let answer = ask(&state, collection, payload.model, server_prompt(&message, &result.context)).await?;

    Ok(Json(ChatResponse {
        answer,
        used_chars: result.used_chars,
        included_files: result.included_labels(),
    }))
}
