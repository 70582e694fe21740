//! Configuration loading, validation, and management for VaultGate.
//!
//! Loads configuration from `~/.vaultgate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use vaultgate_core::document::Collection;

/// The root configuration structure.
///
/// Maps directly to `~/.vaultgate/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Key-rotation authority (signing keys + introspection)
    #[serde(default)]
    pub authority: AuthorityConfig,

    /// Metadata and object store
    #[serde(default)]
    pub store: StoreConfig,

    /// Language-model collaborator
    #[serde(default)]
    pub llm: LlmConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Document collections answered by the chat routes
    #[serde(default)]
    pub collections: CollectionsConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Explicit authority base URL. When absent it is derived from `public_api_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Public (anonymous) API key sent as `apikey` on every authority/store call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_api_key: Option<String>,

    /// Template used when deriving the URL from the key's `ref` claim.
    #[serde(default = "default_derived_url_template")]
    pub derived_url_template: String,

    #[serde(default = "default_jwks_path")]
    pub jwks_path: String,

    #[serde(default = "default_introspection_path")]
    pub introspection_path: String,

    /// Key-set cache window in seconds.
    #[serde(default = "default_key_cache_ttl")]
    pub key_cache_ttl_secs: u64,

    /// Timeout for key-set and introspection calls.
    #[serde(default = "default_authority_timeout")]
    pub timeout_secs: u64,

    /// Fall back to introspection when no published key matches.
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,

    /// Algorithm assumed when a published key omits `alg`.
    #[serde(default = "default_algorithm")]
    pub default_algorithm: String,
}

fn default_derived_url_template() -> String {
    "https://{ref}.supabase.co".into()
}
fn default_jwks_path() -> String {
    "/auth/v1/.well-known/jwks.json".into()
}
fn default_introspection_path() -> String {
    "/auth/v1/user".into()
}
fn default_key_cache_ttl() -> u64 {
    300
}
fn default_authority_timeout() -> u64 {
    5
}
fn default_algorithm() -> String {
    "RS256".into()
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            url: None,
            public_api_key: None,
            derived_url_template: default_derived_url_template(),
            jwks_path: default_jwks_path(),
            introspection_path: default_introspection_path(),
            key_cache_ttl_secs: default_key_cache_ttl(),
            timeout_secs: default_authority_timeout(),
            fallback_enabled: true,
            default_algorithm: default_algorithm(),
        }
    }
}

impl std::fmt::Debug for AuthorityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityConfig")
            .field("url", &self.url)
            .field("public_api_key", &redact(&self.public_api_key))
            .field("derived_url_template", &self.derived_url_template)
            .field("jwks_path", &self.jwks_path)
            .field("introspection_path", &self.introspection_path)
            .field("key_cache_ttl_secs", &self.key_cache_ttl_secs)
            .field("timeout_secs", &self.timeout_secs)
            .field("fallback_enabled", &self.fallback_enabled)
            .field("default_algorithm", &self.default_algorithm)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store base URL. Defaults to the authority URL (same project).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_rest_path")]
    pub rest_path: String,

    #[serde(default = "default_object_path")]
    pub object_path: String,

    /// Timeout for listing and cache write-back calls.
    #[serde(default = "default_list_timeout")]
    pub list_timeout_secs: u64,

    /// Timeout for object downloads.
    #[serde(default = "default_object_timeout")]
    pub object_timeout_secs: u64,

    /// Documents fetched and extracted concurrently per request.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

fn default_rest_path() -> String {
    "/rest/v1".into()
}
fn default_object_path() -> String {
    "/storage/v1/object".into()
}
fn default_list_timeout() -> u64 {
    20
}
fn default_object_timeout() -> u64 {
    30
}
fn default_fetch_concurrency() -> usize {
    4
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            rest_path: default_rest_path(),
            object_path: default_object_path(),
            list_timeout_secs: default_list_timeout(),
            object_timeout_secs: default_object_timeout(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_llm_url(),
            default_model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Request body limit in bytes.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Name stripped from `@mentions` in server chat messages.
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_body_limit() -> usize {
    1024 * 1024
}
fn default_assistant_name() -> String {
    "Claude".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            body_limit_bytes: default_body_limit(),
            assistant_name: default_assistant_name(),
        }
    }
}

/// The two document collections the gateway answers questions about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionsConfig {
    #[serde(default = "CollectionConfig::vault")]
    pub vault: CollectionConfig,

    #[serde(default = "CollectionConfig::server")]
    pub server: CollectionConfig,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            vault: CollectionConfig::vault(),
            server: CollectionConfig::server(),
        }
    }
}

impl CollectionsConfig {
    /// Look up a collection by its route name.
    pub fn get(&self, name: &str) -> Option<&CollectionConfig> {
        match name {
            "vault" | "vaults" => Some(&self.vault),
            "server" | "servers" => Some(&self.server),
            _ => None,
        }
    }
}

/// Where a document collection lives and how chat over it behaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub table: String,
    pub scope_column: String,
    pub order_column: String,
    pub select: String,
    pub bucket: String,
    pub limit: usize,
    pub cache_text: bool,
    pub default_max_chars: usize,
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_answer_tokens: Option<u32>,
}

impl CollectionConfig {
    pub fn vault() -> Self {
        Self {
            table: "files".into(),
            scope_column: "vault_id".into(),
            order_column: "uploaded_at".into(),
            select: "id,name,file_path,file_type,file_size,uploaded_at,extracted_text,text_extracted_at"
                .into(),
            bucket: "vault-files".into(),
            limit: 50,
            cache_text: true,
            default_max_chars: 200_000,
            system_prompt: "You are a helpful assistant. You are given a knowledge context composed of the user's vault files. \
Use only this context when relevant. If the context lacks information, say so clearly."
                .into(),
            max_answer_tokens: None,
        }
    }

    pub fn server() -> Self {
        Self {
            table: "server_files".into(),
            scope_column: "server_id".into(),
            order_column: "created_at".into(),
            select: "id,name,size,file_path,file_type,created_at,uploaded_by".into(),
            bucket: "server-files".into(),
            limit: 30,
            cache_text: false,
            default_max_chars: 150_000,
            system_prompt: "You are a helpful AI assistant in a team server. You can see files shared in the server's cloud storage. \
Answer questions based on the provided context from server files. Be conversational and helpful. \
If you don't have enough context, say so clearly."
                .into(),
            max_answer_tokens: Some(1000),
        }
    }

    /// The store-facing description of this collection.
    pub fn to_collection(&self, name: &str) -> Collection {
        Collection {
            name: name.to_string(),
            table: self.table.clone(),
            scope_column: self.scope_column.clone(),
            order_column: self.order_column.clone(),
            select: self.select.clone(),
            bucket: self.bucket.clone(),
            limit: self.limit,
            cache_text: self.cache_text,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.vaultgate/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load configuration from `path`, then apply environment overrides.
    ///
    /// Environment variables take the highest priority:
    /// - `VAULTGATE_AUTHORITY_URL` / `SUPABASE_URL`
    /// - `VAULTGATE_PUBLIC_API_KEY` / `SUPABASE_ANON_KEY`
    /// - `VAULTGATE_STORE_URL`
    /// - `VAULTGATE_LLM_API_KEY` / `OPENAI_API_KEY`
    /// - `VAULTGATE_MODEL` / `OPENAI_MODEL`
    /// - `VAULTGATE_FALLBACK_ENABLED`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup function.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| env(k).filter(|v| !v.trim().is_empty()))
        };

        if let Some(url) = first(&["VAULTGATE_AUTHORITY_URL", "SUPABASE_URL"]) {
            self.authority.url = Some(url);
        }
        if let Some(key) = first(&["VAULTGATE_PUBLIC_API_KEY", "SUPABASE_ANON_KEY"]) {
            self.authority.public_api_key = Some(key);
        }
        if let Some(url) = first(&["VAULTGATE_STORE_URL"]) {
            self.store.url = Some(url);
        }
        if let Some(key) = first(&["VAULTGATE_LLM_API_KEY", "OPENAI_API_KEY"]) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = first(&["VAULTGATE_MODEL", "OPENAI_MODEL"]) {
            self.llm.default_model = model;
        }
        if let Some(flag) = first(&["VAULTGATE_FALLBACK_ENABLED"]) {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.authority.fallback_enabled = true,
                "0" | "false" | "no" | "off" => self.authority.fallback_enabled = false,
                other => tracing::warn!(value = %other, "Ignoring unrecognized VAULTGATE_FALLBACK_ENABLED"),
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.authority.key_cache_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "authority.key_cache_ttl_secs must be > 0".into(),
            ));
        }

        if self.store.fetch_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "store.fetch_concurrency must be > 0".into(),
            ));
        }

        if self.llm.temperature < 0.0 || self.llm.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        for (name, collection) in [
            ("vault", &self.collections.vault),
            ("server", &self.collections.server),
        ] {
            if collection.limit == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "collections.{name}.limit must be > 0"
                )));
            }
            if collection.default_max_chars == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "collections.{name}.default_max_chars must be > 0"
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".vaultgate")
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.authority.key_cache_ttl_secs, 300);
        assert!(config.authority.fallback_enabled);
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.collections.vault.limit, 50);
        assert_eq!(config.collections.server.limit, 30);
        assert!(config.collections.vault.cache_text);
        assert!(!config.collections.server.cache_text);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.collections.vault.table, "files");
        assert_eq!(parsed.authority.jwks_path, config.authority.jwks_path);
    }

    #[test]
    fn zero_ttl_rejected() {
        let mut config = AppConfig::default();
        config.authority.key_cache_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.llm.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_collection_limit_rejected() {
        let mut config = AppConfig::default();
        config.collections.server.limit = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("collections.server.limit"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.llm.default_model, "gpt-4o-mini");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[authority]
url = "https://auth.example.com"
fallback_enabled = false

[collections.vault]
table = "docs"
scope_column = "owner_id"
order_column = "created_at"
select = "*"
bucket = "docs"
limit = 10
cache_text = false
default_max_chars = 5000
system_prompt = "Be brief."
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.authority.url.as_deref(), Some("https://auth.example.com"));
        assert!(!config.authority.fallback_enabled);
        assert_eq!(config.authority.key_cache_ttl_secs, 300);
        assert_eq!(config.collections.vault.table, "docs");
        assert_eq!(config.collections.server.table, "server_files");
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[authority\nurl = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_take_priority() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SUPABASE_URL", "https://legacy.example.com"),
            ("VAULTGATE_AUTHORITY_URL", "https://primary.example.com"),
            ("SUPABASE_ANON_KEY", "anon-key"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("VAULTGATE_FALLBACK_ENABLED", "false"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(
            config.authority.url.as_deref(),
            Some("https://primary.example.com")
        );
        assert_eq!(config.authority.public_api_key.as_deref(), Some("anon-key"));
        assert_eq!(config.llm.default_model, "gpt-4o");
        assert!(!config.authority.fallback_enabled);
    }

    #[test]
    fn blank_env_values_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(|k| (k == "OPENAI_MODEL").then(|| "  ".to_string()));
        assert_eq!(config.llm.default_model, "gpt-4o-mini");
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.authority.public_api_key = Some("super-secret".into());
        config.llm.api_key = Some("sk-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn collection_lookup_by_route_name() {
        let config = AppConfig::default();
        assert_eq!(config.collections.get("vaults").unwrap().bucket, "vault-files");
        assert_eq!(config.collections.get("server").unwrap().bucket, "server-files");
        assert!(config.collections.get("voice").is_none());

        let collection = config.collections.vault.to_collection("vault");
        assert_eq!(collection.scope_column, "vault_id");
        assert!(collection.cache_text);
    }
}
