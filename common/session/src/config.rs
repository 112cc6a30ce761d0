use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::logout::DEFAULT_LOGIN_PATH;
use crate::session::{ExpiryPolicy, Session, SessionBuilder};
use crate::storage::{FileStorage, TokenStorage, DEFAULT_DURABLE_TTL_SECONDS};
use crate::store::{TokenStore, DEFAULT_TOKEN_KEY};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Runtime configuration for the client session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Key both storage slots keep the token under.
    pub token_key: String,
    /// Route the logout handler redirects to.
    pub login_path: String,
    /// Max-age of the durable slot.
    pub durable_ttl_seconds: i64,
    pub expiry_policy: ExpiryPolicy,
    /// File backing the durable slot, when the host has a filesystem.
    pub storage_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfig {
    /// Defaults: key `token`, login at `/login`, 30 day durable slot, evict
    /// expired tokens.
    pub fn new() -> Self {
        Self {
            token_key: DEFAULT_TOKEN_KEY.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            durable_ttl_seconds: DEFAULT_DURABLE_TTL_SECONDS,
            expiry_policy: ExpiryPolicy::default(),
            storage_path: None,
        }
    }

    pub fn with_token_key(mut self, key: impl Into<String>) -> Self {
        self.token_key = key.into();
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn with_durable_ttl_seconds(mut self, seconds: i64) -> Self {
        self.durable_ttl_seconds = seconds;
        self
    }

    pub fn with_expiry_policy(mut self, policy: ExpiryPolicy) -> Self {
        self.expiry_policy = policy;
        self
    }

    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Durable slot at `storage_path`, if one is configured.
    pub fn durable_storage(&self) -> Option<FileStorage> {
        self.storage_path
            .as_ref()
            .map(|path| FileStorage::new(path).with_ttl_seconds(self.durable_ttl_seconds))
    }

    pub fn token_store(
        &self,
        primary: Arc<dyn TokenStorage>,
        fallback: Arc<dyn TokenStorage>,
    ) -> TokenStore {
        TokenStore::new(primary, fallback).with_key(&self.token_key)
    }

    /// Builder preloaded with the login path and expiry policy.
    pub fn session_builder(&self, store: TokenStore) -> SessionBuilder {
        Session::builder(store)
            .with_login_path(self.login_path.clone())
            .with_expiry_policy(self.expiry_policy)
    }
}

pub fn load_session_config() -> Result<SessionConfig> {
    let mut config = SessionConfig::new();

    if let Some(key) = env_value("FIELDEYES_TOKEN_KEY") {
        config.token_key = key;
    }

    if let Some(path) = env_value("FIELDEYES_LOGIN_PATH") {
        config.login_path = normalize_login_path(&path);
    }

    if let Some(days) = env_value("FIELDEYES_TOKEN_TTL_DAYS") {
        config.durable_ttl_seconds =
            parse_ttl_days(&days).context("Failed to parse FIELDEYES_TOKEN_TTL_DAYS")?;
    }

    if let Some(policy) = env_value("FIELDEYES_EXPIRY_POLICY") {
        config.expiry_policy = policy
            .parse::<ExpiryPolicy>()
            .map_err(|err| anyhow!(err))
            .context("Failed to parse FIELDEYES_EXPIRY_POLICY")?;
    }

    config.storage_path = env_value("FIELDEYES_SESSION_FILE").map(PathBuf::from);

    Ok(config)
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| normalize_optional(&value))
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_login_path(value: &str) -> String {
    if value.starts_with('/') || value.contains("://") {
        value.to_string()
    } else {
        format!("/{value}")
    }
}

fn parse_ttl_days(value: &str) -> Result<i64> {
    let days: i64 = value
        .trim()
        .parse()
        .map_err(|err| anyhow!("Invalid day count '{value}': {err}"))?;
    if days <= 0 {
        return Err(anyhow!("Token TTL must be at least one day, got {days}"));
    }
    days.checked_mul(SECONDS_PER_DAY)
        .ok_or_else(|| anyhow!("Token TTL of {days} days is too large"))
}
