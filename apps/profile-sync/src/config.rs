use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::sync::policy::{AttachmentStorage, FailurePolicy, HeaderWrite, SyncPolicy};

/// Configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub header_write: HeaderWrite,
    pub commit_uploads: bool,
    pub attachment_storage: AttachmentStorage,
    pub failure_policy: FailurePolicy,
    pub request_timeout: Duration,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            api_base_url: require_env("PROFILE_API_URL")?,
            api_token: std::env::var("PROFILE_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            header_write: parse_env("HEADER_WRITE")?.unwrap_or_default(),
            commit_uploads: parse_env("UPLOAD_COMMIT")?.unwrap_or(true),
            attachment_storage: parse_env("ATTACHMENT_STORAGE")?.unwrap_or_default(),
            failure_policy: parse_env("SAVE_FAILURE_POLICY")?.unwrap_or_default(),
            request_timeout: Duration::from_secs(
                parse_env("REQUEST_TIMEOUT_SECS")?.unwrap_or(30),
            ),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn policy(&self) -> SyncPolicy {
        SyncPolicy::default()
            .with_header_write(self.header_write)
            .with_commit_uploads(self.commit_uploads)
            .with_attachment_storage(self.attachment_storage)
            .with_failure(self.failure_policy)
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        _ => Ok(None),
    }
}
