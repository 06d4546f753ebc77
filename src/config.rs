//! Process-level configuration: API endpoints and credential fallbacks.
//!
//! Credentials are normally supplied per request. When a field is missing,
//! the value from the process environment (or a service account file) fills
//! the gap before normalization.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::credential::{Credential, CredentialError};

pub const ENV_PROJECT_ID: &str = "FIREBASE_PROJECT_ID";
pub const ENV_CLIENT_EMAIL: &str = "FIREBASE_CLIENT_EMAIL";
pub const ENV_PRIVATE_KEY: &str = "FIREBASE_PRIVATE_KEY";

const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse service account JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid endpoint URL {url:?}: {source}")]
    Endpoint {
        url: String,
        source: url::ParseError,
    },
}

/// Base URL of the FCM HTTP v1 API and the OAuth2 token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    fcm_base: String,
    token_uri: String,
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::Endpoint {
        url: raw.to_string(),
        source,
    })
}

impl Endpoints {
    pub fn new(fcm_base: &str) -> Result<Self, ConfigError> {
        let url = parse_url(fcm_base)?;
        Ok(Self {
            fcm_base: url.as_str().trim_end_matches('/').to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        })
    }

    /// Replaces the endpoint service account keys exchange their JWT at.
    pub fn with_token_uri(mut self, token_uri: &str) -> Result<Self, ConfigError> {
        self.token_uri = parse_url(token_uri)?.to_string();
        Ok(self)
    }

    pub fn send_url(&self, project_id: &str) -> String {
        format!("{}/v1/projects/{}/messages:send", self.fcm_base, project_id)
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            fcm_base: DEFAULT_FCM_ENDPOINT.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        }
    }
}

/// Credential fields as supplied by a caller, any of which may be absent.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RawCredentials {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
}

impl std::fmt::Debug for RawCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawCredentials")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RawCredentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            project_id: lookup(ENV_PROJECT_ID),
            client_email: lookup(ENV_CLIENT_EMAIL),
            private_key: lookup(ENV_PRIVATE_KEY),
        }
    }

    /// Reads the three fields from a service account JSON document.
    pub fn from_service_account_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_service_account_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_service_account_json(&content)
    }

    /// Fills every blank or absent field from `fallback`.
    pub fn or(self, fallback: RawCredentials) -> Self {
        fn pick(primary: Option<String>, fallback: Option<String>) -> Option<String> {
            match primary {
                Some(value) if !value.trim().is_empty() => Some(value),
                _ => fallback,
            }
        }

        Self {
            project_id: pick(self.project_id, fallback.project_id),
            client_email: pick(self.client_email, fallback.client_email),
            private_key: pick(self.private_key, fallback.private_key),
        }
    }

    pub fn normalize(&self) -> Result<Credential, CredentialError> {
        Credential::normalize(
            self.project_id.as_deref().unwrap_or_default(),
            self.client_email.as_deref().unwrap_or_default(),
            self.private_key.as_deref().unwrap_or_default(),
        )
    }
}
