use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials a caller supplies so the server acts on behalf of another principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedAuth {
    pub auth_type: String,
    pub token: String,
}

/// Per-request extras sent as headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub feature_flags: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_auth: Option<DelegatedAuth>,
}

impl RequestOptions {
    /// Layers `other` over `self`: flags merge key by key, delegated auth is replaced when set.
    pub fn merged(&self, other: &RequestOptions) -> RequestOptions {
        let mut feature_flags = self.feature_flags.clone();
        feature_flags.extend(
            other
                .feature_flags
                .iter()
                .map(|(name, value)| (name.clone(), *value)),
        );
        RequestOptions {
            feature_flags,
            delegated_auth: other
                .delegated_auth
                .clone()
                .or_else(|| self.delegated_auth.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Absolute http(s) URL; `/v1/...` is appended to its path.
    pub base_url: String,
    pub token: Option<String>,
    /// Applies to every request except the log stream, which stays open.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub defaults: RequestOptions,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: format!("eventhorizon-client/{}", env!("CARGO_PKG_VERSION")),
            defaults: RequestOptions::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_defaults(mut self, defaults: RequestOptions) -> Self {
        self.defaults = defaults;
        self
    }
}
