use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use eventhorizon_client::{ClientConfig, DelegatedAuth, RequestOptions};

pub const URL_ENV: &str = "EVENTHORIZON_URL";
pub const TOKEN_ENV: &str = "EVENTHORIZON_TOKEN";
pub const CONFIG_ENV: &str = "EVENTHORIZON_CONFIG";

/// Connection flags shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// JSON config file; defaults to `<config dir>/eventhorizon/config.json` when present.
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, env = URL_ENV)]
    pub url: Option<String>,
    #[arg(long, global = true, env = TOKEN_ENV, hide_env_values = true)]
    pub token: Option<String>,
    /// Request timeout in seconds. Does not apply to `logs stream`.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
    /// Per-request feature flag, repeatable.
    #[arg(
        long = "feature-flag",
        global = true,
        value_name = "NAME=BOOL",
        value_parser = parse_feature_flag
    )]
    pub feature_flags: Vec<(String, bool)>,
    #[arg(long, global = true, requires = "delegated_auth_token")]
    pub delegated_auth_type: Option<String>,
    #[arg(long, global = true, requires = "delegated_auth_type", hide_env_values = true)]
    pub delegated_auth_token: Option<String>,
    /// Also write JSON-lines logs into this directory.
    #[arg(long, global = true)]
    pub logs_dir: Option<PathBuf>,
}

impl GlobalArgs {
    /// Command-line layer. Unset flags are `null` and leave lower layers alone.
    fn overlay(&self) -> Value {
        let flags = self
            .feature_flags
            .iter()
            .map(|(name, value)| (name.clone(), Value::Bool(*value)))
            .collect::<Map<_, _>>();
        let delegated_auth = match (&self.delegated_auth_type, &self.delegated_auth_token) {
            (Some(auth_type), Some(token)) => json!({ "authType": auth_type, "token": token }),
            _ => Value::Null,
        };
        json!({
            "url": self.url,
            "token": self.token,
            "timeoutSecs": self.timeout,
            "featureFlags": flags,
            "delegatedAuth": delegated_auth,
            "logsDir": self.logs_dir,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub feature_flags: BTreeMap<String, bool>,
    #[serde(default)]
    pub delegated_auth: Option<DelegatedAuth>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub logs_dir: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_filter() -> String {
    "warn".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout_secs: default_timeout_secs(),
            feature_flags: BTreeMap::new(),
            delegated_auth: None,
            log_filter: default_log_filter(),
            logs_dir: None,
        }
    }
}

impl CliConfig {
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let url = self
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .with_context(|| format!("no service URL configured; pass --url or set {URL_ENV}"))?;
        let mut config = ClientConfig::new(url)
            .with_timeout(Duration::from_secs(self.timeout_secs.max(1)))
            .with_defaults(RequestOptions {
                feature_flags: self.feature_flags.clone(),
                delegated_auth: self.delegated_auth.clone(),
            });
        if let Some(token) = self.token.as_deref().filter(|token| !token.is_empty()) {
            config = config.with_token(token);
        }
        Ok(config)
    }
}

/// Layers defaults, the config file, then environment and flags.
pub fn resolve(args: &GlobalArgs) -> anyhow::Result<CliConfig> {
    let mut merged = serde_json::to_value(CliConfig::default())?;
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|path| path.is_file()),
    };
    if let Some(path) = path {
        deep_merge(&mut merged, &read_config_file(&path)?);
    }
    deep_merge(&mut merged, &args.overlay());
    serde_json::from_value(merged).context("invalid configuration")
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("eventhorizon").join("config.json"))
}

fn read_config_file(path: &Path) -> anyhow::Result<Value> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("config file {} is not valid JSON", path.display()))?;
    if !value.is_object() {
        anyhow::bail!("config file {} must hold a JSON object", path.display());
    }
    Ok(value)
}

/// Objects merge key by key; `null` in the overlay keeps the base value.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    if overlay.is_null() {
        return;
    }
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                if overlay_value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

pub fn parse_feature_flag(raw: &str) -> Result<(String, bool), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=BOOL, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("feature flag name is empty in `{raw}`"));
    }
    let value = match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => true,
        "false" | "0" | "off" | "no" => false,
        other => return Err(format!("`{other}` is not a boolean for feature flag `{name}`")),
    };
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_keeps_base_for_null_and_merges_objects() {
        let mut base = json!({
            "url": "https://file.example",
            "featureFlags": {"a": true, "b": false},
            "timeoutSecs": 30,
        });
        deep_merge(
            &mut base,
            &json!({
                "url": null,
                "featureFlags": {"b": true, "c": true},
                "timeoutSecs": 5,
            }),
        );
        assert_eq!(base["url"], "https://file.example");
        assert_eq!(base["featureFlags"], json!({"a": true, "b": true, "c": true}));
        assert_eq!(base["timeoutSecs"], 5);
    }

    #[test]
    fn parses_feature_flags() {
        assert_eq!(
            parse_feature_flag("fast-logs=true"),
            Ok(("fast-logs".to_string(), true))
        );
        assert_eq!(parse_feature_flag(" beta = off "), Ok(("beta".to_string(), false)));
        assert!(parse_feature_flag("beta").is_err());
        assert!(parse_feature_flag("=true").is_err());
        assert!(parse_feature_flag("beta=maybe").is_err());
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"url":"https://file.example","token":"file-token","featureFlags":{"a":true,"b":true}}"#,
        )
        .expect("write config");

        let args = GlobalArgs {
            config: Some(path),
            url: Some("https://flag.example".to_string()),
            feature_flags: vec![("b".to_string(), false)],
            delegated_auth_type: Some("github".to_string()),
            delegated_auth_token: Some("gh-token".to_string()),
            ..GlobalArgs::default()
        };
        let config = resolve(&args).expect("resolve");
        assert_eq!(config.url.as_deref(), Some("https://flag.example"));
        assert_eq!(config.token.as_deref(), Some("file-token"));
        assert_eq!(
            config.feature_flags,
            BTreeMap::from([("a".to_string(), true), ("b".to_string(), false)])
        );
        assert_eq!(
            config.delegated_auth,
            Some(DelegatedAuth {
                auth_type: "github".to_string(),
                token: "gh-token".to_string(),
            })
        );
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn explicit_missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = GlobalArgs {
            config: Some(dir.path().join("absent.json")),
            ..GlobalArgs::default()
        };
        assert!(resolve(&args).is_err());
    }

    #[test]
    fn client_config_requires_a_url() {
        let err = CliConfig::default().client_config().unwrap_err();
        assert!(err.to_string().contains(URL_ENV));

        let config = CliConfig {
            url: Some("https://api.example".to_string()),
            token: Some("t".to_string()),
            timeout_secs: 5,
            ..CliConfig::default()
        };
        let client = config.client_config().expect("client config");
        assert_eq!(client.base_url, "https://api.example");
        assert_eq!(client.token.as_deref(), Some("t"));
        assert_eq!(client.timeout, Duration::from_secs(5));
    }
}
