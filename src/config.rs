//! Application-level configuration: listening port, storage backend, webhook and message limits.

use std::{env, fs, io::ErrorKind, path::PathBuf, str::FromStr, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MONSTER_LOBBY_CONFIG_PATH";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_WEBHOOK_ATTEMPTS: u32 = 3;
const DEFAULT_WEBHOOK_BACKOFF_MS: u64 = 500;
const DEFAULT_WEBHOOK_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MESSAGE_LIMIT: usize = 50;
const DEFAULT_MAX_MESSAGE_LIMIT: usize = 200;
const DEFAULT_RECENT_COUNT: usize = 10;
const DEFAULT_MAX_CONTENT_LENGTH: usize = 2000;

/// Storage backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store; data is lost on restart.
    #[default]
    Memory,
    /// CouchDB over its REST API.
    Couch,
    /// MongoDB.
    Mongo,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "couch" | "couchdb" => Ok(Self::Couch),
            "mongo" | "mongodb" => Ok(Self::Mongo),
            other => Err(format!("unknown store backend `{other}`")),
        }
    }
}

/// Outbound webhook settings used to hand user messages to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Target URL; `None` disables the webhook entirely.
    pub url: Option<String>,
    /// Shared secret sent as `x-webhook-secret` and required on the AI callback route.
    pub secret: Option<String>,
    /// Delivery attempts per message, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled after each failure.
    pub initial_backoff: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            secret: None,
            max_attempts: DEFAULT_WEBHOOK_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_WEBHOOK_BACKOFF_MS),
            timeout: Duration::from_millis(DEFAULT_WEBHOOK_TIMEOUT_MS),
        }
    }
}

/// Bounds applied to message reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLimits {
    pub default_limit: usize,
    pub max_limit: usize,
    pub recent_count: usize,
    pub max_content_length: usize,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_MESSAGE_LIMIT,
            max_limit: DEFAULT_MAX_MESSAGE_LIMIT,
            recent_count: DEFAULT_RECENT_COUNT,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }
}

impl MessageLimits {
    /// Resolve a caller-supplied limit, falling back to `default` and capping at `max_limit`.
    pub fn clamp(&self, requested: Option<usize>, default: usize) -> usize {
        requested.unwrap_or(default).clamp(1, self.max_limit)
    }
}

#[derive(Debug, Clone, Default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub port: u16,
    pub store: StoreBackend,
    pub webhook: WebhookConfig,
    pub messages: MessageLimits,
}

impl AppConfig {
    /// Load the configuration file (if any), then apply environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let raw = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration file");
                    raw
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    RawConfig::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                RawConfig::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                RawConfig::default()
            }
        };

        let config = Self::from_raw(raw, |key| env::var(key).ok());
        info!(
            port = config.port,
            store = ?config.store,
            webhook = config.webhook.url.is_some(),
            "configuration ready"
        );
        config
    }

    /// Merge file values with environment overrides looked up through `lookup`.
    fn from_raw(raw: RawConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env_parsed = |key: &str| -> Option<String> {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let port = env_parsed("PORT")
            .or_else(|| env_parsed("SERVER_PORT"))
            .and_then(|value| parse_or_warn("PORT", &value))
            .or(raw.port)
            .unwrap_or(DEFAULT_PORT);

        let store = env_parsed("STORE_BACKEND")
            .and_then(|value| parse_or_warn("STORE_BACKEND", &value))
            .or(raw.store)
            .unwrap_or_default();

        let raw_webhook = raw.webhook.unwrap_or_default();
        let defaults = WebhookConfig::default();
        let webhook = WebhookConfig {
            url: env_parsed("WEBHOOK_URL").or(raw_webhook.url),
            secret: env_parsed("WEBHOOK_SECRET").or(raw_webhook.secret),
            max_attempts: raw_webhook
                .max_attempts
                .unwrap_or(defaults.max_attempts)
                .max(1),
            initial_backoff: raw_webhook
                .initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
            timeout: raw_webhook
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        };

        let raw_messages = raw.messages.unwrap_or_default();
        let message_defaults = MessageLimits::default();
        let max_limit = raw_messages
            .max_limit
            .unwrap_or(message_defaults.max_limit)
            .max(1);
        let messages = MessageLimits {
            default_limit: raw_messages
                .default_limit
                .unwrap_or(message_defaults.default_limit)
                .clamp(1, max_limit),
            max_limit,
            recent_count: raw_messages
                .recent_count
                .unwrap_or(message_defaults.recent_count)
                .clamp(1, max_limit),
            max_content_length: raw_messages
                .max_content_length
                .unwrap_or(message_defaults.max_content_length)
                .max(1),
        };

        Self {
            port,
            store,
            webhook,
            messages,
        }
    }
}

fn parse_or_warn<T>(key: &str, value: &str) -> Option<T>
where
    T: FromStr,
{
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value, "ignoring unparsable environment override");
            None
        }
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    port: Option<u16>,
    store: Option<StoreBackend>,
    webhook: Option<RawWebhook>,
    messages: Option<RawMessages>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWebhook {
    url: Option<String>,
    secret: Option<String>,
    max_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMessages {
    default_limit: Option<usize>,
    max_limit: Option<usize>,
    recent_count: Option<usize>,
    max_content_length: Option<usize>,
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let config = AppConfig::from_raw(RawConfig::default(), lookup(&[]));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.webhook, WebhookConfig::default());
        assert_eq!(config.messages, MessageLimits::default());
    }

    #[test]
    fn environment_overrides_file_values() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "port": 9000,
                "store": "couch",
                "webhook": { "url": "http://file/hook", "max_attempts": 5 },
                "messages": { "default_limit": 20 }
            }"#,
        )
        .unwrap();

        let config = AppConfig::from_raw(
            raw,
            lookup(&[
                ("PORT", "7000"),
                ("STORE_BACKEND", "mongo"),
                ("WEBHOOK_URL", "http://env/hook"),
            ]),
        );

        assert_eq!(config.port, 7000);
        assert_eq!(config.store, StoreBackend::Mongo);
        assert_eq!(config.webhook.url.as_deref(), Some("http://env/hook"));
        assert_eq!(config.webhook.max_attempts, 5);
        assert_eq!(config.messages.default_limit, 20);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let config = AppConfig::from_raw(
            RawConfig::default(),
            lookup(&[("PORT", "not-a-port"), ("STORE_BACKEND", "redis")]),
        );
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.store, StoreBackend::Memory);
    }

    #[test]
    fn clamp_caps_requested_limits() {
        let limits = MessageLimits::default();
        assert_eq!(limits.clamp(None, limits.default_limit), 50);
        assert_eq!(limits.clamp(Some(0), limits.default_limit), 1);
        assert_eq!(limits.clamp(Some(10_000), limits.default_limit), 200);
    }
}
