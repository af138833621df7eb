//! examkit configuration and gateway factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examkit_core::clock::DEFAULT_TICK_INTERVAL;
use examkit_core::coordinator::RetryPolicy;
use examkit_core::traits::ExamGateway;
use examkit_core::EngineConfig;

use crate::http::{HttpExamGateway, DEFAULT_TIMEOUT_SECS};

/// Where and how to reach the Exam Gateway.
///
/// Note: Custom Debug impl masks the auth token to keep it out of logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Submission retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockSettings {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
        }
    }
}

/// Top-level examkit configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamkitConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub clock: ClockSettings,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}
fn default_request_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    8000
}
fn default_tick_interval() -> u64 {
    DEFAULT_TICK_INTERVAL.as_millis() as u64
}

impl ExamkitConfig {
    /// Engine settings derived from this configuration.
    ///
    /// Zero values are clamped so a bad config cannot disable submission or
    /// spin the clock.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            retry: RetryPolicy {
                max_attempts: self.retry.max_attempts.max(1),
                base_delay: Duration::from_millis(self.retry.base_delay_ms),
                max_delay: Duration::from_millis(
                    self.retry.max_delay_ms.max(self.retry.base_delay_ms),
                ),
                attempt_timeout: Duration::from_secs(self.gateway.request_timeout_secs.max(1)),
            },
            tick_interval: Duration::from_millis(self.clock.tick_interval_ms.max(1)),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
/// Unset variables expand to the empty string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + len];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examkit.toml` in the current directory
/// 2. `~/.config/examkit/config.toml`
///
/// Environment variable overrides: `EXAMKIT_GATEWAY_URL`, `EXAMKIT_GATEWAY_TOKEN`.
pub fn load_config() -> Result<ExamkitConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamkitConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("examkit.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ExamkitConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ExamkitConfig::default(),
    };

    if let Ok(url) = std::env::var("EXAMKIT_GATEWAY_URL") {
        config.gateway.base_url = url;
    }
    if let Ok(token) = std::env::var("EXAMKIT_GATEWAY_TOKEN") {
        config.gateway.auth_token = Some(token);
    }

    config.gateway.base_url = resolve_env_vars(&config.gateway.base_url);
    config.gateway.auth_token = config
        .gateway
        .auth_token
        .as_deref()
        .map(resolve_env_vars)
        .filter(|t| !t.is_empty());

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examkit"))
}

/// Create the HTTP gateway described by `config`.
pub fn create_gateway(config: &GatewayConfig) -> Result<Arc<dyn ExamGateway>> {
    let gateway = HttpExamGateway::with_timeout(
        &config.base_url,
        config.auth_token.clone(),
        Duration::from_secs(config.request_timeout_secs.max(1)),
    )
    .context("failed to build HTTP client")?;
    Ok(Arc::new(gateway))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_EXAMKIT_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_EXAMKIT_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_EXAMKIT_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${_EXAMKIT_UNSET_VAR}x"), "x");
        assert_eq!(resolve_env_vars("no ${closing"), "no ${closing");
        std::env::remove_var("_EXAMKIT_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = ExamkitConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.gateway.request_timeout_secs, 15);

        let engine = config.engine_config();
        assert_eq!(engine.retry, RetryPolicy::default());
        assert_eq!(engine.tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
[gateway]
base_url = "https://lms.example.edu/api"
auth_token = "secret"

[retry]
max_attempts = 5
"#;
        let config: ExamkitConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.gateway.base_url, "https://lms.example.edu/api");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.clock.tick_interval_ms, 1000);
    }

    #[test]
    fn debug_masks_token() {
        let config = GatewayConfig {
            auth_token: Some("super-secret".into()),
            ..GatewayConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn zero_settings_are_clamped() {
        let mut config = ExamkitConfig::default();
        config.retry.max_attempts = 0;
        config.clock.tick_interval_ms = 0;
        let engine = config.engine_config();
        assert_eq!(engine.retry.max_attempts, 1);
        assert!(!engine.tick_interval.is_zero());
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("examkit.toml");
        std::fs::write(&path, "[clock]\ntick_interval_ms = 250\n").unwrap();

        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.clock.tick_interval_ms, 250);

        let missing = dir.path().join("missing.toml");
        assert!(load_config_from(Some(&missing)).is_err());
    }
}
