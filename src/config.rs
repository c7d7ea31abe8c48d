//! TOML configuration types for FlowGuard.
//!
//! The top-level [`AppConfig`] is deserialized from `flowguard.toml` and
//! contains sections for the shared storage location, engine behaviour and
//! notifications. Every section is optional; a missing file yields the
//! built-in defaults.
//!
//! # Example `flowguard.toml`
//!
//! ```toml
//! [storage]
//! dir = "${HOME}/.flowguard"
//!
//! [engine]
//! self_identifiers = ["flowguard"]
//! pending_capacity = 100
//!
//! [notification]
//! enabled = true
//!
//! [notification.webhook]
//! url = "https://hooks.example.com/flowguard"
//! bearer_token = "${FLOWGUARD_WEBHOOK_TOKEN}"
//! ```

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FlowGuardError, Result};
use crate::pending::DEFAULT_CAPACITY;

/// Template written by `flowguard init`.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/default.toml");

/// Shared storage configuration (`[storage]` section).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding `rules.json` and `pending.json`.
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

/// Decision engine configuration (`[engine]` section).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Substrings identifying this tool's own processes; matching flows are
    /// always allowed.
    #[serde(default = "default_self_identifiers")]
    pub self_identifiers: Vec<String>,
    /// Bound on the pending queue.
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,
    /// Process selector used for flows whose process cannot be identified.
    #[serde(default = "default_unknown_process")]
    pub unknown_process: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            self_identifiers: default_self_identifiers(),
            pending_capacity: default_pending_capacity(),
            unknown_process: default_unknown_process(),
        }
    }
}

/// Webhook configuration (nested under `[notification.webhook]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// Endpoint receiving a JSON `POST` per event.
    pub url: String,
    /// Optional bearer token sent in the `Authorization` header.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

/// Notification configuration (`[notification]` section).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Whether notifications are active.
    #[serde(default)]
    pub enabled: bool,
    /// Optional webhook backend configuration.
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

/// Top-level application configuration deserialized from `flowguard.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl AppConfig {
    /// Load and parse the configuration from a TOML file at the given path.
    ///
    /// Before parsing, `${VAR}` and `$VAR` placeholders outside comment lines
    /// are replaced with the corresponding environment variable values. An
    /// error is returned if a referenced variable is not set.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Like [`load_from_path`](Self::load_from_path), but a missing file
    /// yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration text, substituting environment variables first.
    pub fn parse(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content)?;
        Ok(toml::from_str(&content)?)
    }
}

fn default_storage_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".flowguard")
}

fn default_self_identifiers() -> Vec<String> {
    vec!["flowguard".to_string()]
}

fn default_pending_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_unknown_process() -> String {
    "unknown".to_string()
}

/// Replace `${VAR_NAME}` and `$VAR_NAME` placeholders with environment
/// variable values. Comment lines are left untouched.
///
/// Returns an error containing the variable name if the variable is not set.
fn substitute_env_vars(input: &str) -> Result<String> {
    // ${VAR_NAME}, or bare $VAR_NAME (uppercase only to avoid false positives)
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Z_][A-Z0-9_]*)")?;

    let mut result = String::with_capacity(input.len());
    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            continue;
        }

        let mut last = 0;
        for cap in re.captures_iter(line) {
            let (Some(whole), Some(name)) = (cap.get(0), cap.get(1).or_else(|| cap.get(2)))
            else {
                continue;
            };
            let value = std::env::var(name.as_str())
                .map_err(|_| FlowGuardError::ConfigEnvVar(name.as_str().to_string()))?;
            result.push_str(&line[last..whole.start()]);
            result.push_str(&value);
            last = whole.end();
        }
        result.push_str(&line[last..]);
    }

    Ok(result)
}
