use std::ffi::OsString;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::render::RenderSettings;

// ── LLM provider types ──────────────────────────────────────────

/// Wire format spoken by an LLM endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Anthropic,
    #[serde(alias = "openai")]
    OpenAiCompatible,
}

impl LlmProvider {
    /// Registry name of a provider built from `llm`.
    pub fn name(self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::OpenAiCompatible => "openai",
        }
    }

    /// Conventional environment variable holding this provider's key.
    pub fn key_env_var(self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::OpenAiCompatible => "OPENAI_API_KEY",
        }
    }
}

/// Endpoint configuration for one provider.
///
/// `api_key` is read from the settings file or the environment but never written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    pub provider: LlmProvider,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL override. For OpenAI-compatible providers `/chat/completions` is appended.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model override. None = use provider default.
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Anthropic,
            api_key: None,
            base_url: None,
            model: None,
        }
    }
}

// ── Agent settings ───────────────────────────────────────────────

/// Backoff for transient provider failures. The delay doubles per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

impl RetrySettings {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> std::time::Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        std::time::Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Default provider.
    pub llm: LlmProviderConfig,
    /// Additional named providers, selectable by name.
    pub providers: IndexMap<String, LlmProviderConfig>,
    /// Model round trips allowed per processed message.
    pub max_turns: usize,
    pub retry: RetrySettings,
    /// Events a subscriber may fall behind before losing the oldest.
    pub event_buffer: usize,
    pub render: RenderSettings,
    /// Directory for the JSONL tool audit log. None disables it.
    pub audit_dir: Option<PathBuf>,
    /// Merge a scene summary into the latest user message before the first model call.
    pub include_scene_summary: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            llm: LlmProviderConfig::default(),
            providers: IndexMap::new(),
            max_turns: 10,
            retry: RetrySettings::default(),
            event_buffer: 256,
            render: RenderSettings::default(),
            audit_dir: None,
            include_scene_summary: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

pub const API_KEY_ENV: &str = "SCENE_AGENT_API_KEY";

impl AgentSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let mut problems = Vec::new();
        if self.max_turns < 1 {
            problems.push("max_turns must be at least 1");
        }
        if self.event_buffer < 1 {
            problems.push("event_buffer must be at least 1");
        }
        if self.retry.max_attempts < 1 {
            problems.push("retry.max_attempts must be at least 1");
        }
        if self.render.width == 0 || self.render.height == 0 {
            problems.push("render width and height must be positive");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Invalid(problems.join("; ")))
        }
    }

    /// Fill missing API keys from the environment.
    pub fn resolve_api_keys(&mut self) {
        self.resolve_api_keys_with(|name| std::env::var(name).ok());
    }

    /// `SCENE_AGENT_API_KEY` applies to the default provider only; every
    /// provider falls back to its conventional variable.
    pub(crate) fn resolve_api_keys_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
        let missing = |config: &LlmProviderConfig| !config.api_key.as_ref().is_some_and(|k| !k.is_empty());

        if missing(&self.llm) {
            self.llm.api_key = lookup(API_KEY_ENV).or_else(|| lookup(self.llm.provider.key_env_var()));
        }
        for config in self.providers.values_mut() {
            if missing(config) {
                config.api_key = lookup(config.provider.key_env_var());
            }
        }
    }
}

/// Load settings from `path`, falling back to defaults when the file doesn't
/// exist. Keys are resolved from the environment and the result is validated.
pub fn load_settings(path: &Path) -> Result<AgentSettings, SettingsError> {
    let mut settings = if path.exists() {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str::<AgentSettings>(&data)?
    } else {
        debug!(path = %path.display(), "no settings file, using defaults");
        AgentSettings::default()
    };
    settings.resolve_api_keys();
    settings.validate()?;
    Ok(settings)
}

/// Write settings as pretty JSON via a sibling temp file and rename.
pub fn save_settings(path: &Path, settings: &AgentSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;

    let mut tmp_name = OsString::from(path.file_name().unwrap_or_default());
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json.as_bytes())?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
