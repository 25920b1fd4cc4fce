//! Provider abstraction: the loop talks to an LLM only through [`Provider`].

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::conversation::{Message, Part, ToolCall};
use crate::settings::AgentSettings;
use crate::tools::ToolDeclaration;

pub use http::HttpProvider;

/// What one `generate` call produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    /// Text, thought text and tool calls, in arrival order.
    pub parts: Vec<Part>,
}

impl ModelResponse {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    /// No text and no tool calls.
    pub fn is_empty(&self) -> bool {
        !self.parts.iter().any(|p| match p {
            Part::Text { text, .. } => !text.is_empty(),
            Part::ToolCall(_) => true,
            _ => false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Worth retrying: rate limits, overloaded servers, dropped connections.
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("provider error: {0}")]
    Fatal(String),
    #[error("provider call cancelled")]
    Cancelled,
}

const TRANSIENT_MARKERS: [&str; 6] = [
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "temporary failure",
    "temporarily unavailable",
];

impl ProviderError {
    /// Transient errors, plus fatal ones whose text names a network hiccup.
    /// Adapters don't always classify what they forward.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transient(_) => true,
            ProviderError::Fatal(message) => {
                let lower = message.to_lowercase();
                TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
            }
            ProviderError::Cancelled => false,
        }
    }
}

/// A remote (or scripted) model that can answer a transcript.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, conversation: &[Message], tools: &[ToolDeclaration]) -> Result<ModelResponse, ProviderError>;
}

// ── Registry ─────────────────────────────────────────────────────

/// Named providers, built once and read-only afterwards.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: IndexMap<String, Arc<dyn Provider>>,
    default: Option<String>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .field("default", &self.default)
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under `name`. The first registration becomes the default.
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        let name = name.into();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.providers.insert(name, provider);
        self
    }

    /// Build HTTP providers for `settings.llm` (the default) and every entry of
    /// `settings.providers`. Extra entries without an API key are skipped.
    pub fn from_settings(settings: &AgentSettings) -> Result<Self, ProviderError> {
        let client = reqwest::Client::new();
        let default_name = settings.llm.provider.name().to_string();
        let default = HttpProvider::from_config(client.clone(), &default_name, &settings.llm)?;
        let mut registry = Self::new().with_provider(default_name, Arc::new(default));

        for (name, config) in &settings.providers {
            match HttpProvider::from_config(client.clone(), name, config) {
                Ok(provider) => registry = registry.with_provider(name.clone(), Arc::new(provider)),
                Err(e) => warn!(provider = %name, error = %e, "skipping provider"),
            }
        }
        info!(providers = ?registry.names(), "provider registry ready");
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn default_provider(&self) -> Option<Arc<dyn Provider>> {
        self.default.as_deref().and_then(|name| self.get(name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl Provider for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn generate(&self, _: &[Message], _: &[ToolDeclaration]) -> Result<ModelResponse, ProviderError> {
            Ok(ModelResponse::new(vec![Part::text(self.0)]))
        }
    }

    #[test]
    fn network_hiccups_in_fatal_text_are_transient() {
        assert!(ProviderError::Transient("429".into()).is_transient());
        assert!(ProviderError::Fatal("request Timed Out after 30s".into()).is_transient());
        assert!(ProviderError::Fatal("Connection reset by peer".into()).is_transient());
        assert!(!ProviderError::Fatal("API error 401: invalid x-api-key".into()).is_transient());
        assert!(!ProviderError::Cancelled.is_transient());
    }

    #[test]
    fn empty_response_detection() {
        assert!(ModelResponse::default().is_empty());
        assert!(ModelResponse::new(vec![Part::text("")]).is_empty());
        assert!(!ModelResponse::new(vec![Part::text("done")]).is_empty());
        let call = ModelResponse::new(vec![Part::ToolCall(ToolCall {
            id: "c1".into(),
            name: "get_scene_state".into(),
            arguments: json!({}),
        })]);
        assert!(!call.is_empty());
        assert_eq!(call.tool_calls().count(), 1);
    }

    #[tokio::test]
    async fn first_registered_provider_is_default() {
        let registry = ProviderRegistry::new()
            .with_provider("alpha", Arc::new(Named("alpha")))
            .with_provider("beta", Arc::new(Named("beta")));
        assert_eq!(registry.names(), vec!["alpha", "beta"]);
        assert_eq!(registry.default_provider().unwrap().name(), "alpha");
        let beta = registry.get("beta").unwrap();
        let response = beta.generate(&[], &[]).await.unwrap();
        assert_eq!(response.parts, vec![Part::text("beta")]);
        assert!(registry.get("gamma").is_none());
    }

    #[test]
    fn settings_without_key_cannot_build_default() {
        let mut settings = AgentSettings::default();
        settings.llm.api_key = None;
        assert!(matches!(ProviderRegistry::from_settings(&settings), Err(ProviderError::Fatal(_))));
    }
}
