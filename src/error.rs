use std::fmt;

use serde::Serialize;

/// Ordered list of human-readable invariant violations.
///
/// Validation never stops at the first problem: every violated rule of every
/// offending entity lands here so the model can fix them all in one round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn into_messages(self) -> Vec<String> {
        self.0
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<String> for ValidationErrors {
    fn from(message: String) -> Self {
        Self(vec![message])
    }
}

/// Which kind of scene entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Shape,
    Light,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Shape => write!(f, "shape"),
            EntityKind::Light => write!(f, "light"),
        }
    }
}

/// Errors raised by scene model operations. Serialized with a `code` tag so
/// hosts can match on the variant.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "code", content = "detail")]
pub enum SceneError {
    #[error("{0}")]
    Validation(ValidationErrors),
    #[error("{kind} \"{id}\" not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("scene compile failed: {message}")]
    Compile { message: String },
}

impl SceneError {
    pub fn not_found(kind: EntityKind, id: &str) -> Self {
        SceneError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Flatten into the list of strings placed in a tool failure envelope.
    pub fn messages(&self) -> Vec<String> {
        match self {
            SceneError::Validation(errors) => errors.messages().to_vec(),
            other => vec![other.to_string()],
        }
    }
}

impl From<ValidationErrors> for SceneError {
    fn from(errors: ValidationErrors) -> Self {
        SceneError::Validation(errors)
    }
}

/// Fatal errors that end one `process_turn` call. Mutations applied before
/// the failure stay applied.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "code", content = "detail")]
pub enum AgentError {
    #[error("provider error: {message}")]
    Provider { message: String },
    #[error("model returned neither text nor tool calls")]
    EmptyResponse,
    #[error("scene compile failed after tool execution: {message}")]
    Compile { message: String },
    #[error("cancelled")]
    Cancelled,
}

impl From<crate::llm::ProviderError> for AgentError {
    fn from(e: crate::llm::ProviderError) -> Self {
        match e {
            crate::llm::ProviderError::Cancelled => AgentError::Cancelled,
            other => AgentError::Provider {
                message: other.to_string(),
            },
        }
    }
}
