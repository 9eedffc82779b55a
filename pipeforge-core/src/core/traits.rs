//! Capability traits consumed by the engine.
//!
//! The engine never talks to a model service directly. Generative stages go
//! through [`Provider`], which implementations back with whatever client and
//! transport they need.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::Result;

/// Speaker of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation
    System,
    /// Caller-supplied content
    User,
    /// Prior model output
    Assistant,
}

/// One `(role, content)` entry of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Who is speaking
    pub role: Role,
    /// Message text, possibly containing `{column}` placeholders
    pub content: String,
}

impl Message {
    /// Create a message with an explicit role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Turns a conversation into generated text.
///
/// `identity` must be a stable fingerprint of everything that changes the
/// output (model, sampling parameters, system prompt) and nothing secret.
/// It is folded into cache keys, so two providers with the same identity
/// are treated as interchangeable.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate a completion for the given messages.
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Deterministic fingerprint of the generation-affecting configuration.
    fn identity(&self) -> String;
}

#[async_trait]
impl<T> Provider for Arc<T>
where
    T: Provider + ?Sized,
{
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        (**self).generate(messages).await
    }

    fn identity(&self) -> String {
        (**self).identity()
    }
}
