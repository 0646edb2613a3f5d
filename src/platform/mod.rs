//! Gateway capability seams.
//!
//! The rest of the crate talks to the platform through these traits so that
//! turn orchestration and the chat loop can be exercised against scripted
//! implementations.

pub mod http;

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::api::UserIdentity;

/// Whether a chat call asks the gateway for partial objects or one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Streaming,
    Blocking,
}

/// One model invocation routed through the gateway.
#[derive(Debug, Clone)]
pub struct ChatCall {
    pub model_id: String,
    pub prompt: String,
    pub image_url: Option<String>,
    pub mode: ChatMode,
}

/// The gateway's answer to a chat call.
///
/// A streaming request normally yields `Stream`, but gateways have been seen
/// answering one with a single object; callers decide what that means for
/// them.
pub enum ChatReply {
    Complete(Value),
    Stream(BoxStream<'static, Result<Value, PlatformError>>),
}

/// Failure reported by the gateway or the transport underneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError {
    message: String,
}

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PlatformError {}

/// Chat capability exposed by the platform.
#[async_trait]
pub trait PlatformChat: Send + Sync {
    async fn chat(&self, call: ChatCall) -> Result<ChatReply, PlatformError>;
}

/// Authentication capability exposed by the platform.
#[async_trait]
pub trait PlatformAuth: Send + Sync {
    /// Resolve the identity behind the configured credential. `None` means
    /// the gateway rejected the credential rather than the call failing.
    async fn whoami(&self) -> Result<Option<UserIdentity>, PlatformError>;

    /// Invalidate the configured credential server-side.
    async fn sign_out(&self) -> Result<(), PlatformError>;
}
