//! Inference backends: the capability that turns one unit of text into one
//! unit of output text.

mod call_config;
mod chat;
mod echo;

pub use call_config::CallConfig;
pub use chat::ChatCompletionsClient;
pub use echo::EchoClient;

use crate::config::{ProviderConfig, ProviderKind};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a single inference call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API key not found in environment variable {0}")]
    MissingCredentials(String),

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("Server returned error status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Response contained no text")]
    EmptyResponse,
}

/// Transforms one unit of text. Implementations must be stateless from the
/// pipeline's point of view; the scheduler calls them concurrently.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn transform(&self, text: &str, config: &CallConfig) -> Result<String, ProviderError>;

    /// Short label used in logs.
    fn name(&self) -> &str;
}

/// Build the backend selected by the provider configuration.
pub fn client_from_config(config: &ProviderConfig) -> Result<Arc<dyn InferenceClient>, ProviderError> {
    match config.kind {
        ProviderKind::ChatCompletions => Ok(Arc::new(ChatCompletionsClient::from_config(config)?)),
        ProviderKind::Echo => Ok(Arc::new(EchoClient::new())),
    }
}
