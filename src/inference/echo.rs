use super::{CallConfig, InferenceClient, ProviderError};
use async_trait::async_trait;

/// Offline backend returning every unit unchanged. Useful to check
/// segmentation and reassembly without spending API calls.
#[derive(Debug, Default)]
pub struct EchoClient;

impl EchoClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InferenceClient for EchoClient {
    async fn transform(&self, text: &str, _config: &CallConfig) -> Result<String, ProviderError> {
        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        "echo"
    }
}
