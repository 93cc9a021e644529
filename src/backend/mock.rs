use super::{ExecuteRequest, Execution, InferenceBackend, TokenStream};
use crate::error::GatewayError;
use async_trait::async_trait;
use futures::stream;

/// Echoes a deterministic, word-tokenized reply derived from the last user
/// message. Exists so the gateway runs and can be exercised end-to-end
/// without wiring a real model-serving integration.
pub struct MockBackend;

#[async_trait]
impl InferenceBackend for MockBackend {
    async fn execute(&self, request: ExecuteRequest) -> Result<Execution, GatewayError> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let reply = format!("You said: {last_user}");
        let tokens: Vec<Result<String, GatewayError>> = reply
            .split_whitespace()
            .map(|w| Ok(format!("{w} ")))
            .collect();

        let stream: TokenStream = Box::pin(stream::iter(tokens));
        Ok(Execution { tokens: stream })
    }
}
