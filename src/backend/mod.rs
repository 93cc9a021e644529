//! `InferenceBackend` (§4.8): `Execute(model, messages, params) ->
//! (TokenIterator, Usage)`. The gateway itself is backend-agnostic — this
//! trait is the seam a real model-serving integration plugs into. A mock
//! implementation ships so the gateway is runnable and testable standalone.

mod mock;

pub use mock::MockBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tensorgate_schema::ChatMessage;
use tokio_stream::Stream;

use crate::error::GatewayError;

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, GatewayError>> + Send>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// A running execution: a token stream the caller pulls from. Completion
/// usage is derived by the caller from prompt size and tokens actually
/// observed, so a backend need not track it separately.
pub struct Execution {
    pub tokens: TokenStream,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn execute(&self, request: ExecuteRequest) -> Result<Execution, GatewayError>;

    /// Whether the backend can serve more than one lease against the same
    /// already-loaded model on one device (§4.5's sharing path).
    fn supports_sharing(&self, _model: &str) -> bool {
        true
    }
}
