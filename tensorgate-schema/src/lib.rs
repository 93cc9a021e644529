pub mod auth;
pub mod chat;
pub mod error;
pub mod models;

pub use auth::{JwkKey, JwksResponse, LoginRequest, RefreshRequest, RevokeRequest, TokenPair};
pub use chat::{
    ChatChoice, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
    ChunkChoice, Delta, Usage,
};
pub use error::{ApiErrorBody, ApiErrorObject};
pub use models::{ModelList, ModelObject};
