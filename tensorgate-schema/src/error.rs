//! Stable error envelope returned by every failing endpoint.
//!
//! `{"error": {"type": "...", "message": "...", "code": "..."}}`

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(rename = "error")]
    pub inner: ApiErrorObject,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorObject {
    pub r#type: String,
    pub message: String,
    pub code: String,
}

impl ApiErrorBody {
    pub fn new(kind: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            inner: ApiErrorObject {
                r#type: kind.into(),
                message: message.into(),
                code: code.into(),
            },
        }
    }
}
