//! Resource action models

use serde::{Deserialize, Serialize};

/// One atomic operation on an engine resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAction {
    /// `pull` or `remove`
    pub action: String,

    /// `image`, `container`, `volume` or `network`
    pub resource: String,

    /// Image reference, or container/volume/network id or name
    pub id: String,
}

impl ResourceAction {
    pub fn new(action: &str, resource: &str, id: &str) -> Self {
        Self {
            action: action.to_string(),
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

/// Outcome of one resource action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceActionResponse {
    pub success: bool,
    pub return_code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

impl ResourceActionResponse {
    /// Build a response, success is derived from the code
    pub fn new(return_code: u16, message: impl Into<String>) -> Self {
        Self {
            success: return_code < 400,
            return_code,
            message: message.into(),
            content: None,
        }
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = Some(content);
        self
    }
}
