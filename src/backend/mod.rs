pub mod actions;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::node::NodeRef;

pub use memory::MemoryBackend;

/// Error type for backend calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("{action} failed: {message}")]
    Failed { action: String, message: String },
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("no document is open")]
    NoDocument,
    #[error("backend disconnected")]
    Disconnected,
    #[error("could not encode parameter: {0}")]
    Encode(String),
}

impl BackendError {
    pub fn failed(action: &str, message: impl Into<String>) -> Self {
        BackendError::Failed {
            action: action.to_string(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Encode(e.to_string())
    }
}

/// What the backend reports after an action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// The backend's selection after the action
    #[serde(default)]
    pub node: Option<NodeRef>,
    /// Number of documents open in the backend, when reported
    #[serde(default)]
    pub opened_documents: Option<usize>,
    /// Business-level notice for the user, e.g. "not found"
    #[serde(default)]
    pub message: Option<String>,
    /// Action-specific fields
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ActionResult {
    pub fn with_node(node: NodeRef) -> Self {
        ActionResult {
            node: Some(node),
            ..Default::default()
        }
    }

    /// The `body` string of a `get_body` response
    pub fn body_text(&self) -> Option<&str> {
        self.payload.get("body").and_then(|b| b.as_str())
    }
}

/// Asynchronous request/response access to the backend
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn execute(
        &self,
        action: &str,
        param: serde_json::Value,
    ) -> Result<ActionResult, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_text_reads_payload() {
        let result = ActionResult {
            payload: serde_json::json!({ "body": "hello" }),
            ..Default::default()
        };
        assert_eq!(result.body_text(), Some("hello"));
        assert_eq!(ActionResult::default().body_text(), None);
    }

    #[test]
    fn test_error_messages_name_the_action() {
        let e = BackendError::failed("insert_node", "node not found");
        assert_eq!(e.to_string(), "insert_node failed: node not found");
    }
}
