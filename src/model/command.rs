use serde::{Deserialize, Serialize};

use super::node::NodeRef;
use super::refresh::RefreshRequest;

/// Where focus should land once an operation settles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Focus {
    #[default]
    NoChange,
    Outline,
    Body,
    Goto,
}

impl std::fmt::Display for Focus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Focus::NoChange => write!(f, "no-change"),
            Focus::Outline => write!(f, "outline"),
            Focus::Body => write!(f, "body"),
            Focus::Goto => write!(f, "goto"),
        }
    }
}

/// A user-issued operation waiting on the command queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Backend action identifier
    pub action: String,
    /// Explicit target. `None` applies to whatever the queue resolves next.
    #[serde(default)]
    pub node: Option<NodeRef>,
    /// Text payload, e.g. a new headline
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub refresh: RefreshRequest,
    #[serde(default)]
    pub focus: Focus,
    /// Issued from the outline pane
    #[serde(default)]
    pub from_outline: bool,
    /// Human-readable name for logs and notices
    #[serde(default)]
    pub name: Option<String>,
}

impl Command {
    pub fn new(action: impl Into<String>) -> Self {
        Command {
            action: action.into(),
            node: None,
            text: None,
            refresh: RefreshRequest::NONE,
            focus: Focus::NoChange,
            from_outline: false,
            name: None,
        }
    }

    pub fn with_node(mut self, node: NodeRef) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn refresh(mut self, refresh: RefreshRequest) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn focus(mut self, focus: Focus) -> Self {
        self.focus = focus;
        self
    }

    pub fn from_outline(mut self, from_outline: bool) -> Self {
        self.from_outline = from_outline;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name for logs: the explicit name, else the action id
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.action)
    }

    /// Build the backend parameter for this command applied to `target`.
    ///
    /// Shape: `{ "node": NodeRef?, "text": String? }`.
    pub fn parameter(&self, target: Option<&NodeRef>) -> Result<serde_json::Value, serde_json::Error> {
        let mut param = serde_json::Map::new();
        if let Some(node) = target {
            param.insert("node".into(), serde_json::to_value(node)?);
        }
        if let Some(text) = &self.text {
            param.insert("text".into(), serde_json::Value::String(text.clone()));
        }
        Ok(serde_json::Value::Object(param))
    }
}
