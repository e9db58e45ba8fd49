pub mod debounced;
pub mod recording;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::command::Focus;
use crate::model::config::PaneDebounceConfig;
use crate::model::node::NodeRef;

pub use debounced::DebouncedPane;
pub use recording::{RecordingSurface, UiEvent};

/// Error type for a failed reveal
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevealError {
    #[error("node {0} is not in the tree")]
    NotFound(String),
    #[error("reveal was abandoned before it finished")]
    Abandoned,
}

/// Error type for a pane that could not be redrawn
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaneError {
    #[error("{0} pane is not available")]
    Unavailable(String),
    #[error("{pane} pane failed: {message}")]
    Failed { pane: String, message: String },
}

/// The secondary panes, refreshed per flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaneKind {
    Documents,
    Buttons,
    Goto,
    Undo,
    States,
}

impl PaneKind {
    pub const ALL: [PaneKind; 5] = [
        PaneKind::Documents,
        PaneKind::Buttons,
        PaneKind::Goto,
        PaneKind::Undo,
        PaneKind::States,
    ];
}

impl fmt::Display for PaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaneKind::Documents => "documents",
            PaneKind::Buttons => "buttons",
            PaneKind::Goto => "goto",
            PaneKind::Undo => "undo",
            PaneKind::States => "states",
        };
        f.write_str(name)
    }
}

/// How a tree reveal should treat the revealed node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealOptions {
    pub select: bool,
    pub focus: bool,
    pub expand: bool,
}

/// How the body pane should show new content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyOptions {
    /// Keep the current selection range in the editor
    pub preserve_range: bool,
    /// Restore the stored scroll position
    pub scroll: bool,
    /// Leave detached body views alone
    pub exclude_detached: bool,
    /// Move keyboard focus into the body
    pub focus: bool,
}

/// A pane that can be told to redraw itself. Fire-and-forget.
pub trait PaneRefresher: Send + Sync {
    fn refresh(&self) -> Result<(), PaneError>;
}

/// The outline tree widget
#[async_trait]
pub trait TreeView: Send + Sync {
    /// Redraw from the root
    fn refresh_tree(&self);

    /// Scroll to `node`, optionally selecting, focusing and expanding it.
    /// Not re-entrant: callers go through [`crate::sync::RevealSerializer`].
    async fn reveal(&self, node: &NodeRef, options: RevealOptions) -> Result<(), RevealError>;
}

/// The body text editor
pub trait BodyPane: Send + Sync {
    fn show(&self, node: &NodeRef, text: &str, options: BodyOptions) -> Result<(), PaneError>;
}

/// Window-level state and actions
pub trait Workbench: Send + Sync {
    /// The outline pane is currently on screen
    fn outline_visible(&self) -> bool;
    /// The UI currently shows an open document
    fn document_shown(&self) -> bool;
    fn document_opened(&self);
    fn document_closed(&self);
    fn focus(&self, target: Focus);
    /// Transient user-visible notice
    fn notify(&self, message: &str);
}

/// Every collaborator the refresh coordinator talks to
#[derive(Clone)]
pub struct Panes {
    pub tree: Arc<dyn TreeView>,
    pub body: Arc<dyn BodyPane>,
    pub workbench: Arc<dyn Workbench>,
    pub documents: Arc<dyn PaneRefresher>,
    pub buttons: Arc<dyn PaneRefresher>,
    pub goto: Arc<dyn PaneRefresher>,
    pub undo: Arc<dyn PaneRefresher>,
    pub states: Arc<dyn PaneRefresher>,
}

impl Panes {
    pub fn secondary(&self, kind: PaneKind) -> &Arc<dyn PaneRefresher> {
        match kind {
            PaneKind::Documents => &self.documents,
            PaneKind::Buttons => &self.buttons,
            PaneKind::Goto => &self.goto,
            PaneKind::Undo => &self.undo,
            PaneKind::States => &self.states,
        }
    }

    /// Wrap each secondary pane in its own trailing debounce
    pub fn debounced(self, config: &PaneDebounceConfig) -> Panes {
        let wrap = |kind: PaneKind, inner: Arc<dyn PaneRefresher>, ms: u64| -> Arc<dyn PaneRefresher> {
            Arc::new(DebouncedPane::new(
                kind,
                inner,
                std::time::Duration::from_millis(ms),
            ))
        };
        Panes {
            documents: wrap(PaneKind::Documents, self.documents, config.documents_ms),
            buttons: wrap(PaneKind::Buttons, self.buttons, config.buttons_ms),
            goto: wrap(PaneKind::Goto, self.goto, config.goto_ms),
            undo: wrap(PaneKind::Undo, self.undo, config.undo_ms),
            states: wrap(PaneKind::States, self.states, config.states_ms),
            tree: self.tree,
            body: self.body,
            workbench: self.workbench,
        }
    }
}
