use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;

use super::{
    BodyOptions, BodyPane, PaneError, PaneKind, PaneRefresher, Panes, RevealError, RevealOptions,
    TreeView, Workbench,
};
use crate::model::command::Focus;
use crate::model::node::NodeRef;
use crate::sync::lock;

/// One observable UI effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UiEvent {
    TreeRefreshed,
    Revealed { gnx: String, select: bool, focus: bool },
    RevealFailed { gnx: String },
    BodyShown { gnx: String, text: String, preserve_range: bool },
    PaneRefreshed { pane: PaneKind },
    Focused { target: Focus },
    Notified { message: String },
    DocumentOpened,
    DocumentClosed,
}

impl std::fmt::Display for UiEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiEvent::TreeRefreshed => write!(f, "tree refreshed"),
            UiEvent::Revealed { gnx, select, focus } => {
                write!(f, "revealed {}", gnx)?;
                if *select {
                    write!(f, " +select")?;
                }
                if *focus {
                    write!(f, " +focus")?;
                }
                Ok(())
            }
            UiEvent::RevealFailed { gnx } => write!(f, "reveal of {} failed", gnx),
            UiEvent::BodyShown {
                gnx,
                text,
                preserve_range,
            } => {
                write!(f, "body {} ({} bytes)", gnx, text.len())?;
                if *preserve_range {
                    write!(f, " +range")?;
                }
                Ok(())
            }
            UiEvent::PaneRefreshed { pane } => write!(f, "{} pane refreshed", pane),
            UiEvent::Focused { target } => write!(f, "focus -> {}", target),
            UiEvent::Notified { message } => write!(f, "notice: {}", message),
            UiEvent::DocumentOpened => write!(f, "document opened"),
            UiEvent::DocumentClosed => write!(f, "document closed"),
        }
    }
}

#[derive(Debug)]
struct SurfaceState {
    events: Vec<UiEvent>,
    outline_visible: bool,
    document_shown: bool,
    /// gnx -> remaining reveal failures
    failing: HashMap<String, usize>,
}

/// Implements every UI collaborator and logs the calls it receives
#[derive(Debug)]
pub struct RecordingSurface {
    state: Mutex<SurfaceState>,
}

impl RecordingSurface {
    /// Outline visible, one document shown
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingSurface {
            state: Mutex::new(SurfaceState {
                events: Vec::new(),
                outline_visible: true,
                document_shown: true,
                failing: HashMap::new(),
            }),
        })
    }

    pub fn set_outline_visible(&self, visible: bool) {
        lock(&self.state).outline_visible = visible;
    }

    pub fn set_document_shown(&self, shown: bool) {
        lock(&self.state).document_shown = shown;
    }

    /// Make the next `times` reveals of `gnx` fail
    pub fn fail_reveal(&self, gnx: &str, times: usize) {
        lock(&self.state).failing.insert(gnx.to_string(), times);
    }

    pub fn events(&self) -> Vec<UiEvent> {
        lock(&self.state).events.clone()
    }

    /// Drain the log
    pub fn take_events(&self) -> Vec<UiEvent> {
        std::mem::take(&mut lock(&self.state).events)
    }

    pub fn count(&self, pred: impl Fn(&UiEvent) -> bool) -> usize {
        lock(&self.state).events.iter().filter(|e| pred(e)).count()
    }

    /// This surface in every collaborator slot
    pub fn panes(self: &Arc<Self>) -> Panes {
        let pane = |kind| -> Arc<dyn PaneRefresher> {
            Arc::new(RecordedPane {
                kind,
                surface: Arc::clone(self),
            })
        };
        Panes {
            tree: self.clone(),
            body: self.clone(),
            workbench: self.clone(),
            documents: pane(PaneKind::Documents),
            buttons: pane(PaneKind::Buttons),
            goto: pane(PaneKind::Goto),
            undo: pane(PaneKind::Undo),
            states: pane(PaneKind::States),
        }
    }

    fn record(&self, event: UiEvent) {
        lock(&self.state).events.push(event);
    }
}

struct RecordedPane {
    kind: PaneKind,
    surface: Arc<RecordingSurface>,
}

impl PaneRefresher for RecordedPane {
    fn refresh(&self) -> Result<(), PaneError> {
        self.surface.record(UiEvent::PaneRefreshed { pane: self.kind });
        Ok(())
    }
}

#[async_trait]
impl TreeView for RecordingSurface {
    fn refresh_tree(&self) {
        self.record(UiEvent::TreeRefreshed);
    }

    async fn reveal(&self, node: &NodeRef, options: RevealOptions) -> Result<(), RevealError> {
        tokio::task::yield_now().await;
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if let Some(remaining) = state.failing.get_mut(&node.gnx) {
            if *remaining > 0 {
                *remaining -= 1;
                state.events.push(UiEvent::RevealFailed {
                    gnx: node.gnx.clone(),
                });
                return Err(RevealError::NotFound(node.position_key()));
            }
        }
        state.events.push(UiEvent::Revealed {
            gnx: node.gnx.clone(),
            select: options.select,
            focus: options.focus,
        });
        Ok(())
    }
}

impl BodyPane for RecordingSurface {
    fn show(&self, node: &NodeRef, text: &str, options: BodyOptions) -> Result<(), PaneError> {
        self.record(UiEvent::BodyShown {
            gnx: node.gnx.clone(),
            text: text.to_string(),
            preserve_range: options.preserve_range,
        });
        Ok(())
    }
}

impl Workbench for RecordingSurface {
    fn outline_visible(&self) -> bool {
        lock(&self.state).outline_visible
    }

    fn document_shown(&self) -> bool {
        lock(&self.state).document_shown
    }

    fn document_opened(&self) {
        let mut state = lock(&self.state);
        state.document_shown = true;
        state.events.push(UiEvent::DocumentOpened);
    }

    fn document_closed(&self) {
        let mut state = lock(&self.state);
        state.document_shown = false;
        state.events.push(UiEvent::DocumentClosed);
    }

    fn focus(&self, target: Focus) {
        self.record(UiEvent::Focused { target });
    }

    fn notify(&self, message: &str) {
        self.record(UiEvent::Notified {
            message: message.to_string(),
        });
    }
}
