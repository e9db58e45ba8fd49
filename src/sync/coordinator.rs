use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::{debug, error, warn};
use serde::Serialize;

use super::clock::Stamp;
use super::command_queue::{RefreshSink, SettledRun};
use super::debounce::Debouncer;
use super::lock;
use super::reveal::RevealSerializer;
use super::selection::SelectionSources;
use super::staleness::StalenessResolver;
use crate::backend::{BackendClient, BackendError, actions};
use crate::model::command::{Command, Focus};
use crate::model::config::EngineConfig;
use crate::model::node::NodeRef;
use crate::model::refresh::RefreshRequest;
use crate::ui::{BodyOptions, PaneKind, Panes, RevealOptions};

/// Pass reports kept for inspection
pub const PASS_HISTORY: usize = 128;

/// What a pass did with the outline pane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutlineAction {
    /// Redrew the whole tree
    Tree,
    /// Revealed a single node
    Reveal,
    /// Left the outline alone and fed the body directly
    BodyOnly,
    None,
    /// No document open; the pass stopped early
    Closed,
}

impl std::fmt::Display for OutlineAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutlineAction::Tree => "tree",
            OutlineAction::Reveal => "reveal",
            OutlineAction::BodyOnly => "body-only",
            OutlineAction::None => "none",
            OutlineAction::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Summary of one launch pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub focus: Focus,
    /// Flags consumed by the pass
    pub flags: RefreshRequest,
    /// gnx of the node the pass targeted
    pub node: Option<String>,
    pub outline: OutlineAction,
}

impl std::fmt::Display for PassReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] outline={} focus={} node={}",
            self.flags,
            self.outline,
            self.focus,
            self.node.as_deref().unwrap_or("-")
        )
    }
}

#[derive(Debug, Default)]
struct Pending {
    focus: Focus,
    flags: RefreshRequest,
    node: Option<NodeRef>,
    preserve_range: bool,
    /// Bumped each time `preserve_range` is set
    preserve_epoch: u64,
    /// Last node the backend reported through a settled run
    server_node: Option<NodeRef>,
    /// Open-document count last reported by the backend
    documents: Option<usize>,
    scheduled: bool,
    running: bool,
    /// The most recent passes, oldest first
    history: VecDeque<PassReport>,
    passes: usize,
}

/// Everything a pass reads, taken in one critical section
struct PassInput {
    focus: Focus,
    flags: RefreshRequest,
    node: Option<NodeRef>,
    fallback: Option<NodeRef>,
    preserve_range: bool,
    preserve_epoch: u64,
    documents: Option<usize>,
}

struct CoordinatorShared {
    pending: Mutex<Pending>,
    sources: Arc<SelectionSources>,
    resolver: StalenessResolver,
    backend: Arc<dyn BackendClient>,
    panes: Panes,
    reveals: RevealSerializer,
    debouncer: Debouncer,
    pass_lock: tokio::sync::Mutex<()>,
    retry_reveal: bool,
}

/// The refresh coordinator. Cheap to clone; clones share one coordinator.
#[derive(Clone)]
pub struct RefreshCoordinator {
    shared: Arc<CoordinatorShared>,
}

impl RefreshCoordinator {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        panes: Panes,
        sources: Arc<SelectionSources>,
        resolver: StalenessResolver,
        config: &EngineConfig,
    ) -> Self {
        RefreshCoordinator {
            shared: Arc::new(CoordinatorShared {
                pending: Mutex::new(Pending::default()),
                sources,
                resolver,
                backend,
                panes,
                reveals: RevealSerializer::new(),
                debouncer: Debouncer::new(config.refresh.debounce()),
                pass_lock: tokio::sync::Mutex::new(()),
                retry_reveal: config.reveal.retry_with_tree_refresh,
            }),
        }
    }

    /// Record refresh intent and restart the debounce window.
    ///
    /// `focus` overwrites the pending focus; `flags` are unioned in. A `node`
    /// becomes the pass target and stamps `node_to_reveal`; without one the
    /// pending target is cleared. `preserve_range` applies to the next pass.
    ///
    /// Must be called from within a tokio runtime.
    pub fn setup_refresh(
        &self,
        focus: Focus,
        flags: RefreshRequest,
        node: Option<NodeRef>,
        preserve_range: bool,
    ) {
        {
            let mut pending = lock(&self.shared.pending);
            pending.focus = focus;
            pending.flags.union(&flags);
            if preserve_range {
                pending.preserve_range = true;
                pending.preserve_epoch += 1;
            }
            match node {
                Some(node) => {
                    self.shared.sources.node_to_reveal.set(Some(node.clone()));
                    pending.node = Some(node);
                }
                None => {
                    self.shared.sources.node_to_reveal.clear();
                    pending.node = None;
                }
            }
            pending.scheduled = true;
        }
        let coordinator = self.clone();
        self.shared.debouncer.call(async move {
            coordinator.launch().await;
        });
    }

    /// Flags waiting for the next pass
    pub fn pending_flags(&self) -> RefreshRequest {
        lock(&self.shared.pending).flags
    }

    pub fn last_pass(&self) -> Option<PassReport> {
        lock(&self.shared.pending).history.back().cloned()
    }

    /// Up to [`PASS_HISTORY`] of the latest passes, oldest first
    pub fn pass_history(&self) -> Vec<PassReport> {
        lock(&self.shared.pending).history.iter().cloned().collect()
    }

    /// Number of passes run so far
    pub fn passes(&self) -> usize {
        lock(&self.shared.pending).passes
    }

    /// No pass scheduled or running
    pub fn is_idle(&self) -> bool {
        let pending = lock(&self.shared.pending);
        !pending.scheduled && !pending.running
    }

    /// Run one pass now, consuming everything pending
    pub async fn launch(&self) -> PassReport {
        let _pass = self.shared.pass_lock.lock().await;
        let input = self.begin_pass();

        let report = self.run_pass(&input).await;

        let mut pending = lock(&self.shared.pending);
        if pending.preserve_epoch == input.preserve_epoch {
            pending.preserve_range = false;
        }
        pending.running = false;
        pending.passes += 1;
        if pending.history.len() == PASS_HISTORY {
            pending.history.pop_front();
        }
        pending.history.push_back(report.clone());
        debug!("refresh pass {}: {}", pending.passes, report);
        report
    }

    fn begin_pass(&self) -> PassInput {
        let mut pending = lock(&self.shared.pending);
        pending.scheduled = false;
        pending.running = true;
        let node = pending.node.take();
        let fallback = pending.server_node.clone();
        PassInput {
            focus: std::mem::take(&mut pending.focus),
            flags: std::mem::take(&mut pending.flags),
            node,
            fallback,
            preserve_range: pending.preserve_range,
            preserve_epoch: pending.preserve_epoch,
            documents: pending.documents,
        }
    }

    async fn run_pass(&self, input: &PassInput) -> PassReport {
        let panes = &self.shared.panes;
        let workbench = &panes.workbench;
        let flags = input.flags;
        let focus = input.focus;
        let mut report = PassReport {
            focus,
            flags,
            node: None,
            outline: OutlineAction::None,
        };

        match input.documents {
            Some(0) => {
                if workbench.document_shown() {
                    debug!("backend has no open document; closing");
                    workbench.document_closed();
                }
                report.outline = OutlineAction::Closed;
                return report;
            }
            Some(_) if !workbench.document_shown() => {
                debug!("backend opened a document");
                workbench.document_opened();
            }
            _ => {}
        }

        let options = RevealOptions {
            select: true,
            focus: focus == Focus::Outline,
            expand: false,
        };
        let outline_shown = workbench.outline_visible() || focus == Focus::Outline;
        let target = input
            .node
            .clone()
            .or_else(|| input.fallback.clone())
            .or_else(|| self.shared.sources.last_selected.node());
        report.node = target.as_ref().map(|n| n.gnx.clone());

        let mut revealed = false;
        if flags.tree {
            panes.tree.refresh_tree();
            report.outline = OutlineAction::Tree;
            if let Some(target) = &target {
                if outline_shown {
                    revealed = self.reveal_with_retry(target, options).await;
                }
                if flags.body {
                    self.apply_body(target, input).await;
                }
            }
        } else if let (true, Some(node)) = (flags.node, &input.node) {
            // the tree keeps its selection while hidden; focus needs it shown
            let options = RevealOptions {
                focus: options.focus && outline_shown,
                ..options
            };
            report.outline = OutlineAction::Reveal;
            revealed = self.reveal_with_retry(node, options).await;
            if flags.body {
                self.apply_body(node, input).await;
            }
        } else if flags.body {
            if let Some(target) = &target {
                report.outline = OutlineAction::BodyOnly;
                self.apply_body(target, input).await;
            }
        }

        for kind in PaneKind::ALL {
            let wanted = match kind {
                PaneKind::Documents => flags.documents,
                PaneKind::Buttons => flags.buttons,
                PaneKind::Goto => flags.goto,
                PaneKind::Undo => flags.undo,
                PaneKind::States => flags.states,
            };
            if wanted {
                if let Err(e) = panes.secondary(kind).refresh() {
                    warn!("{} pane: {}", kind, e);
                }
            }
        }

        match focus {
            Focus::NoChange => {}
            Focus::Outline if revealed => {}
            other => workbench.focus(other),
        }
        report
    }

    /// Reveal through the serializer; on failure redraw the tree and retry once
    async fn reveal_with_retry(&self, node: &NodeRef, options: RevealOptions) -> bool {
        let tree = Arc::clone(&self.shared.panes.tree);
        let first = self
            .shared
            .reveals
            .safe_reveal(Arc::clone(&tree), node.clone(), options)
            .wait()
            .await;
        let e = match first {
            Ok(()) => return true,
            Err(e) => e,
        };
        if !self.shared.retry_reveal {
            warn!("reveal of {} failed: {}", node, e);
            return false;
        }

        warn!("reveal of {} failed: {}; redrawing tree and retrying", node, e);
        tree.refresh_tree();
        let retry = self
            .shared
            .reveals
            .safe_reveal(tree, node.clone(), options)
            .wait()
            .await;
        match retry {
            Ok(()) => true,
            Err(e) => {
                error!("reveal of {} failed after tree refresh: {}", node, e);
                false
            }
        }
    }

    /// Fetch the node's body and show it, unless a newer selection took over
    async fn apply_body(&self, node: &NodeRef, input: &PassInput) {
        let ts = Stamp::now();
        let param = match Command::new(actions::GET_BODY).parameter(Some(node)) {
            Ok(param) => param,
            Err(e) => {
                warn!("could not encode body request for {}: {}", node, e);
                return;
            }
        };
        let result = match self.shared.backend.execute(actions::GET_BODY, param).await {
            Ok(result) => result,
            Err(e) => {
                warn!("could not fetch body of {}: {}", node, e);
                return;
            }
        };
        if !self.shared.resolver.is_node_still_valid(&node.gnx, ts) {
            debug!("discarding stale body of {}", node);
            return;
        }

        let options = BodyOptions {
            preserve_range: input.preserve_range,
            scroll: input.flags.scroll,
            exclude_detached: input.flags.exclude_detached,
            focus: input.focus == Focus::Body,
        };
        let text = result.body_text().unwrap_or_default();
        if let Err(e) = self.shared.panes.body.show(node, text, options) {
            warn!("body pane: {}", e);
        }
    }

    fn note_server_node(&self, node: Option<&NodeRef>) {
        if let Some(node) = node {
            lock(&self.shared.pending).server_node = Some(node.clone());
        }
    }
}

impl RefreshSink for RefreshCoordinator {
    fn queue_settled(&self, settled: SettledRun) {
        self.note_server_node(settled.node.as_ref());
        self.setup_refresh(settled.focus, settled.refresh, settled.node, false);
    }

    fn queue_failed(&self, label: &str, error: &BackendError, settled: SettledRun) {
        self.shared
            .panes
            .workbench
            .notify(&format!("{} failed: {}", label, error));
        self.setup_refresh(settled.focus, settled.refresh, settled.node, false);
    }

    fn backend_message(&self, message: &str) {
        self.shared.panes.workbench.notify(message);
    }

    fn backend_documents(&self, count: usize) {
        lock(&self.shared.pending).documents = Some(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, memory::OutlineSeed};
    use crate::sync::command_queue::QueueProbe;
    use crate::ui::{RecordingSurface, UiEvent};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn setup() -> (RefreshCoordinator, Arc<RecordingSurface>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::from_seed(&[
            OutlineSeed::new("Alpha").gnx("a").body("alpha text"),
            OutlineSeed::new("Beta").gnx("b").body("beta text"),
        ]));
        let surface = RecordingSurface::new();
        let sources = Arc::new(SelectionSources::new());
        let resolver = StalenessResolver::new(Arc::clone(&sources), QueueProbe::new());
        let coordinator = RefreshCoordinator::new(
            backend.clone(),
            surface.panes(),
            sources,
            resolver,
            &EngineConfig::default(),
        );
        (coordinator, surface, backend)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_pass_with_union_of_flags() {
        let (coordinator, _surface, backend) = setup();
        let b = backend.node_ref("b").unwrap();
        coordinator.setup_refresh(Focus::NoChange, RefreshRequest::body(), None, false);
        coordinator.setup_refresh(
            Focus::NoChange,
            RefreshRequest {
                undo: true,
                ..Default::default()
            },
            None,
            false,
        );
        coordinator.setup_refresh(Focus::Outline, RefreshRequest::node(), Some(b), false);
        settle().await;

        assert_eq!(coordinator.passes(), 1);
        let pass = coordinator.last_pass().unwrap();
        assert_eq!(
            pass.flags,
            RefreshRequest {
                node: true,
                body: true,
                undo: true,
                ..Default::default()
            }
        );
        assert_eq!(pass.focus, Focus::Outline);
        assert_eq!(pass.outline, OutlineAction::Reveal);
        assert!(coordinator.pending_flags().is_empty());
        assert!(coordinator.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tree_refresh_supersedes_single_node_reveal() {
        let (coordinator, surface, backend) = setup();
        let a = backend.node_ref("a").unwrap();
        coordinator.setup_refresh(
            Focus::NoChange,
            RefreshRequest::tree().with(RefreshRequest::node()),
            Some(a),
            false,
        );
        settle().await;

        assert_eq!(
            surface.events(),
            vec![
                UiEvent::TreeRefreshed,
                UiEvent::Revealed {
                    gnx: "a".into(),
                    select: true,
                    focus: false
                },
            ]
        );
        assert_eq!(coordinator.last_pass().unwrap().outline, OutlineAction::Tree);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_outline_feeds_body_directly() {
        let (coordinator, surface, backend) = setup();
        surface.set_outline_visible(false);
        let b = backend.node_ref("b").unwrap();
        coordinator.setup_refresh(
            Focus::NoChange,
            RefreshRequest::node().with(RefreshRequest::body()),
            Some(b),
            false,
        );
        settle().await;

        assert_eq!(
            surface.events(),
            vec![
                UiEvent::Revealed {
                    gnx: "b".into(),
                    select: true,
                    focus: false
                },
                UiEvent::BodyShown {
                    gnx: "b".into(),
                    text: "beta text".into(),
                    preserve_range: false
                },
            ]
        );
        assert_eq!(coordinator.last_pass().unwrap().outline, OutlineAction::Reveal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_outline_node_only_still_reveals() {
        let (coordinator, surface, backend) = setup();
        surface.set_outline_visible(false);
        let b = backend.node_ref("b").unwrap();
        coordinator.setup_refresh(Focus::NoChange, RefreshRequest::node(), Some(b), false);
        settle().await;

        assert_eq!(
            surface.events(),
            vec![UiEvent::Revealed {
                gnx: "b".into(),
                select: true,
                focus: false
            }]
        );
        let pass = coordinator.last_pass().unwrap();
        assert_eq!(pass.outline, OutlineAction::Reveal);
        assert_eq!(pass.node.as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_keeps_latest_passes() {
        let (coordinator, _surface, _backend) = setup();
        for _ in 0..PASS_HISTORY + 5 {
            coordinator.launch().await;
        }
        assert_eq!(coordinator.passes(), PASS_HISTORY + 5);
        assert_eq!(coordinator.pass_history().len(), PASS_HISTORY);
        assert_eq!(coordinator.last_pass().unwrap().outline, OutlineAction::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_document_stops_the_pass() {
        let (coordinator, surface, _backend) = setup();
        coordinator.backend_documents(0);
        coordinator.setup_refresh(Focus::Body, RefreshRequest::structural(), None, false);
        settle().await;

        assert_eq!(surface.events(), vec![UiEvent::DocumentClosed]);
        assert_eq!(coordinator.last_pass().unwrap().outline, OutlineAction::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopened_document_is_set_up_first() {
        let (coordinator, surface, backend) = setup();
        surface.set_document_shown(false);
        coordinator.backend_documents(1);
        coordinator.setup_refresh(Focus::NoChange, RefreshRequest::tree(), backend.selected(), false);
        settle().await;

        let events = surface.events();
        assert_eq!(events[0], UiEvent::DocumentOpened);
        assert_eq!(events[1], UiEvent::TreeRefreshed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_notifies_and_refreshes() {
        let (coordinator, surface, _backend) = setup();
        let settled = SettledRun {
            focus: Focus::NoChange,
            refresh: RefreshRequest::tree(),
            node: None,
        };
        coordinator.queue_failed("Rename", &BackendError::Disconnected, settled);
        settle().await;

        let events = surface.events();
        assert_eq!(
            events[0],
            UiEvent::Notified {
                message: "Rename failed: backend disconnected".into()
            }
        );
        assert!(events.contains(&UiEvent::TreeRefreshed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_preserve_range_is_one_shot() {
        let (coordinator, surface, backend) = setup();
        let a = backend.node_ref("a").unwrap();
        coordinator.setup_refresh(Focus::NoChange, RefreshRequest::body(), Some(a.clone()), true);
        settle().await;
        coordinator.setup_refresh(Focus::NoChange, RefreshRequest::body(), Some(a), false);
        settle().await;

        let ranges: Vec<bool> = surface
            .events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::BodyShown { preserve_range, .. } => Some(preserve_range),
                _ => None,
            })
            .collect();
        assert_eq!(ranges, vec![true, false]);
    }
}
