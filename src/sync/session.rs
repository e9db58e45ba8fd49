use std::sync::Arc;
use std::time::Duration;

use log::debug;

use super::clock::Stamp;
use super::command_queue::{CommandQueue, QueueProbe};
use super::coordinator::{PassReport, RefreshCoordinator};
use super::selection::SelectionSources;
use super::staleness::StalenessResolver;
use crate::backend::{ActionResult, BackendClient, BackendError, actions};
use crate::model::command::{Command, Focus};
use crate::model::config::EngineConfig;
use crate::model::node::NodeRef;
use crate::model::refresh::RefreshRequest;
use crate::ui::Panes;

const SETTLE_POLL: Duration = Duration::from_millis(5);

/// What a UI selection ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The body and states will be refreshed for the node
    Applied,
    /// A newer selection of the same node will do the refresh
    Reselected,
    /// A newer selection of another node superseded this one
    Stale,
}

/// One client's engine: queue, coordinator and the selection sources they
/// share, wired to a backend and a set of panes.
pub struct OutlineSession {
    backend: Arc<dyn BackendClient>,
    sources: Arc<SelectionSources>,
    resolver: StalenessResolver,
    coordinator: RefreshCoordinator,
    queue: CommandQueue,
    pane_window: Duration,
}

impl OutlineSession {
    /// Secondary panes are wrapped in their configured debounces here
    pub fn new(backend: Arc<dyn BackendClient>, panes: Panes, config: &EngineConfig) -> Self {
        let panes = panes.debounced(&config.panes);
        let sources = Arc::new(SelectionSources::new());
        let probe = QueueProbe::new();
        let resolver = StalenessResolver::new(Arc::clone(&sources), probe.clone());
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&backend),
            panes,
            Arc::clone(&sources),
            resolver.clone(),
            config,
        );
        let queue = CommandQueue::new(
            &probe,
            Arc::clone(&backend),
            Arc::clone(&sources),
            Arc::new(coordinator.clone()),
        );
        let p = &config.panes;
        let widest = [p.documents_ms, p.buttons_ms, p.goto_ms, p.undo_ms, p.states_ms]
            .into_iter()
            .max()
            .unwrap_or_default();
        OutlineSession {
            backend,
            sources,
            resolver,
            coordinator,
            queue,
            pane_window: Duration::from_millis(widest + 1),
        }
    }

    /// Submit a command. See [`CommandQueue::add`].
    pub fn add(&self, command: Command) -> bool {
        self.queue.add(command)
    }

    pub fn setup_refresh(
        &self,
        focus: Focus,
        flags: RefreshRequest,
        node: Option<NodeRef>,
        preserve_range: bool,
    ) {
        self.coordinator.setup_refresh(focus, flags, node, preserve_range);
    }

    /// A refresh the backend asked for on its own
    pub fn backend_push(&self, focus: Focus, flags: RefreshRequest, node: Option<NodeRef>) {
        debug!("backend push: {} focus={}", flags, focus);
        self.coordinator.setup_refresh(focus, flags, node, false);
    }

    /// The user picked `node` in the outline.
    ///
    /// Selection goes to the backend directly, bypassing the queue. Once it
    /// answers, the body is refreshed unless a newer selection took over.
    pub async fn select_node(&self, node: NodeRef) -> Result<SelectOutcome, BackendError> {
        let ts: Stamp = self.sources.last_selected.set(Some(node.clone()));
        let param = Command::new(actions::SELECT_NODE).parameter(Some(&node))?;
        let result: ActionResult = self.backend.execute(actions::SELECT_NODE, param).await?;

        if self.resolver.is_node_reselected(&node.gnx, ts) {
            debug!("{} was selected again; leaving the refresh to that selection", node);
            return Ok(SelectOutcome::Reselected);
        }
        if !self.resolver.is_node_still_valid(&node.gnx, ts) {
            debug!("discarding stale selection of {}", node);
            return Ok(SelectOutcome::Stale);
        }
        let flags = RefreshRequest {
            body: true,
            states: true,
            undo: true,
            ..RefreshRequest::NONE
        };
        self.coordinator
            .setup_refresh(Focus::NoChange, flags, result.node.or(Some(node)), false);
        Ok(SelectOutcome::Applied)
    }

    pub fn is_busy(&self) -> bool {
        self.queue.is_busy()
    }

    /// Wait until the queue is idle, no refresh pass is pending and the
    /// secondary panes have had their debounce window.
    pub async fn settle(&self) {
        while self.queue.is_busy() || !self.coordinator.is_idle() {
            tokio::time::sleep(SETTLE_POLL).await;
        }
        tokio::time::sleep(self.pane_window).await;
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn resolver(&self) -> &StalenessResolver {
        &self.resolver
    }

    pub fn sources(&self) -> &SelectionSources {
        &self.sources
    }

    pub fn last_pass(&self) -> Option<PassReport> {
        self.coordinator.last_pass()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, memory::OutlineSeed};
    use crate::ui::{PaneKind, RecordingSurface, UiEvent};

    fn session() -> (OutlineSession, Arc<RecordingSurface>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::from_seed(&[
            OutlineSeed::new("Alpha").gnx("a").body("alpha text"),
            OutlineSeed::new("Beta").gnx("b").body("beta text"),
        ]));
        let surface = RecordingSurface::new();
        let session = OutlineSession::new(backend.clone(), surface.panes(), &EngineConfig::default());
        (session, surface, backend)
    }

    #[tokio::test(start_paused = true)]
    async fn test_selecting_a_node_shows_its_body() {
        let (session, surface, backend) = session();
        let b = backend.node_ref("b").unwrap();
        let outcome = session.select_node(b).await.unwrap();
        assert_eq!(outcome, SelectOutcome::Applied);
        session.settle().await;

        assert_eq!(backend.selected().unwrap().gnx, "b");
        let events = surface.events();
        assert!(events.contains(&UiEvent::BodyShown {
            gnx: "b".into(),
            text: "beta text".into(),
            preserve_range: false
        }));
        assert!(events.contains(&UiEvent::PaneRefreshed { pane: PaneKind::Undo }));
        assert!(events.contains(&UiEvent::PaneRefreshed { pane: PaneKind::States }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_push_goes_straight_to_the_coordinator() {
        let (session, surface, _backend) = session();
        session.backend_push(
            Focus::NoChange,
            RefreshRequest {
                buttons: true,
                ..Default::default()
            },
            None,
        );
        session.settle().await;
        assert_eq!(
            surface.events(),
            vec![UiEvent::PaneRefreshed {
                pane: PaneKind::Buttons
            }]
        );
        assert_eq!(session.coordinator().passes(), 1);
    }
}
