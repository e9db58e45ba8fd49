use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::{debug, error, trace};

use super::lock;
use super::selection::SelectionSources;
use crate::backend::{ActionResult, BackendClient, BackendError};
use crate::model::command::{Command, Focus};
use crate::model::node::NodeRef;
use crate::model::refresh::RefreshRequest;

/// What a finished run hands to the refresh coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct SettledRun {
    pub focus: Focus,
    pub refresh: RefreshRequest,
    /// Backend selection reported by the last response
    pub node: Option<NodeRef>,
}

/// Receiver of the queue's results
pub trait RefreshSink: Send + Sync {
    /// A run completed; called at most once per run, only with a non-empty refresh
    fn queue_settled(&self, settled: SettledRun);
    /// A backend call failed and the rest of the run was dropped
    fn queue_failed(&self, label: &str, error: &BackendError, settled: SettledRun);
    /// Business-level notice carried by a response
    fn backend_message(&self, message: &str);
    /// Open-document count carried by a response
    fn backend_documents(&self, count: usize);
}

#[derive(Debug, Default)]
pub(crate) struct QueueState {
    commands: VecDeque<Command>,
    busy: bool,
    final_refresh: RefreshRequest,
    final_focus: Focus,
    final_from_outline: bool,
}

impl QueueState {
    /// Take the run's aggregate, resetting it for the next run
    fn take_settled(&mut self, node: Option<NodeRef>) -> SettledRun {
        let focus = match (self.final_focus, self.final_from_outline) {
            (Focus::NoChange, true) => Focus::Outline,
            (focus, _) => focus,
        };
        let settled = SettledRun {
            focus,
            refresh: self.final_refresh,
            node,
        };
        self.final_refresh = RefreshRequest::NONE;
        self.final_focus = Focus::NoChange;
        self.final_from_outline = false;
        settled
    }
}

/// Read-only view of the queue state, for the staleness resolver
#[derive(Debug, Clone, Default)]
pub struct QueueProbe {
    state: Arc<Mutex<QueueState>>,
}

impl QueueProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh accumulated by the running queue so far
    pub fn pending_refresh(&self) -> RefreshRequest {
        lock(&self.state).final_refresh
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.state).busy
    }

    pub fn len(&self) -> usize {
        lock(&self.state).commands.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).commands.is_empty()
    }
}

struct QueueShared {
    state: Arc<Mutex<QueueState>>,
    backend: Arc<dyn BackendClient>,
    sources: Arc<SelectionSources>,
    sink: Arc<dyn RefreshSink>,
}

/// The command queue. Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct CommandQueue {
    shared: Arc<QueueShared>,
}

impl CommandQueue {
    pub fn new(
        probe: &QueueProbe,
        backend: Arc<dyn BackendClient>,
        sources: Arc<SelectionSources>,
        sink: Arc<dyn RefreshSink>,
    ) -> Self {
        CommandQueue {
            shared: Arc::new(QueueShared {
                state: Arc::clone(&probe.state),
                backend,
                sources,
                sink,
            }),
        }
    }

    /// Queue a command. Returns false, leaving the queue untouched, when a run
    /// is in motion and the command is bound to an explicit node.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add(&self, command: Command) -> bool {
        {
            let mut state = lock(&self.shared.state);
            if !state.commands.is_empty() && command.node.is_some() {
                debug!(
                    "rejecting {}: bound to a node while {} command(s) are queued",
                    command.label(),
                    state.commands.len()
                );
                return false;
            }
            state.final_focus = command.focus;
            trace!("queued {}", command.label());
            state.commands.push_back(command);
        }
        self.try_start();
        true
    }

    /// Start executing the front command unless a run is already going
    pub fn try_start(&self) {
        {
            let mut state = lock(&self.shared.state);
            if state.commands.is_empty() || state.busy {
                return;
            }
            state.busy = true;
        }
        self.shared.sources.last_received.clear();
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.run().await });
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.shared.state).busy
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.state).commands.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.shared.state).commands.is_empty()
    }
}

/// Outcome of folding one response into the queue
enum Step {
    Next,
    Done,
}

/// One backend call, ready to send
struct Dispatch {
    label: String,
    action: String,
    param: Result<serde_json::Value, serde_json::Error>,
}

impl QueueShared {
    async fn run(&self) {
        loop {
            let Some(dispatch) = self.begin_front() else {
                return;
            };
            let outcome = match dispatch.param {
                Ok(param) => self.backend.execute(&dispatch.action, param).await,
                Err(e) => Err(BackendError::from(e)),
            };
            let step = match outcome {
                Ok(result) => self.complete(result),
                Err(e) => {
                    self.fail(&dispatch.label, &e);
                    self.finish_run()
                }
            };
            if matches!(step, Step::Done) {
                return;
            }
        }
    }

    /// Resolve the front command's target and fold its intent into the run
    fn begin_front(&self) -> Option<Dispatch> {
        let mut state = lock(&self.state);
        let Some(command) = state.commands.front().cloned() else {
            state.busy = false;
            return None;
        };

        let target = command
            .node
            .clone()
            .or_else(|| self.sources.last_received.node())
            .or_else(|| self.sources.last_selected.node());

        state.final_refresh.union(&command.refresh);
        state.final_focus = command.focus;
        state.final_from_outline = command.from_outline;

        debug!(
            "executing {} on {}",
            command.label(),
            target
                .as_ref()
                .map_or_else(|| "backend selection".to_string(), |n| n.to_string())
        );
        Some(Dispatch {
            label: command.label().to_string(),
            action: command.action.clone(),
            param: command.parameter(target.as_ref()),
        })
    }

    fn complete(&self, result: ActionResult) -> Step {
        if let Some(count) = result.opened_documents {
            self.sink.backend_documents(count);
        }
        if let Some(message) = &result.message {
            self.sink.backend_message(message);
        }

        let settled = {
            let mut state = lock(&self.state);
            state.commands.pop_front();
            if state.commands.is_empty() {
                Some(state.take_settled(result.node.clone()))
            } else {
                None
            }
        };

        match settled {
            Some(settled) => {
                self.sources.last_received.clear();
                if settled.refresh.is_empty() {
                    trace!("run finished with nothing to refresh");
                } else {
                    self.sink.queue_settled(settled);
                }
                self.finish_run()
            }
            None => {
                self.sources.last_received.set(result.node);
                Step::Next
            }
        }
    }

    fn fail(&self, label: &str, e: &BackendError) {
        let settled = {
            let mut state = lock(&self.state);
            let dropped = state.commands.len().saturating_sub(1);
            state.commands.clear();
            if dropped > 0 {
                error!("{} failed: {}; dropping {} queued command(s)", label, e, dropped);
            } else {
                error!("{} failed: {}", label, e);
            }
            let mut settled = state.take_settled(None);
            settled.refresh.tree = true;
            settled
        };
        self.sources.last_received.clear();
        self.sink.queue_failed(label, e, settled);
    }

    /// Clear busy once the hand-off is done. Commands admitted while the
    /// sink was being notified start a fresh run on this same task.
    fn finish_run(&self) -> Step {
        let mut state = lock(&self.state);
        if state.commands.is_empty() {
            state.busy = false;
            Step::Done
        } else {
            debug!("{} command(s) arrived during hand-off", state.commands.len());
            Step::Next
        }
    }
}
