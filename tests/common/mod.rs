//! Shared harness for the engine scenario tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;

use outline_bridge::backend::{ActionResult, BackendClient, BackendError, actions};
use outline_bridge::model::{EngineConfig, NodeRef};
use outline_bridge::sync::OutlineSession;
use outline_bridge::ui::RecordingSurface;

type Reply = oneshot::Sender<Result<ActionResult, BackendError>>;

/// A backend call as the test saw it
#[derive(Debug, Clone)]
pub struct Call {
    pub action: String,
    pub param: Value,
}

impl Call {
    /// gnx of the `node` parameter, if any
    pub fn target(&self) -> Option<&str> {
        self.param.get("node")?.get("gnx")?.as_str()
    }
}

/// Backend whose answers the test hands out one at a time.
///
/// Actions in the `auto` set are answered immediately: `get_body` from the
/// bodies table, anything else with an empty result.
pub struct GatedBackend {
    calls: Mutex<Vec<Call>>,
    waiting: Mutex<VecDeque<Reply>>,
    auto: HashSet<&'static str>,
    bodies: Mutex<HashMap<String, String>>,
}

impl GatedBackend {
    /// Body and state reads answer on their own
    pub fn new() -> Arc<Self> {
        Self::with_auto(&[actions::GET_BODY, actions::GET_STATES])
    }

    /// Every call waits for the test
    pub fn gating_everything() -> Arc<Self> {
        Self::with_auto(&[])
    }

    fn with_auto(auto: &[&'static str]) -> Arc<Self> {
        Arc::new(GatedBackend {
            calls: Mutex::new(Vec::new()),
            waiting: Mutex::new(VecDeque::new()),
            auto: auto.iter().copied().collect(),
            bodies: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_body(&self, gnx: &str, text: &str) {
        self.bodies.lock().unwrap().insert(gnx.to_string(), text.to_string());
    }

    /// Calls that had to wait for the test, in arrival order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.action).collect()
    }

    /// Poll until at least `n` gated calls have arrived. Sleeps rather than
    /// yields so paused test time can advance through debounce windows.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls.lock().unwrap().len() < n {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    }

    /// Answer the oldest waiting call. False when nothing is waiting.
    pub fn release(&self, result: Result<ActionResult, BackendError>) -> bool {
        match self.waiting.lock().unwrap().pop_front() {
            Some(reply) => reply.send(result).is_ok(),
            None => false,
        }
    }

    pub fn release_node(&self, node: &NodeRef) -> bool {
        self.release(Ok(ActionResult::with_node(node.clone())))
    }

    fn body_for(&self, param: &Value) -> ActionResult {
        let gnx = param
            .get("node")
            .and_then(|n| n.get("gnx"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let body = self.bodies.lock().unwrap().get(gnx).cloned().unwrap_or_default();
        ActionResult {
            payload: serde_json::json!({ "body": body }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl BackendClient for GatedBackend {
    async fn execute(&self, action: &str, param: Value) -> Result<ActionResult, BackendError> {
        if self.auto.contains(action) {
            if action == actions::GET_BODY {
                return Ok(self.body_for(&param));
            }
            return Ok(ActionResult::default());
        }

        let (tx, rx) = oneshot::channel();
        self.calls.lock().unwrap().push(Call {
            action: action.to_string(),
            param,
        });
        self.waiting.lock().unwrap().push_back(tx);
        rx.await.unwrap_or(Err(BackendError::Disconnected))
    }
}

/// A session over `backend` with default settings and a recording surface
pub fn session_with(
    backend: Arc<dyn BackendClient>,
) -> (Arc<OutlineSession>, Arc<RecordingSurface>) {
    let surface = RecordingSurface::new();
    let session = OutlineSession::new(backend, surface.panes(), &EngineConfig::default());
    (Arc::new(session), surface)
}

pub fn node(gnx: &str) -> NodeRef {
    NodeRef::top_level(gnx, 0, gnx.to_uppercase())
}

/// Long enough for every default debounce window to close
pub async fn quiesce() {
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
}
