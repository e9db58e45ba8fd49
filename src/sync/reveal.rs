use std::sync::{Arc, Mutex};

use log::debug;
use tokio::sync::watch;

use super::lock;
use crate::model::node::NodeRef;
use crate::ui::{RevealError, RevealOptions, TreeView};

type RevealOutcome = Option<Result<(), RevealError>>;

struct RevealRequest {
    tree: Arc<dyn TreeView>,
    node: NodeRef,
    options: RevealOptions,
}

#[derive(Default)]
struct RevealSlot {
    in_flight: Option<watch::Receiver<RevealOutcome>>,
    queued: Option<RevealRequest>,
}

/// Completion of a reveal.
///
/// A request that was coalesced behind an in-flight reveal shares that
/// reveal's handle and sees its outcome.
#[derive(Debug, Clone)]
pub struct RevealHandle {
    rx: watch::Receiver<RevealOutcome>,
}

impl RevealHandle {
    pub async fn wait(mut self) -> Result<(), RevealError> {
        loop {
            let current = (*self.rx.borrow_and_update()).clone();
            if let Some(outcome) = current {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                let last = (*self.rx.borrow()).clone();
                return last.unwrap_or(Err(RevealError::Abandoned));
            }
        }
    }
}

/// Serializes reveals for one call site. Clones share the slot.
#[derive(Clone, Default)]
pub struct RevealSerializer {
    slot: Arc<Mutex<RevealSlot>>,
}

impl RevealSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a reveal now, or queue it behind the one in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn safe_reveal(
        &self,
        tree: Arc<dyn TreeView>,
        node: NodeRef,
        options: RevealOptions,
    ) -> RevealHandle {
        let mut slot = lock(&self.slot);
        if let Some(rx) = slot.in_flight.clone() {
            debug!("reveal of {} waits behind the one in flight", node);
            let request = RevealRequest {
                tree,
                node,
                options,
            };
            if let Some(dropped) = slot.queued.replace(request) {
                debug!("dropping superseded reveal of {}", dropped.node);
            }
            return RevealHandle { rx };
        }

        let (tx, rx) = watch::channel(None);
        slot.in_flight = Some(rx.clone());
        drop(slot);

        let serializer = self.clone();
        let request = RevealRequest {
            tree,
            node,
            options,
        };
        tokio::spawn(async move { serializer.drive(request, tx).await });
        RevealHandle { rx }
    }

    /// No reveal in flight and none queued
    pub fn is_idle(&self) -> bool {
        let slot = lock(&self.slot);
        slot.in_flight.is_none() && slot.queued.is_none()
    }

    async fn drive(&self, first: RevealRequest, first_tx: watch::Sender<RevealOutcome>) {
        let mut request = first;
        let mut tx = first_tx;
        loop {
            let outcome = request.tree.reveal(&request.node, request.options).await;
            if let Err(e) = &outcome {
                debug!("reveal of {} failed: {}", request.node, e);
            }
            tx.send_replace(Some(outcome));

            let next = {
                let mut slot = lock(&self.slot);
                match slot.queued.take() {
                    Some(next) => {
                        let (next_tx, next_rx) = watch::channel(None);
                        slot.in_flight = Some(next_rx);
                        Some((next, next_tx))
                    }
                    None => {
                        slot.in_flight = None;
                        None
                    }
                }
            };
            match next {
                Some((next, next_tx)) => {
                    request = next;
                    tx = next_tx;
                }
                None => return,
            }
        }
    }
}
