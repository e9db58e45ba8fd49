use std::sync::Arc;

use super::clock::Stamp;
use super::command_queue::QueueProbe;
use super::selection::{Selection, SelectionSources};
use crate::model::refresh::RefreshRequest;

/// Snapshot of everything the resolver reads
#[derive(Debug, Clone, Default)]
pub struct StalenessView {
    pub last_received: Selection,
    pub node_to_reveal: Selection,
    pub last_selected: Selection,
    /// Refresh accumulated by the running queue so far
    pub queue_refresh: RefreshRequest,
}

impl StalenessView {
    /// The source that currently speaks for "the selected node".
    ///
    /// Precedence is last_selected < node_to_reveal < last_received, and a
    /// higher source only takes over when its stamp is newer. The queue
    /// source counts only while a tree or node refresh is still owed.
    pub fn authority(&self) -> Option<&Selection> {
        let mut best = Some(&self.last_selected).filter(|s| s.node.is_some());
        for candidate in [&self.node_to_reveal, &self.last_received] {
            if candidate.node.is_none() {
                continue;
            }
            if std::ptr::eq(candidate, &self.last_received) && !self.queue_refresh.touches_outline() {
                continue;
            }
            if best.is_none_or(|b| candidate.stamp > b.stamp) {
                best = Some(candidate);
            }
        }
        best
    }
}

/// False when a newer selection has superseded work started at `ts`
pub fn is_timestamp_still_valid(view: &StalenessView, ts: Stamp) -> bool {
    !view.authority().is_some_and(|a| a.stamp > ts)
}

/// False when a newer selection points at a different node than `gnx`.
/// A newer selection of the same node re-confirms the result.
pub fn is_node_still_valid(view: &StalenessView, gnx: &str, ts: Stamp) -> bool {
    match view.authority() {
        Some(a) if a.stamp > ts => a.gnx() == Some(gnx),
        _ => true,
    }
}

/// True when a newer selection points at the same node `gnx`
pub fn is_node_reselected(view: &StalenessView, gnx: &str, ts: Stamp) -> bool {
    view.authority()
        .is_some_and(|a| a.stamp > ts && a.gnx() == Some(gnx))
}

/// Reads the live sources and answers the three questions above
#[derive(Clone)]
pub struct StalenessResolver {
    sources: Arc<SelectionSources>,
    queue: QueueProbe,
}

impl StalenessResolver {
    pub fn new(sources: Arc<SelectionSources>, queue: QueueProbe) -> Self {
        StalenessResolver { sources, queue }
    }

    pub fn view(&self) -> StalenessView {
        StalenessView {
            last_received: self.sources.last_received.snapshot(),
            node_to_reveal: self.sources.node_to_reveal.snapshot(),
            last_selected: self.sources.last_selected.snapshot(),
            queue_refresh: self.queue.pending_refresh(),
        }
    }

    pub fn is_timestamp_still_valid(&self, ts: Stamp) -> bool {
        is_timestamp_still_valid(&self.view(), ts)
    }

    pub fn is_node_still_valid(&self, gnx: &str, ts: Stamp) -> bool {
        is_node_still_valid(&self.view(), gnx, ts)
    }

    pub fn is_node_reselected(&self, gnx: &str, ts: Stamp) -> bool {
        is_node_reselected(&self.view(), gnx, ts)
    }
}
