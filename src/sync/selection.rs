use std::sync::Mutex;

use super::clock::Stamp;
use super::lock;
use crate::model::node::NodeRef;

/// A node together with the clock reading of the write that stored it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub node: Option<NodeRef>,
    pub stamp: Stamp,
}

impl Selection {
    pub fn gnx(&self) -> Option<&str> {
        self.node.as_ref().map(|n| n.gnx.as_str())
    }

    /// Holds a node stamped strictly after `ts`
    pub fn is_newer_than(&self, ts: Stamp) -> bool {
        self.node.is_some() && self.stamp > ts
    }
}

/// "The current known node", stamped on every write.
///
/// Node and stamp sit behind one lock, so a reader always sees both fields
/// from the same write.
#[derive(Debug)]
pub struct TimestampedSelection {
    label: &'static str,
    slot: Mutex<Selection>,
}

impl TimestampedSelection {
    pub fn new(label: &'static str) -> Self {
        TimestampedSelection {
            label,
            slot: Mutex::new(Selection::default()),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Store `node` with a fresh clock reading and return that reading
    pub fn set(&self, node: Option<NodeRef>) -> Stamp {
        let stamp = Stamp::now();
        self.set_at(node, stamp);
        stamp
    }

    /// Store `node` with an explicit reading
    pub fn set_at(&self, node: Option<NodeRef>, stamp: Stamp) {
        *lock(&self.slot) = Selection { node, stamp };
    }

    /// Forget the node, keeping the stamp of the last real write
    pub fn clear(&self) {
        lock(&self.slot).node = None;
    }

    pub fn snapshot(&self) -> Selection {
        lock(&self.slot).clone()
    }

    pub fn node(&self) -> Option<NodeRef> {
        lock(&self.slot).node.clone()
    }

    pub fn stamp(&self) -> Stamp {
        lock(&self.slot).stamp
    }
}

/// The three independent producers of "current node".
///
/// Each source has exactly one writer: the command queue writes
/// `last_received`, the refresh coordinator writes `node_to_reveal`, and UI
/// event handlers write `last_selected`. Anyone may read.
#[derive(Debug)]
pub struct SelectionSources {
    /// Node returned by the last finished command of a running queue
    pub last_received: TimestampedSelection,
    /// Node the coordinator's next pass will reveal
    pub node_to_reveal: TimestampedSelection,
    /// Node the user last picked in the outline or body
    pub last_selected: TimestampedSelection,
}

impl SelectionSources {
    pub fn new() -> Self {
        SelectionSources {
            last_received: TimestampedSelection::new("queue.last_received"),
            node_to_reveal: TimestampedSelection::new("coordinator.node_to_reveal"),
            last_selected: TimestampedSelection::new("ui.last_selected"),
        }
    }
}

impl Default for SelectionSources {
    fn default() -> Self {
        Self::new()
    }
}
