use serde::{Deserialize, Serialize};

/// Which UI surfaces must be redrawn once pending work settles.
///
/// Requests only ever grow while pending: [`RefreshRequest::union`] is the one
/// way to combine them, and a flag is only cleared by the pass that consumes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshRequest {
    /// Redraw the whole outline
    pub tree: bool,
    /// Reveal a single node instead of redrawing the outline
    pub node: bool,
    pub body: bool,
    pub documents: bool,
    pub buttons: bool,
    pub goto: bool,
    pub undo: bool,
    /// Context states (can-undo, marked, ...) and the status line
    pub states: bool,
    /// Restore the body scroll position
    pub scroll: bool,
    /// Leave detached body views alone
    pub exclude_detached: bool,
}

impl RefreshRequest {
    pub const NONE: RefreshRequest = RefreshRequest {
        tree: false,
        node: false,
        body: false,
        documents: false,
        buttons: false,
        goto: false,
        undo: false,
        states: false,
        scroll: false,
        exclude_detached: false,
    };

    pub fn tree() -> Self {
        RefreshRequest {
            tree: true,
            ..Self::NONE
        }
    }

    pub fn node() -> Self {
        RefreshRequest {
            node: true,
            ..Self::NONE
        }
    }

    pub fn body() -> Self {
        RefreshRequest {
            body: true,
            ..Self::NONE
        }
    }

    /// Tree, body and states: what a structural edit usually needs
    pub fn structural() -> Self {
        RefreshRequest {
            tree: true,
            body: true,
            states: true,
            ..Self::NONE
        }
    }

    /// Logical OR of every flag
    pub fn union(&mut self, other: &RefreshRequest) {
        self.tree |= other.tree;
        self.node |= other.node;
        self.body |= other.body;
        self.documents |= other.documents;
        self.buttons |= other.buttons;
        self.goto |= other.goto;
        self.undo |= other.undo;
        self.states |= other.states;
        self.scroll |= other.scroll;
        self.exclude_detached |= other.exclude_detached;
    }

    /// Builder form of [`RefreshRequest::union`]
    pub fn with(mut self, other: RefreshRequest) -> Self {
        self.union(&other);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }

    /// True when a structural tree redraw or a single-node reveal is pending
    pub fn touches_outline(&self) -> bool {
        self.tree || self.node
    }

    fn names(&self) -> Vec<&'static str> {
        let flags = [
            (self.tree, "tree"),
            (self.node, "node"),
            (self.body, "body"),
            (self.documents, "documents"),
            (self.buttons, "buttons"),
            (self.goto, "goto"),
            (self.undo, "undo"),
            (self.states, "states"),
            (self.scroll, "scroll"),
            (self.exclude_detached, "exclude-detached"),
        ];
        flags
            .into_iter()
            .filter_map(|(set, name)| set.then_some(name))
            .collect()
    }
}

impl std::fmt::Display for RefreshRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.names();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}
