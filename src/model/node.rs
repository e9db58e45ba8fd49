use serde::{Deserialize, Serialize};

/// One ancestor of a node, from the root down to the node's parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEntry {
    /// Global identity of the ancestor
    pub gnx: String,
    /// Index of the ancestor among its own siblings
    pub child_index: usize,
    /// Ancestor headline, for display only
    #[serde(default)]
    pub headline: String,
}

/// Transient UI attributes, replaced wholesale on every backend response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttrs {
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub has_children: bool,
    #[serde(default)]
    pub expanded: bool,
    #[serde(default)]
    pub marked: bool,
    #[serde(default)]
    pub cloned: bool,
    #[serde(default)]
    pub dirty: bool,
    #[serde(default)]
    pub has_body: bool,
}

/// A position in the remote outline.
///
/// The same `gnx` may appear at several positions (clones). Two references
/// with the same `gnx` but different ancestor stacks are different reveal and
/// selection targets, so equality compares the full position and ignores
/// the transient attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRef {
    /// Global identity, shared by every clone of the node
    pub gnx: String,
    /// Index among siblings
    pub child_index: usize,
    /// Ancestors from root to parent
    #[serde(default)]
    pub stack: Vec<StackEntry>,
    #[serde(flatten)]
    pub attrs: NodeAttrs,
}

impl NodeRef {
    /// A top-level node with default attributes
    pub fn top_level(gnx: impl Into<String>, child_index: usize, headline: impl Into<String>) -> Self {
        NodeRef {
            gnx: gnx.into(),
            child_index,
            stack: Vec::new(),
            attrs: NodeAttrs {
                headline: headline.into(),
                ..Default::default()
            },
        }
    }

    /// A child of `parent` at `child_index`
    pub fn child_of(
        parent: &NodeRef,
        gnx: impl Into<String>,
        child_index: usize,
        headline: impl Into<String>,
    ) -> Self {
        let mut stack = parent.stack.clone();
        stack.push(StackEntry {
            gnx: parent.gnx.clone(),
            child_index: parent.child_index,
            headline: parent.attrs.headline.clone(),
        });
        NodeRef {
            gnx: gnx.into(),
            child_index,
            stack,
            attrs: NodeAttrs {
                headline: headline.into(),
                ..Default::default()
            },
        }
    }

    pub fn headline(&self) -> &str {
        &self.attrs.headline
    }

    /// Depth below the top level (0 = top-level node)
    pub fn level(&self) -> usize {
        self.stack.len()
    }

    /// Key identifying this position, e.g. `a:0/b:2/c:1`
    pub fn position_key(&self) -> String {
        let mut parts: Vec<String> = self
            .stack
            .iter()
            .map(|e| format!("{}:{}", e.gnx, e.child_index))
            .collect();
        parts.push(format!("{}:{}", self.gnx, self.child_index));
        parts.join("/")
    }

    /// Same underlying content, regardless of position
    pub fn same_content(&self, other: &NodeRef) -> bool {
        self.gnx == other.gnx
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.gnx == other.gnx
            && self.child_index == other.child_index
            && self.stack.len() == other.stack.len()
            && self
                .stack
                .iter()
                .zip(&other.stack)
                .all(|(a, b)| a.gnx == b.gnx && a.child_index == b.child_index)
    }
}

impl Eq for NodeRef {}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} \"{}\"", self.position_key(), self.attrs.headline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_are_distinct_positions() {
        let a = NodeRef::top_level("root", 0, "Root");
        let b = NodeRef::top_level("other", 1, "Other");
        let clone_under_a = NodeRef::child_of(&a, "shared", 0, "Shared");
        let clone_under_b = NodeRef::child_of(&b, "shared", 0, "Shared");

        assert!(clone_under_a.same_content(&clone_under_b));
        assert_ne!(clone_under_a, clone_under_b);
    }

    #[test]
    fn test_equality_ignores_transient_attributes() {
        let mut a = NodeRef::top_level("n1", 0, "Before");
        let b = a.clone();
        a.attrs.headline = "After".into();
        a.attrs.marked = true;
        assert_eq!(a, b);
    }

    #[test]
    fn test_position_key_lists_ancestors() {
        let root = NodeRef::top_level("r", 0, "Root");
        let child = NodeRef::child_of(&root, "c", 2, "Child");
        let grandchild = NodeRef::child_of(&child, "g", 1, "Grandchild");
        assert_eq!(grandchild.position_key(), "r:0/c:2/g:1");
        assert_eq!(grandchild.level(), 2);
        assert_eq!(grandchild.stack[1].headline, "Child");
    }

    #[test]
    fn test_serde_flattens_attributes() {
        let node = NodeRef::top_level("n1", 0, "Hello");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["gnx"], "n1");
        assert_eq!(json["headline"], "Hello");
        let back: NodeRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
        assert_eq!(back.headline(), "Hello");
    }
}
