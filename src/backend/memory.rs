use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::actions;
use super::{ActionResult, BackendClient, BackendError};
use crate::model::node::{NodeAttrs, NodeRef, StackEntry};
use crate::sync::lock;

/// A node of the seed outline a [`MemoryBackend`] starts from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSeed {
    /// Fixed identity; generated when absent
    #[serde(default)]
    pub gnx: Option<String>,
    pub headline: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub children: Vec<OutlineSeed>,
}

impl OutlineSeed {
    pub fn new(headline: impl Into<String>) -> Self {
        OutlineSeed {
            headline: headline.into(),
            ..Default::default()
        }
    }

    pub fn gnx(mut self, gnx: impl Into<String>) -> Self {
        self.gnx = Some(gnx.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn child(mut self, child: OutlineSeed) -> Self {
        self.children.push(child);
        self
    }
}

/// Content shared by every position of one gnx
#[derive(Debug, Clone)]
struct VNode {
    headline: String,
    body: String,
    children: Vec<String>,
    marked: bool,
    expanded: bool,
}

/// Child indices from the top level down
type Path = Vec<usize>;

#[derive(Debug, Clone)]
struct Outline {
    nodes: IndexMap<String, VNode>,
    roots: Vec<String>,
    next_id: u64,
}

impl Outline {
    fn from_seed(seed: &[OutlineSeed]) -> Self {
        let mut outline = Outline {
            nodes: IndexMap::new(),
            roots: Vec::new(),
            next_id: 1,
        };
        for s in seed {
            let gnx = outline.plant(s);
            outline.roots.push(gnx);
        }
        outline
    }

    fn plant(&mut self, seed: &OutlineSeed) -> String {
        let gnx = match &seed.gnx {
            Some(g) if !self.nodes.contains_key(g) => g.clone(),
            _ => self.fresh_gnx(),
        };
        self.nodes.insert(
            gnx.clone(),
            VNode {
                headline: seed.headline.clone(),
                body: seed.body.clone(),
                children: Vec::new(),
                marked: false,
                expanded: false,
            },
        );
        let children: Vec<String> = seed.children.iter().map(|c| self.plant(c)).collect();
        if let Some(v) = self.nodes.get_mut(&gnx) {
            v.children = children;
        }
        gnx
    }

    fn fresh_gnx(&mut self) -> String {
        loop {
            let candidate = format!("n{}", self.next_id);
            self.next_id += 1;
            if !self.nodes.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn siblings_mut(&mut self, parent: &[usize]) -> Option<&mut Vec<String>> {
        if parent.is_empty() {
            return Some(&mut self.roots);
        }
        let gnx = self.gnx_at(parent)?.to_string();
        self.nodes.get_mut(&gnx).map(|v| &mut v.children)
    }

    fn gnx_at(&self, path: &[usize]) -> Option<&str> {
        let mut list = &self.roots;
        let mut current: Option<&str> = None;
        for &idx in path {
            let gnx = list.get(idx)?;
            current = Some(gnx.as_str());
            list = &self.nodes.get(gnx)?.children;
        }
        current
    }

    fn vnode_at(&self, path: &[usize]) -> Option<&VNode> {
        self.gnx_at(path).and_then(|g| self.nodes.get(g))
    }

    /// Every position in outline order
    fn preorder(&self) -> Vec<Path> {
        fn walk(outline: &Outline, list: &[String], prefix: &mut Path, out: &mut Vec<Path>) {
            for (i, gnx) in list.iter().enumerate() {
                prefix.push(i);
                out.push(prefix.clone());
                if let Some(v) = outline.nodes.get(gnx) {
                    walk(outline, &v.children, prefix, out);
                }
                prefix.pop();
            }
        }
        let mut out = Vec::new();
        walk(self, &self.roots, &mut Vec::new(), &mut out);
        out
    }

    fn occurrences(&self, gnx: &str) -> usize {
        let in_roots = self.roots.iter().filter(|g| *g == gnx).count();
        let in_children: usize = self
            .nodes
            .values()
            .map(|v| v.children.iter().filter(|g| *g == gnx).count())
            .sum();
        in_roots + in_children
    }

    /// Resolve a reference to a path, checking every ancestor identity
    fn path_of(&self, node: &NodeRef) -> Option<Path> {
        let mut path: Path = node.stack.iter().map(|e| e.child_index).collect();
        path.push(node.child_index);
        for depth in 0..path.len() {
            let expected = node
                .stack
                .get(depth)
                .map(|e| e.gnx.as_str())
                .unwrap_or(node.gnx.as_str());
            if self.gnx_at(&path[..=depth]) != Some(expected) {
                return None;
            }
        }
        Some(path)
    }

    fn node_ref(&self, path: &[usize], dirty: &HashSet<String>) -> Option<NodeRef> {
        let (&child_index, parents) = path.split_last()?;
        let mut stack = Vec::with_capacity(parents.len());
        for depth in 0..parents.len() {
            let gnx = self.gnx_at(&path[..=depth])?;
            stack.push(StackEntry {
                gnx: gnx.to_string(),
                child_index: path[depth],
                headline: self.nodes.get(gnx)?.headline.clone(),
            });
        }
        let gnx = self.gnx_at(path)?;
        let v = self.nodes.get(gnx)?;
        Some(NodeRef {
            gnx: gnx.to_string(),
            child_index,
            stack,
            attrs: NodeAttrs {
                headline: v.headline.clone(),
                has_children: !v.children.is_empty(),
                expanded: v.expanded,
                marked: v.marked,
                cloned: self.occurrences(gnx) > 1,
                dirty: dirty.contains(gnx),
                has_body: !v.body.is_empty(),
            },
        })
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    outline: Outline,
    selected: Path,
}

#[derive(Debug)]
struct Document {
    outline: Outline,
    selected: Path,
    undo: Vec<Snapshot>,
    redo: Vec<Snapshot>,
    dirty: HashSet<String>,
}

impl Document {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            outline: self.outline.clone(),
            selected: self.selected.clone(),
        }
    }

    fn selected_ref(&self) -> Option<NodeRef> {
        self.outline.node_ref(&self.selected, &self.dirty)
    }

    /// The path named by `param.node`, else the current selection
    fn target(&self, action: &str, param: &serde_json::Value) -> Result<Path, BackendError> {
        match param.get("node") {
            Some(value) => {
                let node: NodeRef = serde_json::from_value(value.clone())?;
                self.outline
                    .path_of(&node)
                    .ok_or_else(|| BackendError::failed(action, format!("node not found: {}", node)))
            }
            None if self.outline.gnx_at(&self.selected).is_some() => Ok(self.selected.clone()),
            None => Err(BackendError::failed(action, "nothing selected")),
        }
    }

    fn touch(&mut self, path: &[usize]) {
        if let Some(gnx) = self.outline.gnx_at(path) {
            self.dirty.insert(gnx.to_string());
        }
    }

    fn vnode_mut(&mut self, action: &str, path: &[usize]) -> Result<&mut VNode, BackendError> {
        let gnx = self
            .outline
            .gnx_at(path)
            .ok_or_else(|| BackendError::failed(action, "node not found"))?
            .to_string();
        self.outline
            .nodes
            .get_mut(&gnx)
            .ok_or_else(|| BackendError::failed(action, "node not found"))
    }

    fn apply(
        &mut self,
        action: &str,
        param: &serde_json::Value,
    ) -> Result<ActionResult, BackendError> {
        let text = param.get("text").and_then(|t| t.as_str()).map(str::to_string);
        let mut result = ActionResult::default();

        match action {
            actions::SELECT_NODE => {
                self.selected = self.target(action, param)?;
            }
            actions::SET_HEADLINE => {
                let path = self.target(action, param)?;
                let text = text.ok_or_else(|| BackendError::failed(action, "missing text"))?;
                self.vnode_mut(action, &path)?.headline = text;
                self.touch(&path);
                self.selected = path;
            }
            actions::SET_BODY => {
                let path = self.target(action, param)?;
                self.vnode_mut(action, &path)?.body = text.unwrap_or_default();
                self.touch(&path);
            }
            actions::INSERT_NODE | actions::CLONE_NODE => {
                let path = self.target(action, param)?;
                let (&idx, parent) = path
                    .split_last()
                    .ok_or_else(|| BackendError::failed(action, "node not found"))?;
                let gnx = if action == actions::CLONE_NODE {
                    self.outline.gnx_at(&path).unwrap_or_default().to_string()
                } else {
                    self.new_node(text.as_deref())
                };
                let siblings = self
                    .outline
                    .siblings_mut(parent)
                    .ok_or_else(|| BackendError::failed(action, "parent not found"))?;
                siblings.insert(idx + 1, gnx);
                let mut new_path = parent.to_vec();
                new_path.push(idx + 1);
                self.touch(&new_path);
                self.selected = new_path;
            }
            actions::INSERT_CHILD => {
                let path = self.target(action, param)?;
                let gnx = self.new_node(text.as_deref());
                let parent = self.vnode_mut(action, &path)?;
                parent.children.push(gnx);
                parent.expanded = true;
                let last = parent.children.len() - 1;
                let mut new_path = path;
                new_path.push(last);
                self.touch(&new_path);
                self.selected = new_path;
            }
            actions::DELETE_NODE => {
                let path = self.target(action, param)?;
                if path.len() == 1 && self.outline.roots.len() == 1 {
                    return Err(BackendError::failed(action, "cannot delete the last top-level node"));
                }
                let (&idx, parent) = path
                    .split_last()
                    .ok_or_else(|| BackendError::failed(action, "node not found"))?;
                let parent = parent.to_vec();
                let siblings = self
                    .outline
                    .siblings_mut(&parent)
                    .ok_or_else(|| BackendError::failed(action, "parent not found"))?;
                siblings.remove(idx);
                let remaining = siblings.len();
                self.touch(&parent);
                self.selected = if remaining == 0 {
                    parent
                } else {
                    let mut p = parent;
                    p.push(idx.min(remaining - 1));
                    p
                };
            }
            actions::MOVE_UP | actions::MOVE_DOWN => {
                let path = self.target(action, param)?;
                let (&idx, parent) = path
                    .split_last()
                    .ok_or_else(|| BackendError::failed(action, "node not found"))?;
                let parent = parent.to_vec();
                let siblings = self
                    .outline
                    .siblings_mut(&parent)
                    .ok_or_else(|| BackendError::failed(action, "parent not found"))?;
                let other = if action == actions::MOVE_UP {
                    idx.checked_sub(1)
                } else {
                    Some(idx + 1).filter(|i| *i < siblings.len())
                };
                match other {
                    Some(other) => {
                        siblings.swap(idx, other);
                        let mut p = parent;
                        p.push(other);
                        self.touch(&p);
                        self.selected = p;
                    }
                    None => result.message = Some("cannot move further".into()),
                }
            }
            actions::MARK | actions::UNMARK => {
                let path = self.target(action, param)?;
                self.vnode_mut(action, &path)?.marked = action == actions::MARK;
                self.touch(&path);
            }
            actions::EXPAND_ALL | actions::CONTRACT_ALL => {
                let expand = action == actions::EXPAND_ALL;
                for v in self.outline.nodes.values_mut() {
                    v.expanded = expand && !v.children.is_empty();
                }
            }
            actions::GOTO_NEXT | actions::GOTO_PREV => {
                let order = self.outline.preorder();
                let at = order.iter().position(|p| *p == self.selected);
                let next = match (at, action == actions::GOTO_NEXT) {
                    (Some(i), true) => order.get(i + 1),
                    (Some(i), false) => i.checked_sub(1).and_then(|j| order.get(j)),
                    (None, _) => order.first(),
                };
                match next {
                    Some(p) => self.selected = p.clone(),
                    None => result.message = Some("no more nodes".into()),
                }
            }
            actions::FIND => {
                let pattern = text.ok_or_else(|| BackendError::failed(action, "missing pattern"))?;
                let re = Regex::new(&format!("(?i){}", pattern))
                    .or_else(|_| Regex::new(&format!("(?i){}", regex::escape(&pattern))))
                    .map_err(|e| BackendError::failed(action, e.to_string()))?;
                let order = self.outline.preorder();
                let start = order
                    .iter()
                    .position(|p| *p == self.selected)
                    .map_or(0, |i| i + 1);
                let hit = (0..order.len())
                    .map(|k| &order[(start + k) % order.len()])
                    .find(|p| {
                        self.outline
                            .vnode_at(p)
                            .is_some_and(|v| re.is_match(&v.headline) || re.is_match(&v.body))
                    });
                match hit {
                    Some(p) => self.selected = p.clone(),
                    None => result.message = Some(format!("not found: {}", pattern)),
                }
            }
            actions::UNDO | actions::REDO => {
                let (from, to) = if action == actions::UNDO {
                    (&mut self.undo, &mut self.redo)
                } else {
                    (&mut self.redo, &mut self.undo)
                };
                match from.pop() {
                    Some(snap) => {
                        to.push(Snapshot {
                            outline: self.outline.clone(),
                            selected: self.selected.clone(),
                        });
                        self.outline = snap.outline;
                        self.selected = snap.selected;
                    }
                    None => result.message = Some(format!("nothing to {}", action)),
                }
            }
            actions::GET_BODY => {
                let path = self.target(action, param)?;
                let body = self
                    .outline
                    .vnode_at(&path)
                    .map(|v| v.body.clone())
                    .unwrap_or_default();
                result.payload = serde_json::json!({ "body": body });
            }
            actions::GET_STATES => {
                let marked = self.outline.vnode_at(&self.selected).is_some_and(|v| v.marked);
                result.payload = serde_json::json!({
                    "can_undo": !self.undo.is_empty(),
                    "can_redo": !self.redo.is_empty(),
                    "marked": marked,
                    "dirty": !self.dirty.is_empty(),
                });
            }
            other => return Err(BackendError::UnknownAction(other.to_string())),
        }

        result.node = self.selected_ref();
        result.opened_documents = Some(1);
        Ok(result)
    }

    fn new_node(&mut self, headline: Option<&str>) -> String {
        let gnx = self.outline.fresh_gnx();
        self.outline.nodes.insert(
            gnx.clone(),
            VNode {
                headline: headline.unwrap_or("NewHeadline").to_string(),
                body: String::new(),
                children: Vec::new(),
                marked: false,
                expanded: false,
            },
        );
        gnx
    }
}

/// An in-process outline engine.
///
/// Processes one action at a time under a lock, optionally after a fixed
/// latency, so the client sees the same ordering a remote backend gives.
pub struct MemoryBackend {
    document: Mutex<Option<Document>>,
    latency: Duration,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryBackend {
    pub fn from_seed(seed: &[OutlineSeed]) -> Self {
        let outline = Outline::from_seed(seed);
        let selected = if outline.roots.is_empty() { Vec::new() } else { vec![0] };
        MemoryBackend {
            document: Mutex::new(Some(Document {
                outline,
                selected,
                undo: Vec::new(),
                redo: Vec::new(),
                dirty: HashSet::new(),
            })),
            latency: Duration::ZERO,
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every later call of `action` fail
    pub fn fail_on(&self, action: &str) {
        lock(&self.failing).insert(action.to_string());
    }

    /// Actions received so far, in order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// First position (in outline order) showing `gnx`
    pub fn node_ref(&self, gnx: &str) -> Option<NodeRef> {
        let guard = lock(&self.document);
        let doc = guard.as_ref()?;
        doc.outline
            .preorder()
            .into_iter()
            .find(|p| doc.outline.gnx_at(p) == Some(gnx))
            .and_then(|p| doc.outline.node_ref(&p, &doc.dirty))
    }

    pub fn selected(&self) -> Option<NodeRef> {
        lock(&self.document).as_ref().and_then(|d| d.selected_ref())
    }

    pub fn body_of(&self, gnx: &str) -> Option<String> {
        lock(&self.document)
            .as_ref()
            .and_then(|d| d.outline.nodes.get(gnx).map(|v| v.body.clone()))
    }

    /// The outline as indented lines: `*` selected, `+` marked, `c` cloned
    pub fn dump(&self) -> Vec<String> {
        let guard = lock(&self.document);
        let Some(doc) = guard.as_ref() else {
            return Vec::new();
        };
        doc.outline
            .preorder()
            .into_iter()
            .filter_map(|p| {
                let node = doc.outline.node_ref(&p, &doc.dirty)?;
                let mut flags = String::new();
                if p == doc.selected {
                    flags.push('*');
                }
                if node.attrs.marked {
                    flags.push('+');
                }
                if node.attrs.cloned {
                    flags.push('c');
                }
                let flags = if flags.is_empty() { String::new() } else { format!(" [{}]", flags) };
                Some(format!("{}{}{}", "  ".repeat(node.level()), node.headline(), flags))
            })
            .collect()
    }

    fn run(&self, action: &str, param: &serde_json::Value) -> Result<ActionResult, BackendError> {
        lock(&self.calls).push(action.to_string());
        if lock(&self.failing).contains(action) {
            return Err(BackendError::failed(action, "injected failure"));
        }

        let mut guard = lock(&self.document);
        if action == actions::CLOSE_DOCUMENT {
            *guard = None;
            return Ok(ActionResult {
                opened_documents: Some(0),
                ..Default::default()
            });
        }
        let doc = guard.as_mut().ok_or(BackendError::NoDocument)?;

        if actions::is_mutating(action) {
            let before = doc.snapshot();
            let result = doc.apply(action, param)?;
            doc.undo.push(before);
            doc.redo.clear();
            Ok(result)
        } else {
            doc.apply(action, param)
        }
    }
}

#[async_trait]
impl BackendClient for MemoryBackend {
    async fn execute(
        &self,
        action: &str,
        param: serde_json::Value,
    ) -> Result<ActionResult, BackendError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = self.run(action, &param);
        if let Err(e) = &result {
            log::debug!("memory backend: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> MemoryBackend {
        MemoryBackend::from_seed(&[
            OutlineSeed::new("Root")
                .gnx("root")
                .body("root body")
                .child(OutlineSeed::new("Alpha").gnx("alpha"))
                .child(OutlineSeed::new("Beta").gnx("beta").body("beta text")),
            OutlineSeed::new("Second").gnx("second"),
        ])
    }

    fn param(node: &NodeRef) -> serde_json::Value {
        serde_json::json!({ "node": node })
    }

    #[tokio::test]
    async fn test_insert_child_selects_new_node() {
        let backend = sample();
        let root = backend.node_ref("root").unwrap();
        let result = backend
            .execute(
                actions::INSERT_CHILD,
                serde_json::json!({ "node": root, "text": "Gamma" }),
            )
            .await
            .unwrap();
        let node = result.node.unwrap();
        assert_eq!(node.headline(), "Gamma");
        assert_eq!(node.child_index, 2);
        assert_eq!(node.stack[0].gnx, "root");
        assert!(node.attrs.dirty);
        assert_eq!(result.opened_documents, Some(1));
    }

    #[tokio::test]
    async fn test_stale_reference_is_rejected() {
        let backend = sample();
        let beta = backend.node_ref("beta").unwrap();
        let alpha = backend.node_ref("alpha").unwrap();
        backend
            .execute(actions::DELETE_NODE, param(&alpha))
            .await
            .unwrap();
        // beta moved from index 1 to index 0; the old reference no longer resolves
        let err = backend
            .execute(actions::MARK, param(&beta))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_clones_share_content() {
        let backend = sample();
        let alpha = backend.node_ref("alpha").unwrap();
        let result = backend
            .execute(actions::CLONE_NODE, param(&alpha))
            .await
            .unwrap();
        let clone = result.node.unwrap();
        assert_eq!(clone.gnx, "alpha");
        assert!(clone.attrs.cloned);
        assert_ne!(clone, alpha);

        backend
            .execute(
                actions::SET_HEADLINE,
                serde_json::json!({ "node": clone, "text": "Renamed" }),
            )
            .await
            .unwrap();
        assert_eq!(
            backend.dump(),
            vec![
                "Root",
                "  Renamed [c]",
                "  Renamed [*c]",
                "  Beta",
                "Second",
            ]
        );
    }

    #[tokio::test]
    async fn test_find_wraps_and_reports_misses() {
        let backend = sample();
        let hit = backend
            .execute(actions::FIND, serde_json::json!({ "text": "beta TEXT" }))
            .await
            .unwrap();
        assert_eq!(hit.node.unwrap().gnx, "beta");
        assert!(hit.message.is_none());

        let miss = backend
            .execute(actions::FIND, serde_json::json!({ "text": "zzz" }))
            .await
            .unwrap();
        assert_eq!(miss.message.as_deref(), Some("not found: zzz"));
        assert_eq!(miss.node.unwrap().gnx, "beta");
    }

    #[tokio::test]
    async fn test_undo_and_redo_restore_outline() {
        let backend = sample();
        let second = backend.node_ref("second").unwrap();
        backend
            .execute(
                actions::SET_HEADLINE,
                serde_json::json!({ "node": second, "text": "Changed" }),
            )
            .await
            .unwrap();
        let undone = backend
            .execute(actions::UNDO, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(undone.node.unwrap().headline(), "Root");
        assert_eq!(backend.dump().last().unwrap(), "Second");

        backend
            .execute(actions::REDO, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(backend.dump().last().unwrap(), "Changed [*]");

        let states = backend
            .execute(actions::GET_STATES, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(states.payload["can_undo"], true);
        assert_eq!(states.payload["can_redo"], false);
    }

    #[tokio::test]
    async fn test_goto_walks_outline_order() {
        let backend = sample();
        let mut seen = Vec::new();
        for _ in 0..4 {
            let r = backend
                .execute(actions::GOTO_NEXT, serde_json::json!({}))
                .await
                .unwrap();
            seen.push(r.node.unwrap().gnx);
        }
        assert_eq!(seen, vec!["alpha", "beta", "second", "second"]);
    }

    #[tokio::test]
    async fn test_close_document_then_actions_fail() {
        let backend = sample();
        let closed = backend
            .execute(actions::CLOSE_DOCUMENT, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(closed.opened_documents, Some(0));
        let err = backend
            .execute(actions::GET_STATES, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NoDocument));
    }

    #[tokio::test]
    async fn test_injected_failures_and_call_log() {
        let backend = sample();
        backend.fail_on(actions::MARK);
        let err = backend
            .execute(actions::MARK, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("injected failure"));
        assert_eq!(backend.calls(), vec![actions::MARK]);
    }

    #[tokio::test]
    async fn test_get_body_reads_target() {
        let backend = sample();
        let beta = backend.node_ref("beta").unwrap();
        let r = backend.execute(actions::GET_BODY, param(&beta)).await.unwrap();
        assert_eq!(r.body_text(), Some("beta text"));
        assert_eq!(backend.body_of("root").as_deref(), Some("root body"));
    }
}
