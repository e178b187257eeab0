//! Read-only view of a frame's document, plus a snapshot-backed implementation.
//!
//! The detector never touches a real browser: it walks whatever implements
//! [`Dom`]. Shadow roots are not children of their host; they are reached
//! through [`Dom::shadow_root`] and searched as separate roots, like an
//! open `shadowRoot` in a browser.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Subset of the computed style that decides visibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedStyle {
    #[serde(default = "default_display")]
    pub display: String,
    #[serde(default = "default_visibility")]
    pub visibility: String,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

fn default_display() -> String {
    "block".to_string()
}

fn default_visibility() -> String {
    "visible".to_string()
}

fn default_opacity() -> f64 {
    1.0
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: default_display(),
            visibility: default_visibility(),
            opacity: default_opacity(),
        }
    }
}

/// Layout box size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub width: f64,
    pub height: f64,
}

pub trait Dom: Send + Sync {
    type Node: Clone + Eq + Hash + fmt::Debug + Send + Sync;

    /// The document root.
    fn document(&self) -> Self::Node;
    /// Element children in document order. Never includes shadow roots.
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;
    /// The open shadow root hosted by this element, if any.
    fn shadow_root(&self, node: &Self::Node) -> Option<Self::Node>;
    /// Lowercase tag name.
    fn tag_name(&self, node: &Self::Node) -> String;
    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;
    /// Rendered text of the element and its light-DOM descendants.
    fn text(&self, node: &Self::Node) -> String;
    /// `None` when the style cannot be computed.
    fn style(&self, node: &Self::Node) -> Option<ComputedStyle>;
    fn bounding_box(&self, node: &Self::Node) -> Option<Rect>;
    fn title(&self) -> String;
    fn set_title(&self, title: &str);
}

// ============================================================================
// Element queries
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Has(&'static str),
    Equals(&'static str, &'static str),
    Contains(&'static str, &'static str),
    NotContains(&'static str, &'static str),
    Class(&'static str),
    Disabled,
}

impl Condition {
    fn holds<D: Dom + ?Sized>(&self, dom: &D, node: &D::Node) -> bool {
        match self {
            Condition::Has(name) => dom.attribute(node, name).is_some(),
            Condition::Equals(name, value) => dom.attribute(node, name).is_some_and(|v| v == *value),
            Condition::Contains(name, value) => {
                dom.attribute(node, name).is_some_and(|v| v.contains(value))
            }
            Condition::NotContains(name, value) => {
                !dom.attribute(node, name).is_some_and(|v| v.contains(value))
            }
            Condition::Class(class) => dom
                .attribute(node, "class")
                .is_some_and(|v| v.split_whitespace().any(|c| c == *class)),
            Condition::Disabled => !is_enabled_button_like(dom, node),
        }
    }
}

/// A small selector: tag, attribute conditions and an optional ancestor.
///
/// `ElementQuery::tag("button").class("run-button").inside(ElementQuery::tag("ms-run-button"))`
/// reads as `ms-run-button button.run-button`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementQuery {
    tag: Option<&'static str>,
    conditions: Vec<Condition>,
    ancestor: Option<Box<ElementQuery>>,
    excluded_ancestor: Option<Box<ElementQuery>>,
}

impl ElementQuery {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn tag(tag: &'static str) -> Self {
        Self {
            tag: Some(tag),
            ..Self::default()
        }
    }

    pub fn has_attr(mut self, name: &'static str) -> Self {
        self.conditions.push(Condition::Has(name));
        self
    }

    pub fn attr_eq(mut self, name: &'static str, value: &'static str) -> Self {
        self.conditions.push(Condition::Equals(name, value));
        self
    }

    pub fn attr_contains(mut self, name: &'static str, value: &'static str) -> Self {
        self.conditions.push(Condition::Contains(name, value));
        self
    }

    pub fn attr_not_contains(mut self, name: &'static str, value: &'static str) -> Self {
        self.conditions.push(Condition::NotContains(name, value));
        self
    }

    pub fn class(mut self, class: &'static str) -> Self {
        self.conditions.push(Condition::Class(class));
        self
    }

    /// `disabled` or `aria-disabled="true"`.
    pub fn disabled(mut self) -> Self {
        self.conditions.push(Condition::Disabled);
        self
    }

    pub fn inside(mut self, ancestor: ElementQuery) -> Self {
        self.ancestor = Some(Box::new(ancestor));
        self
    }

    /// Reject nodes with any ancestor matching `ancestor`.
    pub fn not_inside(mut self, ancestor: ElementQuery) -> Self {
        self.excluded_ancestor = Some(Box::new(ancestor));
        self
    }

    /// `ancestors` is the path from the search root down to the node's parent.
    pub fn matches<D: Dom + ?Sized>(&self, dom: &D, node: &D::Node, ancestors: &[D::Node]) -> bool {
        if let Some(tag) = self.tag {
            if !dom.tag_name(node).eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if !self.conditions.iter().all(|c| c.holds(dom, node)) {
            return false;
        }
        if let Some(excluded) = &self.excluded_ancestor {
            let blocked = ancestors
                .iter()
                .enumerate()
                .any(|(i, a)| excluded.matches(dom, a, &ancestors[..i]));
            if blocked {
                return false;
            }
        }
        match &self.ancestor {
            None => true,
            Some(anc) => ancestors
                .iter()
                .enumerate()
                .any(|(i, a)| anc.matches(dom, a, &ancestors[..i])),
        }
    }
}

/// All descendants of `root` matching `query`, in document order.
/// Does not descend into shadow roots.
pub fn query_all<D: Dom + ?Sized>(dom: &D, root: &D::Node, query: &ElementQuery) -> Vec<D::Node> {
    let mut out = Vec::new();
    let mut path: Vec<D::Node> = Vec::new();
    let mut stack: Vec<(D::Node, usize)> =
        dom.children(root).into_iter().rev().map(|c| (c, 0)).collect();

    while let Some((node, depth)) = stack.pop() {
        path.truncate(depth);
        if query.matches(dom, &node, &path) {
            out.push(node.clone());
        }
        let kids = dom.children(&node);
        path.push(node);
        stack.extend(kids.into_iter().rev().map(|k| (k, depth + 1)));
    }

    out
}

/// Rendered, non-transparent and with a non-empty box.
pub fn is_visible<D: Dom + ?Sized>(dom: &D, node: &D::Node) -> bool {
    if dom.attribute(node, "hidden").is_some() {
        return false;
    }
    if let Some(style) = dom.style(node) {
        if style.display.eq_ignore_ascii_case("none") {
            return false;
        }
        let visibility = style.visibility.to_ascii_lowercase();
        if visibility == "hidden" || visibility == "collapse" {
            return false;
        }
        if style.opacity <= 0.0 {
            return false;
        }
    }
    dom.bounding_box(node)
        .is_some_and(|r| r.width > 0.0 && r.height > 0.0)
}

pub fn is_enabled_button_like<D: Dom + ?Sized>(dom: &D, node: &D::Node) -> bool {
    if dom.attribute(node, "disabled").is_some() {
        return false;
    }
    !dom.attribute(node, "aria-disabled")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Snapshot-backed DOM
// ============================================================================

/// One element of a serialized page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotElement {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub style: Option<ComputedStyle>,
    #[serde(default = "default_rect")]
    pub rect: Option<Rect>,
    #[serde(default)]
    pub children: Vec<SnapshotElement>,
    /// Children of an attached open shadow root.
    #[serde(default)]
    pub shadow: Option<Vec<SnapshotElement>>,
}

fn default_rect() -> Option<Rect> {
    Some(Rect {
        width: 100.0,
        height: 24.0,
    })
}

impl SnapshotElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            style: None,
            rect: default_rect(),
            children: Vec::new(),
            shadow: None,
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn style(mut self, style: ComputedStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn rect(mut self, rect: Option<Rect>) -> Self {
        self.rect = rect;
        self
    }

    pub fn child(mut self, child: SnapshotElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn shadow(mut self, children: Vec<SnapshotElement>) -> Self {
        self.shadow = Some(children);
        self
    }
}

/// A serialized page: title plus top-level elements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Vec<SnapshotElement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    style: Option<ComputedStyle>,
    rect: Option<Rect>,
    children: Vec<NodeId>,
    shadow: Option<NodeId>,
    parent: Option<NodeId>,
}

impl NodeData {
    fn synthetic(tag: &str, parent: Option<NodeId>) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
            text: String::new(),
            style: None,
            rect: None,
            children: Vec::new(),
            shadow: None,
            parent,
        }
    }

    fn hides_subtree(&self) -> bool {
        self.attrs.contains_key("hidden")
            || self
                .style
                .as_ref()
                .is_some_and(|s| s.display.eq_ignore_ascii_case("none"))
    }
}

#[derive(Debug, Default)]
struct Arena {
    nodes: Vec<NodeData>,
    title: String,
}

impl Arena {
    fn insert(&mut self, parent: NodeId, element: SnapshotElement) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            tag: element.tag.to_ascii_lowercase(),
            attrs: element.attrs,
            text: element.text,
            style: element.style,
            rect: element.rect,
            children: Vec::new(),
            shadow: None,
            parent: Some(parent),
        });
        for child in element.children {
            let child_id = self.insert(id, child);
            self.nodes[id.0].children.push(child_id);
        }
        if let Some(shadow_children) = element.shadow {
            self.attach_shadow(id, shadow_children);
        }
        id
    }

    fn attach_shadow(&mut self, host: NodeId, children: Vec<SnapshotElement>) -> NodeId {
        let root = NodeId(self.nodes.len());
        self.nodes.push(NodeData::synthetic("#shadow-root", Some(host)));
        for child in children {
            let child_id = self.insert(root, child);
            self.nodes[root.0].children.push(child_id);
        }
        self.nodes[host.0].shadow = Some(root);
        root
    }

    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0)
    }

    fn inside_hidden_subtree(&self, id: NodeId) -> bool {
        let mut current = self.node(id).and_then(|n| n.parent);
        while let Some(parent) = current {
            match self.node(parent) {
                Some(data) if data.hides_subtree() => return true,
                Some(data) => current = data.parent,
                None => return false,
            }
        }
        false
    }

    fn collect_text(&self, id: NodeId, out: &mut Vec<String>) {
        if let Some(data) = self.node(id) {
            if !data.text.trim().is_empty() {
                out.push(data.text.trim().to_string());
            }
            for child in &data.children {
                self.collect_text(*child, out);
            }
        }
    }

    /// Depth-first over the document, crossing into shadow roots.
    fn find(&self, pred: impl Fn(&NodeData) -> bool) -> Option<NodeId> {
        let mut stack = vec![NodeId(0)];
        while let Some(id) = stack.pop() {
            let data = self.node(id)?;
            if pred(data) {
                return Some(id);
            }
            if let Some(shadow) = data.shadow {
                stack.push(shadow);
            }
            stack.extend(data.children.iter().rev().copied());
        }
        None
    }
}

/// In-memory document built from a [`PageSnapshot`].
///
/// Mutations take `&self` so a page can change while a reporter watches it.
/// An element inside a `hidden` or `display: none` ancestor gets an empty box.
#[derive(Debug)]
pub struct MemoryDom {
    arena: RwLock<Arena>,
}

impl MemoryDom {
    pub fn new(title: &str) -> Self {
        Self::from_snapshot(PageSnapshot {
            title: title.to_string(),
            body: Vec::new(),
        })
    }

    pub fn from_snapshot(snapshot: PageSnapshot) -> Self {
        let mut arena = Arena {
            nodes: vec![NodeData::synthetic("#document", None)],
            title: snapshot.title,
        };
        for element in snapshot.body {
            let id = arena.insert(NodeId(0), element);
            arena.nodes[0].children.push(id);
        }
        Self {
            arena: RwLock::new(arena),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: PageSnapshot = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(snapshot))
    }

    fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        self.arena.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Append an element (with its subtree) as the last child of `parent`.
    pub fn append(&self, parent: NodeId, element: SnapshotElement) -> NodeId {
        let mut arena = self.write();
        let id = arena.insert(parent, element);
        if let Some(data) = arena.node_mut(parent) {
            data.children.push(id);
        }
        id
    }

    /// Attach an open shadow root to `host`, returning the root node.
    pub fn attach_shadow(&self, host: NodeId, children: Vec<SnapshotElement>) -> NodeId {
        self.write().attach_shadow(host, children)
    }

    /// Detach a node from its parent.
    pub fn remove(&self, node: NodeId) {
        let mut arena = self.write();
        let parent = arena.node(node).and_then(|n| n.parent);
        if let Some(parent) = parent.and_then(|p| arena.node_mut(p)) {
            parent.children.retain(|c| *c != node);
        }
        if let Some(data) = arena.node_mut(node) {
            data.parent = None;
        }
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Some(data) = self.write().node_mut(node) {
            data.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(data) = self.write().node_mut(node) {
            data.attrs.remove(name);
        }
    }

    pub fn set_style(&self, node: NodeId, style: ComputedStyle) {
        if let Some(data) = self.write().node_mut(node) {
            data.style = Some(style);
        }
    }

    pub fn set_rect(&self, node: NodeId, rect: Option<Rect>) {
        if let Some(data) = self.write().node_mut(node) {
            data.rect = rect;
        }
    }

    pub fn set_text(&self, node: NodeId, text: &str) {
        if let Some(data) = self.write().node_mut(node) {
            data.text = text.to_string();
        }
    }

    /// First attached element whose attribute equals `value`, searching shadow roots too.
    pub fn find_by_attr(&self, name: &str, value: &str) -> Option<NodeId> {
        self.read()
            .find(|n| n.attrs.get(name).is_some_and(|v| v == value))
    }

    pub fn find_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.read().find(|n| n.tag.eq_ignore_ascii_case(tag))
    }
}

impl Dom for MemoryDom {
    type Node = NodeId;

    fn document(&self) -> NodeId {
        NodeId(0)
    }

    fn children(&self, node: &NodeId) -> Vec<NodeId> {
        self.read()
            .node(*node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn shadow_root(&self, node: &NodeId) -> Option<NodeId> {
        self.read().node(*node).and_then(|n| n.shadow)
    }

    fn tag_name(&self, node: &NodeId) -> String {
        self.read()
            .node(*node)
            .map(|n| n.tag.clone())
            .unwrap_or_default()
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.read().node(*node).and_then(|n| n.attrs.get(name).cloned())
    }

    fn text(&self, node: &NodeId) -> String {
        let mut parts = Vec::new();
        self.read().collect_text(*node, &mut parts);
        parts.join(" ")
    }

    fn style(&self, node: &NodeId) -> Option<ComputedStyle> {
        let arena = self.read();
        let data = arena.node(*node)?;
        Some(data.style.clone().unwrap_or_default())
    }

    fn bounding_box(&self, node: &NodeId) -> Option<Rect> {
        let arena = self.read();
        let rect = arena.node(*node)?.rect?;
        if arena.inside_hidden_subtree(*node) {
            return Some(Rect::default());
        }
        Some(rect)
    }

    fn title(&self) -> String {
        self.read().title.clone()
    }

    fn set_title(&self, title: &str) {
        self.write().title = title.to_string();
    }
}
