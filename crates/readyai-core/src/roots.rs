//! The set of searchable roots: the document plus every open shadow root found so far.

use crate::dom::Dom;
use std::collections::HashSet;
use std::hash::Hash;
use tracing::trace;

/// Minimum gap between two full re-sweeps of the document.
pub const SHADOW_RESWEEP_MS: u64 = 4_000;

/// Incrementally maintained root set.
///
/// Roots are added on init, on mutation (for added subtrees) and on a
/// periodic re-sweep that catches shadow roots attached without a mutation
/// we could observe. Roots are never removed until the set is cleared.
#[derive(Debug, Clone)]
pub struct SearchRoots<N> {
    roots: Vec<N>,
    known: HashSet<N>,
    deep: bool,
    last_sweep_at: Option<u64>,
}

impl<N: Clone + Eq + Hash> Default for SearchRoots<N> {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            known: HashSet::new(),
            deep: false,
            last_sweep_at: None,
        }
    }
}

impl<N: Clone + Eq + Hash> SearchRoots<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the document, collecting shadow roots when `deep` is set.
    pub fn init<D: Dom<Node = N> + ?Sized>(&mut self, dom: &D, deep: bool, now_ms: u64) {
        self.clear();
        self.deep = deep;
        let document = dom.document();
        self.roots.push(document.clone());
        self.known.insert(document.clone());
        if deep {
            self.scan_tree(dom, &document);
            self.last_sweep_at = Some(now_ms);
        }
    }

    pub fn is_deep(&self) -> bool {
        self.deep
    }

    pub fn roots(&self) -> &[N] {
        &self.roots
    }

    pub fn document(&self) -> Option<&N> {
        self.roots.first()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn clear(&mut self) {
        self.roots.clear();
        self.known.clear();
        self.deep = false;
        self.last_sweep_at = None;
    }

    fn add_root<D: Dom<Node = N> + ?Sized>(&mut self, dom: &D, root: N) {
        if !self.known.insert(root.clone()) {
            return;
        }
        self.roots.push(root.clone());
        // A new shadow root can itself host further shadow roots.
        self.scan_tree(dom, &root);
    }

    /// Register every shadow root hosted at or below `start`.
    pub fn scan_tree<D: Dom<Node = N> + ?Sized>(&mut self, dom: &D, start: &N) {
        let mut stack = vec![start.clone()];
        while let Some(node) = stack.pop() {
            if let Some(shadow) = dom.shadow_root(&node) {
                self.add_root(dom, shadow);
            }
            stack.extend(dom.children(&node));
        }
    }

    /// Nodes added by a mutation.
    pub fn on_added_nodes<D: Dom<Node = N> + ?Sized>(&mut self, dom: &D, added: &[N]) {
        if !self.deep {
            return;
        }
        for node in added {
            self.scan_tree(dom, node);
        }
    }

    /// Re-sweep the whole document if the last sweep is old enough.
    pub fn maybe_resweep<D: Dom<Node = N> + ?Sized>(&mut self, dom: &D, now_ms: u64) -> bool {
        if !self.deep {
            return false;
        }
        if self
            .last_sweep_at
            .is_some_and(|last| now_ms.saturating_sub(last) < SHADOW_RESWEEP_MS)
        {
            return false;
        }
        self.last_sweep_at = Some(now_ms);
        let before = self.roots.len();
        let document = dom.document();
        self.scan_tree(dom, &document);
        trace!(
            target: "readyai::detector",
            "Shadow re-sweep: {} -> {} roots",
            before,
            self.roots.len()
        );
        true
    }
}
