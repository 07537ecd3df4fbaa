//! Search-tree arena
//!
//! Entries are appended, never moved; parents are arena indices. A node may
//! own several entries over a search (one per improvement); `best` points at
//! the current one.

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::graph::{EdgeId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchTreeEntry {
    pub node: NodeId,
    /// Arc the node was reached over; `None` for search roots
    pub edge: Option<u32>,
    /// Last base edge of `edge` (turn-cost correlation)
    pub orig_edge: Option<EdgeId>,
    /// Cumulative weight from the search root
    pub weight: f64,
    pub parent: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchTree {
    entries: Vec<SearchTreeEntry>,
    best: FxHashMap<NodeId, usize>,
}

impl SearchTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` and make it the node's current best
    pub fn push(&mut self, entry: SearchTreeEntry) -> usize {
        let index = self.entries.len();
        self.best.insert(entry.node, index);
        self.entries.push(entry);
        index
    }

    pub fn root(&mut self, node: NodeId, weight: f64) -> usize {
        self.push(SearchTreeEntry {
            node,
            edge: None,
            orig_edge: None,
            weight,
            parent: None,
        })
    }

    pub fn entry(&self, index: usize) -> &SearchTreeEntry {
        &self.entries[index]
    }

    pub fn best_index(&self, node: NodeId) -> Option<usize> {
        self.best.get(&node).copied()
    }

    pub fn best(&self, node: NodeId) -> Option<&SearchTreeEntry> {
        self.best_index(node).map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries from the root down to `node`'s best entry
    pub fn path_to(&self, node: NodeId) -> Vec<&SearchTreeEntry> {
        let mut path = Vec::new();
        let mut current = self.best_index(node);
        while let Some(i) = current {
            let entry = &self.entries[i];
            path.push(entry);
            current = entry.parent;
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_follows_parents() {
        let mut tree = SearchTree::new();
        let root = tree.root(4, 0.0);
        let a = tree.push(SearchTreeEntry {
            node: 5,
            edge: Some(10),
            orig_edge: Some(10),
            weight: 2.0,
            parent: Some(root),
        });
        tree.push(SearchTreeEntry {
            node: 6,
            edge: Some(11),
            orig_edge: Some(11),
            weight: 3.0,
            parent: Some(a),
        });
        // improvement for 5 replaces the best entry but keeps the old one
        tree.push(SearchTreeEntry {
            node: 5,
            edge: Some(12),
            orig_edge: Some(12),
            weight: 1.0,
            parent: Some(root),
        });

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.best(5).unwrap().weight, 1.0);
        let path: Vec<NodeId> = tree.path_to(6).iter().map(|e| e.node).collect();
        assert_eq!(path, vec![4, 5, 6]);
        assert!(tree.path_to(99).is_empty());
    }
}
