//! Per-weighting eccentricity storage
//!
//! Border node → slot map plus two parallel arrays. Written once by the
//! precomputation, read-only at query time.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use butterfly_common::{Error, Result};

use crate::formats::EccentricityFile;
use crate::graph::NodeId;

#[derive(Debug, Clone)]
pub struct EccentricityStorage {
    weighting: String,
    slots: FxHashMap<NodeId, usize>,
    nodes: Vec<NodeId>,
    eccentricities: Vec<f64>,
    fully_reachable: Vec<bool>,
}

impl EccentricityStorage {
    /// Empty storage for `border_nodes`. Until set, a node has an infinite
    /// eccentricity and is not fully reachable, so it never saturates a cell.
    pub fn create(weighting: impl Into<String>, mut border_nodes: Vec<NodeId>) -> Self {
        border_nodes.sort_unstable();
        border_nodes.dedup();
        let slots = border_nodes
            .iter()
            .enumerate()
            .map(|(slot, &node)| (node, slot))
            .collect();
        let n = border_nodes.len();
        Self {
            weighting: weighting.into(),
            slots,
            nodes: border_nodes,
            eccentricities: vec![f64::INFINITY; n],
            fully_reachable: vec![false; n],
        }
    }

    pub(crate) fn from_entries(
        weighting: String,
        entries: Vec<(NodeId, f64, bool)>,
    ) -> Result<Self> {
        let nodes: Vec<NodeId> = entries.iter().map(|e| e.0).collect();
        if nodes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidInput(
                "eccentricity entries must be strictly ascending by node".to_string(),
            ));
        }
        let mut storage = Self::create(weighting, nodes);
        for (node, eccentricity, fully) in entries {
            storage.set(node, eccentricity, fully)?;
        }
        Ok(storage)
    }

    pub fn weighting(&self) -> &str {
        &self.weighting
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.slots.contains_key(&node)
    }

    pub fn set(&mut self, node: NodeId, eccentricity: f64, fully_reachable: bool) -> Result<()> {
        let slot = *self.slots.get(&node).ok_or_else(|| {
            Error::InvalidInput(format!("node {node} has no eccentricity slot"))
        })?;
        if eccentricity.is_nan() || eccentricity < 0.0 {
            return Err(Error::InvalidInput(format!(
                "invalid eccentricity {eccentricity} for node {node}"
            )));
        }
        self.eccentricities[slot] = eccentricity;
        self.fully_reachable[slot] = fully_reachable;
        Ok(())
    }

    pub fn eccentricity(&self, node: NodeId) -> Option<f64> {
        self.slots.get(&node).map(|&s| self.eccentricities[s])
    }

    pub fn is_fully_reachable(&self, node: NodeId) -> bool {
        self.slots
            .get(&node)
            .is_some_and(|&s| self.fully_reachable[s])
    }

    /// `(node, eccentricity, fully_reachable)` in ascending node order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, f64, bool)> + '_ {
        self.nodes
            .iter()
            .zip(&self.eccentricities)
            .zip(&self.fully_reachable)
            .map(|((&n, &e), &f)| (n, e, f))
    }

    pub fn fully_reachable_count(&self) -> usize {
        self.fully_reachable.iter().filter(|&&f| f).count()
    }

    /// Persist to `<dir>/eccentricity.<weighting>.bin`
    pub fn flush(&self, dir: &Path) -> Result<PathBuf> {
        let path = EccentricityFile::path(dir, &self.weighting);
        EccentricityFile::write(&path, self)?;
        Ok(path)
    }

    /// Load the store for `weighting` from `dir`; `None` if it does not exist.
    pub fn load_existing(dir: &Path, weighting: &str) -> Result<Option<Self>> {
        let path = EccentricityFile::path(dir, weighting);
        if !path.exists() {
            return Ok(None);
        }
        let storage = EccentricityFile::read(&path)?;
        if storage.weighting != weighting {
            return Err(Error::invalid_format(
                &path,
                format!(
                    "store holds weighting '{}', expected '{}'",
                    storage.weighting, weighting
                ),
            ));
        }
        Ok(Some(storage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_slots_never_saturate() {
        let storage = EccentricityStorage::create("fastest", vec![5, 2, 5]);
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.eccentricity(2), Some(f64::INFINITY));
        assert!(!storage.is_fully_reachable(2));
        assert_eq!(storage.eccentricity(3), None);
        assert!(!storage.is_fully_reachable(3));
    }

    #[test]
    fn test_set_rejects_unknown_nodes_and_bad_values() {
        let mut storage = EccentricityStorage::create("fastest", vec![1]);
        assert!(storage.set(2, 1.0, true).is_err());
        assert!(storage.set(1, f64::NAN, true).is_err());
        assert!(storage.set(1, -1.0, true).is_err());
        storage.set(1, 4.5, true).unwrap();
        assert_eq!(storage.eccentricity(1), Some(4.5));
        assert_eq!(storage.fully_reachable_count(), 1);
    }

    #[test]
    fn test_flush_and_load_existing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EccentricityStorage::load_existing(dir.path(), "fastest")
            .unwrap()
            .is_none());

        let mut storage = EccentricityStorage::create("fastest", vec![0, 9]);
        storage.set(0, 12.0, true).unwrap();
        storage.set(9, 3.0, false).unwrap();
        let path = storage.flush(dir.path()).unwrap();
        assert!(path.exists());

        let loaded = EccentricityStorage::load_existing(dir.path(), "fastest")
            .unwrap()
            .unwrap();
        assert_eq!(loaded.iter().collect::<Vec<_>>(), storage.iter().collect::<Vec<_>>());
        assert!(EccentricityStorage::load_existing(dir.path(), "shortest")
            .unwrap()
            .is_none());
    }
}
