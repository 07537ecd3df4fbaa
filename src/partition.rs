//! Partition catalog: cell membership and border flags
//!
//! The partitioning algorithm itself lives elsewhere; this module only
//! consumes its output (one cell id per node) and answers the lookups the
//! preparation and query stages need.

use rustc_hash::FxHashMap;

use butterfly_common::{Error, Result};

use crate::graph::{EdgeFilter, EdgeState, NodeId, RoadGraph};

pub type CellId = u32;

/// Marker for "node belongs to no cell" in dense cell id arrays
pub const NO_CELL: CellId = u32::MAX;

/// Read-only view of a graph partition
pub trait PartitionCatalog: Send + Sync {
    /// Number of nodes covered by the catalog
    fn n_nodes(&self) -> u32;

    fn cell_id(&self, node: NodeId) -> Option<CellId>;

    fn is_border(&self, node: NodeId) -> bool;

    /// Members of `cell`, ascending; empty for unknown cells
    fn nodes_of_cell(&self, cell: CellId) -> &[NodeId];

    /// All cell ids, ascending
    fn cell_ids(&self) -> &[CellId];

    fn border_nodes(&self) -> Vec<NodeId> {
        (0..self.n_nodes()).filter(|&n| self.is_border(n)).collect()
    }

    fn same_cell(&self, a: NodeId, b: NodeId) -> bool {
        match (self.cell_id(a), self.cell_id(b)) {
            (Some(ca), Some(cb)) => ca == cb,
            _ => false,
        }
    }
}

/// Dense in-memory partition catalog
#[derive(Debug, Clone)]
pub struct CellStorage {
    cell_of: Vec<CellId>,
    border: Vec<bool>,
    members: FxHashMap<CellId, Vec<NodeId>>,
    cells: Vec<CellId>,
}

impl CellStorage {
    /// Build from one cell id per node, deriving border flags from `graph`.
    ///
    /// A node is a border node iff one of its incident edges leads to a node
    /// of another cell (or to a node without a cell).
    pub fn from_cell_ids(graph: &RoadGraph, cell_of: Vec<CellId>) -> Result<Self> {
        if cell_of.len() != graph.n_nodes() as usize {
            return Err(Error::InvalidInput(format!(
                "cell id array has {} entries, graph has {} nodes",
                cell_of.len(),
                graph.n_nodes()
            )));
        }

        let mut border = vec![false; cell_of.len()];
        for e in graph.edges() {
            let (a, b) = (e.base as usize, e.adj as usize);
            if cell_of[a] != cell_of[b] {
                border[a] = cell_of[a] != NO_CELL;
                border[b] = cell_of[b] != NO_CELL;
            }
        }

        Self::with_borders(cell_of, border)
    }

    /// Build from explicit cell ids and border flags (e.g. a loaded store)
    pub fn with_borders(cell_of: Vec<CellId>, border: Vec<bool>) -> Result<Self> {
        if cell_of.len() != border.len() {
            return Err(Error::InvalidInput(format!(
                "cell id array has {} entries, border array has {}",
                cell_of.len(),
                border.len()
            )));
        }
        if cell_of.len() > u32::MAX as usize {
            return Err(Error::InvalidInput("too many nodes".to_string()));
        }

        let mut members: FxHashMap<CellId, Vec<NodeId>> = FxHashMap::default();
        for (node, &cell) in cell_of.iter().enumerate() {
            if cell != NO_CELL {
                members.entry(cell).or_default().push(node as NodeId);
            }
        }
        let mut cells: Vec<CellId> = members.keys().copied().collect();
        cells.sort_unstable();

        Ok(Self {
            cell_of,
            border,
            members,
            cells,
        })
    }

    /// Raw cell id per node (`NO_CELL` for unassigned nodes)
    pub fn cell_array(&self) -> &[CellId] {
        &self.cell_of
    }

    pub fn border_array(&self) -> &[bool] {
        &self.border
    }

    pub fn largest_cell_size(&self) -> usize {
        self.members.values().map(Vec::len).max().unwrap_or(0)
    }
}

impl PartitionCatalog for CellStorage {
    fn n_nodes(&self) -> u32 {
        self.cell_of.len() as u32
    }

    fn cell_id(&self, node: NodeId) -> Option<CellId> {
        match self.cell_of.get(node as usize) {
            Some(&c) if c != NO_CELL => Some(c),
            _ => None,
        }
    }

    fn is_border(&self, node: NodeId) -> bool {
        self.border.get(node as usize).copied().unwrap_or(false)
    }

    fn nodes_of_cell(&self, cell: CellId) -> &[NodeId] {
        self.members.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    fn cell_ids(&self) -> &[CellId] {
        &self.cells
    }
}

/// Rejects every edge whose endpoints lie in different cells.
///
/// Used as the restriction filter of the core preparation: any node touching
/// a rejected edge stays in the core, so all border nodes are core nodes.
pub struct CellBorderRestrictionFilter<'a> {
    catalog: &'a dyn PartitionCatalog,
}

impl<'a> CellBorderRestrictionFilter<'a> {
    pub fn new(catalog: &'a dyn PartitionCatalog) -> Self {
        Self { catalog }
    }
}

impl EdgeFilter for CellBorderRestrictionFilter<'_> {
    fn accept(&self, edge: &EdgeState) -> bool {
        self.catalog.same_cell(edge.base, edge.adj)
    }
}

/// Accepts only edges with both endpoints inside one fixed cell
pub struct FixedCellEdgeFilter<'a> {
    catalog: &'a dyn PartitionCatalog,
    cell: CellId,
}

impl<'a> FixedCellEdgeFilter<'a> {
    pub fn new(catalog: &'a dyn PartitionCatalog, cell: CellId) -> Self {
        Self { catalog, cell }
    }

    pub fn cell(&self) -> CellId {
        self.cell
    }
}

impl EdgeFilter for FixedCellEdgeFilter<'_> {
    fn accept(&self, edge: &EdgeState) -> bool {
        self.catalog.cell_id(edge.base) == Some(self.cell)
            && self.catalog.cell_id(edge.adj) == Some(self.cell)
    }
}
