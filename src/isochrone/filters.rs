//! Edge rules for the query phases
//!
//! Both filters AND in the optional query filter. Core arcs are not filtered
//! here; a core prepared with the same filter holds no rejected edge.

use crate::graph::{EdgeFilter, EdgeState, NodeId};
use crate::partition::{CellId, FixedCellEdgeFilter, PartitionCatalog};

fn accepted_by(extra: Option<&dyn EdgeFilter>, edge: &EdgeState) -> bool {
    extra.map_or(true, |f| f.accept(edge))
}

/// Phase 1: base edges inside the origin's cell, plus the core overlay
pub struct StartCellEdgeFilter<'a> {
    catalog: &'a dyn PartitionCatalog,
    start_cell: CellId,
    cell: FixedCellEdgeFilter<'a>,
    extra: Option<&'a dyn EdgeFilter>,
}

impl<'a> StartCellEdgeFilter<'a> {
    pub fn new(
        catalog: &'a dyn PartitionCatalog,
        start_cell: CellId,
        extra: Option<&'a dyn EdgeFilter>,
    ) -> Self {
        Self {
            catalog,
            start_cell,
            cell: FixedCellEdgeFilter::new(catalog, start_cell),
            extra,
        }
    }

    /// Whether base edges leaving `node` can stay in the start cell
    pub fn covers(&self, node: NodeId) -> bool {
        self.catalog.cell_id(node) == Some(self.start_cell)
    }
}

impl EdgeFilter for StartCellEdgeFilter<'_> {
    fn accept(&self, edge: &EdgeState) -> bool {
        self.cell.accept(edge) && accepted_by(self.extra, edge)
    }
}

/// Phase 3: base edges with both endpoints in the active cell being swept.
///
/// A sweep under this filter never settles a node outside its cell.
pub struct ActiveCellEdgeFilter<'a> {
    cell: FixedCellEdgeFilter<'a>,
    extra: Option<&'a dyn EdgeFilter>,
}

impl<'a> ActiveCellEdgeFilter<'a> {
    pub fn new(
        catalog: &'a dyn PartitionCatalog,
        cell: CellId,
        extra: Option<&'a dyn EdgeFilter>,
    ) -> Self {
        Self {
            cell: FixedCellEdgeFilter::new(catalog, cell),
            extra,
        }
    }
}

impl EdgeFilter for ActiveCellEdgeFilter<'_> {
    fn accept(&self, edge: &EdgeState) -> bool {
        self.cell.accept(edge) && accepted_by(self.extra, edge)
    }
}
