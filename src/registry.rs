//! Prospective-join registry: a memoized, lazily-refreshed
//! priority view over the graph's edges. `best()` is the only place an edge
//! is actually re-evaluated -- invalidation just flips a flag so the driver
//! never pays for an edge it won't ask about this iteration.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::graph::{EdgeKey, TileGraph};
use crate::parcel::ParcelTable;
use crate::tile::TileKey;

/// Below this many stale edges, recomputing sequentially is cheaper than
/// paying rayon's dispatch overhead; above it the recompute is embarrassingly
/// parallel since every edge reads disjoint tile member sets.
const PARALLEL_RECOMPUTE_THRESHOLD: usize = 64;

struct JoinEntry {
    r_squared: f64,
    parcel_count: usize,
    stale: bool,
}

impl JoinEntry {
    fn fresh_stale() -> Self {
        Self {
            r_squared: 0.0,
            parcel_count: 0,
            stale: true,
        }
    }
}

pub struct JoinRegistry {
    entries: HashMap<EdgeKey, JoinEntry>,
}

impl JoinRegistry {
    /// Builds a registry with one stale entry per edge currently in `graph`.
    pub fn from_graph(graph: &TileGraph) -> Self {
        let entries = graph
            .edges()
            .into_iter()
            .map(|edge| (edge, JoinEntry::fresh_stale()))
            .collect();
        Self { entries }
    }

    /// The memoized R² for `edge` as of the last [`Self::best`] call that
    /// touched it. Used by the driver to record the winning join's R² on
    /// the tile it creates, without re-running the regression.
    pub fn r_squared_of(&self, edge: EdgeKey) -> Option<f64> {
        self.entries.get(&edge).map(|entry| entry.r_squared)
    }

    pub fn invalidate(&mut self, edge: EdgeKey) {
        if let Some(entry) = self.entries.get_mut(&edge) {
            entry.stale = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Called after [`TileGraph::merge`] has produced tile `new_key` from
    /// `removed`. Drops the edges the graph no longer has (`{removed.0, n}`,
    /// `{removed.1, n}`, and `{removed.0, removed.1}`) and installs a stale
    /// entry for every edge the new tile inherited.
    pub fn on_merge(
        &mut self,
        new_key: TileKey,
        removed: (TileKey, TileKey),
        new_neighbors: &[TileKey],
    ) {
        self.entries
            .remove(&EdgeKey::new(removed.0, removed.1));
        for &n in new_neighbors {
            self.entries.remove(&EdgeKey::new(removed.0, n));
            self.entries.remove(&EdgeKey::new(removed.1, n));
            self.entries
                .insert(EdgeKey::new(new_key, n), JoinEntry::fresh_stale());
        }
    }

    fn evaluate(
        graph: &TileGraph,
        parcels: &ParcelTable,
        edge: EdgeKey,
        min_sales_for_ols: usize,
    ) -> Result<(f64, usize), crate::ols::Error> {
        let (a, b) = edge.endpoints();
        let tile_a = graph.tile(a).expect("edge endpoint must exist in graph");
        let tile_b = graph.tile(b).expect("edge endpoint must exist in graph");

        let mut indices: Vec<usize> = tile_a
            .members()
            .iter()
            .chain(tile_b.members().iter())
            .filter_map(|&key| parcels.index_of(key))
            .collect();
        // Sorted so the design matrix's row order -- and therefore floating
        // point summation order in the solver -- depends only on the input
        // set, never on iteration order over the tiles' member sets.
        indices.sort_unstable();

        let parcel_count = indices.len();
        let r_squared = crate::ols::r_squared(parcels, &indices, min_sales_for_ols)?;
        Ok((r_squared, parcel_count))
    }

    /// Recomputes every stale entry (in parallel once there are enough of
    /// them to be worth it) and returns the globally best edge: highest R²,
    /// ties broken by higher parcel count, further ties by ascending
    /// `EdgeKey`. `None` means the graph has no edges left.
    pub fn best(
        &mut self,
        graph: &TileGraph,
        parcels: &ParcelTable,
        min_sales_for_ols: usize,
    ) -> Result<Option<EdgeKey>, crate::ols::Error> {
        let stale: Vec<EdgeKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.stale)
            .map(|(edge, _)| *edge)
            .collect();

        let recomputed: Vec<(EdgeKey, f64, usize)> = if stale.len() >= PARALLEL_RECOMPUTE_THRESHOLD
        {
            stale
                .par_iter()
                .map(|&edge| {
                    Self::evaluate(graph, parcels, edge, min_sales_for_ols)
                        .map(|(r2, count)| (edge, r2, count))
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stale
                .iter()
                .map(|&edge| {
                    Self::evaluate(graph, parcels, edge, min_sales_for_ols)
                        .map(|(r2, count)| (edge, r2, count))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        for (edge, r_squared, parcel_count) in recomputed {
            if let Some(entry) = self.entries.get_mut(&edge) {
                entry.r_squared = r_squared;
                entry.parcel_count = parcel_count;
                entry.stale = false;
            }
        }

        let mut ranked: Vec<(EdgeKey, f64, usize)> = self
            .entries
            .iter()
            .map(|(edge, entry)| (*edge, entry.r_squared, entry.parcel_count))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .expect("r_squared is never NaN")
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(ranked.into_iter().next().map(|(edge, _, _)| edge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parcel::{ParcelInput, ParcelKey};
    use crate::tile::TileKey;
    use geo_types::{polygon, MultiPolygon};

    fn square(x0: f64, y0: f64, side: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x0, y: y0),
            (x: x0 + side, y: y0),
            (x: x0 + side, y: y0 + side),
            (x: x0, y: y0 + side),
            (x: x0, y: y0),
        ]])
    }

    fn two_tile_graph(min_sales: usize) -> (TileGraph, ParcelTable, usize) {
        let rows = vec![
            ParcelInput {
                key: ParcelKey(1),
                land_area_sqft: 5000.0,
                built_area_sqft: Some(1000.0),
                adj_sale_price: Some(200_000.0),
                assessed_value: 200_000.0,
                geometry: square(0.0, 0.0, 10.0).0[0].clone(),
            },
            ParcelInput {
                key: ParcelKey(2),
                land_area_sqft: 6000.0,
                built_area_sqft: Some(1500.0),
                adj_sale_price: Some(300_000.0),
                assessed_value: 300_000.0,
                geometry: square(10.0, 0.0, 10.0).0[0].clone(),
            },
        ];
        let mut parcels = ParcelTable::from_rows(rows, TileKey(0)).unwrap();
        for idx in 0..parcels.len() {
            parcels.set_market_value_proxy(idx, parcels.assessed_value(idx));
        }
        let tiles = vec![
            (TileKey(1), square(0.0, 0.0, 10.0)),
            (TileKey(2), square(10.0, 0.0, 10.0)),
        ];
        let graph = TileGraph::init(tiles, &mut parcels, 0.0).unwrap();
        (graph, parcels, min_sales)
    }

    #[test]
    fn best_picks_the_only_edge() {
        let (graph, parcels, min_sales) = two_tile_graph(0);
        let mut registry = JoinRegistry::from_graph(&graph);
        let best = registry.best(&graph, &parcels, min_sales).unwrap();
        assert_eq!(best, Some(EdgeKey::new(TileKey(1), TileKey(2))));
    }

    #[test]
    fn gate_law_forces_zero_r_squared() {
        let (graph, parcels, _) = two_tile_graph(3);
        let mut registry = JoinRegistry::from_graph(&graph);
        registry.best(&graph, &parcels, 3).unwrap();
        let edge = EdgeKey::new(TileKey(1), TileKey(2));
        assert_eq!(registry.entries.get(&edge).unwrap().r_squared, 0.0);
    }

    #[test]
    fn on_merge_leaves_no_other_edge_stale() {
        let (mut graph, mut parcels, _) = two_tile_graph(0);
        let mut registry = JoinRegistry::from_graph(&graph);
        registry.best(&graph, &parcels, 0).unwrap();

        let (new_key, neighbors) = graph
            .merge(TileKey(1), TileKey(2), 1.0, &mut parcels)
            .unwrap();
        registry.on_merge(new_key, (TileKey(1), TileKey(2)), &neighbors);

        assert!(registry.entries.is_empty());
    }
}
