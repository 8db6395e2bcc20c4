//! Spatial index: an R-tree over parcel centroids for the
//! infiller's k-nearest queries, and a second R-tree over tile bounding
//! boxes for cheap merge-candidate discovery. Both are read-only once built
//! except the tile index, which the driver maintains incrementally (one
//! remove per consumed tile, one insert for the merged tile) rather than
//! rebuilding on every iteration.

use std::collections::HashMap;

use geo_types::Rect;
use ordered_float::OrderedFloat;
use rstar::{RTree, RTreeObject, AABB};

use crate::parcel::ParcelKey;
use crate::tile::TileKey;

#[derive(Debug, Clone, Copy)]
struct ParcelNode {
    key: ParcelKey,
    point: [f64; 2],
}

impl RTreeObject for ParcelNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

/// Bulk-built once, at parcel-table load, from parcel centroids.
pub struct ParcelIndex {
    tree: RTree<ParcelNode>,
}

fn dist2(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

impl ParcelIndex {
    pub fn build(points: impl IntoIterator<Item = (ParcelKey, [f64; 2])>) -> Self {
        let nodes: Vec<ParcelNode> = points
            .into_iter()
            .map(|(key, point)| ParcelNode { key, point })
            .collect();
        Self {
            tree: RTree::bulk_load(nodes),
        }
    }

    /// Up to `k` parcels satisfying `predicate`, ordered by ascending
    /// Euclidean distance from `origin`; ties broken by ascending parcel key
    /// for determinism, per the spatial-lag infiller's requirements.
    pub fn k_nearest(
        &self,
        origin: [f64; 2],
        k: usize,
        mut predicate: impl FnMut(ParcelKey) -> bool,
    ) -> Vec<ParcelKey> {
        if k == 0 {
            return Vec::new();
        }
        // Overscan past k before re-sorting so that distance ties land in
        // deterministic key order rather than whatever order the tree's
        // nearest-neighbor traversal happens to produce.
        let overscan = k.saturating_mul(4).max(k + 16);
        let mut candidates: Vec<(OrderedFloat<f64>, ParcelKey)> = self
            .tree
            .nearest_neighbor_iter(&origin)
            .filter(|n| predicate(n.key))
            .take(overscan)
            .map(|n| (OrderedFloat(dist2(origin, n.point)), n.key))
            .collect();
        candidates.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        candidates.into_iter().take(k).map(|(_, key)| key).collect()
    }
}

#[derive(Debug, Clone)]
struct TileBBoxNode {
    key: TileKey,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for TileBBoxNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

impl PartialEq for TileBBoxNode {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

fn rect_to_envelope(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [rect.min().x, rect.min().y],
        [rect.max().x, rect.max().y],
    )
}

fn expand(env: AABB<[f64; 2]>, buffer: f64) -> AABB<[f64; 2]> {
    let lower = env.lower();
    let upper = env.upper();
    AABB::from_corners(
        [lower[0] - buffer, lower[1] - buffer],
        [upper[0] + buffer, upper[1] + buffer],
    )
}

/// Bounding-box index over live tiles, maintained incrementally by the
/// driver across merges rather than rebuilt from the full tile set.
pub struct TileBBoxIndex {
    tree: RTree<TileBBoxNode>,
    envelopes: HashMap<TileKey, AABB<[f64; 2]>>,
}

impl TileBBoxIndex {
    pub fn build(tiles: impl IntoIterator<Item = (TileKey, Rect<f64>)>) -> Self {
        let mut envelopes = HashMap::new();
        let nodes: Vec<TileBBoxNode> = tiles
            .into_iter()
            .map(|(key, rect)| {
                let env = rect_to_envelope(rect);
                envelopes.insert(key, env);
                TileBBoxNode { key, env }
            })
            .collect();
        Self {
            tree: RTree::bulk_load(nodes),
            envelopes,
        }
    }

    pub fn insert(&mut self, key: TileKey, rect: Rect<f64>) {
        let env = rect_to_envelope(rect);
        self.envelopes.insert(key, env);
        self.tree.insert(TileBBoxNode { key, env });
    }

    pub fn remove(&mut self, key: TileKey) {
        if let Some(env) = self.envelopes.remove(&key) {
            self.tree.remove(&TileBBoxNode { key, env });
        }
    }

    /// Tiles whose bounding box is within `buffer` of `key`'s bounding box.
    /// The caller must confirm candidates with [`crate::geom::intersects_rook`];
    /// this is a cheap coarse filter, not the adjacency predicate itself.
    pub fn candidate_neighbors(&self, key: TileKey, buffer: f64) -> Vec<TileKey> {
        let Some(&env) = self.envelopes.get(&key) else {
            return Vec::new();
        };
        let search = expand(env, buffer);
        self.tree
            .locate_in_envelope_intersecting(&search)
            .filter(|n| n.key != key)
            .map(|n| n.key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k_nearest_breaks_ties_by_key() {
        let idx = ParcelIndex::build(vec![
            (ParcelKey(3), [1.0, 0.0]),
            (ParcelKey(1), [1.0, 0.0]),
            (ParcelKey(2), [1.0, 0.0]),
        ]);
        let result = idx.k_nearest([0.0, 0.0], 2, |_| true);
        assert_eq!(result, vec![ParcelKey(1), ParcelKey(2)]);
    }

    #[test]
    fn k_nearest_respects_predicate() {
        let idx = ParcelIndex::build(vec![
            (ParcelKey(1), [1.0, 0.0]),
            (ParcelKey(2), [2.0, 0.0]),
            (ParcelKey(3), [3.0, 0.0]),
        ]);
        let result = idx.k_nearest([0.0, 0.0], 2, |k| k != ParcelKey(1));
        assert_eq!(result, vec![ParcelKey(2), ParcelKey(3)]);
    }

    #[test]
    fn tile_bbox_candidates_require_buffer() {
        let mut idx = TileBBoxIndex::build(vec![
            (
                TileKey(1),
                Rect::new((0.0, 0.0), (1.0, 1.0)),
            ),
            (
                TileKey(2),
                Rect::new((2.0, 0.0), (3.0, 1.0)),
            ),
        ]);
        assert!(idx.candidate_neighbors(TileKey(1), 0.5).is_empty());
        assert_eq!(idx.candidate_neighbors(TileKey(1), 1.5), vec![TileKey(2)]);

        idx.remove(TileKey(2));
        assert!(idx.candidate_neighbors(TileKey(1), 1.5).is_empty());
    }
}
