//! Tile graph: tiles as nodes, rook-adjacency as edges, with
//! incremental edge maintenance across merges. The graph and its bounding
//! box index are the only place tile geometry and membership are mutated --
//! everything else in the crate reads through `&TileGraph`.

use std::collections::{BTreeSet, HashMap};

use geo::Contains;
use geo_types::{MultiPolygon, Point};

use crate::parcel::{ParcelKey, ParcelTable};
use crate::spatial_index::TileBBoxIndex;
use crate::tile::{Tile, TileKey};

/// Unordered pair of distinct tile keys, canonicalized so `{a, b}` and
/// `{b, a}` hash and compare identically -- this is the edge identity the
/// registry keys its memo on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey(TileKey, TileKey);

impl EdgeKey {
    pub fn new(a: TileKey, b: TileKey) -> Self {
        if a <= b {
            EdgeKey(a, b)
        } else {
            EdgeKey(b, a)
        }
    }

    pub fn endpoints(&self) -> (TileKey, TileKey) {
        (self.0, self.1)
    }
}

pub struct TileGraph {
    tiles: HashMap<TileKey, Tile>,
    adjacency: HashMap<TileKey, BTreeSet<TileKey>>,
    bbox_index: TileBBoxIndex,
    next_tile_key: u64,
    buffer_feet: f64,
}

impl TileGraph {
    pub fn tile(&self, key: TileKey) -> Option<&Tile> {
        self.tiles.get(&key)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn tile_keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.tiles.keys().copied()
    }

    /// Edges currently in the graph, in deterministic `(TileKey, TileKey)`
    /// ascending order.
    pub fn edges(&self) -> Vec<EdgeKey> {
        let mut out = BTreeSet::new();
        for (&a, neighbors) in &self.adjacency {
            for &b in neighbors {
                out.insert(EdgeKey::new(a, b));
            }
        }
        out.into_iter().collect()
    }

    pub fn neighbors(&self, key: TileKey) -> impl Iterator<Item = TileKey> + '_ {
        self.adjacency
            .get(&key)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Assigns every parcel to exactly one of `initial_tiles` by
    /// point-in-polygon on its centroid, then discovers the initial edge set
    /// via the bounding-box index confirmed with [`crate::geom::intersects_rook`].
    pub fn init(
        initial_tiles: Vec<(TileKey, MultiPolygon<f64>)>,
        parcels: &mut ParcelTable,
        buffer_feet: f64,
    ) -> Result<Self, crate::Error> {
        // Assign in ascending tile-key order so a parcel on a shared
        // boundary lands on the lexicographically smaller tile.
        let mut sorted_tiles = initial_tiles;
        sorted_tiles.sort_by_key(|(key, _)| *key);

        let mut members: HashMap<TileKey, BTreeSet<ParcelKey>> = sorted_tiles
            .iter()
            .map(|(key, _)| (*key, BTreeSet::new()))
            .collect();

        for parcel_key in parcels.keys().collect::<Vec<_>>() {
            let idx = parcels.index_of(parcel_key).expect("key from table");
            let centroid: Point<f64> = parcels.centroid(idx);
            let owner = sorted_tiles
                .iter()
                .find(|(_, geom)| geom.contains(&centroid) || geom_touches(geom, &centroid))
                .map(|(key, _)| *key);
            let owner = match owner {
                Some(key) => key,
                None => nearest_tile_by_centroid(&sorted_tiles, centroid),
            };
            members.get_mut(&owner).expect("tile exists").insert(parcel_key);
            parcels.set_current_tile(idx, owner);
        }

        let mut tiles = HashMap::new();
        let mut bbox_entries = Vec::with_capacity(sorted_tiles.len());
        for (key, geometry) in sorted_tiles {
            let bbox = crate::geom::bounding_rect(&geometry).ok_or(crate::Error::Geom(
                crate::geom::Error::EmptyResult("initial tile bounding box"),
            ))?;
            bbox_entries.push((key, bbox));
            let member_set = members.remove(&key).unwrap_or_default();
            tiles.insert(key, Tile::new(key, geometry, member_set));
        }
        let next_tile_key = tiles.keys().map(|k| k.0).max().unwrap_or(0) + 1;

        let mut graph = Self {
            bbox_index: TileBBoxIndex::build(bbox_entries),
            tiles,
            adjacency: HashMap::new(),
            next_tile_key,
            buffer_feet,
        };

        let keys: Vec<TileKey> = graph.tile_keys().collect();
        for key in keys {
            let candidates = graph.bbox_index.candidate_neighbors(key, buffer_feet);
            for candidate in candidates {
                if graph.adjacency.get(&key).is_some_and(|n| n.contains(&candidate)) {
                    continue;
                }
                let a = graph.tiles.get(&key).expect("tile exists").geometry();
                let b = graph.tiles.get(&candidate).expect("tile exists").geometry();
                if crate::geom::intersects_rook(a, b, buffer_feet)? {
                    graph.connect(key, candidate);
                }
            }
        }

        Ok(graph)
    }

    fn connect(&mut self, a: TileKey, b: TileKey) {
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    fn disconnect(&mut self, a: TileKey, b: TileKey) {
        if let Some(set) = self.adjacency.get_mut(&a) {
            set.remove(&b);
        }
        if let Some(set) = self.adjacency.get_mut(&b) {
            set.remove(&a);
        }
    }

    /// Merges tiles `a` and `b` into a freshly keyed tile, recorded with
    /// `winning_r_squared`. Returns the new tile's key and the set of
    /// neighbor tiles it inherited from `a` and `b` (with `{a,b}` itself
    /// dropped and duplicate counterparts collapsed), which the registry
    /// uses to mark exactly the right edges stale.
    pub fn merge(
        &mut self,
        a: TileKey,
        b: TileKey,
        winning_r_squared: f64,
        parcels: &mut ParcelTable,
    ) -> Result<(TileKey, Vec<TileKey>), crate::Error> {
        let tile_a = self.tiles.remove(&a).expect("endpoint a must exist");
        let tile_b = self.tiles.remove(&b).expect("endpoint b must exist");

        let geometry = crate::geom::union(tile_a.geometry(), tile_b.geometry())?;
        let mut members = tile_a.members().clone();
        members.extend(tile_b.members().iter().copied());

        let new_key = TileKey(self.next_tile_key);
        self.next_tile_key += 1;

        for &parcel_key in &members {
            if let Some(idx) = parcels.index_of(parcel_key) {
                parcels.set_current_tile(idx, new_key);
            }
        }

        let mut new_tile = Tile::new(new_key, geometry.clone(), members);

        let neighbors_a = self.adjacency.remove(&a).unwrap_or_default();
        let neighbors_b = self.adjacency.remove(&b).unwrap_or_default();
        let mut new_neighbors = BTreeSet::new();
        for &n in neighbors_a.iter().chain(neighbors_b.iter()) {
            if n == a || n == b {
                continue;
            }
            self.disconnect(a, n);
            self.disconnect(b, n);
            new_neighbors.insert(n);
        }
        self.disconnect(a, b);

        for &n in &new_neighbors {
            self.connect(new_key, n);
        }

        new_tile.set_r_squared_from_merge(winning_r_squared);
        self.tiles.insert(new_key, new_tile);

        self.bbox_index.remove(a);
        self.bbox_index.remove(b);
        let bbox = crate::geom::bounding_rect(&geometry).ok_or(crate::Error::Geom(
            crate::geom::Error::EmptyResult("merged tile bounding box"),
        ))?;
        self.bbox_index.insert(new_key, bbox);

        Ok((new_key, new_neighbors.into_iter().collect()))
    }

    pub fn buffer_feet(&self) -> f64 {
        self.buffer_feet
    }
}

fn geom_touches(geom: &MultiPolygon<f64>, point: &Point<f64>) -> bool {
    use geo::Intersects;
    geom.intersects(point)
}

fn nearest_tile_by_centroid(tiles: &[(TileKey, MultiPolygon<f64>)], point: Point<f64>) -> TileKey {
    tiles
        .iter()
        .min_by(|(_, a), (_, b)| {
            let da = crate::geom::centroid(a)
                .map(|c| (c.x() - point.x()).powi(2) + (c.y() - point.y()).powi(2))
                .unwrap_or(f64::INFINITY);
            let db = crate::geom::centroid(b)
                .map(|c| (c.x() - point.x()).powi(2) + (c.y() - point.y()).powi(2))
                .unwrap_or(f64::INFINITY);
            da.partial_cmp(&db).unwrap()
        })
        .map(|(key, _)| *key)
        .expect("at least one tile")
}
