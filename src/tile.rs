//! Tile nodes of the graph.

use std::collections::BTreeSet;

use geo_types::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::parcel::ParcelKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileKey(pub u64);

/// A tile as carried by the graph. `r_squared` is `None` until the tile is
/// created by a merge, at which point it is set once to the winning join's
/// R² and never touched again -- per the "overwritten, not historized" open
/// question resolution in the design notes.
#[derive(Debug, Clone)]
pub struct Tile {
    key: TileKey,
    geometry: MultiPolygon<f64>,
    r_squared: Option<f64>,
    members: BTreeSet<ParcelKey>,
}

impl Tile {
    pub fn new(key: TileKey, geometry: MultiPolygon<f64>, members: BTreeSet<ParcelKey>) -> Self {
        Self {
            key,
            geometry,
            r_squared: None,
            members,
        }
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn members(&self) -> &BTreeSet<ParcelKey> {
        &self.members
    }

    pub fn r_squared(&self) -> Option<f64> {
        self.r_squared
    }

    /// Records the R² of the merge that created this tile. Called exactly
    /// once, by [`crate::graph::TileGraph::merge`].
    pub(crate) fn set_r_squared_from_merge(&mut self, r_squared: f64) {
        self.r_squared = Some(r_squared);
    }
}
