//! Columnar parcel store.
//!
//! Parcels are immutable except for three fields the merge pipeline is
//! explicitly allowed to write once: `built_area_sqft` (infill pass 1),
//! `market_value_proxy` (proxy assignment and infill pass 2), and
//! `current_tile` (tile membership, updated on every merge). Storage is
//! struct-of-arrays, indexed positionally, with a key -> index lookup on
//! top, structured like a `polars::DataFrame` wrapped column-by-column but
//! without polars in the hot path once the table is loaded.

use std::collections::HashMap;

use geo_types::{MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::tile::TileKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParcelKey(pub u64);

pub struct ParcelTable {
    keys: Vec<ParcelKey>,
    index_of: HashMap<ParcelKey, usize>,
    land_area_sqft: Vec<f64>,
    built_area_sqft: Vec<Option<f64>>,
    adj_sale_price: Vec<Option<f64>>,
    assessed_value: Vec<f64>,
    geometry: Vec<Polygon<f64>>,
    centroid: Vec<Point<f64>>,
    market_value_proxy: Vec<Option<f64>>,
    current_tile: Vec<TileKey>,
}

/// One row as read from the parcel input file, before the table validates
/// and indexes it.
pub struct ParcelInput {
    pub key: ParcelKey,
    pub land_area_sqft: f64,
    pub built_area_sqft: Option<f64>,
    pub adj_sale_price: Option<f64>,
    pub assessed_value: f64,
    pub geometry: Polygon<f64>,
}

impl ParcelTable {
    /// Builds the table from loaded rows, validating the `land_area_sqft`
    /// invariant and the input geometry. `current_tile` is left at the
    /// caller-supplied `unassigned` key until [`crate::graph::TileGraph::init`]
    /// assigns every parcel to a tile.
    pub fn from_rows(
        rows: Vec<ParcelInput>,
        unassigned: TileKey,
    ) -> Result<Self, crate::Error> {
        let mut keys = Vec::with_capacity(rows.len());
        let mut index_of = HashMap::with_capacity(rows.len());
        let mut land_area_sqft = Vec::with_capacity(rows.len());
        let mut built_area_sqft = Vec::with_capacity(rows.len());
        let mut adj_sale_price = Vec::with_capacity(rows.len());
        let mut assessed_value = Vec::with_capacity(rows.len());
        let mut geometry = Vec::with_capacity(rows.len());
        let mut centroid = Vec::with_capacity(rows.len());
        let mut market_value_proxy = Vec::with_capacity(rows.len());
        let mut current_tile = Vec::with_capacity(rows.len());

        for row in rows {
            if row.land_area_sqft <= 0.0 {
                return Err(crate::Error::NonPositiveLandArea(row.key));
            }
            let mp = MultiPolygon(vec![row.geometry.clone()]);
            crate::geom::validate(&mp)?;
            let c = crate::geom::centroid(&mp).ok_or(crate::Error::Geom(
                crate::geom::Error::EmptyResult("parcel centroid"),
            ))?;

            index_of.insert(row.key, keys.len());
            keys.push(row.key);
            land_area_sqft.push(row.land_area_sqft);
            built_area_sqft.push(row.built_area_sqft);
            adj_sale_price.push(row.adj_sale_price);
            assessed_value.push(row.assessed_value);
            geometry.push(row.geometry);
            centroid.push(c);
            market_value_proxy.push(None);
            current_tile.push(unassigned);
        }

        Ok(Self {
            keys,
            index_of,
            land_area_sqft,
            built_area_sqft,
            adj_sale_price,
            assessed_value,
            geometry,
            centroid,
            market_value_proxy,
            current_tile,
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = ParcelKey> + '_ {
        self.keys.iter().copied()
    }

    pub fn index_of(&self, key: ParcelKey) -> Option<usize> {
        self.index_of.get(&key).copied()
    }

    pub fn key_at(&self, idx: usize) -> ParcelKey {
        self.keys[idx]
    }

    pub fn land_area_sqft(&self, idx: usize) -> f64 {
        self.land_area_sqft[idx]
    }

    pub fn built_area_sqft(&self, idx: usize) -> Option<f64> {
        self.built_area_sqft[idx]
    }

    pub fn adj_sale_price(&self, idx: usize) -> Option<f64> {
        self.adj_sale_price[idx]
    }

    pub fn assessed_value(&self, idx: usize) -> f64 {
        self.assessed_value[idx]
    }

    pub fn geometry(&self, idx: usize) -> &Polygon<f64> {
        &self.geometry[idx]
    }

    pub fn centroid(&self, idx: usize) -> Point<f64> {
        self.centroid[idx]
    }

    pub fn market_value_proxy(&self, idx: usize) -> Option<f64> {
        self.market_value_proxy[idx]
    }

    pub fn current_tile(&self, idx: usize) -> TileKey {
        self.current_tile[idx]
    }

    /// Single write for `built_area_sqft`, phase D-1 only.
    pub fn set_built_area_sqft(&mut self, idx: usize, value: f64) {
        self.built_area_sqft[idx] = Some(value);
    }

    /// Single write for `market_value_proxy`, phases 3 and D-2 only.
    pub fn set_market_value_proxy(&mut self, idx: usize, value: f64) {
        self.market_value_proxy[idx] = Some(value);
    }

    pub fn set_current_tile(&mut self, idx: usize, tile: TileKey) {
        self.current_tile[idx] = tile;
    }
}
