//! Row <-> `polars::DataFrame` conversions for the parcel and tile input
//! tables and for the intermediate tile output.

use std::io::Cursor;

use geo_types::{Geometry, MultiPolygon};
use geozero::wkb::{FromWkb, WkbDialect, WkbWriter};
use geozero::GeozeroGeometry;
use polars::prelude::*;

use super::Error;
use crate::graph::TileGraph;
use crate::parcel::{ParcelInput, ParcelKey};
use crate::tile::TileKey;

const COL_KEY: &str = "key";
const COL_LAND_AREA: &str = "land_area_sqft";
const COL_BUILT_AREA: &str = "built_area_sqft";
const COL_SALE_PRICE: &str = "adj_sale_price";
const COL_ASSESSED_VALUE: &str = "assessed_value";
const COL_GEOMETRY: &str = "geometry";
const COL_R_SQUARED: &str = "r_squared";

fn u64_column<'a>(df: &'a DataFrame, name: &'static str) -> Result<&'a UInt64Chunked, Error> {
    df.column(name)
        .map_err(|_| Error::MissingColumn(name))?
        .u64()
        .map_err(|_| Error::UnexpectedColumnType(name))
}

fn f64_column<'a>(df: &'a DataFrame, name: &'static str) -> Result<&'a Float64Chunked, Error> {
    df.column(name)
        .map_err(|_| Error::MissingColumn(name))?
        .f64()
        .map_err(|_| Error::UnexpectedColumnType(name))
}

fn binary_column<'a>(df: &'a DataFrame, name: &'static str) -> Result<&'a BinaryChunked, Error> {
    df.column(name)
        .map_err(|_| Error::MissingColumn(name))?
        .binary()
        .map_err(|_| Error::UnexpectedColumnType(name))
}

fn geometry_to_wkb(geom: &Geometry<f64>) -> Result<Vec<u8>, Error> {
    let mut wkb: Vec<u8> = Vec::with_capacity(256);
    let mut writer = WkbWriter::new(&mut wkb, WkbDialect::Wkb);
    geom.process_geom(&mut writer)?;
    Ok(wkb)
}

fn geometry_from_wkb(bytes: &[u8]) -> Result<Geometry<f64>, Error> {
    let mut cursor = Cursor::new(bytes);
    Ok(Geometry::from_wkb(&mut cursor, WkbDialect::Wkb)?)
}

/// Reads the parcels table into [`ParcelInput`] rows, ready for
/// [`crate::parcel::ParcelTable::from_rows`]. Fails with
/// [`Error::MissingColumn`]/[`Error::UnexpectedColumnType`] on a
/// malformed input schema.
pub fn parcels_from_dataframe(df: &DataFrame) -> Result<Vec<ParcelInput>, Error> {
    let key = u64_column(df, COL_KEY)?;
    let land_area = f64_column(df, COL_LAND_AREA)?;
    let built_area = f64_column(df, COL_BUILT_AREA)?;
    let sale_price = f64_column(df, COL_SALE_PRICE)?;
    let assessed_value = f64_column(df, COL_ASSESSED_VALUE)?;
    let geometry = binary_column(df, COL_GEOMETRY)?;

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let key = ParcelKey(key.get(i).ok_or(Error::MissingColumn(COL_KEY))?);
        let land_area_sqft = land_area
            .get(i)
            .ok_or(Error::MissingColumn(COL_LAND_AREA))?;
        let built_area_sqft = built_area.get(i);
        let adj_sale_price = sale_price.get(i);
        let assessed_value = assessed_value
            .get(i)
            .ok_or(Error::MissingColumn(COL_ASSESSED_VALUE))?;
        let wkb_bytes = geometry.get(i).ok_or(Error::MissingColumn(COL_GEOMETRY))?;
        let geom = geometry_from_wkb(wkb_bytes)?;
        let polygon = match geom {
            Geometry::Polygon(p) => p,
            Geometry::MultiPolygon(mp) if mp.0.len() == 1 => {
                mp.0.into_iter().next().expect("checked len == 1")
            }
            _ => return Err(Error::UnexpectedColumnType(COL_GEOMETRY)),
        };
        rows.push(ParcelInput {
            key,
            land_area_sqft,
            built_area_sqft,
            adj_sale_price,
            assessed_value,
            geometry: polygon,
        });
    }
    Ok(rows)
}

/// Reads the tiles table into `(TileKey, MultiPolygon)` pairs, ready for
/// [`crate::graph::TileGraph::init`]. The input `r_squared` column is
/// ignored -- it is always null on input.
pub fn tiles_from_dataframe(df: &DataFrame) -> Result<Vec<(TileKey, MultiPolygon<f64>)>, Error> {
    let key = u64_column(df, COL_KEY)?;
    let geometry = binary_column(df, COL_GEOMETRY)?;

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let key = TileKey(key.get(i).ok_or(Error::MissingColumn(COL_KEY))?);
        let wkb_bytes = geometry.get(i).ok_or(Error::MissingColumn(COL_GEOMETRY))?;
        let geom = geometry_from_wkb(wkb_bytes)?;
        let mp = match geom {
            Geometry::MultiPolygon(mp) => mp,
            Geometry::Polygon(p) => MultiPolygon(vec![p]),
            _ => return Err(Error::UnexpectedColumnType(COL_GEOMETRY)),
        };
        rows.push((key, mp));
    }
    Ok(rows)
}

/// Builds the `intermediate_tiles_<n>.parquet` frame: `key`, `geometry`
/// (WKB), `r_squared` (null for a tile that has never been merged). Tiles
/// are emitted in ascending key order for a deterministic row order.
pub fn tiles_to_dataframe(graph: &TileGraph) -> Result<DataFrame, Error> {
    let mut keys: Vec<TileKey> = graph.tile_keys().collect();
    keys.sort_unstable();

    let mut key_values = Vec::with_capacity(keys.len());
    let mut geometry_values: Vec<Vec<u8>> = Vec::with_capacity(keys.len());
    let mut r_squared_values: Vec<Option<f64>> = Vec::with_capacity(keys.len());

    for key in keys {
        let tile = graph.tile(key).expect("key came from graph.tile_keys()");
        key_values.push(key.0);
        let geom = Geometry::MultiPolygon(tile.geometry().clone());
        geometry_values.push(geometry_to_wkb(&geom)?);
        r_squared_values.push(tile.r_squared());
    }

    let df = df! {
        COL_KEY => key_values,
        COL_GEOMETRY => geometry_values,
        COL_R_SQUARED => r_squared_values,
    }?;
    Ok(df)
}
