//! Thin file-level plumbing over [`super::dataframe`]: a `File` in, a
//! `DataFrame` out (or back), with Zstd compression on write. Kept as
//! domain-specific functions rather than a generic trait pair: parcels,
//! tiles, and the intermediate-output frame have no common conversion
//! shape worth abstracting over here.

use std::fs::File;
use std::path::Path;

use polars::prelude::{ParquetCompression, ParquetReader, ParquetWriter, SerReader, SerWriter};

use super::{dataframe, Error};
use crate::graph::TileGraph;
use crate::parcel::ParcelInput;
use crate::tile::TileKey;
use geo_types::MultiPolygon;

fn read_dataframe(path: &Path) -> Result<polars::prelude::DataFrame, Error> {
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}

fn write_dataframe(path: &Path, df: &mut polars::prelude::DataFrame) -> Result<(), Error> {
    let file = File::create(path)?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .finish(df)?;
    Ok(())
}

/// Loads the parcels input table.
pub fn load_parcels(path: &Path) -> Result<Vec<ParcelInput>, Error> {
    let df = read_dataframe(path)?;
    dataframe::parcels_from_dataframe(&df)
}

/// Loads the initial tiles input table.
pub fn load_tiles(path: &Path) -> Result<Vec<(TileKey, MultiPolygon<f64>)>, Error> {
    let df = read_dataframe(path)?;
    dataframe::tiles_from_dataframe(&df)
}

/// Writes `intermediate_tiles_<iteration>.parquet` into `output_directory`,
/// creating the directory if it does not already exist.
pub fn write_intermediate_tiles(
    graph: &TileGraph,
    output_directory: &Path,
    iteration: usize,
) -> Result<(), Error> {
    std::fs::create_dir_all(output_directory)?;
    let mut df = dataframe::tiles_to_dataframe(graph)?;
    let path = output_directory.join(format!("intermediate_tiles_{iteration}.parquet"));
    write_dataframe(&path, &mut df)
}
