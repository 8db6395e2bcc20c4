//! Parquet input/output: schema-aware `DataFrame` conversions in
//! `dataframe`, thin read/write plumbing in `parquet`.

mod dataframe;
mod error;
pub mod parquet;

pub use dataframe::{parcels_from_dataframe, tiles_from_dataframe, tiles_to_dataframe};
pub use error::Error;
