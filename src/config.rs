//! Run configuration: a YAML file loaded once at startup, validated, then
//! handed to the driver. Plain `serde::Deserialize` structs with
//! `#[serde(default = "...")]` for every option that has one.

use std::path::PathBuf;

use serde::Deserialize;

fn default_adjacency_buffer_feet() -> f64 {
    30.0
}

fn default_infill_k() -> usize {
    3
}

fn default_min_sales_for_ols() -> usize {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// path to the parcels input table
    pub parcels_path: PathBuf,

    /// path to the initial tiles input table
    pub tiles_path: PathBuf,

    /// terminate the merge loop once the tile count reaches this value
    pub desired_ending_tile_count: usize,

    /// buffer applied in the rook adjacency predicate, in feet
    #[serde(default = "default_adjacency_buffer_feet")]
    pub adjacency_buffer_feet: f64,

    /// number of donors used by the spatial-lag infiller
    #[serde(default = "default_infill_k")]
    pub infill_k: usize,

    /// sales-count gate applied by the OLS evaluator
    #[serde(default = "default_min_sales_for_ols")]
    pub min_sales_for_ols: usize,

    /// directory intermediate tile files are written to
    pub output_directory: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl RunConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self, crate::Error> {
        serde_yaml::from_str(contents)
            .map_err(|e| crate::Error::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.adjacency_buffer_feet < 0.0 {
            return Err(crate::Error::InvalidConfig(
                "adjacency_buffer_feet must be >= 0".to_string(),
            ));
        }
        if self.infill_k == 0 {
            return Err(crate::Error::InvalidConfig(
                "infill_k must be >= 1".to_string(),
            ));
        }
        if self.desired_ending_tile_count == 0 {
            return Err(crate::Error::InvalidConfig(
                "desired_ending_tile_count must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_missing_options() {
        let yaml = r#"
parcels_path: parcels.parquet
tiles_path: tiles.parquet
desired_ending_tile_count: 5
output_directory: out/
"#;
        let config = RunConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.adjacency_buffer_feet, 30.0);
        assert_eq!(config.infill_k, 3);
        assert_eq!(config.min_sales_for_ols, 3);
        assert_eq!(config.log_level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn rejects_negative_buffer() {
        let yaml = r#"
parcels_path: parcels.parquet
tiles_path: tiles.parquet
desired_ending_tile_count: 5
adjacency_buffer_feet: -1.0
output_directory: out/
"#;
        let config = RunConfig::from_yaml_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
