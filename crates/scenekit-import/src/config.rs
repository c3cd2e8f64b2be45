//! Import pipeline configuration

use serde::{Deserialize, Serialize};

use crate::file::ModelFormat;

/// Settings shared by every stage of the import pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Largest accepted file in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Formats accepted by the validator
    #[serde(default = "default_supported_types")]
    pub supported_types: Vec<ModelFormat>,
    /// What a multi-file import does when one file fails
    #[serde(default)]
    pub batch_policy: BatchPolicy,
    /// Timeout for URL imports in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub zip: ZipConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            supported_types: default_supported_types(),
            batch_policy: BatchPolicy::default(),
            http_timeout_secs: default_http_timeout(),
            zip: ZipConfig::default(),
            placement: PlacementConfig::default(),
        }
    }
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

fn default_supported_types() -> Vec<ModelFormat> {
    ModelFormat::ALL.to_vec()
}

fn default_http_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZipConfig {
    /// Encoding label for entry names that are not valid UTF-8
    #[serde(default = "default_legacy_encoding")]
    pub legacy_encoding: String,
}

impl Default for ZipConfig {
    fn default() -> Self {
        Self {
            legacy_encoding: default_legacy_encoding(),
        }
    }
}

fn default_legacy_encoding() -> String {
    "gbk".to_string()
}

/// Where imported models land
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Height of the grid plane the model rests on
    #[serde(default)]
    pub grid_height: f64,
    /// Extra offset applied to every placement
    #[serde(default)]
    pub offset: [f64; 3],
    /// Snap x/z to multiples of this size; 0 disables snapping
    #[serde(default)]
    pub grid_cell_size: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPolicy {
    /// Fail the whole batch on the first error
    #[default]
    Abort,
    /// Skip failed files and keep the rest
    Continue,
}
