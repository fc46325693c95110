//! Configuration for a tiled polygon layer and the store that holds it.

use crate::index::TileGrid;
use crate::io::GeometryEncoding;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for reading a tiled layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Grid geometry of the layer
    pub layer: LayerConfig,

    /// Where the tiles live
    pub store: StoreConfig,

    /// Fetch tuning
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Grid geometry: the layer is `shape` cells partitioned into square tiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Cell extent of the layer along (x, y)
    pub shape: [u64; 2],

    /// Cells per tile edge
    #[serde(default = "default_tile_size")]
    pub tile_size: u64,
}

impl LayerConfig {
    pub fn grid(&self) -> crate::Result<TileGrid> {
        TileGrid::new(self.shape, self.tile_size)
    }
}

/// Tile store backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// One GeoParquet file per tile on the local filesystem.
    Columnar {
        /// Path with `{x}` and `{y}` placeholders
        path_template: String,

        /// Encoding of the `geometry` column
        #[serde(default = "default_encoding")]
        encoding: GeometryEncoding,

        /// Un-tiled GeoParquet file read by `query --whole`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        whole_file: Option<String>,
    },

    /// One Zarr group per tile under a parent group.
    ArrayStore {
        /// Local directory or `s3://bucket/prefix` URI of the parent group
        path: String,

        /// AWS region for S3 stores
        #[serde(default)]
        region: Option<String>,
    },
}

impl StoreConfig {
    /// Human-readable location of the store.
    pub fn location(&self) -> &str {
        match self {
            Self::Columnar { path_template, .. } => path_template,
            Self::ArrayStore { path, .. } => path,
        }
    }
}

/// Fetch tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum tile fetches in flight for array stores
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Number of Tokio worker threads
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Rayon thread pool size for polygon decoding
    #[serde(default)]
    pub rayon_threads: Option<usize>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            worker_threads: None,
            rayon_threads: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "json" => serde_json::from_str(&contents)?,
            // YAML is a superset of JSON
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.layer.tile_size == 0 {
            anyhow::bail!("Tile size must be > 0");
        }
        if self.layer.shape.contains(&0) {
            anyhow::bail!("Layer shape must be non-empty on both axes");
        }
        if self.fetch.concurrency == 0 {
            anyhow::bail!("Concurrency must be > 0");
        }
        if self.fetch.worker_threads == Some(0) || self.fetch.rayon_threads == Some(0) {
            anyhow::bail!("Thread counts must be > 0 when set");
        }

        match &self.store {
            StoreConfig::Columnar { path_template, .. } => {
                if !path_template.contains("{x}") || !path_template.contains("{y}") {
                    anyhow::bail!(
                        "Columnar path template must contain {{x}} and {{y}}: {}",
                        path_template
                    );
                }
            }
            StoreConfig::ArrayStore { path, .. } => {
                if path.is_empty() {
                    anyhow::bail!("Array store path must not be empty");
                }
                if path.starts_with("s3://") {
                    crate::io::parse_s3_uri(path)?;
                }
            }
        }
        Ok(())
    }

    /// A starting configuration for `generate-config`.
    pub fn example() -> Self {
        Self {
            layer: LayerConfig {
                shape: [100, 100],
                tile_size: default_tile_size(),
            },
            store: StoreConfig::ArrayStore {
                path: "data/tiled.zarr".to_string(),
                region: None,
            },
            fetch: FetchConfig::default(),
        }
    }
}

// Default value functions for serde
fn default_tile_size() -> u64 { 10 }
fn default_concurrency() -> usize { 16 }
fn default_encoding() -> GeometryEncoding { GeometryEncoding::Wkb }
