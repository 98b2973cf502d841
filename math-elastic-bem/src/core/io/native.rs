//! Native Rust JSON/TOML format for near-field configuration
//!
//! Every section and field is optional; missing values take the library defaults.
//!
//! ## Example TOML Configuration
//!
//! ```toml
//! [material]
//! shear_modulus = 3.0e10
//! poisson_ratio = 0.25
//!
//! [limit]
//! eps_start = 0.01
//! eps_steps = 5
//! tolerance = 5e-3
//!
//! [geometry]
//! min_angle_deg = 20.0
//! nearfield_threshold = 3.0
//!
//! [table]
//! directory = "tables"
//! coincident_nodes = [8, 8, 5]
//! edge_nodes = [12, 5]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::constants::{
    DEFAULT_MIN_ANGLE_DEG, DEFAULT_NEARFIELD_THRESHOLD, DEFAULT_SPLIT_ANGLE_DEG,
    DEFAULT_TILE_SIZE,
};
use crate::core::error::{NearfieldError, Result};
use crate::core::evaluator::CpuEvaluator;
use crate::core::integration::{LimitSettings, QuadratureSettings, SingularClass};
use crate::core::types::ElasticityParams;

/// Native near-field configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NearfieldConfig {
    /// Problem description
    #[serde(default)]
    pub description: String,

    /// Elastic material
    #[serde(default)]
    pub material: MaterialConfig,

    /// Rule orders
    #[serde(default)]
    pub quadrature: QuadratureSettings,

    /// Regularized sequence and extrapolation
    #[serde(default)]
    pub limit: LimitSettings,

    /// Geometric thresholds
    #[serde(default)]
    pub geometry: GeometryConfig,

    /// Interpolation tables
    #[serde(default)]
    pub table: TableConfig,

    /// Batched evaluator
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
}

/// Elastic material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialConfig {
    /// Shear modulus μ
    #[serde(default = "default_shear_modulus")]
    pub shear_modulus: f64,

    /// Poisson ratio ν
    #[serde(default = "default_poisson_ratio")]
    pub poisson_ratio: f64,
}

fn default_shear_modulus() -> f64 {
    1.0
}
fn default_poisson_ratio() -> f64 {
    0.25
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            shear_modulus: default_shear_modulus(),
            poisson_ratio: default_poisson_ratio(),
        }
    }
}

/// Geometric thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// Smallest accepted interior angle in degrees
    #[serde(default = "default_min_angle")]
    pub min_angle_deg: f64,

    /// Base angle of the edge-adjacent core in degrees
    #[serde(default = "default_split_angle")]
    pub split_angle_deg: f64,

    /// Pairs closer than this many triangle sizes are near field
    #[serde(default = "default_nearfield_threshold")]
    pub nearfield_threshold: f64,
}

fn default_min_angle() -> f64 {
    DEFAULT_MIN_ANGLE_DEG
}
fn default_split_angle() -> f64 {
    DEFAULT_SPLIT_ANGLE_DEG
}
fn default_nearfield_threshold() -> f64 {
    DEFAULT_NEARFIELD_THRESHOLD
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            min_angle_deg: default_min_angle(),
            split_angle_deg: default_split_angle(),
            nearfield_threshold: default_nearfield_threshold(),
        }
    }
}

/// Interpolation table settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Directory holding table files
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Node counts of the coincident axes `(x2, y2, ν)`
    #[serde(default = "default_coincident_nodes")]
    pub coincident_nodes: [usize; 3],

    /// Node counts of the edge-adjacent axes `(φ, ν)`
    #[serde(default = "default_edge_nodes")]
    pub edge_nodes: [usize; 2],

    /// Range of the Poisson ratio axis
    #[serde(default = "default_poisson_range")]
    pub poisson_range: [f64; 2],
}

fn default_coincident_nodes() -> [usize; 3] {
    [8, 8, 5]
}
fn default_edge_nodes() -> [usize; 2] {
    [12, 5]
}
fn default_poisson_range() -> [f64; 2] {
    [0.0, 0.5]
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            directory: None,
            coincident_nodes: default_coincident_nodes(),
            edge_nodes: default_edge_nodes(),
            poisson_range: default_poisson_range(),
        }
    }
}

impl TableConfig {
    /// Node counts for a table class
    pub fn nodes(&self, class: SingularClass) -> Vec<usize> {
        match class {
            SingularClass::Coincident => self.coincident_nodes.to_vec(),
            SingularClass::EdgeAdjacent => self.edge_nodes.to_vec(),
        }
    }
}

/// Batched evaluator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Pairs per evaluator tile
    #[serde(default = "default_tile_size")]
    pub tile_size: usize,
}

fn default_tile_size() -> usize {
    DEFAULT_TILE_SIZE
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            tile_size: default_tile_size(),
        }
    }
}

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON format
    Json,
    /// TOML format
    Toml,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        match ext.to_lowercase().as_str() {
            "json" => Some(ConfigFormat::Json),
            "toml" => Some(ConfigFormat::Toml),
            _ => None,
        }
    }
}

/// Load near-field configuration from a file
pub fn load_config<P: AsRef<Path>>(path: P) -> std::result::Result<NearfieldConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;

    let format = ConfigFormat::from_path(path)
        .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;

    parse_config(&content, format)
}

/// Parse near-field configuration from a string
pub fn parse_config(
    content: &str,
    format: ConfigFormat,
) -> std::result::Result<NearfieldConfig, ConfigError> {
    match format {
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
        }
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
        }
    }
}

/// Save near-field configuration to a file
pub fn save_config<P: AsRef<Path>>(
    config: &NearfieldConfig,
    path: P,
) -> std::result::Result<(), ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)
        .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;

    let content = serialize_config(config, format)?;
    fs::write(path, content)?;
    Ok(())
}

/// Serialize near-field configuration to a string
pub fn serialize_config(
    config: &NearfieldConfig,
    format: ConfigFormat,
) -> std::result::Result<String, ConfigError> {
    match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::SerializeError(e.to_string())),
        ConfigFormat::Toml => {
            toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Serialize error
    #[error("Serialize error: {0}")]
    SerializeError(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its accepted range
    #[error("Invalid value: {0}")]
    Invalid(#[from] NearfieldError),
}

impl NearfieldConfig {
    /// Validated elasticity parameters of the material section
    pub fn elasticity(&self) -> Result<ElasticityParams> {
        ElasticityParams::new(self.material.shear_modulus, self.material.poisson_ratio)
    }

    /// Evaluator described by the evaluator section
    pub fn cpu_evaluator(&self) -> Result<CpuEvaluator> {
        CpuEvaluator::new(self.evaluator.tile_size)
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        self.elasticity()?;
        self.quadrature.validate()?;
        self.limit.validate()?;

        let g = &self.geometry;
        if !(g.min_angle_deg > 0.0 && g.min_angle_deg <= 60.0) {
            return Err(NearfieldError::invalid(format!(
                "min_angle_deg must lie in (0, 60], got {}",
                g.min_angle_deg
            )));
        }
        if !(g.split_angle_deg > 0.0 && g.split_angle_deg < 90.0) {
            return Err(NearfieldError::invalid(format!(
                "split_angle_deg must lie in (0, 90), got {}",
                g.split_angle_deg
            )));
        }
        if !(g.nearfield_threshold > 0.0) {
            return Err(NearfieldError::invalid(format!(
                "nearfield_threshold must be positive, got {}",
                g.nearfield_threshold
            )));
        }

        let [lo, hi] = self.table.poisson_range;
        if !(lo <= hi && lo > -1.0 && hi <= 0.5) {
            return Err(NearfieldError::invalid(format!(
                "poisson_range must satisfy -1 < lo <= hi <= 0.5, got [{}, {}]",
                lo, hi
            )));
        }
        let mut counts = self
            .table
            .coincident_nodes
            .iter()
            .chain(&self.table.edge_nodes);
        if counts.any(|&n| n == 0) {
            return Err(NearfieldError::invalid("table node counts must be positive"));
        }
        let nu_counts = [
            self.table.coincident_nodes.last(),
            self.table.edge_nodes.last(),
        ];
        if lo < hi && nu_counts.into_iter().flatten().any(|&n| n == 1) {
            return Err(NearfieldError::invalid(format!(
                "poisson_range [{}, {}] needs at least 2 nu nodes",
                lo, hi
            )));
        }
        if self.evaluator.tile_size == 0 {
            return Err(NearfieldError::invalid("tile_size must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::integration::LogTerms;

    const SAMPLE_JSON: &str = r#"{
        "description": "fault patch",
        "material": {
            "shear_modulus": 3.0e10,
            "poisson_ratio": 0.25
        },
        "limit": {
            "eps_start": 0.02,
            "eps_steps": 5
        },
        "table": {
            "directory": "tables",
            "edge_nodes": [16, 3]
        }
    }"#;

    const SAMPLE_TOML: &str = r#"
description = "fault patch"

[material]
shear_modulus = 3.0e10

[quadrature]
vertex_order = 6

[quadrature.coincident]
inner_radial = 14

[geometry]
min_angle_deg = 25.0
"#;

    #[test]
    fn test_parse_json() {
        let config = parse_config(SAMPLE_JSON, ConfigFormat::Json).unwrap();

        assert_eq!(config.description, "fault patch");
        assert_eq!(config.material.shear_modulus, 3.0e10);
        assert_eq!(config.limit.eps_steps, 5);
        assert_eq!(config.limit.tolerance, crate::core::constants::DEFAULT_LIMIT_TOL);
        assert_eq!(config.table.edge_nodes, [16, 3]);
        assert_eq!(config.table.coincident_nodes, [8, 8, 5]);
        assert_eq!(config.table.directory, Some(PathBuf::from("tables")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = parse_config(SAMPLE_TOML, ConfigFormat::Toml).unwrap();

        assert_eq!(config.quadrature.vertex_order, 6);
        assert_eq!(config.quadrature.coincident.inner_radial, 14);
        assert_eq!(config.quadrature.coincident.outer_radial, 8);
        assert_eq!(config.geometry.min_angle_deg, 25.0);
        assert_eq!(config.geometry.split_angle_deg, DEFAULT_SPLIT_ANGLE_DEG);
        assert_eq!(config.material.poisson_ratio, 0.25);
    }

    #[test]
    fn test_empty_is_default() {
        let config = parse_config("{}", ConfigFormat::Json).unwrap();
        assert_eq!(config, NearfieldConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_round_trip() {
        let mut config = NearfieldConfig::default();
        config.geometry.nearfield_threshold = 2.5;
        config.limit.log_terms = Some(LogTerms::Full);

        for format in [ConfigFormat::Json, ConfigFormat::Toml] {
            let text = serialize_config(&config, format).unwrap();
            assert_eq!(parse_config(&text, format).unwrap(), config);
        }
    }

    #[test]
    fn test_validation() {
        let mut config = NearfieldConfig::default();
        config.material.poisson_ratio = 0.5;
        assert!(config.validate().is_err());

        let mut config = NearfieldConfig::default();
        config.table.poisson_range = [0.3, 0.1];
        assert!(config.validate().is_err());

        let mut config = NearfieldConfig::default();
        config.limit.eps_steps = 2;
        assert!(config.validate().is_err());

        let mut config = NearfieldConfig::default();
        config.table.edge_nodes = [12, 1];
        assert!(config.validate().is_err());
        config.table.poisson_range = [0.25, 0.25];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path("a/b.TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_path("c.json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_path("c.yaml"), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nearfield.toml");
        let config = parse_config(SAMPLE_JSON, ConfigFormat::Json).unwrap();
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
        assert!(matches!(
            save_config(&config, dir.path().join("x.ini")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
