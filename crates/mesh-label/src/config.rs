//! Serializable labeling configuration.
//!
//! Collects every tunable of a labeling session in one TOML or JSON
//! document. Missing tables and keys fall back to their defaults.
//!
//! # Example TOML
//!
//! ```toml
//! name = "scan-cleanup"
//! label_policy = "strict"
//! affinity_sigma = 0.5
//!
//! [load]
//! compute_vertex_normals = true
//!
//! [load.isolated]
//! weld_threshold = 1e-7
//! search = "kd_tree"
//! candidate_rule = "any_vertex"
//! rebuild = false
//!
//! [face_laplacian]
//! uniform_weight = 1.0
//! affinity_weight = 2.0
//! affinity_sigma = 0.25
//! dissimilarity = "centroid_distance"
//! ```

use std::path::Path;

use crate::error::{MeshError, MeshResult};
use crate::labels::LabelImportPolicy;
use crate::model::LoadParams;
use crate::operators::FaceLaplacianParams;

/// Settings for loading, operator construction and label import.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LabelingConfig {
    /// Optional name for this configuration.
    pub name: Option<String>,

    /// Kernel width of the standalone face affinity matrix.
    /// Default: 1.0
    pub affinity_sigma: f64,

    /// Default: strict
    pub label_policy: LabelImportPolicy,

    pub load: LoadParams,

    pub face_laplacian: FaceLaplacianParams,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            name: None,
            affinity_sigma: 1.0,
            label_policy: LabelImportPolicy::Strict,
            load: LoadParams::default(),
            face_laplacian: FaceLaplacianParams::default(),
        }
    }
}

/// Errors that can occur when loading or saving a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] MeshError),
}

impl LabelingConfig {
    /// Create a named configuration with default settings.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Settings matching older tools: legacy isolated-face rule and
    /// lenient label import.
    pub fn legacy() -> Self {
        Self {
            name: Some("legacy".to_string()),
            load: LoadParams::legacy(),
            label_policy: LabelImportPolicy::Lenient,
            ..Default::default()
        }
    }

    /// Check every parameter group.
    pub fn validate(&self) -> MeshResult<()> {
        self.load.isolated.validate()?;
        self.face_laplacian.validate()?;
        if !self.affinity_sigma.is_finite() || self.affinity_sigma <= 0.0 {
            return Err(MeshError::invalid_parameter(
                "affinity_sigma",
                self.affinity_sigma,
                "must be > 0",
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the configuration as a TOML file.
    pub fn save_toml(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
