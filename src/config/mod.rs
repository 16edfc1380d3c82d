//! Configuration module for insitu-rs
//!
//! This module handles the pipeline configuration:
//! - Live link endpoint
//! - Output description (file name, intermediate dumps, image settings)
//! - Render settings (resolution, lighting, contour stacking)
//! - Initial field selection
//!
//! Configuration files are JSON or TOML, picked by extension.
//!
//! # Example
//!
//! ```ignore
//! use insitu_rs::config::PipelineConfig;
//!
//! let config = PipelineConfig::load("pipeline.toml")?;
//! config.save("pipeline.json")?;
//! ```

use crate::error::{InsituError, Result, ResultExt};
use crate::pipeline::live_link::LinkEndpoint;
use crate::pipeline::view::ImageSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the reference geometry directory
pub const DATA_DIR_ENV: &str = "PYFR_DATA_DIR";

/// Directory used when [`DATA_DIR_ENV`] is not set
pub const DEFAULT_REFERENCE_DIR: &str =
    "/lustre/atlas2/ard116/proj-shared/Test/T106D_cascade_3d-1-105.600PCC-001RCPLDG/TR1/wall";

/// Reference geometry file inside the data directory
pub const REFERENCE_GEOMETRY_FILE: &str = "wall.vtu";

/// Default live link port
pub const DEFAULT_LINK_PORT: u16 = 22222;

/// Vertical offset of the second contour in the contour view
pub const DEFAULT_CONTOUR_STACK_OFFSET: f64 = -0.955;

// ==================== Sections ====================

/// Live link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Connect to a remote viewer at startup
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: DEFAULT_LINK_PORT,
        }
    }
}

impl LinkConfig {
    pub fn endpoint(&self) -> LinkEndpoint {
        LinkEndpoint {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Output description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output file name; dump names are derived from it. Must not be empty.
    pub file_name: String,
    /// Dump the producer output every step (`.vtu`)
    pub write_mesh_dump: bool,
    /// Dump the first contour every step (`.vtp`)
    pub write_contour_dump: bool,
    pub magnification: u32,
    /// Image quality, 0-100
    pub quality: u32,
    /// Directory for rolling log files; stdout only when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file_name: String::new(),
            write_mesh_dump: false,
            write_contour_dump: false,
            magnification: 1,
            quality: 100,
            log_dir: None,
        }
    }
}

/// Render settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub specular_coefficient: f64,
    pub specular_power: f64,
    /// Vertical offset of the second contour in the contour view
    pub contour_stack_offset: f64,
    /// Show the static reference geometry in the contour view
    pub reference_geometry: bool,
    /// Reset each camera before applying the step's overrides
    pub reset_camera: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            specular_coefficient: 0.0,
            specular_power: 0.0,
            contour_stack_offset: DEFAULT_CONTOUR_STACK_OFFSET,
            reference_geometry: true,
            reset_camera: true,
        }
    }
}

/// Initial field selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub contour_field: usize,
    pub color_field: usize,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            contour_field: 0,
            color_field: 8,
        }
    }
}

// ==================== Pipeline Config ====================

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub link: LinkConfig,
    pub output: OutputConfig,
    pub render: RenderConfig,
    pub fields: FieldConfig,
}

enum ConfigFormat {
    Json,
    Toml,
}

fn format_of(path: &Path) -> Result<ConfigFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(ConfigFormat::Json),
        Some("toml") => Ok(ConfigFormat::Toml),
        other => Err(InsituError::Config(format!(
            "Unsupported config extension {:?} for {}",
            other,
            path.display()
        ))),
    }
}

impl PipelineConfig {
    /// Load a configuration from a `.json` or `.toml` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)
            .map_err(InsituError::from)
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        let config: Self = match format {
            ConfigFormat::Json => serde_json::from_str(&content)
                .map_err(|e| InsituError::Config(format!("Failed to parse config: {}", e)))?,
            ConfigFormat::Toml => toml::from_str(&content)
                .map_err(|e| InsituError::Config(format!("Failed to parse config: {}", e)))?,
        };
        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Load a configuration, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration; the format follows the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = match format_of(path)? {
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| InsituError::Serialization(e.to_string()))?,
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| InsituError::Serialization(e.to_string()))?
            }
        };

        std::fs::write(path, content)
            .map_err(InsituError::from)
            .with_context(|| format!("Failed to write config {}", path.display()))
    }

    /// Check value ranges. An empty output file name is not checked here; it
    /// is reported per step by the orchestrator.
    pub fn validate(&self) -> Result<()> {
        if self.render.width == 0 || self.render.height == 0 {
            return Err(InsituError::Config(format!(
                "Invalid resolution {}x{}",
                self.render.width, self.render.height
            )));
        }
        if self.output.magnification == 0 {
            return Err(InsituError::Config("Magnification must be at least 1".to_string()));
        }
        if self.output.quality > 100 {
            return Err(InsituError::Config(format!(
                "Image quality {} out of range 0-100",
                self.output.quality
            )));
        }
        Ok(())
    }

    pub fn image_settings(&self) -> ImageSettings {
        ImageSettings {
            magnification: self.output.magnification,
            quality: self.output.quality,
            reset_camera: self.render.reset_camera,
        }
    }
}

// ==================== Reference Geometry ====================

/// Resolve the reference geometry directory from an optional env value.
///
/// Falls back to [`DEFAULT_REFERENCE_DIR`] with a warning only when the
/// variable is missing; a set but empty value is used as is.
pub fn resolve_reference_dir(env_value: Option<String>) -> PathBuf {
    match env_value {
        Some(dir) => PathBuf::from(dir),
        None => {
            tracing::warn!(
                "{} not set, using default reference geometry directory {}",
                DATA_DIR_ENV,
                DEFAULT_REFERENCE_DIR
            );
            PathBuf::from(DEFAULT_REFERENCE_DIR)
        }
    }
}

/// Path of the reference geometry file, honouring [`DATA_DIR_ENV`]
pub fn reference_geometry_path() -> PathBuf {
    resolve_reference_dir(std::env::var(DATA_DIR_ENV).ok()).join(REFERENCE_GEOMETRY_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.link.port, 22222);
        assert_eq!(config.link.host, "localhost");
        assert_eq!(config.render.width, 1920);
        assert_eq!(config.render.contour_stack_offset, -0.955);
        assert_eq!(config.fields.contour_field, 0);
        assert_eq!(config.fields.color_field, 8);
        assert_eq!(config.output.quality, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.json");

        let mut config = PipelineConfig::default();
        config.output.file_name = "out/pyfr.vtu".to_string();
        config.output.write_mesh_dump = true;
        config.save(&path).unwrap();

        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_toml_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[render]\nwidth = 800\nheight = 600\n").unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.render.width, 800);
        assert_eq!(config.render.height, 600);
        assert_eq!(config.link, LinkConfig::default());
        assert_eq!(config.fields.color_field, 8);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        assert!(PipelineConfig::default().save(&path).is_err());
    }

    #[test]
    fn test_missing_file_error_names_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = PipelineConfig::load(&path).unwrap_err();
        assert!(matches!(err, InsituError::WithContext { .. }));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_invalid_file_values_rejected_with_context() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"output": {"quality": 150}}"#).unwrap();
        let err = PipelineConfig::load(&path).unwrap_err();
        assert!(err.to_string().starts_with("Invalid config"));
        assert!(err.to_string().contains("150"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = PipelineConfig::default();
        config.output.quality = 101;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.render.height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_reference_dir() {
        assert_eq!(
            resolve_reference_dir(Some("/data".to_string())),
            PathBuf::from("/data")
        );
        assert_eq!(resolve_reference_dir(None), PathBuf::from(DEFAULT_REFERENCE_DIR));
        assert_eq!(resolve_reference_dir(Some(String::new())), PathBuf::new());
    }

    #[test]
    #[serial]
    fn test_reference_geometry_path_from_env() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/pyfr-data");
        assert_eq!(
            reference_geometry_path(),
            PathBuf::from("/tmp/pyfr-data/wall.vtu")
        );
        std::env::remove_var(DATA_DIR_ENV);
        assert_eq!(
            reference_geometry_path(),
            Path::new(DEFAULT_REFERENCE_DIR).join("wall.vtu")
        );
    }
}
