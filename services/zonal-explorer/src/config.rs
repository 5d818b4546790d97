//! Explorer configuration.
//!
//! Loaded from an optional YAML file, then overlaid with `ZONAL_*`
//! environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use zonal_processor::{AnalysisConfig, SourceConfig, Statistic};

/// Top-level explorer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Parameters of every analysis.
    pub analysis: AnalysisConfig,

    /// Directory of the climate Zarr store (with `catalog.json`).
    pub climate_store: Option<PathBuf>,

    /// Directory of the land cover Zarr array.
    pub land_cover_store: Option<PathBuf>,

    /// Chunk cache budget shared by both stores, in megabytes.
    pub chunk_cache_mb: usize,

    /// Statistic plotted on the chart.
    pub chart_statistic: Statistic,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            climate_store: None,
            land_cover_store: None,
            chunk_cache_mb: SourceConfig::default().chunk_cache_size_mb,
            chart_statistic: Statistic::Mean,
        }
    }
}

impl ExplorerConfig {
    /// Load the configuration file (if any) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML configuration file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn apply_env(&mut self) -> Result<()> {
        self.analysis
            .apply_env()
            .context("Invalid ZONAL_* analysis override")?;

        if let Ok(path) = env::var("ZONAL_CLIMATE_STORE") {
            self.climate_store = Some(PathBuf::from(path));
        }
        if let Ok(path) = env::var("ZONAL_LAND_COVER_STORE") {
            self.land_cover_store = Some(PathBuf::from(path));
        }
        if let Ok(mb) = env::var("ZONAL_CHUNK_CACHE_MB") {
            self.chunk_cache_mb = mb
                .parse()
                .with_context(|| format!("ZONAL_CHUNK_CACHE_MB: cannot parse '{}'", mb))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis.validate().context("Invalid analysis config")?;
        if self.climate_store.is_some() != self.land_cover_store.is_some() {
            anyhow::bail!("climate_store and land_cover_store must be configured together");
        }
        Ok(())
    }

    /// Whether both Zarr stores are configured.
    pub fn has_stores(&self) -> bool {
        self.climate_store.is_some() && self.land_cover_store.is_some()
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            chunk_cache_size_mb: self.chunk_cache_mb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_run_in_demo_mode() {
        let config = ExplorerConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.has_stores());
        assert_eq!(config.source_config().chunk_cache_size_bytes(), 256 * 1024 * 1024);
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
analysis:
  model: MIROC6
  date_range:
    start: "2000-01-01"
    end: "2005-12-31"
  classes: [10, 40]
  buffer_m: 2500
  percentile: null
climate_store: /data/climate
land_cover_store: /data/worldcover
chunk_cache_mb: 64
chart_statistic: percentile
"#
        )
        .unwrap();

        let config = ExplorerConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.analysis.model, "MIROC6");
        assert_eq!(config.analysis.classes, vec![10, 40]);
        assert_eq!(config.analysis.buffer_m, 2500.0);
        assert_eq!(config.analysis.percentile, None);
        // Unset analysis fields keep their defaults.
        assert_eq!(config.analysis.variable, "tas");
        assert_eq!(config.chunk_cache_mb, 64);
        assert_eq!(config.chart_statistic, Statistic::Percentile);
        assert!(config.has_stores());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_single_store_is_rejected() {
        let config = ExplorerConfig {
            climate_store: Some(PathBuf::from("/data/climate")),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = ExplorerConfig::from_yaml_file(Path::new("/nonexistent/explorer.yaml"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/explorer.yaml"));
    }
}
