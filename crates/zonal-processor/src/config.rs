//! Configuration for zonal analyses and the raster sources they read.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use zonal_common::{parse_date, DateRange, VisParams};

use crate::error::{Result, ZonalError};

/// Parameters of one zonal statistics analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Climate model identifier scenes must match.
    pub model: String,

    /// Continuous variable to composite, e.g. `tas`.
    pub variable: String,

    /// Dates to analyse; expanded to whole calendar years.
    pub date_range: DateRange,

    /// Land cover classes to report, in output order.
    pub classes: Vec<u8>,

    /// Radius of the area of interest in metres.
    pub buffer_m: f64,

    /// Reduction scale in metres.
    pub scale_m: f64,

    /// Pixel budget of a single reduction.
    pub max_pixels: u64,

    /// Percentile rank (0-100) to compute, or `None` to skip it.
    pub percentile: Option<f64>,

    /// Years composited and reduced concurrently.
    pub max_concurrent_years: usize,

    /// Display parameters of the preview raster.
    pub preview: VisParams,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: "CanESM5".to_string(),
            variable: "tas".to_string(),
            date_range: DateRange::new(
                NaiveDate::from_ymd_opt(1990, 1, 1).unwrap_or_default(),
                NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or_default(),
            ),
            classes: vec![30, 40, 50],
            buffer_m: 10_000.0,
            scale_m: 100.0,
            max_pixels: 1_000_000_000,
            percentile: Some(95.0),
            max_concurrent_years: 8,
            preview: VisParams::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from environment variables over the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `ZONAL_*` environment variables onto this configuration.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("ZONAL_MODEL") {
            self.model = val;
        }

        if let Ok(val) = std::env::var("ZONAL_VARIABLE") {
            self.variable = val;
        }

        if let Ok(val) = std::env::var("ZONAL_START_DATE") {
            self.date_range.start = parse_date(&val)?;
        }

        if let Ok(val) = std::env::var("ZONAL_END_DATE") {
            self.date_range.end = parse_date(&val)?;
        }

        if let Ok(val) = std::env::var("ZONAL_CLASSES") {
            self.classes = parse_classes(&val)?;
        }

        if let Ok(val) = std::env::var("ZONAL_BUFFER_M") {
            self.buffer_m = parse_var("ZONAL_BUFFER_M", &val)?;
        }

        if let Ok(val) = std::env::var("ZONAL_SCALE_M") {
            self.scale_m = parse_var("ZONAL_SCALE_M", &val)?;
        }

        if let Ok(val) = std::env::var("ZONAL_MAX_PIXELS") {
            // Accept scientific notation such as 1e9.
            let pixels: f64 = parse_var("ZONAL_MAX_PIXELS", &val)?;
            self.max_pixels = pixels as u64;
        }

        if let Ok(val) = std::env::var("ZONAL_PERCENTILE") {
            self.percentile = match val.trim().to_lowercase().as_str() {
                "" | "none" | "off" => None,
                other => Some(parse_var("ZONAL_PERCENTILE", other)?),
            };
        }

        if let Ok(val) = std::env::var("ZONAL_MAX_CONCURRENT_YEARS") {
            self.max_concurrent_years = parse_var("ZONAL_MAX_CONCURRENT_YEARS", &val)?;
        }

        Ok(())
    }

    /// Validate the configuration.
    ///
    /// An inverted date range is valid; it simply yields no years.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ZonalError::invalid_config("model must not be empty"));
        }

        if self.variable.trim().is_empty() {
            return Err(ZonalError::invalid_config("variable must not be empty"));
        }

        if !(self.buffer_m.is_finite() && self.buffer_m > 0.0) {
            return Err(ZonalError::invalid_config(format!(
                "buffer_m must be > 0, got {}",
                self.buffer_m
            )));
        }

        if !(self.scale_m.is_finite() && self.scale_m > 0.0) {
            return Err(ZonalError::invalid_config(format!(
                "scale_m must be > 0, got {}",
                self.scale_m
            )));
        }

        if self.max_pixels == 0 {
            return Err(ZonalError::invalid_config("max_pixels must be > 0"));
        }

        if self.classes.is_empty() {
            return Err(ZonalError::invalid_config("at least one class is required"));
        }

        let mut seen = HashSet::new();
        for class in &self.classes {
            if *class == 0 {
                return Err(ZonalError::invalid_config(
                    "class 0 is reserved for no data",
                ));
            }
            if !seen.insert(class) {
                return Err(ZonalError::invalid_config(format!(
                    "duplicate class {}",
                    class
                )));
            }
        }

        if let Some(p) = self.percentile {
            if !(0.0..=100.0).contains(&p) {
                return Err(ZonalError::invalid_config(format!(
                    "percentile must be within 0-100, got {}",
                    p
                )));
            }
        }

        if self.max_concurrent_years == 0 {
            return Err(ZonalError::invalid_config("max_concurrent_years must be > 0"));
        }

        self.preview.validate()?;

        Ok(())
    }
}

/// Configuration of the Zarr-backed raster sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Memory budget for the shared chunk cache in megabytes.
    pub chunk_cache_size_mb: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            chunk_cache_size_mb: 256,
        }
    }
}

impl SourceConfig {
    /// Get the chunk cache size in bytes.
    pub fn chunk_cache_size_bytes(&self) -> usize {
        self.chunk_cache_size_mb * 1024 * 1024
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, val: &str) -> Result<T> {
    val.trim()
        .parse()
        .map_err(|_| ZonalError::invalid_config(format!("{}: cannot parse '{}'", name, val)))
}

/// Parse a comma separated class list such as "30,40,50".
pub fn parse_classes(s: &str) -> Result<Vec<u8>> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| parse_var("classes", p))
        .collect()
}
