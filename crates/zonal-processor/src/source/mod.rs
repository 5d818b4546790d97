//! Read-only raster data sources.
//!
//! Two sources feed an analysis: a dated, model-tagged series of continuous
//! climate rasters and a single categorical land cover raster. Both are
//! accessed by bounding box so only the cells under the area of interest
//! are read.

mod memory;
mod zarr;

pub use memory::{MemoryClimateSeries, MemoryLandCover};
pub use zarr::{Catalog, ZarrClimateSeries, ZarrLandCover, CATALOG_FILE};

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use zonal_common::{BoundingBox, DateRange, GridSpec, LandCoverLegend};

use crate::error::{Result, ZonalError};
use crate::types::{CategoryWindow, RasterWindow};

/// One dated raster of the climate series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    /// Unique scene identifier.
    pub id: String,
    /// Climate model run the scene belongs to.
    pub model: String,
    /// Nominal date of the scene.
    pub date: NaiveDate,
    /// Variable name → location of its raster within the source.
    pub variables: BTreeMap<String, String>,
}

impl SceneDescriptor {
    pub fn has_variable(&self, variable: &str) -> bool {
        self.variables.contains_key(variable)
    }
}

/// Scene selection: model identifier plus an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneFilter {
    pub model: String,
    pub dates: DateRange,
}

impl SceneFilter {
    pub fn new(model: impl Into<String>, dates: DateRange) -> Self {
        Self {
            model: model.into(),
            dates,
        }
    }

    pub fn matches(&self, scene: &SceneDescriptor) -> bool {
        scene.model == self.model && self.dates.contains(scene.date)
    }
}

/// A collection of dated, model-tagged, multi-variable rasters on one grid.
#[async_trait]
pub trait ClimateSeries: Send + Sync {
    /// Native grid shared by every scene.
    fn grid(&self) -> GridSpec;

    /// Scenes matching a filter, ordered by date then id.
    async fn scenes(&self, filter: &SceneFilter) -> Result<Vec<SceneDescriptor>>;

    /// Values of one variable over the grid cells intersecting `bbox`.
    async fn read_window(
        &self,
        scene: &SceneDescriptor,
        variable: &str,
        bbox: &BoundingBox,
    ) -> Result<RasterWindow>;

    /// Per-pixel arithmetic mean of a variable across scenes.
    ///
    /// No-data samples are skipped per pixel; a pixel without any sample
    /// stays no data.
    async fn mean_window(
        &self,
        scenes: &[SceneDescriptor],
        variable: &str,
        bbox: &BoundingBox,
    ) -> Result<RasterWindow> {
        let grid = self.grid();
        let Some(window) = grid.window(bbox) else {
            return Ok(RasterWindow::empty(*bbox));
        };
        let target = grid.subgrid(&window);

        let windows = try_join_all(
            scenes
                .iter()
                .map(|scene| self.read_window(scene, variable, bbox)),
        )
        .await?;

        let mut sums = vec![0.0f64; target.len()];
        let mut counts = vec![0u32; target.len()];
        for (scene, w) in scenes.iter().zip(&windows) {
            if w.data.len() != target.len() {
                return Err(ZonalError::invalid_metadata(format!(
                    "scene {} returned {} cells, expected {}",
                    scene.id,
                    w.data.len(),
                    target.len()
                )));
            }
            for (i, v) in w.data.iter().enumerate() {
                if !v.is_nan() {
                    sums[i] += *v as f64;
                    counts[i] += 1;
                }
            }
        }

        let data = sums
            .iter()
            .zip(&counts)
            .map(|(sum, n)| if *n == 0 { f32::NAN } else { (sum / *n as f64) as f32 })
            .collect();

        Ok(RasterWindow::new(target, data))
    }
}

/// A single categorical land cover raster with its legend.
#[async_trait]
pub trait LandCoverSource: Send + Sync {
    /// Native grid of the raster.
    fn grid(&self) -> GridSpec;

    /// Value domain with labels and colors.
    fn legend(&self) -> &LandCoverLegend;

    /// Codes over the grid cells intersecting `bbox`. Code 0 is no data.
    async fn read_window(&self, bbox: &BoundingBox) -> Result<CategoryWindow>;
}
