//! In-memory raster sources.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use zonal_common::{BoundingBox, GridSpec, LandCoverLegend};

use super::{ClimateSeries, LandCoverSource, SceneDescriptor, SceneFilter};
use crate::error::{Result, ZonalError};
use crate::types::{CategoryWindow, RasterWindow};

/// Copy the cells of `data` (laid out on `grid`) intersecting `bbox`.
fn copy_window<T: Copy>(grid: &GridSpec, data: &[T], bbox: &BoundingBox) -> Option<(GridSpec, Vec<T>)> {
    let window = grid.window(bbox)?;
    let mut out = Vec::with_capacity(window.len());
    for row in window.row_off..window.row_off + window.height {
        let start = grid.flat_index(window.col_off, row);
        out.extend_from_slice(&data[start..start + window.width]);
    }
    Some((grid.subgrid(&window), out))
}

struct MemoryScene {
    descriptor: SceneDescriptor,
    bands: HashMap<String, Vec<f32>>,
}

/// Climate series held in memory, all scenes on one grid.
pub struct MemoryClimateSeries {
    grid: GridSpec,
    scenes: Vec<MemoryScene>,
    unavailable: AtomicBool,
    reads: AtomicU64,
}

impl MemoryClimateSeries {
    pub fn new(grid: GridSpec) -> Self {
        Self {
            grid,
            scenes: Vec::new(),
            unavailable: AtomicBool::new(false),
            reads: AtomicU64::new(0),
        }
    }

    /// Add one variable of a scene. Scenes are merged by id.
    pub fn add_scene(
        &mut self,
        mut descriptor: SceneDescriptor,
        variable: &str,
        data: Vec<f32>,
    ) -> Result<()> {
        if data.len() != self.grid.len() {
            return Err(ZonalError::invalid_metadata(format!(
                "scene {} has {} cells, grid has {}",
                descriptor.id,
                data.len(),
                self.grid.len()
            )));
        }

        if let Some(scene) = self
            .scenes
            .iter_mut()
            .find(|s| s.descriptor.id == descriptor.id)
        {
            scene
                .descriptor
                .variables
                .insert(variable.to_string(), variable.to_string());
            scene.bands.insert(variable.to_string(), data);
            return Ok(());
        }

        descriptor
            .variables
            .insert(variable.to_string(), variable.to_string());
        self.scenes.push(MemoryScene {
            descriptor,
            bands: HashMap::from([(variable.to_string(), data)]),
        });
        Ok(())
    }

    /// Make every subsequent query fail with `SourceUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of windows read so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ZonalError::source_unavailable("climate series is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl ClimateSeries for MemoryClimateSeries {
    fn grid(&self) -> GridSpec {
        self.grid
    }

    async fn scenes(&self, filter: &SceneFilter) -> Result<Vec<SceneDescriptor>> {
        self.check_available()?;
        let mut matching: Vec<SceneDescriptor> = self
            .scenes
            .iter()
            .map(|s| &s.descriptor)
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn read_window(
        &self,
        scene: &SceneDescriptor,
        variable: &str,
        bbox: &BoundingBox,
    ) -> Result<RasterWindow> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let stored = self
            .scenes
            .iter()
            .find(|s| s.descriptor.id == scene.id)
            .ok_or_else(|| ZonalError::read_failed(format!("unknown scene {}", scene.id)))?;
        let data = stored.bands.get(variable).ok_or_else(|| {
            ZonalError::read_failed(format!("scene {} has no variable {}", scene.id, variable))
        })?;

        Ok(match copy_window(&self.grid, data, bbox) {
            Some((grid, values)) => RasterWindow::new(grid, values),
            None => RasterWindow::empty(*bbox),
        })
    }
}

/// Land cover raster held in memory.
pub struct MemoryLandCover {
    grid: GridSpec,
    codes: Vec<u8>,
    legend: LandCoverLegend,
    unavailable: AtomicBool,
}

impl MemoryLandCover {
    pub fn new(grid: GridSpec, codes: Vec<u8>, legend: LandCoverLegend) -> Result<Self> {
        if codes.len() != grid.len() {
            return Err(ZonalError::invalid_metadata(format!(
                "land cover has {} cells, grid has {}",
                codes.len(),
                grid.len()
            )));
        }
        legend.validate()?;
        Ok(Self {
            grid,
            codes,
            legend,
            unavailable: AtomicBool::new(false),
        })
    }

    /// Make every subsequent read fail with `SourceUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl LandCoverSource for MemoryLandCover {
    fn grid(&self) -> GridSpec {
        self.grid
    }

    fn legend(&self) -> &LandCoverLegend {
        &self.legend
    }

    async fn read_window(&self, bbox: &BoundingBox) -> Result<CategoryWindow> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ZonalError::source_unavailable("land cover is offline"));
        }
        Ok(match copy_window(&self.grid, &self.codes, bbox) {
            Some((grid, codes)) => CategoryWindow::new(grid, codes),
            None => CategoryWindow::empty(*bbox),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridSpec {
        GridSpec::new(BoundingBox::new(0.0, 0.0, 4.0, 4.0), 4, 4)
    }

    #[tokio::test]
    async fn test_land_cover_window() {
        let codes: Vec<u8> = (0..16).map(|i| (i % 4 + 1) as u8 * 10).collect();
        let lc = MemoryLandCover::new(grid(), codes, LandCoverLegend::worldcover_v200()).unwrap();

        let window = lc
            .read_window(&BoundingBox::new(1.2, 1.2, 2.8, 2.8))
            .await
            .unwrap();
        assert_eq!(window.grid.width, 2);
        assert_eq!(window.grid.height, 2);
        assert_eq!(window.codes, vec![20, 30, 20, 30]);

        let outside = lc
            .read_window(&BoundingBox::new(10.0, 10.0, 11.0, 11.0))
            .await
            .unwrap();
        assert!(outside.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_source_fails() {
        let lc = MemoryLandCover::new(grid(), vec![10; 16], LandCoverLegend::worldcover_v200())
            .unwrap();
        lc.set_unavailable(true);
        let err = lc.read_window(&grid().bbox).await.unwrap_err();
        assert!(matches!(err, ZonalError::SourceUnavailable(_)));
    }

    #[test]
    fn test_rejects_wrong_size() {
        let mut series = MemoryClimateSeries::new(grid());
        let scene = SceneDescriptor {
            id: "a".to_string(),
            model: "m".to_string(),
            date: chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            variables: Default::default(),
        };
        assert!(series.add_scene(scene, "tas", vec![0.0; 3]).is_err());
        assert_eq!(series.scene_count(), 0);
    }
}
