//! Annual composites: one mean climate raster per year with the land cover
//! band overlaid on the same grid.

use serde::Serialize;
use tracing::debug;
use zonal_common::{BoundingBox, DateRange, GridSpec, VisParams};

use crate::aoi::AreaOfInterest;
use crate::error::Result;
use crate::resample::nearest_categories;
use crate::source::{ClimateSeries, LandCoverSource, SceneDescriptor, SceneFilter};
use crate::types::RasterWindow;

/// Two bands over one window of the climate grid.
#[derive(Debug, Clone)]
pub struct CompositeTile {
    pub grid: GridSpec,
    /// Mean of the year's scenes, `NaN` where nothing contributed.
    pub values: Vec<f32>,
    /// Land cover codes resampled onto `grid` (0 = no data).
    pub categories: Vec<u8>,
}

impl CompositeTile {
    fn sample(&self, lon: f64, lat: f64) -> Option<(Option<f32>, u8)> {
        let (col, row) = self.grid.coords_to_cell(lon, lat)?;
        let idx = self.grid.flat_index(col, row);
        let value = self.values.get(idx).copied().filter(|v| !v.is_nan());
        let code = self.categories.get(idx).copied().unwrap_or(0);
        Some((value, code))
    }
}

/// Two-band raster for one year over the climate grid cells under the AOI.
///
/// An AOI crossing the antimeridian gets one tile per side; otherwise there
/// is a single tile, or none when the AOI misses the climate grid. A year
/// without scenes still has a composite, with every continuous cell set to
/// no data.
#[derive(Debug, Clone)]
pub struct AnnualComposite {
    pub year: i32,
    /// Tiles in AOI box order, the one holding the centre first.
    pub tiles: Vec<CompositeTile>,
    /// Scenes averaged into the continuous band.
    pub scene_count: usize,
}

impl AnnualComposite {
    /// Build the composite for `year`.
    ///
    /// Scenes are those of `model` dated within `[year-01-01, year-12-31]`.
    pub async fn generate(
        year: i32,
        aoi: &AreaOfInterest,
        model: &str,
        variable: &str,
        climate: &dyn ClimateSeries,
        land_cover: &dyn LandCoverSource,
    ) -> Result<Self> {
        let filter = SceneFilter::new(model, DateRange::year(year)?);
        let scenes = climate.scenes(&filter).await?;

        let mut tiles = Vec::new();
        for bbox in aoi.bounding_boxes() {
            let mean = read_mean(climate, &scenes, variable, &bbox).await?;
            if mean.grid.is_empty() {
                continue;
            }

            let codes = land_cover.read_window(&mean.grid.bbox).await?;
            let categories = nearest_categories(&codes, &mean.grid);

            debug!(
                year,
                scenes = scenes.len(),
                width = mean.grid.width,
                height = mean.grid.height,
                valid = mean.valid_count(),
                "Built composite tile"
            );

            tiles.push(CompositeTile {
                grid: mean.grid,
                values: mean.data,
                categories,
            });
        }

        Ok(Self {
            year,
            tiles,
            scene_count: scenes.len(),
        })
    }

    /// Continuous value and category code of the cell under a location.
    ///
    /// Longitudes outside `[-180, 180]` are wrapped. The value is `None`
    /// where the continuous band has no data; the code is 0 outside the
    /// composite.
    pub fn sample(&self, lon: f64, lat: f64) -> (Option<f32>, u8) {
        let lon = wrap_lon(lon);
        self.tiles
            .iter()
            .find_map(|tile| tile.sample(lon, lat))
            .unwrap_or((None, 0))
    }

    /// Whether any continuous cell holds a value.
    pub fn has_data(&self) -> bool {
        self.tiles
            .iter()
            .any(|tile| tile.values.iter().any(|v| !v.is_nan()))
    }

    /// Total number of cells over all tiles.
    pub fn len(&self) -> usize {
        self.tiles.iter().map(|tile| tile.grid.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The continuous band clipped to the AOI, for display.
    pub fn preview(&self, aoi: &AreaOfInterest, variable: &str, vis: &VisParams) -> PreviewRaster {
        let tiles: Vec<PreviewTile> = self
            .tiles
            .iter()
            .map(|tile| clip_tile(tile, aoi))
            .collect();

        PreviewRaster {
            year: self.year,
            variable: variable.to_string(),
            valid_pixels: tiles
                .iter()
                .map(|t| t.values.iter().filter(|v| v.is_some()).count())
                .sum(),
            tiles,
            vis: vis.clone(),
        }
    }
}

async fn read_mean(
    climate: &dyn ClimateSeries,
    scenes: &[SceneDescriptor],
    variable: &str,
    bbox: &BoundingBox,
) -> Result<RasterWindow> {
    if !scenes.is_empty() {
        return climate.mean_window(scenes, variable, bbox).await;
    }
    let grid = climate.grid();
    Ok(match grid.window(bbox) {
        Some(window) => RasterWindow::no_data(grid.subgrid(&window)),
        None => RasterWindow::empty(*bbox),
    })
}

/// Mask the cells of a tile that do not intersect the AOI.
fn clip_tile(tile: &CompositeTile, aoi: &AreaOfInterest) -> PreviewTile {
    let (res_x, res_y) = tile.grid.resolution();
    let mut values = Vec::with_capacity(tile.values.len());

    for row in 0..tile.grid.height {
        for col in 0..tile.grid.width {
            let min_lon = tile.grid.bbox.min_lon + col as f64 * res_x;
            let max_lat = tile.grid.bbox.max_lat - row as f64 * res_y;
            // Point of the cell nearest the AOI centre, across the antimeridian too.
            let lon = [-360.0, 0.0, 360.0]
                .iter()
                .map(|shift| aoi.center.lon.clamp(min_lon + shift, min_lon + res_x + shift))
                .min_by(|a, b| (a - aoi.center.lon).abs().total_cmp(&(b - aoi.center.lon).abs()))
                .unwrap_or(min_lon);
            let lat = aoi.center.lat.clamp(max_lat - res_y, max_lat);

            let value = tile.values[tile.grid.flat_index(col, row)];
            values.push(if aoi.contains(lon, lat) && !value.is_nan() {
                Some(value)
            } else {
                None
            });
        }
    }

    PreviewTile {
        grid: tile.grid,
        values,
    }
}

/// Wrap a longitude into `[-180, 180]`.
pub(crate) fn wrap_lon(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// One clipped tile of the preview raster.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewTile {
    pub grid: GridSpec,
    /// Row-major values, `null` outside the AOI or where no data.
    pub values: Vec<Option<f32>>,
}

/// The final year's clipped continuous band, for the map-layer renderer.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewRaster {
    pub year: i32,
    pub variable: String,
    /// Same layout as the composite tiles.
    pub tiles: Vec<PreviewTile>,
    pub valid_pixels: usize,
    pub vis: VisParams,
}
