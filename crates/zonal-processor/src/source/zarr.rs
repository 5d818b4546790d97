//! Zarr V3 raster sources on the local filesystem.
//!
//! A climate store is a directory with a `catalog.json` listing the scenes
//! and one 2-D `Float32` array per (scene, variable). A land cover store is
//! a single 2-D `UInt8` array at the store root. Every array carries a
//! `bbox = [min_lon, min_lat, max_lon, max_lat]` attribute describing the
//! outer cell edges.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs::storage::ReadableStorageTraits;
use zarrs_filesystem::FilesystemStore;
use zonal_common::{BoundingBox, GridSpec, GridWindow, LandCoverLegend};

use super::{ClimateSeries, LandCoverSource, SceneDescriptor, SceneFilter};
use crate::cache::{hash_path, ChunkCache, ChunkKey};
use crate::error::{Result, ZonalError};
use crate::types::{CategoryWindow, RasterWindow};

/// Name of the scene catalog inside a climate store.
pub const CATALOG_FILE: &str = "catalog.json";

/// Scene listing of a climate store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Scenes; each variable maps to an array path inside the store.
    pub scenes: Vec<SceneDescriptor>,
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// One 2-D array together with its grid and chunk layout.
struct ZarrRaster<S: ReadableStorageTraits> {
    array: Array<S>,
    path: String,
    path_hash: u64,
    grid: GridSpec,
    /// Chunk shape as (rows, cols).
    chunk_shape: (u64, u64),
    /// Fill value of float arrays, read back as no data.
    fill_value: Option<f32>,
}

impl<S: ReadableStorageTraits + 'static> ZarrRaster<S> {
    fn open(storage: Arc<S>, path: &str) -> Result<Self> {
        let array = Array::open(storage, path)
            .map_err(|e| ZonalError::source_unavailable(format!("{}: {}", path, e)))?;

        let shape = array.shape().to_vec();
        if shape.len() != 2 {
            return Err(ZonalError::invalid_metadata(format!(
                "{}: expected a 2-D array, got {} dimensions",
                path,
                shape.len()
            )));
        }

        let origin = vec![0u64; shape.len()];
        let chunk_shape = array
            .chunk_grid()
            .chunk_shape(&origin, array.shape())
            .map_err(|e| ZonalError::invalid_metadata(e.to_string()))?
            .ok_or_else(|| ZonalError::invalid_metadata(format!("{}: missing chunk shape", path)))?;
        let chunk_shape = (chunk_shape[0].get(), chunk_shape[1].get());

        let bbox = array
            .attributes()
            .get("bbox")
            .and_then(|v| v.as_array())
            .and_then(|arr| {
                if arr.len() == 4 {
                    Some(BoundingBox::new(
                        arr[0].as_f64()?,
                        arr[1].as_f64()?,
                        arr[2].as_f64()?,
                        arr[3].as_f64()?,
                    ))
                } else {
                    None
                }
            })
            .ok_or_else(|| {
                ZonalError::invalid_metadata(format!("{}: missing or malformed bbox attribute", path))
            })?;

        let fill_value = match array.data_type() {
            DataType::Float32 => array
                .fill_value()
                .as_ne_bytes()
                .try_into()
                .map(f32::from_ne_bytes)
                .ok()
                .filter(|v| !v.is_nan()),
            DataType::UInt8 => None,
            other => {
                return Err(ZonalError::invalid_metadata(format!(
                    "{}: unsupported data type {:?}",
                    path, other
                )))
            }
        };

        // Zarr is [rows, cols]
        let grid = GridSpec::new(bbox, shape[1] as usize, shape[0] as usize);

        Ok(Self {
            path: path.to_string(),
            path_hash: hash_path(path),
            array,
            grid,
            chunk_shape,
            fill_value,
        })
    }

    /// Read and decode a single chunk (partial at the grid edges).
    fn read_chunk(&self, chunk_row: u64, chunk_col: u64) -> Result<Vec<f32>> {
        let (chunk_h, chunk_w) = self.chunk_shape;
        let start_row = chunk_row * chunk_h;
        let start_col = chunk_col * chunk_w;
        let height = chunk_h.min(self.grid.height as u64 - start_row);
        let width = chunk_w.min(self.grid.width as u64 - start_col);

        let subset = ArraySubset::new_with_start_shape(
            vec![start_row, start_col],
            vec![height, width],
        )
        .map_err(|e| ZonalError::read_failed(e.to_string()))?;

        match self.array.data_type() {
            DataType::UInt8 => {
                let codes: Vec<u8> = self
                    .array
                    .retrieve_array_subset_elements(&subset)
                    .map_err(|e| ZonalError::zarr(format!("{}: {}", self.path, e)))?;
                Ok(codes.into_iter().map(f32::from).collect())
            }
            _ => {
                let mut values: Vec<f32> = self
                    .array
                    .retrieve_array_subset_elements(&subset)
                    .map_err(|e| ZonalError::zarr(format!("{}: {}", self.path, e)))?;
                if let Some(fill) = self.fill_value {
                    for v in values.iter_mut().filter(|v| **v == fill) {
                        *v = f32::NAN;
                    }
                }
                Ok(values)
            }
        }
    }

    /// Read a chunk through the shared cache. Must run on a blocking thread.
    fn cached_chunk(
        &self,
        chunk_row: u64,
        chunk_col: u64,
        cache: &RwLock<ChunkCache>,
    ) -> Result<Arc<Vec<f32>>> {
        let key = ChunkKey::new(self.path_hash, chunk_row, chunk_col);
        if let Some(data) = cache.blocking_write().get(&key) {
            return Ok(data);
        }

        let data = Arc::new(self.read_chunk(chunk_row, chunk_col)?);
        cache.blocking_write().insert(key, Arc::clone(&data));
        Ok(data)
    }

    /// Assemble the cells of a window from the chunks covering it.
    fn read_window(&self, window: &GridWindow, cache: &RwLock<ChunkCache>) -> Result<Vec<f32>> {
        let (chunk_h, chunk_w) = self.chunk_shape;
        let grid_w = self.grid.width as u64;
        let grid_h = self.grid.height as u64;

        let min_row = window.row_off as u64;
        let max_row = (window.row_off + window.height) as u64;
        let min_col = window.col_off as u64;
        let max_col = (window.col_off + window.width) as u64;

        let mut output = vec![f32::NAN; window.len()];

        for cy in min_row / chunk_h..(max_row + chunk_h - 1) / chunk_h {
            for cx in min_col / chunk_w..(max_col + chunk_w - 1) / chunk_w {
                let chunk = self.cached_chunk(cy, cx, cache)?;

                let chunk_start_row = cy * chunk_h;
                let chunk_start_col = cx * chunk_w;
                let chunk_actual_w = chunk_w.min(grid_w - chunk_start_col);
                let chunk_actual_h = chunk_h.min(grid_h - chunk_start_row);

                let rows = min_row.max(chunk_start_row)..max_row.min(chunk_start_row + chunk_actual_h);
                let cols = min_col.max(chunk_start_col)..max_col.min(chunk_start_col + chunk_actual_w);

                for row in rows {
                    let chunk_row_off = ((row - chunk_start_row) * chunk_actual_w) as usize;
                    let out_row_off = ((row - min_row) * window.width as u64) as usize;
                    for col in cols.clone() {
                        let src = chunk_row_off + (col - chunk_start_col) as usize;
                        let dst = out_row_off + (col - min_col) as usize;
                        if let Some(v) = chunk.get(src) {
                            output[dst] = *v;
                        }
                    }
                }
            }
        }

        tracing::trace!(
            path = %self.path,
            width = window.width,
            height = window.height,
            "Assembled window"
        );

        Ok(output)
    }
}

/// Climate series stored as Zarr arrays plus a JSON scene catalog.
pub struct ZarrClimateSeries {
    store: Arc<FilesystemStore>,
    scenes: Vec<SceneDescriptor>,
    grid: GridSpec,
    rasters: Mutex<HashMap<String, Arc<ZarrRaster<FilesystemStore>>>>,
    cache: Arc<RwLock<ChunkCache>>,
}

impl ZarrClimateSeries {
    /// Open a climate store directory.
    ///
    /// The grid is taken from the first catalogued array; every other array
    /// must share it.
    pub fn open(root: impl AsRef<Path>, cache: Arc<RwLock<ChunkCache>>) -> Result<Self> {
        let root = root.as_ref();
        let catalog_path = root.join(CATALOG_FILE);
        let text = std::fs::read_to_string(&catalog_path).map_err(|e| {
            ZonalError::source_unavailable(format!("{}: {}", catalog_path.display(), e))
        })?;
        let mut catalog: Catalog = serde_json::from_str(&text)?;

        for scene in &mut catalog.scenes {
            for path in scene.variables.values_mut() {
                *path = normalize_path(path);
            }
        }
        catalog
            .scenes
            .sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

        let first_path = catalog
            .scenes
            .iter()
            .flat_map(|s| s.variables.values())
            .next()
            .cloned()
            .ok_or_else(|| ZonalError::invalid_metadata("catalog lists no arrays"))?;

        let store = Arc::new(
            FilesystemStore::new(root)
                .map_err(|e| ZonalError::source_unavailable(e.to_string()))?,
        );
        let first = Arc::new(ZarrRaster::open(store.clone(), &first_path)?);
        let grid = first.grid;

        tracing::info!(
            root = %root.display(),
            scenes = catalog.scenes.len(),
            width = grid.width,
            height = grid.height,
            "Opened climate store"
        );

        Ok(Self {
            store,
            scenes: catalog.scenes,
            grid,
            rasters: Mutex::new(HashMap::from([(first_path, first)])),
            cache,
        })
    }

    fn raster(&self, path: &str) -> Result<Arc<ZarrRaster<FilesystemStore>>> {
        if let Some(raster) = self
            .rasters
            .lock()
            .map_err(|_| ZonalError::internal("raster registry poisoned"))?
            .get(path)
        {
            return Ok(Arc::clone(raster));
        }

        let raster = Arc::new(ZarrRaster::open(self.store.clone(), path)?);
        if raster.grid != self.grid {
            return Err(ZonalError::invalid_metadata(format!(
                "{}: grid {:?} differs from series grid {:?}",
                path, raster.grid, self.grid
            )));
        }

        self.rasters
            .lock()
            .map_err(|_| ZonalError::internal("raster registry poisoned"))?
            .insert(path.to_string(), Arc::clone(&raster));
        Ok(raster)
    }
}

#[async_trait]
impl ClimateSeries for ZarrClimateSeries {
    fn grid(&self) -> GridSpec {
        self.grid
    }

    async fn scenes(&self, filter: &SceneFilter) -> Result<Vec<SceneDescriptor>> {
        Ok(self
            .scenes
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn read_window(
        &self,
        scene: &SceneDescriptor,
        variable: &str,
        bbox: &BoundingBox,
    ) -> Result<RasterWindow> {
        let path = scene.variables.get(variable).ok_or_else(|| {
            ZonalError::read_failed(format!("scene {} has no variable {}", scene.id, variable))
        })?;

        let Some(window) = self.grid.window(bbox) else {
            return Ok(RasterWindow::empty(*bbox));
        };

        let raster = self.raster(path)?;
        let cache = Arc::clone(&self.cache);
        let data = tokio::task::spawn_blocking(move || raster.read_window(&window, &cache)).await??;

        Ok(RasterWindow::new(self.grid.subgrid(&window), data))
    }
}

/// Land cover stored as a single `UInt8` Zarr array.
pub struct ZarrLandCover {
    raster: Arc<ZarrRaster<FilesystemStore>>,
    legend: LandCoverLegend,
    cache: Arc<RwLock<ChunkCache>>,
}

impl ZarrLandCover {
    /// Open a land cover store whose array sits at the store root.
    ///
    /// The legend is read from `class_values`, `class_names` and
    /// `class_palette` (or the `Map_class_*` spelling); without them the
    /// WorldCover v200 legend applies.
    pub fn open(root: impl AsRef<Path>, cache: Arc<RwLock<ChunkCache>>) -> Result<Self> {
        let root = root.as_ref();
        let store = Arc::new(
            FilesystemStore::new(root)
                .map_err(|e| ZonalError::source_unavailable(e.to_string()))?,
        );
        let raster = ZarrRaster::open(store, "/")?;

        if !matches!(raster.array.data_type(), DataType::UInt8) {
            return Err(ZonalError::invalid_metadata(format!(
                "{}: land cover must be UInt8, got {:?}",
                root.display(),
                raster.array.data_type()
            )));
        }

        let legend = legend_from_attributes(raster.array.attributes())?;

        tracing::info!(
            root = %root.display(),
            classes = legend.entries.len(),
            width = raster.grid.width,
            height = raster.grid.height,
            "Opened land cover store"
        );

        Ok(Self {
            raster: Arc::new(raster),
            legend,
            cache,
        })
    }
}

fn attribute<'a>(
    attrs: &'a serde_json::Map<String, serde_json::Value>,
    name: &str,
) -> Option<&'a Vec<serde_json::Value>> {
    attrs
        .get(name)
        .or_else(|| attrs.get(&format!("Map_{}", name)))
        .and_then(|v| v.as_array())
}

fn legend_from_attributes(
    attrs: &serde_json::Map<String, serde_json::Value>,
) -> Result<LandCoverLegend> {
    let Some(values) = attribute(attrs, "class_values") else {
        return Ok(LandCoverLegend::worldcover_v200());
    };

    let values = values
        .iter()
        .map(|v| {
            v.as_u64()
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| ZonalError::invalid_metadata(format!("invalid class value {}", v)))
        })
        .collect::<Result<Vec<u8>>>()?;

    let strings = |name: &str| -> Vec<String> {
        attribute(attrs, name)
            .map(|arr| {
                arr.iter()
                    .map(|v| v.as_str().unwrap_or_default().to_string())
                    .collect()
            })
            .unwrap_or_default()
    };

    let title = attrs
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or("Land cover classes");

    Ok(LandCoverLegend::from_parallel(
        title,
        &values,
        &strings("class_names"),
        &strings("class_palette"),
    )?)
}

#[async_trait]
impl LandCoverSource for ZarrLandCover {
    fn grid(&self) -> GridSpec {
        self.raster.grid
    }

    fn legend(&self) -> &LandCoverLegend {
        &self.legend
    }

    async fn read_window(&self, bbox: &BoundingBox) -> Result<CategoryWindow> {
        let grid = self.raster.grid;
        let Some(window) = grid.window(bbox) else {
            return Ok(CategoryWindow::empty(*bbox));
        };

        let raster = Arc::clone(&self.raster);
        let cache = Arc::clone(&self.cache);
        let values =
            tokio::task::spawn_blocking(move || raster.read_window(&window, &cache)).await??;

        // NaN (unread cells) becomes 0, the no-data code.
        let codes = values
            .into_iter()
            .map(|v| if v.is_nan() { 0 } else { v as u8 })
            .collect();

        Ok(CategoryWindow::new(grid.subgrid(&window), codes))
    }
}
