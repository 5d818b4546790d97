//! Core raster and statistic types.

use serde::{Deserialize, Serialize};
use zonal_common::{BoundingBox, GridSpec};

/// Continuous values over a block of grid cells.
///
/// Values are row-major, top row first. `NaN` marks no data.
#[derive(Debug, Clone)]
pub struct RasterWindow {
    pub grid: GridSpec,
    pub data: Vec<f32>,
}

impl RasterWindow {
    /// Create a new window. `data` must hold `grid.len()` values.
    pub fn new(grid: GridSpec, data: Vec<f32>) -> Self {
        debug_assert_eq!(grid.len(), data.len());
        Self { grid, data }
    }

    /// A window over `grid` with every cell set to no data.
    pub fn no_data(grid: GridSpec) -> Self {
        Self {
            grid,
            data: vec![f32::NAN; grid.len()],
        }
    }

    /// A window without cells, e.g. when a region misses the source grid.
    pub fn empty(bbox: BoundingBox) -> Self {
        Self::no_data(GridSpec::empty(bbox))
    }

    /// Get the value at a specific grid coordinate.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.grid.width || row >= self.grid.height {
            return None;
        }
        self.data.get(self.grid.flat_index(col, row)).copied()
    }

    /// Value of the cell containing a geographic coordinate.
    ///
    /// Returns `None` outside the window or for no-data cells.
    pub fn sample(&self, lon: f64, lat: f64) -> Option<f32> {
        let (col, row) = self.grid.coords_to_cell(lon, lat)?;
        self.get(col, row).filter(|v| !v.is_nan())
    }

    /// Number of cells holding a value.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Categorical codes over a block of grid cells. Code 0 marks no data.
#[derive(Debug, Clone)]
pub struct CategoryWindow {
    pub grid: GridSpec,
    pub codes: Vec<u8>,
}

impl CategoryWindow {
    pub fn new(grid: GridSpec, codes: Vec<u8>) -> Self {
        debug_assert_eq!(grid.len(), codes.len());
        Self { grid, codes }
    }

    pub fn empty(bbox: BoundingBox) -> Self {
        Self::new(GridSpec::empty(bbox), Vec::new())
    }

    /// Code of the cell containing a geographic coordinate, 0 outside.
    pub fn sample(&self, lon: f64, lat: f64) -> u8 {
        self.grid
            .coords_to_cell(lon, lat)
            .and_then(|(col, row)| self.codes.get(self.grid.flat_index(col, row)).copied())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// A reduced statistic, or the marker that no pixel contributed to it.
///
/// Serialized as a JSON number or `null`. `NoData` is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum StatValue {
    Value(f64),
    NoData,
}

impl StatValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            StatValue::Value(v) => Some(*v),
            StatValue::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, StatValue::NoData)
    }
}

impl From<Option<f64>> for StatValue {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => StatValue::Value(v),
            _ => StatValue::NoData,
        }
    }
}

impl From<StatValue> for Option<f64> {
    fn from(value: StatValue) -> Self {
        value.value()
    }
}

/// Chunk cache statistics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
