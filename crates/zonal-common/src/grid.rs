//! Regular lon/lat grid specifications.
//!
//! All rasters handled by the zonal crates are north-up, row-major, with
//! row 0 at the northern edge. Sampling is cell-centred.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// Specification of a regular lat/lon grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Geographic extent covered by the outer cell edges.
    pub bbox: BoundingBox,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

/// A rectangular block of cells within a parent grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl GridWindow {
    /// Total number of cells in the window.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Check if the window has no cells.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl GridSpec {
    /// Create a new grid specification.
    pub fn new(bbox: BoundingBox, width: usize, height: usize) -> Self {
        Self {
            bbox,
            width,
            height,
        }
    }

    /// Resolution in degrees per cell (lon, lat).
    pub fn resolution(&self) -> (f64, f64) {
        (
            self.bbox.width() / self.width.max(1) as f64,
            self.bbox.height() / self.height.max(1) as f64,
        )
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Check if the grid has no cells.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Flat row-major index of a cell.
    pub fn flat_index(&self, col: usize, row: usize) -> usize {
        row * self.width + col
    }

    /// Geographic coordinates of a cell centre.
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        let (res_x, res_y) = self.resolution();
        let lon = self.bbox.min_lon + (col as f64 + 0.5) * res_x;
        let lat = self.bbox.max_lat - (row as f64 + 0.5) * res_y;
        (lon, lat)
    }

    /// Cell containing the given coordinates, if any.
    ///
    /// Coordinates on the eastern or southern outer edge map to the last
    /// column or row.
    pub fn coords_to_cell(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        if self.is_empty() || !self.bbox.contains(lon, lat) {
            return None;
        }

        let (res_x, res_y) = self.resolution();
        let col = (((lon - self.bbox.min_lon) / res_x).floor() as usize).min(self.width - 1);
        let row = (((self.bbox.max_lat - lat) / res_y).floor() as usize).min(self.height - 1);
        Some((col, row))
    }

    /// Cells intersecting a bounding box, or `None` if there is no overlap.
    pub fn window(&self, bbox: &BoundingBox) -> Option<GridWindow> {
        if self.is_empty() || !self.bbox.intersects(bbox) {
            return None;
        }

        let (res_x, res_y) = self.resolution();
        let min_col = ((bbox.min_lon - self.bbox.min_lon) / res_x)
            .floor()
            .max(0.0) as usize;
        let max_col = ((bbox.max_lon - self.bbox.min_lon) / res_x)
            .ceil()
            .min(self.width as f64) as usize;
        let min_row = ((self.bbox.max_lat - bbox.max_lat) / res_y)
            .floor()
            .max(0.0) as usize;
        let max_row = ((self.bbox.max_lat - bbox.min_lat) / res_y)
            .ceil()
            .min(self.height as f64) as usize;

        // A box touching the grid edge still selects the boundary cell.
        let max_col = max_col.max((min_col + 1).min(self.width));
        let max_row = max_row.max((min_row + 1).min(self.height));

        if min_col >= max_col || min_row >= max_row {
            return None;
        }

        Some(GridWindow {
            col_off: min_col,
            row_off: min_row,
            width: max_col - min_col,
            height: max_row - min_row,
        })
    }

    /// The grid describing a window of this grid.
    pub fn subgrid(&self, window: &GridWindow) -> GridSpec {
        let (res_x, res_y) = self.resolution();
        let bbox = BoundingBox::new(
            self.bbox.min_lon + window.col_off as f64 * res_x,
            self.bbox.max_lat - (window.row_off + window.height) as f64 * res_y,
            self.bbox.min_lon + (window.col_off + window.width) as f64 * res_x,
            self.bbox.max_lat - window.row_off as f64 * res_y,
        );
        GridSpec::new(bbox, window.width, window.height)
    }

    /// An empty grid anchored at a bounding box.
    pub fn empty(bbox: BoundingBox) -> Self {
        Self::new(bbox, 0, 0)
    }
}
