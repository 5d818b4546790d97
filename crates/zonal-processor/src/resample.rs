//! Nearest-neighbour resampling of categorical codes.
//!
//! Category codes are labels, not quantities, so they are never blended:
//! each target cell takes the code of the source cell under its centre.

use zonal_common::GridSpec;

use crate::types::CategoryWindow;

/// Resample `source` onto `target`, cell centre by cell centre.
///
/// Target cells whose centre falls outside the source are no data (0).
pub fn nearest_categories(source: &CategoryWindow, target: &GridSpec) -> Vec<u8> {
    if source.grid == *target {
        return source.codes.clone();
    }

    let mut output = vec![0u8; target.len()];
    for row in 0..target.height {
        for col in 0..target.width {
            let (lon, lat) = target.cell_center(col, row);
            output[target.flat_index(col, row)] = source.sample(lon, lat);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonal_common::BoundingBox;

    #[test]
    fn test_identical_grid_is_copied() {
        let grid = GridSpec::new(BoundingBox::new(0.0, 0.0, 2.0, 1.0), 2, 1);
        let source = CategoryWindow::new(grid, vec![10, 20]);
        assert_eq!(nearest_categories(&source, &grid), vec![10, 20]);
    }

    #[test]
    fn test_fine_to_coarse_takes_center_code() {
        // 4x4 source, 2x2 target: each target centre sits on a source cell corner
        // shared by four cells; the cell to the south-east wins.
        let source = CategoryWindow::new(
            GridSpec::new(BoundingBox::new(0.0, 0.0, 4.0, 4.0), 4, 4),
            vec![
                10, 10, 20, 20, //
                10, 30, 20, 40, //
                50, 50, 60, 60, //
                50, 50, 60, 70,
            ],
        );
        let target = GridSpec::new(BoundingBox::new(0.0, 0.0, 4.0, 4.0), 2, 2);
        assert_eq!(nearest_categories(&source, &target), vec![30, 40, 50, 70]);
    }

    #[test]
    fn test_coarse_to_fine_never_blends() {
        let source = CategoryWindow::new(
            GridSpec::new(BoundingBox::new(0.0, 0.0, 2.0, 1.0), 2, 1),
            vec![10, 90],
        );
        let target = GridSpec::new(BoundingBox::new(0.0, 0.0, 2.0, 1.0), 4, 2);
        let codes = nearest_categories(&source, &target);
        assert_eq!(codes, vec![10, 10, 90, 90, 10, 10, 90, 90]);
    }

    #[test]
    fn test_target_outside_source_is_no_data() {
        let source = CategoryWindow::new(
            GridSpec::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 1, 1),
            vec![40],
        );
        let target = GridSpec::new(BoundingBox::new(0.0, 0.0, 2.0, 1.0), 2, 1);
        assert_eq!(nearest_categories(&source, &target), vec![40, 0]);
    }
}
