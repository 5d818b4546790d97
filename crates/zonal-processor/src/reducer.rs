//! Categorical masking and regional reduction.
//!
//! Reductions sample the annual composite at the centres of a grid of
//! `scale_m` metre cells anchored at the AOI centre. Rows are `scale_m`
//! apart in latitude; along each row the longitude step is `scale_m` on
//! that parallel, so cells keep their ground size towards the poles. A cell
//! takes part iff its centre lies inside the AOI. When more cells than the pixel budget
//! would take part, the grid is coarsened by keeping every f-th row and
//! column (counted from the centre) for the smallest f that fits; the run is
//! then approximate.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;
use zonal_common::GeoPoint;

use crate::aoi::AreaOfInterest;
use crate::composite::{wrap_lon, AnnualComposite};
use crate::error::{Result, ZonalError};
use crate::types::StatValue;

/// Metres per degree of latitude used to convert the reduction scale.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// How a reduction was sampled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReductionPlan {
    /// Requested scale in metres.
    pub scale_m: f64,
    /// Pixel budget the plan had to fit.
    pub max_pixels: u64,
    /// Coarsening factor; 1 means every cell is used.
    pub factor: u32,
    /// Cells inside the AOI at the requested scale.
    pub total_cells: u64,
    /// Cells actually sampled.
    pub sampled_cells: u64,
    /// `scale_m * factor`.
    pub effective_scale_m: f64,
}

impl ReductionPlan {
    /// Whether the pixel budget forced a coarser sampling.
    pub fn approximate(&self) -> bool {
        self.factor > 1
    }
}

/// Cells `i` in `[-half, half]` of reduction row `j`, `dlon` degrees apart.
#[derive(Debug, Clone, Copy)]
struct RowSpan {
    j: i64,
    lat: f64,
    dlon: f64,
    half: i64,
}

impl RowSpan {
    fn count(&self, factor: i64) -> u64 {
        if self.j.rem_euclid(factor) != 0 {
            return 0;
        }
        (2 * (self.half / factor) + 1) as u64
    }
}

/// The reduction cells of one AOI at one scale, after budget coarsening.
#[derive(Debug, Clone)]
pub struct ReductionGrid {
    center: GeoPoint,
    rows: Vec<RowSpan>,
    plan: ReductionPlan,
}

impl ReductionGrid {
    /// Lay out the reduction cells of `aoi` and fit them to `max_pixels`.
    pub fn new(aoi: &AreaOfInterest, scale_m: f64, max_pixels: u64) -> Result<Self> {
        if !(scale_m.is_finite() && scale_m > 0.0) {
            return Err(ZonalError::invalid_config(format!(
                "scale must be > 0, got {}",
                scale_m
            )));
        }
        if max_pixels == 0 {
            return Err(ZonalError::invalid_config("max_pixels must be > 0"));
        }

        let center = aoi.center;
        let dlat = scale_m / METERS_PER_DEGREE;
        let j_max = (aoi.angular_radius_deg() / dlat).floor() as i64;

        let rows: Vec<RowSpan> = (-j_max..=j_max)
            .filter_map(|j| {
                let lat = center.lat + j as f64 * dlat;
                if lat.abs() > 90.0 {
                    return None;
                }
                let half_width = aoi.lon_half_width(lat)?;

                // A row at the pole degenerates to a single cell.
                let dlon = dlat / lat.to_radians().cos().max(f64::EPSILON);
                // Distinct cells around the whole parallel.
                let max_half = (((360.0 / dlon).floor() as i64).max(1) - 1) / 2;
                let half = if half_width >= 180.0 {
                    max_half
                } else {
                    ((half_width / dlon).floor() as i64).min(max_half)
                };
                Some(RowSpan { j, lat, dlon, half })
            })
            .collect();

        let count = |factor: i64| rows.iter().map(|r| r.count(factor)).sum::<u64>();
        let total_cells = count(1);

        let mut factor = 1i64;
        let mut sampled_cells = total_cells;
        while sampled_cells > max_pixels {
            factor += 1;
            sampled_cells = count(factor);
        }

        let plan = ReductionPlan {
            scale_m,
            max_pixels,
            factor: factor as u32,
            total_cells,
            sampled_cells,
            effective_scale_m: scale_m * factor as f64,
        };

        if plan.approximate() {
            warn!(
                total_cells,
                sampled_cells,
                factor,
                max_pixels,
                effective_scale_m = plan.effective_scale_m,
                "AOI exceeds pixel budget, coarsening reduction grid"
            );
        }

        Ok(Self { center, rows, plan })
    }

    pub fn plan(&self) -> &ReductionPlan {
        &self.plan
    }

    /// Centres `(lon, lat)` of the sampled cells, row by row from south.
    /// Longitudes are wrapped into `[-180, 180]`.
    pub fn cells(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let factor = self.plan.factor as i64;
        self.rows
            .iter()
            .filter(move |r| r.j.rem_euclid(factor) == 0)
            .flat_map(move |r| {
                let kept = r.half / factor;
                (-kept..=kept).map(move |k| {
                    let lon = self.center.lon + (k * factor) as f64 * r.dlon;
                    (wrap_lon(lon), r.lat)
                })
            })
    }
}

/// Statistics of one category within one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStats {
    pub class: u8,
    pub mean: StatValue,
    /// Present only when a percentile was requested.
    pub percentile: Option<StatValue>,
    pub count: u64,
}

/// All category statistics of one year, in class order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearReduction {
    pub year: i32,
    pub stats: Vec<CategoryStats>,
    /// Sampled cells with a continuous value, whatever their category.
    pub total_valid_pixels: u64,
    /// Scenes averaged into the year's composite.
    pub scene_count: usize,
}

/// Reduce one composite for every class.
///
/// Pixels of another class, no-data pixels and pixels outside the AOI never
/// contribute. A class without contributing pixels gets `NoData` statistics
/// and a count of 0.
pub fn reduce_composite(
    composite: &AnnualComposite,
    grid: &ReductionGrid,
    classes: &[u8],
    percentile: Option<f64>,
) -> YearReduction {
    let samples: Vec<(u8, f64)> = grid
        .cells()
        .filter_map(|(lon, lat)| match composite.sample(lon, lat) {
            (Some(value), code) => Some((code, value as f64)),
            (None, _) => None,
        })
        .collect();

    let stats = classes
        .par_iter()
        .map(|&class| reduce_class(class, &samples, percentile))
        .collect();

    YearReduction {
        year: composite.year,
        stats,
        total_valid_pixels: samples.len() as u64,
        scene_count: composite.scene_count,
    }
}

fn reduce_class(class: u8, samples: &[(u8, f64)], percentile: Option<f64>) -> CategoryStats {
    let mut values: Vec<f64> = samples
        .iter()
        .filter(|(code, _)| *code == class)
        .map(|(_, v)| *v)
        .collect();

    let count = values.len() as u64;
    let mean = if values.is_empty() {
        StatValue::NoData
    } else {
        StatValue::Value(values.iter().sum::<f64>() / values.len() as f64)
    };

    let percentile = percentile.map(|p| {
        values.sort_by(f64::total_cmp);
        percentile_of_sorted(&values, p).into()
    });

    CategoryStats {
        class,
        mean,
        percentile,
        count,
    }
}

/// Percentile `p` (0-100) of ascending values, interpolating linearly
/// between the closest ranks. `None` for an empty slice.
pub fn percentile_of_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let weight = rank - lo as f64;
            Some(sorted[lo] + (sorted[hi] - sorted[lo]) * weight)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::CompositeTile;
    use zonal_common::{BoundingBox, GridSpec};

    fn aoi(radius_m: f64) -> AreaOfInterest {
        AreaOfInterest::new(GeoPoint::new(10.0, 45.0), radius_m).unwrap()
    }

    fn composite(values: Vec<f32>, categories: Vec<u8>) -> AnnualComposite {
        // 2x2 cells around the AOI centre.
        AnnualComposite {
            year: 2001,
            tiles: vec![CompositeTile {
                grid: GridSpec::new(BoundingBox::new(9.0, 44.0, 11.0, 46.0), 2, 2),
                values,
                categories,
            }],
            scene_count: 1,
        }
    }

    #[test]
    fn test_percentile_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_of_sorted(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile_of_sorted(&sorted, 50.0), Some(3.0));
        assert_eq!(percentile_of_sorted(&sorted, 100.0), Some(5.0));
        let p95 = percentile_of_sorted(&sorted, 95.0).unwrap();
        assert!((p95 - 4.8).abs() < 1e-12);
        assert_eq!(percentile_of_sorted(&[], 95.0), None);
        assert_eq!(percentile_of_sorted(&[7.0], 95.0), Some(7.0));
    }

    #[test]
    fn test_small_aoi_samples_center_only() {
        let grid = ReductionGrid::new(&aoi(10.0), 100.0, 1_000).unwrap();
        assert_eq!(grid.plan().total_cells, 1);
        let cells: Vec<_> = grid.cells().collect();
        assert_eq!(cells, vec![(10.0, 45.0)]);
    }

    #[test]
    fn test_cell_count_close_to_disc_area() {
        let grid = ReductionGrid::new(&aoi(2_000.0), 100.0, u64::MAX).unwrap();
        let plan = grid.plan();
        assert!(!plan.approximate());
        // pi * r^2 / scale^2, with the latitude step slightly under 100 m.
        let expected = std::f64::consts::PI * 20.0 * 20.0;
        let ratio = plan.total_cells as f64 / expected;
        assert!(ratio > 0.95 && ratio < 1.05, "ratio {}", ratio);
        assert_eq!(grid.cells().count() as u64, plan.total_cells);
        let aoi = aoi(2_000.0);
        assert!(grid.cells().all(|(lon, lat)| aoi.contains(lon, lat)));
    }

    #[test]
    fn test_budget_coarsening_is_deterministic() {
        let full = ReductionGrid::new(&aoi(5_000.0), 100.0, u64::MAX).unwrap();
        let budget = full.plan().total_cells / 10;
        let a = ReductionGrid::new(&aoi(5_000.0), 100.0, budget).unwrap();
        let b = ReductionGrid::new(&aoi(5_000.0), 100.0, budget).unwrap();

        let plan = a.plan();
        assert!(plan.approximate());
        assert!(plan.sampled_cells <= budget);
        assert_eq!(plan.total_cells, full.plan().total_cells);
        assert_eq!(plan.effective_scale_m, 100.0 * plan.factor as f64);
        assert_eq!(a.cells().count() as u64, plan.sampled_cells);
        assert_eq!(a.cells().collect::<Vec<_>>(), b.cells().collect::<Vec<_>>());

        // The next smaller factor would not have fitted.
        if plan.factor > 2 {
            let rows = &a.rows;
            let smaller: u64 = rows.iter().map(|r| r.count(plan.factor as i64 - 1)).sum();
            assert!(smaller > budget);
        }
    }

    #[test]
    fn test_polar_disc_keeps_ground_cell_size() {
        let aoi = AreaOfInterest::new(GeoPoint::new(0.0, 89.9), 50_000.0).unwrap();
        let grid = ReductionGrid::new(&aoi, 5_000.0, u64::MAX).unwrap();
        let total = grid.plan().total_cells;

        // Latitude step is 5 km on a 111.32 km degree, the disc uses 111.195 km.
        let step_m = 5_000.0 / METERS_PER_DEGREE * 111_195.0;
        let expected = std::f64::consts::PI * (50_000.0 / step_m).powi(2);
        let ratio = total as f64 / expected;
        assert!(ratio > 0.85 && ratio < 1.15, "{} cells, ratio {}", total, ratio);

        let cells: Vec<_> = grid.cells().collect();
        assert_eq!(cells.len() as u64, total);
        assert!(cells.iter().all(|&(lon, lat)| aoi.contains(lon, lat)));
        // No two cells share a centre.
        for (n, a) in cells.iter().enumerate() {
            assert!(cells[n + 1..].iter().all(|b| a != b));
        }
    }

    #[test]
    fn test_row_through_pole_is_one_cell() {
        let aoi = AreaOfInterest::new(GeoPoint::new(20.0, 90.0), 3_000.0).unwrap();
        let grid = ReductionGrid::new(&aoi, 1_000.0, u64::MAX).unwrap();
        let pole: Vec<_> = grid.cells().filter(|&(_, lat)| lat == 90.0).collect();
        assert_eq!(pole, vec![(20.0, 90.0)]);
        assert!(grid.cells().all(|(lon, lat)| aoi.contains(lon, lat)));
    }

    #[test]
    fn test_cells_past_antimeridian_are_wrapped() {
        let aoi = AreaOfInterest::new(GeoPoint::new(179.9, 0.0), 50_000.0).unwrap();
        let grid = ReductionGrid::new(&aoi, 5_000.0, u64::MAX).unwrap();
        let (east, west): (Vec<_>, Vec<_>) = grid.cells().partition(|&(lon, _)| lon > 0.0);
        assert!(!east.is_empty() && !west.is_empty());
        assert!(grid.cells().all(|(lon, _)| (-180.0..=180.0).contains(&lon)));

        let reference = AreaOfInterest::new(GeoPoint::new(0.0, 0.0), 50_000.0).unwrap();
        let reference = ReductionGrid::new(&reference, 5_000.0, u64::MAX).unwrap();
        assert_eq!(grid.plan().total_cells, reference.plan().total_cells);
    }

    #[test]
    fn test_growing_radius_never_drops_cells() {
        let small = ReductionGrid::new(&aoi(1_000.0), 100.0, u64::MAX).unwrap();
        let large = ReductionGrid::new(&aoi(1_500.0), 100.0, u64::MAX).unwrap();
        let large_cells: Vec<_> = large.cells().collect();
        assert!(small.cells().all(|c| large_cells.contains(&c)));
    }

    #[test]
    fn test_reduce_masks_by_class() {
        // Left column class 30, right column class 40, bottom-right no data.
        let composite = composite(vec![280.0, 290.0, 282.0, f32::NAN], vec![30, 40, 30, 40]);
        let grid = ReductionGrid::new(&aoi(30_000.0), 1_000.0, u64::MAX).unwrap();
        let reduction = reduce_composite(&composite, &grid, &[30, 40, 50], Some(95.0));

        assert_eq!(reduction.year, 2001);
        let by_class: Vec<u8> = reduction.stats.iter().map(|s| s.class).collect();
        assert_eq!(by_class, vec![30, 40, 50]);

        let c30 = &reduction.stats[0];
        assert!(c30.count > 0);
        let mean = c30.mean.value().unwrap();
        assert!(mean > 280.0 && mean < 282.0);
        assert!(c30.percentile.unwrap().value().unwrap() <= 282.0);

        let c40 = &reduction.stats[1];
        assert_eq!(c40.mean, StatValue::Value(290.0));

        let c50 = &reduction.stats[2];
        assert_eq!(c50.count, 0);
        assert_eq!(c50.mean, StatValue::NoData);
        assert_eq!(c50.percentile, Some(StatValue::NoData));

        let counted: u64 = reduction.stats.iter().map(|s| s.count).sum();
        assert!(counted <= reduction.total_valid_pixels);
    }

    #[test]
    fn test_percentile_absent_when_not_requested() {
        let composite = composite(vec![280.0; 4], vec![30; 4]);
        let grid = ReductionGrid::new(&aoi(5_000.0), 1_000.0, u64::MAX).unwrap();
        let reduction = reduce_composite(&composite, &grid, &[30], None);
        assert_eq!(reduction.stats[0].percentile, None);
        assert_eq!(reduction.stats[0].mean, StatValue::Value(280.0));
    }

    #[test]
    fn test_no_data_composite_yields_zero_counts() {
        let composite = composite(vec![f32::NAN; 4], vec![30; 4]);
        let grid = ReductionGrid::new(&aoi(5_000.0), 1_000.0, u64::MAX).unwrap();
        let reduction = reduce_composite(&composite, &grid, &[30], Some(95.0));
        assert_eq!(reduction.total_valid_pixels, 0);
        assert_eq!(reduction.stats[0].count, 0);
        assert!(reduction.stats[0].mean.is_no_data());
    }
}
