//! Deterministic synthetic data sources.
//!
//! The demo region is a one-degree square around Calgary. Land cover is
//! made of vertical stripes of classes; temperature follows a latitude
//! gradient with a seasonal cycle and a warming trend of 0.03 K per year,
//! so every value can be predicted in tests.
//!
//! | Source | Grid | Contents |
//! |--------|------|----------|
//! | climate | 100x100, 0.01° | 4 `CanESM5` scenes per year plus 1 `MIROC6` decoy |
//! | land cover | 400x400, 0.0025° | stripes 0.05° wide |

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use zarrs::array::{ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;
use zonal_common::{BoundingBox, GeoPoint, GridSpec, LandCoverLegend};

use crate::error::Result;
use crate::source::{Catalog, MemoryClimateSeries, MemoryLandCover, SceneDescriptor, CATALOG_FILE};

/// Extent of the demo region.
pub const DEMO_BBOX: BoundingBox = BoundingBox {
    min_lon: -114.5,
    min_lat: 50.5,
    max_lon: -113.5,
    max_lat: 51.5,
};

/// A point well inside the demo region.
pub const DEMO_CENTER: GeoPoint = GeoPoint {
    lon: -114.0719,
    lat: 51.0447,
};

/// Width of one land cover stripe in degrees.
pub const STRIPE_DEG: f64 = 0.05;

/// Model of the regular scenes.
pub const DEMO_MODEL: &str = "CanESM5";

/// Model of the decoy scenes that filters must skip.
pub const DECOY_MODEL: &str = "MIROC6";

/// Months of the regular scenes.
const SCENE_MONTHS: [u32; 4] = [1, 4, 7, 10];

pub fn climate_grid() -> GridSpec {
    GridSpec::new(DEMO_BBOX, 100, 100)
}

pub fn land_cover_grid() -> GridSpec {
    GridSpec::new(DEMO_BBOX, 400, 400)
}

/// Warming trend added per year since 2000, in kelvin.
pub fn warming_offset(year: i32) -> f32 {
    0.03 * (year - 2000) as f32
}

/// Temperature field (K) of one month on `grid`.
pub fn temperature_field(grid: &GridSpec, year: i32, month: u32) -> Vec<f32> {
    let season = 10.0 * ((month as f32 - 1.0) / 12.0 * std::f32::consts::TAU).cos();
    let mut data = Vec::with_capacity(grid.len());
    for row in 0..grid.height {
        for col in 0..grid.width {
            let (lon, lat) = grid.cell_center(col, row);
            let gradient = -5.0 * (lat - DEMO_BBOX.min_lat) + 0.5 * (lon - DEMO_BBOX.min_lon);
            data.push(280.0 + gradient as f32 - season + warming_offset(year));
        }
    }
    data
}

/// Vertical stripes of `classes`, cycling from the western edge.
pub fn stripes(grid: &GridSpec, classes: &[u8]) -> Vec<u8> {
    let mut codes = Vec::with_capacity(grid.len());
    for row in 0..grid.height {
        for col in 0..grid.width {
            let (lon, _) = grid.cell_center(col, row);
            let stripe = ((lon - grid.bbox.min_lon) / STRIPE_DEG).floor() as usize;
            codes.push(classes.get(stripe % classes.len().max(1)).copied().unwrap_or(0));
        }
    }
    codes
}

fn scene(model: &str, year: i32, month: u32) -> SceneDescriptor {
    let date = NaiveDate::from_ymd_opt(year, month, 15).unwrap_or_default();
    SceneDescriptor {
        id: format!("{}_{}", model, date.format("%Y%m%d")),
        model: model.to_string(),
        date,
        variables: BTreeMap::new(),
    }
}

/// Every scene of the demo climate series with its temperature field.
fn demo_scenes(start_year: i32, end_year: i32) -> Vec<(SceneDescriptor, Vec<f32>)> {
    let grid = climate_grid();
    let mut scenes = Vec::new();
    for year in start_year..=end_year {
        for month in SCENE_MONTHS {
            scenes.push((scene(DEMO_MODEL, year, month), temperature_field(&grid, year, month)));
        }
        // Decoy scene of another model, far too hot to go unnoticed.
        let decoy = temperature_field(&grid, year, 7)
            .into_iter()
            .map(|v| v + 100.0)
            .collect();
        scenes.push((scene(DECOY_MODEL, year, 7), decoy));
    }
    scenes
}

/// In-memory climate series with `tas` scenes for `start_year..=end_year`.
pub fn warming_climate(start_year: i32, end_year: i32) -> Result<MemoryClimateSeries> {
    let mut series = MemoryClimateSeries::new(climate_grid());
    for (descriptor, data) in demo_scenes(start_year, end_year) {
        series.add_scene(descriptor, "tas", data)?;
    }
    Ok(series)
}

/// In-memory land cover of vertical stripes, with the WorldCover legend.
pub fn striped_land_cover(classes: &[u8]) -> Result<MemoryLandCover> {
    let grid = land_cover_grid();
    let codes = stripes(&grid, classes);
    MemoryLandCover::new(grid, codes, LandCoverLegend::worldcover_v200())
}

fn bbox_attribute(bbox: &BoundingBox) -> serde_json::Value {
    serde_json::json!([bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat])
}

/// Write the demo climate series as a Zarr store with `catalog.json`.
///
/// Returns the catalog that was written.
pub fn write_climate_store(
    root: &Path,
    start_year: i32,
    end_year: i32,
    chunk_size: u64,
) -> std::result::Result<Catalog, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(root)?;
    let store = Arc::new(FilesystemStore::new(root)?);
    let grid = climate_grid();

    let mut catalog = Catalog::default();
    for (mut descriptor, data) in demo_scenes(start_year, end_year) {
        let path = format!("/tas/{}", descriptor.id);

        let array = ArrayBuilder::new(
            vec![grid.height as u64, grid.width as u64],
            DataType::Float32,
            vec![chunk_size, chunk_size].try_into()?,
            FillValue::from(f32::NAN),
        )
        .attributes({
            let mut attrs = serde_json::Map::new();
            attrs.insert("model".to_string(), serde_json::json!(descriptor.model));
            attrs.insert("variable".to_string(), serde_json::json!("tas"));
            attrs.insert("units".to_string(), serde_json::json!("K"));
            attrs.insert(
                "date".to_string(),
                serde_json::json!(descriptor.date.to_string()),
            );
            attrs.insert("bbox".to_string(), bbox_attribute(&grid.bbox));
            attrs
        })
        .build(store.clone(), &path)?;

        array.store_metadata()?;
        let subset = ArraySubset::new_with_start_shape(
            vec![0, 0],
            vec![grid.height as u64, grid.width as u64],
        )?;
        array.store_array_subset_elements(&subset, &data)?;

        descriptor.variables.insert("tas".to_string(), path);
        catalog.scenes.push(descriptor);
    }

    std::fs::write(
        root.join(CATALOG_FILE),
        serde_json::to_string_pretty(&catalog)?,
    )?;

    Ok(catalog)
}

/// Write striped land cover as a `UInt8` Zarr array with legend attributes.
pub fn write_land_cover_store(
    root: &Path,
    classes: &[u8],
    chunk_size: u64,
) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(root)?;
    let store = Arc::new(FilesystemStore::new(root)?);
    let grid = land_cover_grid();
    let codes = stripes(&grid, classes);
    let legend = LandCoverLegend::worldcover_v200();

    let array = ArrayBuilder::new(
        vec![grid.height as u64, grid.width as u64],
        DataType::UInt8,
        vec![chunk_size, chunk_size].try_into()?,
        FillValue::from(0u8),
    )
    .attributes({
        let mut attrs = serde_json::Map::new();
        attrs.insert("title".to_string(), serde_json::json!(legend.title));
        attrs.insert("bbox".to_string(), bbox_attribute(&grid.bbox));
        attrs.insert(
            "class_values".to_string(),
            serde_json::json!(legend.codes()),
        );
        attrs.insert(
            "class_names".to_string(),
            serde_json::json!(legend.entries.iter().map(|e| &e.label).collect::<Vec<_>>()),
        );
        attrs.insert(
            "class_palette".to_string(),
            serde_json::json!(legend
                .entries
                .iter()
                .map(|e| e.color.to_hex().trim_start_matches('#').to_string())
                .collect::<Vec<_>>()),
        );
        attrs
    })
    .build(store.clone(), "/")?;

    array.store_metadata()?;
    let subset =
        ArraySubset::new_with_start_shape(vec![0, 0], vec![grid.height as u64, grid.width as u64])?;
    array.store_array_subset_elements(&subset, &codes)?;

    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_field_trend() {
        let grid = climate_grid();
        let a = temperature_field(&grid, 2000, 7);
        let b = temperature_field(&grid, 2010, 7);
        assert_eq!(a.len(), grid.len());
        for (x, y) in a.iter().zip(&b) {
            assert!((y - x - 0.3).abs() < 1e-3);
        }
        // Colder towards the north (row 0).
        assert!(a[0] < a[grid.len() - 1]);
    }

    #[test]
    fn test_stripes_cycle_classes() {
        let grid = land_cover_grid();
        let codes = stripes(&grid, &[30, 40, 50]);
        // 20 cells per stripe at 0.0025 degrees.
        assert_eq!(codes[0], 30);
        assert_eq!(codes[19], 30);
        assert_eq!(codes[20], 40);
        assert_eq!(codes[40], 50);
        assert_eq!(codes[60], 30);
    }

    #[test]
    fn test_demo_scenes_include_decoy() {
        let scenes = demo_scenes(2000, 2001);
        assert_eq!(scenes.len(), 10);
        assert_eq!(
            scenes.iter().filter(|(s, _)| s.model == DECOY_MODEL).count(),
            2
        );
    }

    #[test]
    fn test_demo_center_in_region() {
        assert!(DEMO_BBOX.contains(DEMO_CENTER.lon, DEMO_CENTER.lat));
    }
}
