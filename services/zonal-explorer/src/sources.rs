//! Raster source setup: Zarr stores when configured, demo data otherwise.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use zonal_processor::testdata::{striped_land_cover, warming_climate};
use zonal_processor::{
    ChunkCache, ClimateSeries, LandCoverSource, ZarrClimateSeries, ZarrLandCover,
};

use crate::config::ExplorerConfig;

/// Classes painted into the demo land cover.
const DEMO_CLASSES: [u8; 3] = [30, 40, 50];

pub struct Sources {
    pub climate: Arc<dyn ClimateSeries>,
    pub land_cover: Arc<dyn LandCoverSource>,
    /// Shared chunk cache; `None` for the in-memory demo sources.
    pub cache: Option<Arc<RwLock<ChunkCache>>>,
}

/// Open the configured sources.
pub fn open_sources(config: &ExplorerConfig) -> Result<Sources> {
    let (Some(climate_root), Some(land_cover_root)) =
        (&config.climate_store, &config.land_cover_store)
    else {
        return demo_sources(config);
    };

    let cache_bytes = config.source_config().chunk_cache_size_bytes();
    let cache = Arc::new(RwLock::new(ChunkCache::new(cache_bytes)));

    let climate = ZarrClimateSeries::open(climate_root, Arc::clone(&cache))
        .with_context(|| format!("Failed to open climate store {}", climate_root.display()))?;
    let land_cover = ZarrLandCover::open(land_cover_root, Arc::clone(&cache)).with_context(
        || format!("Failed to open land cover store {}", land_cover_root.display()),
    )?;

    info!(
        climate = %climate_root.display(),
        land_cover = %land_cover_root.display(),
        cache_mb = config.chunk_cache_mb,
        "Opened Zarr sources"
    );

    Ok(Sources {
        climate: Arc::new(climate),
        land_cover: Arc::new(land_cover),
        cache: Some(cache),
    })
}

/// Synthetic sources covering the configured date range.
fn demo_sources(config: &ExplorerConfig) -> Result<Sources> {
    let range = &config.analysis.date_range;
    warn!(
        start_year = range.start_year(),
        end_year = range.end_year(),
        "No stores configured, using synthetic demo data"
    );

    let climate = warming_climate(range.start_year(), range.end_year())
        .context("Failed to build demo climate series")?;
    let land_cover =
        striped_land_cover(&DEMO_CLASSES).context("Failed to build demo land cover")?;

    Ok(Sources {
        climate: Arc::new(climate),
        land_cover: Arc::new(land_cover),
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonal_processor::testdata::{write_climate_store, write_land_cover_store};

    #[test]
    fn test_demo_sources_without_stores() {
        let sources = open_sources(&ExplorerConfig::default()).unwrap();
        assert!(sources.cache.is_none());
        assert_eq!(sources.land_cover.legend().label(30), "Grassland");
    }

    #[test]
    fn test_zarr_sources_share_a_cache() {
        let dir = tempfile::tempdir().unwrap();
        write_climate_store(&dir.path().join("climate"), 2000, 2000, 50).unwrap();
        write_land_cover_store(&dir.path().join("lc"), &DEMO_CLASSES, 100).unwrap();

        let config = ExplorerConfig {
            climate_store: Some(dir.path().join("climate")),
            land_cover_store: Some(dir.path().join("lc")),
            chunk_cache_mb: 8,
            ..Default::default()
        };
        let sources = open_sources(&config).unwrap();
        assert!(sources.cache.is_some());
        assert_eq!(sources.climate.grid().width, 100);
    }

    #[test]
    fn test_missing_store_reports_path() {
        let config = ExplorerConfig {
            climate_store: Some("/nonexistent/climate".into()),
            land_cover_store: Some("/nonexistent/lc".into()),
            ..Default::default()
        };
        let err = open_sources(&config).err().unwrap();
        assert!(format!("{:#}", err).contains("/nonexistent/climate"));
    }
}
