//! Zonal temporal statistics of climate rasters per land cover class.
//!
//! For a selected point this crate builds a buffered area of interest,
//! composites a climate variable per calendar year, overlays a categorical
//! land cover raster and reduces every (year, class) pair to a mean, an
//! optional percentile and a pixel count.
//!
//! # Architecture
//!
//! ```text
//! point selection
//!      │
//!      ▼
//! InteractiveTrigger::select_point   (last selection wins)
//!      │
//!      ▼
//! ZonalPipeline::run
//!      │
//!      ├─► AreaOfInterest (geodesic disc) ─► ReductionGrid (scale, pixel budget)
//!      │
//!      ├─► per year, concurrently:
//!      │       ClimateSeries scenes ─► mean ─┐
//!      │       LandCoverSource ─► nearest ───┴─► AnnualComposite ─► reduce per class
//!      │
//!      └─► StatisticsTable (year-major, class-minor) + PreviewRaster
//!               │
//!               ▼
//!          AnalysisEvent on an mpsc channel
//! ```
//!
//! # Example
//!
//! ```ignore
//! use zonal_processor::{AnalysisConfig, ZonalPipeline, ZarrClimateSeries, ZarrLandCover};
//!
//! let cache = Arc::new(RwLock::new(ChunkCache::new(256 * 1024 * 1024)));
//! let climate = ZarrClimateSeries::open("data/cmip6", cache.clone())?;
//! let land_cover = ZarrLandCover::open("data/worldcover", cache)?;
//! let pipeline = ZonalPipeline::new(Arc::new(climate), Arc::new(land_cover), AnalysisConfig::default())?;
//!
//! let output = pipeline.run(GeoPoint::new(-114.07, 51.04)).await?;
//! for record in &output.table.records {
//!     println!("{} {} {:?}", record.year, record.land_cover_class, record.mean);
//! }
//! ```

pub mod aoi;
pub mod cache;
pub mod composite;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod reducer;
pub mod resample;
pub mod source;
pub mod testdata;
pub mod trigger;
pub mod types;
pub mod years;

// Re-export commonly used types at crate root
pub use aoi::AreaOfInterest;
pub use cache::{ChunkCache, ChunkKey};
pub use composite::{AnnualComposite, CompositeTile, PreviewRaster, PreviewTile};
pub use config::{AnalysisConfig, SourceConfig};
pub use error::{FailureKind, Result, ZonalError};
pub use pipeline::{AnalysisOutput, ZonalPipeline};
pub use record::{ClassSeries, Statistic, StatisticsTable, YearSummary, ZonalStatRecord};
pub use reducer::{CategoryStats, ReductionGrid, ReductionPlan, YearReduction};
pub use source::{
    ClimateSeries, LandCoverSource, MemoryClimateSeries, MemoryLandCover, SceneDescriptor,
    SceneFilter, ZarrClimateSeries, ZarrLandCover,
};
pub use trigger::{AnalysisCompleted, AnalysisEvent, AnalysisFailed, InteractiveTrigger};
pub use types::{CacheStats, CategoryWindow, RasterWindow, StatValue};
pub use years::expand_years;
