//! The zonal statistics pipeline for one selected point.
//!
//! ```text
//! point ──► AreaOfInterest ──► ReductionGrid (pixel budget)
//!                                   │
//! date range ──► years ──┬─► year y: scenes ─► AnnualComposite ─► reduce (blocking pool)
//!                        ├─► year y+1 ...      (buffer_unordered)
//!                        └─► ...
//!                                   │
//!                        sort by year ─► StatisticsTable + last-year preview
//! ```

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info, instrument};
use zonal_common::{GeoPoint, LandCoverLegend};

use crate::aoi::AreaOfInterest;
use crate::composite::{AnnualComposite, PreviewRaster};
use crate::config::AnalysisConfig;
use crate::error::{Result, ZonalError};
use crate::record::StatisticsTable;
use crate::reducer::{reduce_composite, ReductionGrid, ReductionPlan, YearReduction};
use crate::source::{ClimateSeries, LandCoverSource};
use crate::years::expand_years;

/// Everything one analysis produces.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutput {
    pub aoi: AreaOfInterest,
    pub table: StatisticsTable,
    /// Clipped continuous band of the final year; `None` when no years.
    pub preview: Option<PreviewRaster>,
    pub reduction: ReductionPlan,
    /// Set when the pixel budget forced a coarser sampling.
    pub approximate: bool,
}

/// Runs analyses against a fixed pair of data sources.
pub struct ZonalPipeline {
    climate: Arc<dyn ClimateSeries>,
    land_cover: Arc<dyn LandCoverSource>,
    config: Arc<AnalysisConfig>,
}

impl ZonalPipeline {
    /// Fails when the config is invalid or names a class outside the
    /// land cover legend.
    pub fn new(
        climate: Arc<dyn ClimateSeries>,
        land_cover: Arc<dyn LandCoverSource>,
        config: AnalysisConfig,
    ) -> Result<Self> {
        config.validate()?;

        let legend = land_cover.legend();
        if let Some(class) = config.classes.iter().find(|c| !legend.contains(**c)) {
            return Err(ZonalError::invalid_config(format!(
                "class {} is not in the '{}' legend (codes {:?})",
                class,
                legend.title,
                legend.codes()
            )));
        }

        Ok(Self {
            climate,
            land_cover,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn legend(&self) -> &LandCoverLegend {
        self.land_cover.legend()
    }

    /// Compute the statistics table and preview for a point.
    ///
    /// Years run concurrently; the first failing year fails the whole run.
    #[instrument(skip(self), fields(model = %self.config.model, variable = %self.config.variable))]
    pub async fn run(&self, point: GeoPoint) -> Result<AnalysisOutput> {
        let start = Instant::now();
        let config = &self.config;

        let aoi = AreaOfInterest::new(point, config.buffer_m)?;
        let grid = Arc::new(ReductionGrid::new(&aoi, config.scale_m, config.max_pixels)?);
        let years = expand_years(&config.date_range);
        let last_year = years.last().copied();

        debug!(
            years = years.len(),
            cells = grid.plan().sampled_cells,
            "Starting analysis"
        );

        let mut results: Vec<(YearReduction, Option<AnnualComposite>)> = stream::iter(years)
            .map(|year| self.process_year(year, &aoi, Arc::clone(&grid), Some(year) == last_year))
            .buffer_unordered(config.max_concurrent_years)
            .try_collect()
            .await?;

        results.sort_by_key(|(reduction, _)| reduction.year);

        let preview = results
            .iter_mut()
            .find_map(|(_, composite)| composite.take())
            .map(|composite| composite.preview(&aoi, &config.variable, &config.preview));

        let reductions = results.into_iter().map(|(r, _)| r).collect();
        let table = StatisticsTable::assemble(reductions, config.percentile);
        let reduction = *grid.plan();

        info!(
            records = table.len(),
            approximate = reduction.approximate(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Analysis complete"
        );

        Ok(AnalysisOutput {
            aoi,
            table,
            preview,
            approximate: reduction.approximate(),
            reduction,
        })
    }

    /// Composite and reduce one year. The composite is handed back only when
    /// it is needed for the preview.
    async fn process_year(
        &self,
        year: i32,
        aoi: &AreaOfInterest,
        grid: Arc<ReductionGrid>,
        keep_composite: bool,
    ) -> Result<(YearReduction, Option<AnnualComposite>)> {
        let composite = AnnualComposite::generate(
            year,
            aoi,
            &self.config.model,
            &self.config.variable,
            self.climate.as_ref(),
            self.land_cover.as_ref(),
        )
        .await?;

        let classes = self.config.classes.clone();
        let percentile = self.config.percentile;
        let (reduction, composite) = tokio::task::spawn_blocking(move || {
            let reduction = reduce_composite(&composite, &grid, &classes, percentile);
            (reduction, composite)
        })
        .await?;

        debug!(
            year,
            valid = reduction.total_valid_pixels,
            scenes = reduction.scene_count,
            "Reduced year"
        );

        Ok((reduction, keep_composite.then_some(composite)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::{striped_land_cover, warming_climate, DEMO_CENTER};
    use zonal_common::DateRange;

    fn pipeline(config: AnalysisConfig) -> ZonalPipeline {
        let climate = warming_climate(2000, 2002).unwrap();
        let land_cover = striped_land_cover(&[30, 40]).unwrap();
        ZonalPipeline::new(Arc::new(climate), Arc::new(land_cover), config).unwrap()
    }

    fn config(range: &str) -> AnalysisConfig {
        AnalysisConfig {
            date_range: DateRange::parse(range).unwrap(),
            buffer_m: 5_000.0,
            scale_m: 500.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_run_produces_year_major_records() {
        let output = pipeline(config("2000-01-01/2002-12-31"))
            .run(DEMO_CENTER)
            .await
            .unwrap();

        let keys: Vec<(i32, u8)> = output
            .table
            .records
            .iter()
            .map(|r| (r.year, r.land_cover_class))
            .collect();
        assert_eq!(
            keys,
            vec![
                (2000, 30),
                (2000, 40),
                (2000, 50),
                (2001, 30),
                (2001, 40),
                (2001, 50),
                (2002, 30),
                (2002, 40),
                (2002, 50),
            ]
        );
        assert!(!output.approximate);
        assert_eq!(output.preview.unwrap().year, 2002);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let climate = warming_climate(2000, 2000).unwrap();
        let land_cover = striped_land_cover(&[30]).unwrap();
        let bad = AnalysisConfig {
            scale_m: 0.0,
            ..Default::default()
        };
        assert!(ZonalPipeline::new(Arc::new(climate), Arc::new(land_cover), bad).is_err());
    }

    #[test]
    fn test_class_outside_legend_is_rejected() {
        let climate = warming_climate(2000, 2000).unwrap();
        let land_cover = striped_land_cover(&[30]).unwrap();
        let config = AnalysisConfig {
            classes: vec![30, 35],
            ..Default::default()
        };
        let err = ZonalPipeline::new(Arc::new(climate), Arc::new(land_cover), config)
            .err()
            .unwrap();
        assert!(matches!(err, ZonalError::InvalidConfig(_)));
        assert!(err.to_string().contains("class 35"));
    }

    #[tokio::test]
    async fn test_run_with_single_concurrency_matches_parallel() {
        let serial = pipeline(AnalysisConfig {
            max_concurrent_years: 1,
            ..config("2000-01-01/2002-12-31")
        })
        .run(DEMO_CENTER)
        .await
        .unwrap();
        let parallel = pipeline(config("2000-01-01/2002-12-31"))
            .run(DEMO_CENTER)
            .await
            .unwrap();
        assert_eq!(serial.table, parallel.table);
    }
}
