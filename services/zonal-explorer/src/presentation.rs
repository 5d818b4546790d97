//! Presentation payloads built from analysis events.
//!
//! The [`Presenter`] owns all mutable display state: which generation is on
//! screen, the legend, and the plotted statistic. Events from superseded
//! selections are dropped here as a second line after the trigger's own
//! generation check.

use serde::Serialize;
use zonal_common::{GeoPoint, LandCoverLegend, VisParams};
use zonal_processor::{
    AnalysisCompleted, AnalysisEvent, AnalysisFailed, ClassSeries, FailureKind, PreviewRaster,
    PreviewTile, Statistic, StatisticsTable,
};

/// Least-squares line `y = slope * year + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trendline {
    pub slope: f64,
    pub intercept: f64,
}

impl Trendline {
    /// Fit over the non-gap points. `None` with fewer than two distinct years.
    pub fn fit(points: &[(i32, Option<f64>)]) -> Option<Self> {
        let samples: Vec<(f64, f64)> = points
            .iter()
            .filter_map(|(x, y)| y.map(|y| (*x as f64, y)))
            .collect();
        if samples.len() < 2 {
            return None;
        }

        let n = samples.len() as f64;
        let mean_x = samples.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = samples.iter().map(|(_, y)| y).sum::<f64>() / n;

        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (x, y) in &samples {
            sxy += (x - mean_x) * (y - mean_y);
            sxx += (x - mean_x) * (x - mean_x);
        }
        if sxx == 0.0 {
            return None;
        }

        let slope = sxy / sxx;
        Some(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    pub fn at(&self, year: i32) -> f64 {
        self.slope * year as f64 + self.intercept
    }
}

/// One chart line: a land cover class over the years.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSeries {
    pub class: u8,
    pub label: String,
    pub color: String,
    /// `(year, value)`; `None` is a gap.
    pub points: Vec<(i32, Option<f64>)>,
    pub trendline: Option<Trendline>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Chart {
    pub title: String,
    pub statistic: Statistic,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<ChartSeries>,
}

/// Map layer descriptor for the clipped preview raster.
///
/// Holds two tiles when the buffer crosses the antimeridian.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewLayer {
    pub name: String,
    pub year: i32,
    pub valid_pixels: usize,
    pub tiles: Vec<PreviewTile>,
    pub vis: VisParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegendItem {
    pub value: u8,
    pub label: String,
    pub color: String,
}

/// Labels of the continuous color bar.
#[derive(Debug, Clone, Serialize)]
pub struct ColorRamp {
    pub title: Option<String>,
    pub min: f64,
    pub mid: f64,
    pub max: f64,
    pub palette: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegendPanel {
    pub title: String,
    pub entries: Vec<LegendItem>,
    pub ramp: ColorRamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BannerLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Banner {
    pub level: BannerLevel,
    pub message: String,
}

/// Everything the map surface shows for one selection.
#[derive(Debug, Clone, Serialize)]
pub struct PresentationPayload {
    pub generation: u64,
    pub point: GeoPoint,
    pub chart: Option<Chart>,
    pub layer: Option<PreviewLayer>,
    pub legend: LegendPanel,
    pub banner: Option<Banner>,
}

/// Turns analysis events into payloads for the most recent selection.
pub struct Presenter {
    variable: String,
    statistic: Statistic,
    legend: LandCoverLegend,
    vis: VisParams,
    shown: u64,
}

impl Presenter {
    pub fn new(
        variable: impl Into<String>,
        statistic: Statistic,
        legend: LandCoverLegend,
        vis: VisParams,
    ) -> Self {
        Self {
            variable: variable.into(),
            statistic,
            legend,
            vis,
            shown: 0,
        }
    }

    /// Generation of the payload currently on screen (0 before any).
    pub fn shown_generation(&self) -> u64 {
        self.shown
    }

    /// Build the payload for an event, or `None` if a newer one is shown.
    pub fn present(&mut self, event: &AnalysisEvent) -> Option<PresentationPayload> {
        if event.generation() <= self.shown {
            tracing::debug!(
                generation = event.generation(),
                shown = self.shown,
                "Dropping out-of-date event"
            );
            return None;
        }
        self.shown = event.generation();

        Some(match event {
            AnalysisEvent::Completed(done) => self.completed(done),
            AnalysisEvent::Failed(failed) => self.failed(failed),
        })
    }

    fn completed(&self, done: &AnalysisCompleted) -> PresentationPayload {
        let banner = done.approximate.then(|| Banner {
            level: BannerLevel::Warning,
            message: format!(
                "Pixel budget exceeded: statistics sampled every {} cells ({:.0} m effective scale)",
                done.reduction.factor, done.reduction.effective_scale_m
            ),
        });

        PresentationPayload {
            generation: done.generation,
            point: done.point,
            chart: Some(self.chart(&done.point, &done.table)),
            layer: done
                .preview
                .as_ref()
                .map(|preview| self.layer(&done.point, preview)),
            legend: self.legend_panel(),
            banner,
        }
    }

    fn failed(&self, failed: &AnalysisFailed) -> PresentationPayload {
        let reason = match failed.kind {
            FailureKind::SourceUnavailable => "Data source unavailable",
            FailureKind::InvalidConfig => "Invalid analysis configuration",
            FailureKind::Internal => "Analysis failed",
        };

        PresentationPayload {
            generation: failed.generation,
            point: failed.point,
            chart: None,
            layer: None,
            legend: self.legend_panel(),
            banner: Some(Banner {
                level: BannerLevel::Error,
                message: format!("{}: {}", reason, failed.message),
            }),
        }
    }

    /// Chart of the table, one series per class in configured order.
    pub fn chart(&self, point: &GeoPoint, table: &StatisticsTable) -> Chart {
        // Fall back to the mean when the table carries no percentile column.
        let (statistic, statistic_name) = match (self.statistic, table.percentile_rank) {
            (Statistic::Percentile, Some(rank)) => (Statistic::Percentile, format!("P{}", rank)),
            _ => (Statistic::Mean, "Mean".to_string()),
        };

        let series = table
            .series(statistic)
            .into_iter()
            .map(|ClassSeries { class, points }| ChartSeries {
                class,
                label: self.legend.label(class),
                color: self
                    .legend
                    .entry(class)
                    .map(|e| e.color.to_hex())
                    .unwrap_or_else(|| "#808080".to_string()),
                trendline: Trendline::fit(&points),
                points,
            })
            .collect();

        Chart {
            title: format!(
                "{} yearly {} per land cover class at {}",
                statistic_name,
                self.variable,
                point.caption()
            ),
            statistic,
            x_label: "Year".to_string(),
            y_label: self
                .vis
                .title
                .clone()
                .unwrap_or_else(|| self.variable.clone()),
            series,
        }
    }

    fn layer(&self, point: &GeoPoint, preview: &PreviewRaster) -> PreviewLayer {
        PreviewLayer {
            name: format!("{} of {}", preview.variable, point.caption()),
            year: preview.year,
            valid_pixels: preview.valid_pixels,
            tiles: preview.tiles.clone(),
            vis: preview.vis.clone(),
        }
    }

    fn legend_panel(&self) -> LegendPanel {
        LegendPanel {
            title: self.legend.title.clone(),
            entries: self
                .legend
                .entries
                .iter()
                .map(|e| LegendItem {
                    value: e.value,
                    label: e.label.clone(),
                    color: e.color.to_hex(),
                })
                .collect(),
            ramp: ColorRamp {
                title: self.vis.title.clone(),
                min: self.vis.min,
                mid: self.vis.mid(),
                max: self.vis.max,
                palette: self.vis.palette.iter().map(|c| c.to_hex()).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;
    use zonal_common::DateRange;
    use zonal_processor::testdata::{striped_land_cover, warming_climate, DEMO_CENTER};
    use zonal_processor::{AnalysisConfig, ZonalPipeline};

    fn presenter(statistic: Statistic) -> Presenter {
        Presenter::new(
            "tas",
            statistic,
            LandCoverLegend::worldcover_v200(),
            VisParams::default(),
        )
    }

    async fn completed(generation: u64, max_pixels: u64) -> AnalysisEvent {
        let config = AnalysisConfig {
            date_range: DateRange::parse("2000-01-01/2002-12-31").unwrap(),
            buffer_m: 5_000.0,
            scale_m: 250.0,
            max_pixels,
            ..Default::default()
        };
        let pipeline = ZonalPipeline::new(
            Arc::new(warming_climate(2000, 2002).unwrap()),
            Arc::new(striped_land_cover(&[30, 40]).unwrap()),
            config,
        )
        .unwrap();
        let output = pipeline.run(DEMO_CENTER).await.unwrap();

        AnalysisEvent::Completed(AnalysisCompleted {
            run_id: Uuid::nil(),
            generation,
            point: DEMO_CENTER,
            radius_m: output.aoi.radius_m,
            table: output.table,
            preview: output.preview,
            approximate: output.approximate,
            reduction: output.reduction,
            elapsed_ms: 1,
        })
    }

    #[test]
    fn test_trendline_fit() {
        let points = vec![(2000, Some(1.0)), (2001, None), (2002, Some(5.0)), (2003, Some(7.0))];
        let line = Trendline::fit(&points).unwrap();
        assert!((line.slope - 2.0).abs() < 1e-9);
        assert!((line.at(2000) - 1.0).abs() < 1e-6);

        assert!(Trendline::fit(&[(2000, Some(1.0)), (2001, None)]).is_none());
        assert!(Trendline::fit(&[(2000, Some(1.0)), (2000, Some(2.0))]).is_none());
    }

    #[tokio::test]
    async fn test_completed_payload() {
        let mut presenter = presenter(Statistic::Mean);
        let payload = presenter.present(&completed(1, 1_000_000_000).await).unwrap();

        let chart = payload.chart.unwrap();
        assert_eq!(
            chart.title,
            "Mean yearly tas per land cover class at 51.0447, -114.0719"
        );
        let labels: Vec<&str> = chart.series.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Grassland", "Cropland", "Built-up"]);
        assert_eq!(chart.series[0].color, "#ffff4c");

        // Built-up is absent from the land cover: all gaps, no trend.
        assert!(chart.series[2].points.iter().all(|(_, v)| v.is_none()));
        assert!(chart.series[2].trendline.is_none());
        let trend = chart.series[0].trendline.unwrap();
        assert!((trend.slope - 0.03).abs() < 0.005);

        let layer = payload.layer.unwrap();
        assert_eq!(layer.name, "tas of 51.0447, -114.0719");
        assert_eq!(layer.year, 2002);
        assert!(layer.valid_pixels > 0);

        assert_eq!(payload.legend.entries.len(), 11);
        assert_eq!(payload.legend.ramp.mid, 280.0);
        assert!(payload.banner.is_none());
    }

    #[tokio::test]
    async fn test_approximate_run_shows_banner() {
        let mut presenter = presenter(Statistic::Mean);
        let payload = presenter.present(&completed(1, 50).await).unwrap();

        let banner = payload.banner.unwrap();
        assert_eq!(banner.level, BannerLevel::Warning);
        assert!(banner.message.contains("Pixel budget"));
    }

    #[tokio::test]
    async fn test_percentile_chart_title() {
        let presenter = presenter(Statistic::Percentile);
        let AnalysisEvent::Completed(done) = completed(1, 1_000_000_000).await else {
            panic!("expected a completed event");
        };

        let chart = presenter.chart(&done.point, &done.table);
        assert!(chart.title.starts_with("P95 yearly tas"));
        assert_eq!(chart.statistic, Statistic::Percentile);
    }

    #[tokio::test]
    async fn test_stale_events_are_dropped() {
        let mut presenter = presenter(Statistic::Mean);
        assert!(presenter.present(&completed(2, 1_000_000_000).await).is_some());
        assert!(presenter.present(&completed(1, 1_000_000_000).await).is_none());
        assert_eq!(presenter.shown_generation(), 2);
    }

    #[test]
    fn test_failure_banner() {
        let mut presenter = presenter(Statistic::Mean);
        let payload = presenter
            .present(&AnalysisEvent::Failed(AnalysisFailed {
                generation: 3,
                point: DEMO_CENTER,
                kind: FailureKind::SourceUnavailable,
                message: "store offline".to_string(),
            }))
            .unwrap();

        assert!(payload.chart.is_none());
        let banner = payload.banner.unwrap();
        assert_eq!(banner.level, BannerLevel::Error);
        assert_eq!(banner.message, "Data source unavailable: store offline");
    }
}
