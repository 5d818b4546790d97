//! Statistics table: the flat, ordered output of an analysis.

use serde::{Deserialize, Serialize};

use crate::reducer::YearReduction;
use crate::types::StatValue;

/// One row of the statistics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZonalStatRecord {
    pub year: i32,
    pub land_cover_class: u8,
    pub mean: StatValue,
    /// Absent when no percentile was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile: Option<StatValue>,
    pub count: u64,
}

/// Per-year totals reported alongside the records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSummary {
    pub year: i32,
    pub total_valid_pixels: u64,
    pub scene_count: usize,
}

/// Which statistic a chart plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    #[default]
    Mean,
    Percentile,
}

/// Values of one class over the years, `None` marking gaps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassSeries {
    pub class: u8,
    pub points: Vec<(i32, Option<f64>)>,
}

/// Records ordered year-major, class-minor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsTable {
    pub records: Vec<ZonalStatRecord>,
    /// Percentile rank of the `percentile` column, if computed.
    pub percentile_rank: Option<f64>,
    pub years: Vec<YearSummary>,
}

impl StatisticsTable {
    /// Flatten per-year reductions into records.
    ///
    /// Reductions may arrive in any order; they are sorted by year. Classes
    /// keep the order they were reduced in. Values pass through unchanged.
    pub fn assemble(mut reductions: Vec<YearReduction>, percentile_rank: Option<f64>) -> Self {
        reductions.sort_by_key(|r| r.year);

        let records = reductions
            .iter()
            .flat_map(|r| {
                r.stats.iter().map(move |s| ZonalStatRecord {
                    year: r.year,
                    land_cover_class: s.class,
                    mean: s.mean,
                    percentile: s.percentile,
                    count: s.count,
                })
            })
            .collect();

        let years = reductions
            .iter()
            .map(|r| YearSummary {
                year: r.year,
                total_valid_pixels: r.total_valid_pixels,
                scene_count: r.scene_count,
            })
            .collect();

        Self {
            records,
            percentile_rank,
            years,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Classes in the order they appear within a year.
    pub fn classes(&self) -> Vec<u8> {
        let mut classes = Vec::new();
        for record in &self.records {
            if classes.contains(&record.land_cover_class) {
                break;
            }
            classes.push(record.land_cover_class);
        }
        classes
    }

    /// One series per class with year on the x-axis.
    pub fn series(&self, statistic: Statistic) -> Vec<ClassSeries> {
        self.classes()
            .into_iter()
            .map(|class| ClassSeries {
                class,
                points: self
                    .records
                    .iter()
                    .filter(|r| r.land_cover_class == class)
                    .map(|r| {
                        let value = match statistic {
                            Statistic::Mean => r.mean.value(),
                            Statistic::Percentile => r.percentile.and_then(|p| p.value()),
                        };
                        (r.year, value)
                    })
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::CategoryStats;

    fn reduction(year: i32, means: &[(u8, Option<f64>)]) -> YearReduction {
        YearReduction {
            year,
            stats: means
                .iter()
                .map(|(class, mean)| CategoryStats {
                    class: *class,
                    mean: (*mean).into(),
                    percentile: None,
                    count: u64::from(mean.is_some()) * 10,
                })
                .collect(),
            total_valid_pixels: 25,
            scene_count: 12,
        }
    }

    #[test]
    fn test_assemble_sorts_years_and_keeps_class_order() {
        let table = StatisticsTable::assemble(
            vec![
                reduction(2002, &[(50, Some(3.0)), (30, None)]),
                reduction(2000, &[(50, Some(1.0)), (30, Some(2.0))]),
            ],
            None,
        );

        let keys: Vec<(i32, u8)> = table
            .records
            .iter()
            .map(|r| (r.year, r.land_cover_class))
            .collect();
        assert_eq!(keys, vec![(2000, 50), (2000, 30), (2002, 50), (2002, 30)]);
        assert_eq!(table.records[3].mean, StatValue::NoData);
        assert_eq!(table.records[3].count, 0);
        assert_eq!(table.years[0].year, 2000);
        assert_eq!(table.classes(), vec![50, 30]);
    }

    #[test]
    fn test_series_keeps_gaps() {
        let table = StatisticsTable::assemble(
            vec![
                reduction(2000, &[(30, Some(1.0))]),
                reduction(2001, &[(30, None)]),
                reduction(2002, &[(30, Some(0.0))]),
            ],
            None,
        );
        let series = table.series(Statistic::Mean);
        assert_eq!(series.len(), 1);
        assert_eq!(
            series[0].points,
            vec![(2000, Some(1.0)), (2001, None), (2002, Some(0.0))]
        );
    }

    #[test]
    fn test_record_json_schema() {
        let record = ZonalStatRecord {
            year: 2001,
            land_cover_class: 40,
            mean: StatValue::NoData,
            percentile: None,
            count: 0,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"year": 2001, "landCoverClass": 40, "mean": null, "count": 0})
        );

        let with_percentile = ZonalStatRecord {
            percentile: Some(StatValue::NoData),
            ..record
        };
        let json = serde_json::to_value(&with_percentile).unwrap();
        assert!(json.get("percentile").unwrap().is_null());
    }

    #[test]
    fn test_empty_table() {
        let table = StatisticsTable::assemble(Vec::new(), Some(95.0));
        assert!(table.is_empty());
        assert!(table.series(Statistic::Mean).is_empty());
    }
}
