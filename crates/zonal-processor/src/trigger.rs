//! Interactive trigger: runs the pipeline on each point selection.
//!
//! At most one analysis is authoritative at a time. Each selection bumps a
//! generation counter and aborts the previous task; a task only emits its
//! event if its generation is still the latest when it finishes, so a stale
//! result can never overwrite a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;
use zonal_common::GeoPoint;

use crate::composite::PreviewRaster;
use crate::error::FailureKind;
use crate::pipeline::ZonalPipeline;
use crate::record::StatisticsTable;
use crate::reducer::ReductionPlan;

/// A finished analysis, ready for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisCompleted {
    pub run_id: Uuid,
    pub generation: u64,
    pub point: GeoPoint,
    pub radius_m: f64,
    pub table: StatisticsTable,
    pub preview: Option<PreviewRaster>,
    pub approximate: bool,
    pub reduction: ReductionPlan,
    pub elapsed_ms: u64,
}

/// An analysis that could not produce a table.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisFailed {
    pub generation: u64,
    pub point: GeoPoint,
    pub kind: FailureKind,
    pub message: String,
}

/// Events delivered to presentation collaborators.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    Completed(AnalysisCompleted),
    Failed(AnalysisFailed),
}

impl AnalysisEvent {
    pub fn generation(&self) -> u64 {
        match self {
            AnalysisEvent::Completed(e) => e.generation,
            AnalysisEvent::Failed(e) => e.generation,
        }
    }
}

/// Starts an analysis per selected point, last selection wins.
pub struct InteractiveTrigger {
    pipeline: Arc<ZonalPipeline>,
    events: mpsc::Sender<AnalysisEvent>,
    generation: Arc<AtomicU64>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl InteractiveTrigger {
    pub fn new(pipeline: Arc<ZonalPipeline>, events: mpsc::Sender<AnalysisEvent>) -> Self {
        Self {
            pipeline,
            events,
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: Mutex::new(None),
        }
    }

    /// Generation of the most recent selection (0 before any).
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start an analysis for `point`, superseding any analysis in flight.
    ///
    /// Returns the generation assigned to this selection. Must be called
    /// from within a Tokio runtime.
    pub fn select_point(&self, point: GeoPoint) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let task = tokio::spawn(analyse(
            Arc::clone(&self.pipeline),
            self.events.clone(),
            Arc::clone(&self.generation),
            generation,
            point,
        ));

        let previous = match self.in_flight.lock() {
            Ok(mut slot) => slot.replace(task),
            Err(poisoned) => poisoned.into_inner().replace(task),
        };
        if let Some(previous) = previous {
            if !previous.is_finished() {
                previous.abort();
                counter!("zonal_analyses_superseded_total").increment(1);
                info!(generation, "Superseded analysis in flight");
            }
        }

        generation
    }

    /// Abandon the analysis in flight, if any. Nothing is emitted for it.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let previous = match self.in_flight.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Drop for InteractiveTrigger {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.in_flight.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

async fn analyse(
    pipeline: Arc<ZonalPipeline>,
    events: mpsc::Sender<AnalysisEvent>,
    latest: Arc<AtomicU64>,
    generation: u64,
    point: GeoPoint,
) {
    let start = Instant::now();
    counter!("zonal_analyses_total").increment(1);

    let result = pipeline.run(point).await;
    let elapsed = start.elapsed();
    histogram!("zonal_analysis_duration_seconds").record(elapsed.as_secs_f64());

    if latest.load(Ordering::SeqCst) != generation {
        counter!("zonal_analyses_superseded_total").increment(1);
        warn!(generation, "Discarding stale analysis result");
        return;
    }

    let event = match result {
        Ok(output) => {
            if output.approximate {
                counter!("zonal_approximate_runs_total").increment(1);
            }
            AnalysisEvent::Completed(AnalysisCompleted {
                run_id: Uuid::new_v4(),
                generation,
                point,
                radius_m: output.aoi.radius_m,
                table: output.table,
                preview: output.preview,
                approximate: output.approximate,
                reduction: output.reduction,
                elapsed_ms: elapsed.as_millis() as u64,
            })
        }
        Err(e) => {
            counter!("zonal_analyses_failed_total").increment(1);
            warn!(generation, error = %e, "Analysis failed");
            AnalysisEvent::Failed(AnalysisFailed {
                generation,
                point,
                kind: e.kind(),
                message: e.to_string(),
            })
        }
    };

    if events.send(event).await.is_err() {
        warn!(generation, "Presentation channel closed");
    }
}
