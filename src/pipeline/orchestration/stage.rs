use indexmap::IndexMap;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// A stage (or Market Research sub-call) of the identification pipeline.
///
/// Implements Ord based on execution priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineStage {
    /// Resize and encode the captured frame
    Preprocess,
    /// Coarse title and search query
    Identification,
    /// Specifics, condition, weight and refined title
    DeepAnalysis,
    /// Sold and active comparable listings
    Comparables,
    /// Aggregate sold/active counts
    SellThrough,
    /// Generated listing description
    Description,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Preprocess => "Preprocess",
            PipelineStage::Identification => "Identification",
            PipelineStage::DeepAnalysis => "DeepAnalysis",
            PipelineStage::Comparables => "Comparables",
            PipelineStage::SellThrough => "SellThrough",
            PipelineStage::Description => "Description",
        }
    }

    /// Lower executes first. Background stages share a priority.
    pub fn priority(&self) -> u8 {
        match self {
            PipelineStage::Preprocess => 1,
            PipelineStage::Identification => 2,
            PipelineStage::DeepAnalysis
            | PipelineStage::Comparables
            | PipelineStage::SellThrough
            | PipelineStage::Description => 3,
        }
    }
}

impl PartialOrd for PipelineStage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PipelineStage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority()
            .cmp(&other.priority())
            .then_with(|| (*self as u8).cmp(&(*other as u8)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageOutcome {
    Completed,
    TimedOut,
    Failed,
    Skipped,
}

impl StageOutcome {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, StageOutcome::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: PipelineStage,
    pub duration: Duration,
    pub outcome: StageOutcome,
}

impl StageReport {
    pub fn new(stage: PipelineStage, duration: Duration, outcome: StageOutcome) -> Self {
        Self {
            stage,
            duration,
            outcome,
        }
    }

    pub fn skipped(stage: PipelineStage) -> Self {
        Self::new(stage, Duration::ZERO, StageOutcome::Skipped)
    }
}

/// Duration and outcome per stage for one session.
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    reports: IndexMap<PipelineStage, StageReport>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: StageReport) {
        debug!(
            stage = report.stage.name(),
            elapsed_ms = report.duration.as_millis() as u64,
            outcome = ?report.outcome,
            "Stage finished"
        );
        self.reports.insert(report.stage, report);
    }

    pub fn get(&self, stage: PipelineStage) -> Option<&StageReport> {
        self.reports.get(&stage)
    }

    pub fn duration(&self, stage: PipelineStage) -> Duration {
        self.reports
            .get(&stage)
            .map(|report| report.duration)
            .unwrap_or(Duration::ZERO)
    }

    pub fn degraded_stages(&self) -> Vec<PipelineStage> {
        self.reports
            .values()
            .filter(|report| report.outcome.is_degraded())
            .map(|report| report.stage)
            .collect()
    }

    /// Reports in execution order.
    pub fn reports(&self) -> Vec<StageReport> {
        let mut reports: Vec<StageReport> = self.reports.values().copied().collect();
        reports.sort_by_key(|report| report.stage);
        reports
    }

    pub fn log_summary(&self, session_id: Uuid) {
        let summary = self
            .reports()
            .iter()
            .map(|report| {
                format!(
                    "{}={}ms/{:?}",
                    report.stage.name(),
                    report.duration.as_millis(),
                    report.outcome
                )
            })
            .collect::<Vec<_>>()
            .join(" ");
        info!(session_id = %session_id, "Stage timings: {}", summary);
    }
}
