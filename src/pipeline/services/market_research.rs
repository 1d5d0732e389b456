use crate::collaborators::{CompareResponse, Describer, ListingTab, MarketSearch, SellThrough};
use crate::pipeline::orchestration::deadline::race_with_fallback;
use crate::pipeline::orchestration::stage::{PipelineStage, StageOutcome, StageReport};
use crate::pipeline::services::title::{is_fallback_title, sanitize_title};
use crate::pipeline::types::{Comparable, MarketStats, PartialResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Joined output of the three market research sub-calls.
#[derive(Debug, Clone, Default)]
pub struct MarketResearch {
    pub stats: MarketStats,
    pub description: Option<String>,
    pub reports: Vec<StageReport>,
}

impl MarketResearch {
    pub fn into_patch(self) -> (PartialResult, Vec<StageReport>) {
        let patch = PartialResult {
            market_stats: Some(self.stats),
            description: self.description,
            ..PartialResult::default()
        };
        (patch, self.reports)
    }
}

#[derive(Debug, Clone, Default)]
struct Comparables {
    sold: CompareResponse,
    active: CompareResponse,
}

pub struct MarketResearchStage {
    market: Arc<dyn MarketSearch>,
    describer: Arc<dyn Describer>,
    timeout: Duration,
    condition: String,
    platform: String,
}

impl MarketResearchStage {
    pub fn new(
        market: Arc<dyn MarketSearch>,
        describer: Arc<dyn Describer>,
        timeout: Duration,
        condition: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            market,
            describer,
            timeout,
            condition: condition.into(),
            platform: platform.into(),
        }
    }

    /// Runs comparable search, sell-through and description concurrently and
    /// joins all three. A failing sub-call degrades only its own field.
    #[instrument(skip(self, notes))]
    pub async fn research(&self, search_query: &str, title: &str, notes: &str) -> MarketResearch {
        let query = search_query.trim();
        let (comparables, sell_through, description) = tokio::join!(
            self.comparables(query),
            self.sell_through(query),
            self.describe(title, notes),
        );
        let (comparables, comparables_report) = comparables;
        let (counts, sell_through_report) = sell_through;
        let (description, description_report) = description;

        let counts = SellThrough::from_counts(counts.sold_count, counts.active_count);
        let stats = MarketStats {
            sold_count: counts.sold_count,
            active_count: counts.active_count,
            sell_through_rate: counts.sell_through_rate,
            average_sold_price: Some(comparables.sold.average_price).filter(|p| *p > 0.0),
            active_comps: sanitize_comps(comparables.active.items),
            sold_comps: sanitize_comps(comparables.sold.items),
        };
        info!(
            sold = stats.sold_count,
            active = stats.active_count,
            sell_through_rate = stats.sell_through_rate,
            estimated = comparables.sold.is_estimated,
            "Market research joined"
        );
        MarketResearch {
            stats,
            description,
            reports: vec![comparables_report, sell_through_report, description_report],
        }
    }

    /// Fetches both listing tabs, each under its own deadline, so a tab
    /// that hangs or fails leaves the other one intact.
    async fn comparables(&self, query: &str) -> (Comparables, StageReport) {
        if query.is_empty() {
            return (Comparables::default(), StageReport::skipped(PipelineStage::Comparables));
        }
        let ((sold, sold_report), (active, active_report)) = tokio::join!(
            self.fetch_tab(query, ListingTab::Sold),
            self.fetch_tab(query, ListingTab::Active),
        );
        let outcome = [sold_report.outcome, active_report.outcome]
            .into_iter()
            .find(|outcome| outcome.is_degraded())
            .unwrap_or(StageOutcome::Completed);
        let report = StageReport::new(
            PipelineStage::Comparables,
            sold_report.duration.max(active_report.duration),
            outcome,
        );
        (Comparables { sold, active }, report)
    }

    async fn fetch_tab(&self, query: &str, tab: ListingTab) -> (CompareResponse, StageReport) {
        let (response, report) = race_with_fallback(
            PipelineStage::Comparables,
            self.timeout,
            self.market.compare(query, tab, &self.condition),
            CompareResponse::default,
        )
        .await;
        if report.outcome.is_degraded() {
            debug!(tab = ?tab, outcome = ?report.outcome, "Comparable tab degraded to an empty list");
        }
        (response, report)
    }

    async fn sell_through(&self, query: &str) -> (SellThrough, StageReport) {
        if query.is_empty() {
            return (SellThrough::zeroed(), StageReport::skipped(PipelineStage::SellThrough));
        }
        race_with_fallback(
            PipelineStage::SellThrough,
            self.timeout,
            self.market.sell_through(query),
            SellThrough::zeroed,
        )
        .await
    }

    async fn describe(&self, title: &str, notes: &str) -> (Option<String>, StageReport) {
        if title.trim().is_empty() || is_fallback_title(title) {
            return (None, StageReport::skipped(PipelineStage::Description));
        }
        let (text, report) = race_with_fallback(
            PipelineStage::Description,
            self.timeout,
            self.describer.generate(title, notes, &self.platform),
            String::new,
        )
        .await;
        let text = text.trim().to_string();
        ((!text.is_empty()).then_some(text), report)
    }
}

fn sanitize_comps(comps: Vec<Comparable>) -> Vec<Comparable> {
    comps
        .into_iter()
        .map(|mut comp| {
            comp.title = sanitize_title(&comp.title);
            comp
        })
        .collect()
}
