use crate::collaborators::Recognizer;
use crate::common::ProcessedImage;
use crate::pipeline::orchestration::deadline::race_with_fallback;
use crate::pipeline::orchestration::stage::{PipelineStage, StageReport};
use crate::pipeline::types::PartialResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Requests richer attributes for an identified item. Degrades to an empty
/// patch, never to an error.
pub struct DeepAnalysisStage {
    recognizer: Arc<dyn Recognizer>,
    timeout: Duration,
}

impl DeepAnalysisStage {
    pub fn new(recognizer: Arc<dyn Recognizer>, timeout: Duration) -> Self {
        Self {
            recognizer,
            timeout,
        }
    }

    #[instrument(skip(self, image))]
    pub async fn enrich(&self, image: &ProcessedImage, title: &str) -> (PartialResult, StageReport) {
        let (patch, report) = race_with_fallback(
            PipelineStage::DeepAnalysis,
            self.timeout,
            self.recognizer.enrich(image, title),
            PartialResult::default,
        )
        .await;
        debug!(empty = patch.is_empty(), "Deep analysis returned");
        (patch, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FixtureCollaborators, Scripted};
    use crate::pipeline::orchestration::stage::StageOutcome;
    use image::DynamicImage;

    fn image() -> ProcessedImage {
        ProcessedImage::Original(Arc::new(DynamicImage::new_rgb8(4, 4)))
    }

    #[tokio::test]
    async fn returns_patch_from_recognizer() {
        let fixtures = FixtureCollaborators {
            enrich: Scripted::reply(PartialResult {
                weight_estimate: Some("1 lb".into()),
                condition: Some("Used".into()),
                ..PartialResult::default()
            }),
            ..FixtureCollaborators::default()
        };
        let stage = DeepAnalysisStage::new(Arc::new(fixtures.clone()), Duration::from_secs(25));
        let (patch, report) = stage.enrich(&image(), "Red Widget").await;
        assert_eq!(patch.weight_estimate.as_deref(), Some("1 lb"));
        assert_eq!(report.outcome, StageOutcome::Completed);
        assert_eq!(fixtures.calls(), vec!["enrich:Red Widget"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_yields_empty_patch() {
        let fixtures = FixtureCollaborators {
            enrich: Scripted::Hang,
            ..FixtureCollaborators::default()
        };
        let stage = DeepAnalysisStage::new(Arc::new(fixtures), Duration::from_secs(25));
        let (patch, report) = stage.enrich(&image(), "Red Widget").await;
        assert!(patch.is_empty());
        assert_eq!(report.outcome, StageOutcome::TimedOut);
    }

    #[tokio::test]
    async fn error_yields_empty_patch() {
        let fixtures = FixtureCollaborators {
            enrich: Scripted::fail("500"),
            ..FixtureCollaborators::default()
        };
        let stage = DeepAnalysisStage::new(Arc::new(fixtures), Duration::from_secs(25));
        let (patch, report) = stage.enrich(&image(), "Red Widget").await;
        assert!(patch.is_empty());
        assert_eq!(report.outcome, StageOutcome::Failed);
    }
}
