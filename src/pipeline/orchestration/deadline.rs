use super::stage::{PipelineStage, StageOutcome, StageReport};
use crate::error::CollaboratorError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Races `operation` against `limit`. Whichever finishes first wins; the
/// loser's eventual result is dropped with the future, so it can never be
/// applied late. Timeouts and errors both resolve to `fallback()`.
pub async fn race_with_fallback<T, F, D>(
    stage: PipelineStage,
    limit: Duration,
    operation: F,
    fallback: D,
) -> (T, StageReport)
where
    F: Future<Output = Result<T, CollaboratorError>>,
    D: FnOnce() -> T,
{
    let started = Instant::now();
    let (value, outcome) = match tokio::time::timeout(limit, operation).await {
        Ok(Ok(value)) => (value, StageOutcome::Completed),
        Ok(Err(e)) => {
            warn!(stage = stage.name(), error = %e, "Stage failed, using fallback");
            (fallback(), StageOutcome::Failed)
        }
        Err(_) => {
            warn!(
                stage = stage.name(),
                limit_ms = limit.as_millis() as u64,
                "Stage timed out, using fallback"
            );
            (fallback(), StageOutcome::TimedOut)
        }
    };
    (value, StageReport::new(stage, started.elapsed(), outcome))
}
