use crate::common::{CapturedFrame, ProcessedImage};
use crate::error::AppError;
use crate::pipeline::orchestration::stage::StageTimings;
use crate::pipeline::services::merger;
use crate::pipeline::types::{AnalysisResult, PartialResult};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionPhase {
    Idle,
    Scanning,
    Identifying,
    BackgroundEnriching,
    Complete,
    Failed,
}

impl SessionPhase {
    /// User-visible status label.
    pub fn status(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Scanning => "scanning",
            SessionPhase::Identifying => "analyzing",
            SessionPhase::BackgroundEnriching => "researching",
            SessionPhase::Complete => "complete",
            SessionPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Complete | SessionPhase::Failed)
    }

    pub fn can_transition_to(&self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        match (self, next) {
            (Idle, Scanning) => true,
            (Scanning, Identifying) => true,
            (Identifying, BackgroundEnriching) => true,
            (BackgroundEnriching, Complete) => true,
            // manual stop and the watchdog
            (Identifying, Complete) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// The unit of work for one scan. Mutated only through the supervisor.
pub struct CaptureSession {
    session_id: Uuid,
    raw_image: CapturedFrame,
    processed_image: Option<ProcessedImage>,
    scanned_code: Option<String>,
    phase: SessionPhase,
    provisional_result: Option<AnalysisResult>,
    final_result: Option<AnalysisResult>,
    background_active: bool,
    timings: StageTimings,
}

impl CaptureSession {
    pub fn new(raw_image: CapturedFrame, scanned_code: Option<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            raw_image,
            processed_image: None,
            scanned_code: scanned_code.filter(|code| !code.trim().is_empty()),
            phase: SessionPhase::Idle,
            provisional_result: None,
            final_result: None,
            background_active: false,
            timings: StageTimings::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn raw_image(&self) -> &CapturedFrame {
        &self.raw_image
    }

    pub fn processed_image(&self) -> Option<&ProcessedImage> {
        self.processed_image.as_ref()
    }

    pub fn scanned_code(&self) -> Option<&str> {
        self.scanned_code.as_deref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_frozen(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn background_active(&self) -> bool {
        self.background_active
    }

    pub fn set_background_active(&mut self, active: bool) {
        if !self.is_frozen() {
            self.background_active = active;
        }
    }

    pub fn timings(&self) -> &StageTimings {
        &self.timings
    }

    pub fn timings_mut(&mut self) -> &mut StageTimings {
        &mut self.timings
    }

    pub fn provisional_result(&self) -> Option<&AnalysisResult> {
        self.provisional_result.as_ref()
    }

    pub fn final_result(&self) -> Option<&AnalysisResult> {
        self.final_result.as_ref()
    }

    pub fn set_processed_image(&mut self, image: ProcessedImage) -> Result<(), AppError> {
        if self.processed_image.is_some() {
            return Err(AppError::AlreadyProcessed(self.session_id));
        }
        self.processed_image = Some(image);
        Ok(())
    }

    pub fn transition(&mut self, next: SessionPhase) -> Result<(), AppError> {
        if !self.phase.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        info!(
            session_id = %self.session_id,
            from = ?self.phase,
            to = ?next,
            "Session phase changed"
        );
        self.phase = next;
        if next.is_terminal() {
            self.background_active = false;
        }
        Ok(())
    }

    /// Installs the provisional result from identification.
    pub fn publish_provisional(&mut self, result: AnalysisResult) -> bool {
        if self.is_frozen() {
            return false;
        }
        let mut result = result;
        merger::enforce_default_specifics(&mut result);
        self.provisional_result = Some(result);
        true
    }

    /// Merges a patch into the live result. Ignored once the session is frozen.
    pub fn apply_patch(&mut self, patch: PartialResult) -> bool {
        if self.is_frozen() {
            return false;
        }
        let base = self
            .provisional_result
            .take()
            .unwrap_or_else(merger::fallback_result);
        self.provisional_result = Some(merger::merge(base, patch));
        true
    }

    /// The live result, or a fallback result when identification has not
    /// reported yet.
    pub fn current_result(&self) -> AnalysisResult {
        if let Some(result) = self.final_result.as_ref().or(self.provisional_result.as_ref()) {
            return result.clone();
        }
        merger::fallback_result()
    }

    /// Moves to `next` and freezes whatever has accumulated as the final result.
    pub fn finish(&mut self, next: SessionPhase) -> Result<AnalysisResult, AppError> {
        self.transition(next)?;
        let mut result = self.current_result();
        merger::apply_fallbacks(&mut result);
        merger::enforce_default_specifics(&mut result);
        self.final_result = Some(result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn session() -> CaptureSession {
        CaptureSession::new(CapturedFrame::new(DynamicImage::new_rgb8(4, 4)), None)
    }

    #[test]
    fn happy_path_transitions_are_allowed() {
        let mut session = session();
        for next in [
            SessionPhase::Scanning,
            SessionPhase::Identifying,
            SessionPhase::BackgroundEnriching,
            SessionPhase::Complete,
        ] {
            session.transition(next).expect("transition should be allowed");
        }
        assert!(session.is_frozen());
    }

    #[test]
    fn skipping_phases_is_rejected() {
        let mut session = session();
        let err = session.transition(SessionPhase::Identifying).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: SessionPhase::Idle,
                to: SessionPhase::Identifying
            }
        ));
    }

    #[test]
    fn terminal_phases_do_not_move() {
        let mut session = session();
        session.transition(SessionPhase::Scanning).unwrap();
        session.transition(SessionPhase::Failed).unwrap();
        assert!(session.transition(SessionPhase::Complete).is_err());
        assert!(session.transition(SessionPhase::Failed).is_err());
    }

    #[test]
    fn manual_stop_is_allowed_from_identifying() {
        assert!(SessionPhase::Identifying.can_transition_to(SessionPhase::Complete));
        assert!(SessionPhase::BackgroundEnriching.can_transition_to(SessionPhase::Complete));
        assert!(!SessionPhase::Scanning.can_transition_to(SessionPhase::Complete));
    }

    #[test]
    fn processed_image_is_set_once() {
        let mut session = session();
        let image = ProcessedImage::Original(session.raw_image().image().clone());
        session.set_processed_image(image.clone()).unwrap();
        assert!(matches!(
            session.set_processed_image(image),
            Err(AppError::AlreadyProcessed(_))
        ));
    }

    #[test]
    fn frozen_session_ignores_patches() {
        let mut session = session();
        session.transition(SessionPhase::Scanning).unwrap();
        session.transition(SessionPhase::Identifying).unwrap();
        session.finish(SessionPhase::Complete).unwrap();

        let applied = session.apply_patch(PartialResult {
            title: Some("Late Title".into()),
            ..PartialResult::default()
        });
        assert!(!applied);
        assert_ne!(session.current_result().title, "Late Title");
    }

    #[test]
    fn blank_scanned_code_is_dropped() {
        let session = CaptureSession::new(
            CapturedFrame::new(DynamicImage::new_rgb8(4, 4)),
            Some("   ".into()),
        );
        assert_eq!(session.scanned_code(), None);
    }
}
