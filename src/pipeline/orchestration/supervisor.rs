use crate::collaborators::{Describer, FixtureCollaborators, MarketSearch, ObjectStore, Recognizer};
use crate::common::{CapturedFrame, ProcessedImage};
use crate::config::Configuration;
use crate::error::AppError;
use crate::pipeline::orchestration::stage::StageReport;
use crate::pipeline::orchestration::watchdog::Watchdog;
use crate::pipeline::services::deep_analysis::DeepAnalysisStage;
use crate::pipeline::services::identification::{Identification, IdentificationStage};
use crate::pipeline::services::market_research::MarketResearchStage;
use crate::pipeline::services::merger;
use crate::pipeline::services::preprocessing::Preprocessor;
use crate::pipeline::services::publisher::ResultPublisher;
use crate::pipeline::services::uploads::{UploadState, UploadTable};
use crate::pipeline::types::{
    AnalysisResult, CaptureSession, PartialResult, SessionPhase, SessionUpdate, UpdateCause,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Point-in-time view of the live session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub status: &'static str,
    pub background_active: bool,
    pub scanned_code: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub result: AnalysisResult,
    pub timings: Vec<StageReport>,
}

#[derive(Debug, Clone)]
pub enum ImageReference {
    Remote(String),
    Local(ProcessedImage),
}

/// What `save` hands to inventory.
#[derive(Debug, Clone)]
pub struct SavedScan {
    pub session_id: Uuid,
    pub result: AnalysisResult,
    pub image: ImageReference,
}

struct LiveSession {
    session: CaptureSession,
    watchdog: Option<Watchdog>,
}

impl LiveSession {
    fn disarm(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            debug!(session_id = %watchdog.session_id(), "Disarming watchdog");
            watchdog.disarm();
        }
    }
}

struct SupervisorInner {
    configuration: Configuration,
    preprocessor: Preprocessor,
    identification: IdentificationStage,
    deep_analysis: DeepAnalysisStage,
    market_research: MarketResearchStage,
    object_store: Arc<dyn ObjectStore>,
    publisher: ResultPublisher,
    uploads: UploadTable,
    live: Mutex<Option<LiveSession>>,
}

impl SupervisorInner {
    fn lock_live(&self) -> Result<MutexGuard<'_, Option<LiveSession>>, AppError> {
        self.live
            .lock()
            .map_err(|_| AppError::Pipeline("session lock poisoned".into()))
    }

    /// Runs `f` against the live session if it is still `session_id`.
    fn with_session<R>(
        &self,
        session_id: Uuid,
        f: impl FnOnce(&mut LiveSession) -> R,
    ) -> Option<R> {
        let mut live = match self.lock_live() {
            Ok(live) => live,
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Cannot access session");
                return None;
            }
        };
        match live.as_mut() {
            Some(current) if current.session.session_id() == session_id => Some(f(current)),
            _ => None,
        }
    }

    fn publish(&self, session: &CaptureSession, cause: UpdateCause, include_result: bool) {
        self.publisher.publish(SessionUpdate {
            session_id: session.session_id(),
            phase: session.phase(),
            status: session.phase().status(),
            background_active: session.background_active(),
            cause,
            result: include_result.then(|| session.current_result()),
        });
    }

    fn release(&self, mut previous: LiveSession, reason: &str) {
        previous.disarm();
        let session_id = previous.session.session_id();
        self.uploads.remove(session_id);
        info!(
            session_id = %session_id,
            phase = ?previous.session.phase(),
            reason,
            "Session discarded"
        );
    }

    fn complete_locked(
        &self,
        live: &mut LiveSession,
        cause: UpdateCause,
    ) -> Result<AnalysisResult, AppError> {
        live.disarm();
        let result = live.session.finish(SessionPhase::Complete)?;
        let session_id = live.session.session_id();
        live.session.timings().log_summary(session_id);
        info!(
            session_id = %session_id,
            cause = ?cause,
            title = %result.title,
            confidence = result.confidence,
            "Session complete"
        );
        self.publish(&live.session, cause, true);
        Ok(result)
    }

    /// Moves the session to `Complete` unless it already reached a terminal
    /// phase. Shared by the normal completion path and the watchdog.
    fn force_complete(&self, session_id: Uuid, cause: UpdateCause) -> bool {
        self.with_session(session_id, |live| {
            live.disarm();
            if live.session.is_frozen() {
                debug!(session_id = %session_id, cause = ?cause, "Session already frozen");
                return false;
            }
            match self.complete_locked(live, cause) {
                Ok(_) => true,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Completion rejected");
                    false
                }
            }
        })
        .unwrap_or(false)
    }

    fn install(&self, session: CaptureSession) -> Result<(), AppError> {
        let mut live = self.lock_live()?;
        self.publish(&session, UpdateCause::PhaseChanged, false);
        let previous = live.replace(LiveSession {
            session,
            watchdog: None,
        });
        if let Some(previous) = previous {
            self.release(previous, "new scan started");
        }
        Ok(())
    }

    fn publish_provisional(
        &self,
        live: &mut LiveSession,
        identification: &Identification,
        report: StageReport,
    ) -> Result<Option<AnalysisResult>, AppError> {
        let session_id = live.session.session_id();
        live.session.timings_mut().record(report);
        if live.session.is_frozen() {
            debug!(session_id = %session_id, "Identification arrived after the session froze");
            return Ok(None);
        }
        if !identification.has_usable_title() {
            error!(session_id = %session_id, "Identification produced no usable title");
            live.disarm();
            live.session.transition(SessionPhase::Failed)?;
            self.publish(&live.session, UpdateCause::Failed, true);
            return Err(AppError::Unrecoverable(session_id));
        }
        live.session
            .publish_provisional(identification.clone().into_result());
        live.session.transition(SessionPhase::BackgroundEnriching)?;
        live.session.set_background_active(true);
        self.publish(&live.session, UpdateCause::Provisional, true);
        Ok(live.session.provisional_result().cloned())
    }

    fn apply_enrichment(&self, session_id: Uuid, patch: PartialResult, reports: &[StageReport]) {
        let outcome = self.with_session(session_id, |live| {
            for report in reports {
                live.session.timings_mut().record(*report);
            }
            if patch.is_empty() {
                return true;
            }
            let applied = live.session.apply_patch(patch);
            if applied {
                self.publish(&live.session, UpdateCause::Enriched, true);
            }
            applied
        });
        if outcome != Some(true) {
            debug!(session_id = %session_id, "Discarding late enrichment");
        }
    }
}

/// Owns the lifecycle of the single live capture session.
#[derive(Clone)]
pub struct PipelineSupervisor {
    inner: Arc<SupervisorInner>,
}

impl PipelineSupervisor {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.inner.publisher.subscribe()
    }

    /// Runs capture through identification and publishes the provisional
    /// result, then detaches the background phase. Starting a scan discards
    /// whatever session was live before.
    #[instrument(skip(self, frame), fields(frame_id = %frame.frame_id()))]
    pub async fn scan(
        &self,
        frame: CapturedFrame,
        scanned_code: Option<String>,
    ) -> Result<Uuid, AppError> {
        let inner = &self.inner;
        let mut session = CaptureSession::new(frame.clone(), scanned_code);
        let session_id = session.session_id();
        session.transition(SessionPhase::Scanning)?;
        inner.install(session)?;

        let (processed, report) = inner.preprocessor.process(&frame).await;

        let watchdog_target = Arc::downgrade(&self.inner);
        let ceiling = inner.configuration.watchdog();
        let identifying = inner.with_session(session_id, |live| -> Result<_, AppError> {
            live.session.timings_mut().record(report);
            live.session.set_processed_image(processed.clone())?;
            live.session.transition(SessionPhase::Identifying)?;
            live.watchdog = Some(Watchdog::arm(session_id, ceiling, move || {
                if let Some(inner) = watchdog_target.upgrade() {
                    inner.force_complete(session_id, UpdateCause::Watchdog);
                }
            }));
            inner
                .uploads
                .spawn_upload(inner.object_store.clone(), session_id, processed.clone());
            inner.publish(&live.session, UpdateCause::PhaseChanged, false);
            Ok(live.session.scanned_code().map(str::to_string))
        });
        let scanned_code = match identifying {
            Some(code) => code?,
            None => {
                debug!(session_id = %session_id, "Session replaced during pre-processing");
                return Ok(session_id);
            }
        };

        let (identification, report) = inner
            .identification
            .identify(&processed, scanned_code.as_deref())
            .await;

        let provisional = inner.with_session(session_id, |live| {
            inner.publish_provisional(live, &identification, report)
        });
        let Some(provisional) = provisional.transpose()?.flatten() else {
            return Ok(session_id);
        };

        let notes = describe_notes(&provisional);
        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor
                .enrich_in_background(session_id, processed, identification, notes)
                .await;
        });
        Ok(session_id)
    }

    #[instrument(skip(self, image, identification, notes), fields(title = %identification.title))]
    async fn enrich_in_background(
        &self,
        session_id: Uuid,
        image: ProcessedImage,
        identification: Identification,
        notes: String,
    ) {
        let inner = &self.inner;
        let deep = async {
            let (patch, report) = inner
                .deep_analysis
                .enrich(&image, &identification.title)
                .await;
            inner.apply_enrichment(session_id, patch, &[report]);
        };
        let market = inner.market_research.research(
            &identification.search_query,
            &identification.title,
            &notes,
        );
        let ((), research) = tokio::join!(deep, market);

        let (patch, reports) = research.into_patch();
        inner.apply_enrichment(session_id, patch, &reports);
        inner.force_complete(session_id, UpdateCause::Completed);
    }

    /// Manual unlock: completes the session with whatever has accumulated.
    pub fn stop(&self, session_id: Uuid) -> Result<AnalysisResult, AppError> {
        self.inner
            .with_session(session_id, |live| {
                let phase = live.session.phase();
                if !matches!(
                    phase,
                    SessionPhase::Identifying | SessionPhase::BackgroundEnriching
                ) {
                    return Err(AppError::InvalidTransition {
                        from: phase,
                        to: SessionPhase::Complete,
                    });
                }
                info!(session_id = %session_id, phase = ?phase, "Manual stop");
                self.inner.complete_locked(live, UpdateCause::ManualStop)
            })
            .unwrap_or(Err(AppError::UnknownSession(session_id)))
    }

    pub fn snapshot(&self, session_id: Uuid) -> Result<SessionSnapshot, AppError> {
        self.inner
            .with_session(session_id, |live| {
                let session = &live.session;
                SessionSnapshot {
                    session_id,
                    phase: session.phase(),
                    status: session.phase().status(),
                    background_active: session.background_active(),
                    scanned_code: session.scanned_code().map(str::to_string),
                    captured_at: session.raw_image().captured_at(),
                    result: session.current_result(),
                    timings: session.timings().reports(),
                }
            })
            .ok_or(AppError::UnknownSession(session_id))
    }

    pub fn upload_state(&self, session_id: Uuid) -> Option<UploadState> {
        self.inner.uploads.state(session_id)
    }

    pub fn discard(&self, session_id: Uuid) -> Result<(), AppError> {
        let previous = self.take_live(session_id, |_| Ok(()))?;
        self.inner.release(previous, "discarded by user");
        Ok(())
    }

    /// Hands the frozen result and its image to inventory and ends the
    /// session. Allowed only once the session is complete.
    pub fn save(&self, session_id: Uuid) -> Result<SavedScan, AppError> {
        let saved = self.take_live(session_id, |live| match live.session.phase() {
            SessionPhase::Complete => Ok(()),
            _ => Err(AppError::NotComplete(session_id)),
        })?;
        let session = &saved.session;
        let result = session
            .final_result()
            .cloned()
            .unwrap_or_else(|| session.current_result());
        let image = match self.inner.uploads.take(session_id) {
            Some(UploadState::Uploaded(url)) => ImageReference::Remote(url),
            state => {
                debug!(session_id = %session_id, upload = ?state, "Keeping local image copy");
                ImageReference::Local(session.processed_image().cloned().unwrap_or_else(|| {
                    ProcessedImage::Original(session.raw_image().image().clone())
                }))
            }
        };
        info!(session_id = %session_id, title = %result.title, "Session saved");
        Ok(SavedScan {
            session_id,
            result,
            image,
        })
    }

    fn take_live(
        &self,
        session_id: Uuid,
        check: impl FnOnce(&LiveSession) -> Result<(), AppError>,
    ) -> Result<LiveSession, AppError> {
        let mut live = self.inner.lock_live()?;
        match live.as_ref() {
            Some(current) if current.session.session_id() == session_id => check(current)?,
            _ => return Err(AppError::UnknownSession(session_id)),
        }
        live.take().ok_or(AppError::UnknownSession(session_id))
    }
}

fn describe_notes(result: &AnalysisResult) -> String {
    result
        .specifics
        .iter()
        .filter(|(_, value)| value.as_str() != merger::UNKNOWN)
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect::<Vec<_>>()
        .join("; ")
}

pub struct SupervisorBuilder {
    configuration: Configuration,
    recognizer: Option<Arc<dyn Recognizer>>,
    market_search: Option<Arc<dyn MarketSearch>>,
    describer: Option<Arc<dyn Describer>>,
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl SupervisorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            recognizer: None,
            market_search: None,
            describer: None,
            object_store: None,
        }
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn market_search(mut self, market_search: Arc<dyn MarketSearch>) -> Self {
        self.market_search = Some(market_search);
        self
    }

    pub fn describer(mut self, describer: Arc<dyn Describer>) -> Self {
        self.describer = Some(describer);
        self
    }

    pub fn object_store(mut self, object_store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(object_store);
        self
    }

    /// Uses one scripted fixture for every collaborator.
    pub fn fixtures(self, fixtures: FixtureCollaborators) -> Self {
        let shared = Arc::new(fixtures);
        self.recognizer(shared.clone())
            .market_search(shared.clone())
            .describer(shared.clone())
            .object_store(shared)
    }

    pub fn build(self) -> Result<PipelineSupervisor, AppError> {
        self.configuration.validate()?;
        let recognizer = self
            .recognizer
            .ok_or(AppError::MissingCollaborator("recognizer"))?;
        let market_search = self
            .market_search
            .ok_or(AppError::MissingCollaborator("market search"))?;
        let describer = self
            .describer
            .ok_or(AppError::MissingCollaborator("describer"))?;
        let object_store = self
            .object_store
            .ok_or(AppError::MissingCollaborator("object store"))?;

        let configuration = self.configuration;
        let inner = SupervisorInner {
            preprocessor: Preprocessor::new(
                configuration.max_edge_px,
                configuration.jpeg_quality,
                configuration.preprocess_timeout(),
            ),
            identification: IdentificationStage::new(
                recognizer.clone(),
                configuration.identify_timeout(),
            ),
            deep_analysis: DeepAnalysisStage::new(recognizer, configuration.enrich_timeout()),
            market_research: MarketResearchStage::new(
                market_search,
                describer,
                configuration.market_timeout(),
                configuration.default_condition.clone(),
                configuration.platform.clone(),
            ),
            object_store,
            publisher: ResultPublisher::new(configuration.update_buffer_size),
            uploads: UploadTable::new(),
            live: Mutex::new(None),
            configuration,
        };
        Ok(PipelineSupervisor {
            inner: Arc::new(inner),
        })
    }
}
