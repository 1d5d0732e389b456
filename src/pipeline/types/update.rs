use crate::pipeline::types::{AnalysisResult, SessionPhase};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateCause {
    PhaseChanged,
    Provisional,
    Enriched,
    Completed,
    Watchdog,
    ManualStop,
    Failed,
}

/// A state published to the UI layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub status: &'static str,
    pub background_active: bool,
    pub cause: UpdateCause,
    pub result: Option<AnalysisResult>,
}

impl SessionUpdate {
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}
