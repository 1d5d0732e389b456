pub mod orchestration;
pub mod services;
pub mod types;

pub use orchestration::{PipelineSupervisor, SupervisorBuilder};
pub use types::{AnalysisResult, SessionPhase, SessionUpdate};
