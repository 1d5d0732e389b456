mod analysis_result;
mod session;
mod update;

pub use analysis_result::{AnalysisResult, Comparable, MarketStats, PartialResult};
pub use session::{CaptureSession, SessionPhase};
pub use update::{SessionUpdate, UpdateCause};
