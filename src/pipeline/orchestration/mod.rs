pub mod deadline;
pub mod stage;
pub mod supervisor;
pub mod watchdog;

pub use stage::{PipelineStage, StageOutcome, StageReport, StageTimings};
pub use supervisor::{
    ImageReference, PipelineSupervisor, SavedScan, SessionSnapshot, SupervisorBuilder,
};
