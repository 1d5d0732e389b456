pub mod deep_analysis;
pub mod identification;
pub mod market_research;
pub mod merger;
pub mod preprocessing;
pub mod publisher;
pub mod title;
pub mod uploads;

pub use deep_analysis::DeepAnalysisStage;
pub use identification::{Identification, IdentificationStage};
pub use market_research::{MarketResearch, MarketResearchStage};
pub use preprocessing::{Preprocessor, PreprocessingService};
pub use publisher::ResultPublisher;
pub use uploads::{UploadState, UploadTable};
