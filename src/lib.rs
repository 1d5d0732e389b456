pub mod collaborators;
pub mod common;
pub mod config;
pub mod error;
pub mod pipeline;

pub use crate::config::Configuration;
pub use error::{AppError, CollaboratorError};
pub use pipeline::{PipelineSupervisor, SupervisorBuilder};
