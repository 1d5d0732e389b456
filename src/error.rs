use crate::pipeline::types::SessionPhase;
use thiserror::Error;
use uuid::Uuid;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Fixture error: {0}")]
    Fixture(#[from] serde_json::Error),
    #[error("Pipeline error: {0}")]
    Pipeline(String),
    #[error("No live session with id {0}")]
    UnknownSession(Uuid),
    #[error("Invalid phase transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionPhase, to: SessionPhase },
    #[error("Session {0} already has a processed image")]
    AlreadyProcessed(Uuid),
    #[error("Identification produced no usable title for session {0}")]
    Unrecoverable(Uuid),
    #[error("Session {0} is not complete yet")]
    NotComplete(Uuid),
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

// External collaborator error type. Never crosses a stage boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
