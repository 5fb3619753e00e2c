use std::path::PathBuf;

use thiserror::Error;

/// Missing pieces of a hint request, caught before any generation happens.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputError {
    #[error("no code was submitted")]
    MissingCode,

    #[error("no goal was described")]
    MissingGoal,
}

/// CodePanda error types
#[derive(Error, Debug)]
pub enum HintError {
    #[error("Model file not found at {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Unknown analysis mode: {0:?}")]
    UnknownMode(String),

    #[error("Generation runtime unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("Template invariant violated: {0}")]
    TemplateInvariant(String),

    #[error("Model returned no usable hint")]
    EmptyHint,

    #[error("Completion backend error: {0}")]
    Backend(#[from] async_openai::error::OpenAIError),

    #[error("Tokio runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification the front-ends render as distinct user-visible states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ModelMissing,
    InputIncomplete,
    EngineNotReady,
    Internal,
}

impl HintError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HintError::ModelNotFound(_) => ErrorKind::ModelMissing,
            HintError::InvalidInput(_) => ErrorKind::InputIncomplete,
            HintError::GenerationUnavailable(_) | HintError::Runtime(_) => {
                ErrorKind::EngineNotReady
            }
            HintError::UnknownMode(_)
            | HintError::TemplateInvariant(_)
            | HintError::EmptyHint
            | HintError::Backend(_)
            | HintError::Config(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show a student. Never includes internal fault details.
    pub fn user_message(&self) -> String {
        match self {
            HintError::ModelNotFound(path) => format!(
                "Model not found! Download the GGUF model and place it at {}.",
                path.display()
            ),
            HintError::InvalidInput(InputError::MissingGoal) => {
                "Please describe your goal. I need to know what you're trying to do!".to_string()
            }
            HintError::InvalidInput(InputError::MissingCode) => {
                "Please enter some code for me to analyze.".to_string()
            }
            HintError::GenerationUnavailable(_) | HintError::Runtime(_) => {
                "The AI engine isn't ready. Cannot provide a hint right now.".to_string()
            }
            HintError::EmptyHint => {
                "I couldn't come up with a hint this time. Try asking again.".to_string()
            }
            _ => "Something went wrong while preparing your hint.".to_string(),
        }
    }
}

/// Result type alias for CodePanda operations
pub type Result<T> = std::result::Result<T, HintError>;
