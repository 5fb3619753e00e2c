//! Request/response bodies for the hint API

use serde::{Deserialize, Serialize};

use codepanda::HintCompletion;

/// Request body for POST /v1/hint
#[derive(Debug, Clone, Deserialize)]
pub struct HintRequestBody {
    /// The student's code
    #[serde(default)]
    pub code: String,

    /// "Buggy" or "Correct"
    pub mode: String,

    /// What the code is meant to do
    #[serde(default)]
    pub goal: Option<String>,

    /// Error message the student saw (buggy code only)
    #[serde(default)]
    pub error: Option<String>,
}

/// Response body for a generated hint
#[derive(Debug, Clone, Serialize)]
pub struct HintResponse {
    pub id: String,
    #[serde(flatten)]
    pub completion: HintCompletion,
}

/// Error details rendered to the client
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub kind: &'static str,
    pub message: String,
}

/// Response body for failures
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

impl ErrorResponse {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                kind,
                message: message.into(),
            },
        }
    }
}
