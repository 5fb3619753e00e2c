//! # CodePanda - Socratic hint engine
//!
//! Turns a student's code, stated goal and optional error message into a
//! single pedagogically constrained hint generated by a local language model.

pub mod error;
pub mod prompts;
pub mod runtime;
pub mod sanitize;
pub mod templates;
pub mod types;

mod engine;

// Re-exports
pub use engine::HintEngine;
pub use error::{ErrorKind, HintError, InputError, Result};
pub use runtime::{CompletionRuntime, GenerationInvoker, OpenAiRuntime};
pub use templates::{
    Constraint, Delimiters, PromptTemplate, TemplateRegistry, TemplateStyle, LANGUAGE_REFUSAL,
};
pub use types::{
    AnalysisMode, EngineConfig, GenerationConfig, GoalPolicy, Hint, HintCompletion, HintRequest,
    RawCompletion, Usage,
};
