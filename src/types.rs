use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{HintError, InputError, Result};
use crate::templates::TemplateStyle;

/// The student's declared code status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AnalysisMode {
    Buggy,
    Correct,
}

impl AnalysisMode {
    pub const ALL: [AnalysisMode; 2] = [AnalysisMode::Buggy, AnalysisMode::Correct];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Buggy => "Buggy",
            AnalysisMode::Correct => "Correct",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = HintError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buggy" => Ok(AnalysisMode::Buggy),
            "correct" => Ok(AnalysisMode::Correct),
            _ => Err(HintError::UnknownMode(s.to_string())),
        }
    }
}

/// Whether a request must describe its goal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GoalPolicy {
    Required,
    Optional,
}

/// One hint request from the UI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HintRequest {
    pub code: String,
    pub mode: AnalysisMode,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl HintRequest {
    pub fn new(code: impl Into<String>, mode: AnalysisMode) -> Self {
        Self {
            code: code.into(),
            mode,
            goal: None,
            error: None,
        }
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Goal text, if present and not blank
    pub fn goal_text(&self) -> Option<&str> {
        non_blank(self.goal.as_deref())
    }

    /// Error text, only consulted for buggy code
    pub fn error_text(&self) -> Option<&str> {
        match self.mode {
            AnalysisMode::Buggy => non_blank(self.error.as_deref()),
            AnalysisMode::Correct => None,
        }
    }

    /// Reject requests that must never reach the engine
    pub fn validate(&self, goal_policy: GoalPolicy) -> std::result::Result<(), InputError> {
        if self.code.trim().is_empty() {
            return Err(InputError::MissingCode);
        }
        if goal_policy == GoalPolicy::Required && self.goal_text().is_none() {
            return Err(InputError::MissingGoal);
        }
        Ok(())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// Sampling and stopping configuration for one analysis mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub stop_sequences: Vec<String>,
    pub temperature: f32,
    pub top_p: f32,
}

impl GenerationConfig {
    pub fn new(max_output_tokens: u32, temperature: f32, top_p: f32) -> Self {
        Self {
            max_output_tokens,
            stop_sequences: Vec::new(),
            temperature,
            top_p,
        }
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop_sequences.push(stop.into());
        self
    }

    pub fn with_max_output_tokens(mut self, n: u32) -> Self {
        self.max_output_tokens = n;
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn with_top_p(mut self, p: f32) -> Self {
        self.top_p = p;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_output_tokens == 0 {
            return Err(HintError::Config("max_output_tokens must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(HintError::Config(format!(
                "temperature {} outside [0, 1]",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(HintError::Config(format!("top_p {} outside [0, 1]", self.top_p)));
        }
        if self.stop_sequences.iter().any(|s| s.is_empty()) {
            return Err(HintError::Config("stop sequences must not be empty".into()));
        }
        Ok(())
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
        }
    }
}

/// Unprocessed text from the generation runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCompletion {
    pub text: String,
    pub usage: Usage,
}

impl RawCompletion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// Sanitized hint text, ready for display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Hint(String);

impl Hint {
    pub(crate) fn new(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Hint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A hint together with how it was produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintCompletion {
    pub hint: Hint,
    pub mode: AnalysisMode,
    pub usage: Usage,
    /// Wall-clock seconds
    #[serde(with = "duration_secs")]
    pub execution_time: Duration,
}

/// Configuration for the hint engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Local model artifact (GGUF) served by the completion backend
    pub model_path: PathBuf,
    /// Model name sent to the backend; defaults to the artifact's file stem
    pub model: Option<String>,
    /// Base URL of the OpenAI-compatible completion server
    pub base_url: String,
    pub api_key: Option<String>,
    pub style: TemplateStyle,
    /// Overrides the style's own goal policy
    pub goal_policy: Option<GoalPolicy>,
    pub buggy_generation: Option<GenerationConfig>,
    pub correct_generation: Option<GenerationConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("deepseek-coder-6.7b-instruct.Q4_K_S.gguf"),
            model: None,
            base_url: "http://localhost:8080/v1".to_string(),
            api_key: None,
            style: TemplateStyle::default(),
            goal_policy: None,
            buggy_generation: None,
            correct_generation: None,
        }
    }
}

impl EngineConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_style(mut self, style: TemplateStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_goal_policy(mut self, policy: GoalPolicy) -> Self {
        self.goal_policy = Some(policy);
        self
    }

    pub fn with_generation(mut self, mode: AnalysisMode, config: GenerationConfig) -> Self {
        match mode {
            AnalysisMode::Buggy => self.buggy_generation = Some(config),
            AnalysisMode::Correct => self.correct_generation = Some(config),
        }
        self
    }

    /// Effective goal policy for this configuration
    pub fn goal_policy(&self) -> GoalPolicy {
        self.goal_policy.unwrap_or_else(|| self.style.goal_policy())
    }

    /// Model name for the backend request
    pub fn model_name(&self) -> String {
        self.model.clone().unwrap_or_else(|| model_stem(&self.model_path))
    }
}

fn model_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "local-model".to_string())
}

/// Durations as fractional seconds, e.g. `0.012`
mod duration_secs {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
