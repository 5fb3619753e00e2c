use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{HintError, Result};
use crate::prompts::render;
use crate::runtime::{CompletionRuntime, GenerationInvoker, OpenAiRuntime};
use crate::sanitize::clean;
use crate::templates::{TemplateRegistry, TemplateStyle};
use crate::types::{AnalysisMode, EngineConfig, GoalPolicy, Hint, HintCompletion, HintRequest};

/// Check that the model artifact exists before anything else is built
fn locate_model(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(HintError::ModelNotFound(path.to_path_buf()))
    }
}

/// Hint policy engine: lookup, render, run, clean
///
/// Built once at startup and shared by reference; holds no per-request state.
pub struct HintEngine {
    registry: TemplateRegistry,
    invoker: GenerationInvoker,
}

impl HintEngine {
    /// Create an engine for the local model at `config.model_path`
    pub fn new(config: EngineConfig) -> Result<Self> {
        locate_model(&config.model_path)?;

        let runtime = OpenAiRuntime::new(
            &config.base_url,
            config.api_key.as_deref(),
            config.model_name(),
        )?;
        info!(
            model_path = %config.model_path.display(),
            model = runtime.model(),
            base_url = %config.base_url,
            style = %config.style,
            "hint engine ready"
        );
        Self::with_runtime(config, runtime)
    }

    /// Create an engine around an already-initialized runtime
    pub fn with_runtime(config: EngineConfig, runtime: impl CompletionRuntime + 'static) -> Result<Self> {
        let mut registry = TemplateRegistry::new(config.style)?.with_goal_policy(config.goal_policy());
        if let Some(generation) = config.buggy_generation {
            registry = registry.with_generation(AnalysisMode::Buggy, generation)?;
        }
        if let Some(generation) = config.correct_generation {
            registry = registry.with_generation(AnalysisMode::Correct, generation)?;
        }

        Ok(Self {
            registry,
            invoker: GenerationInvoker::new(runtime),
        })
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn style(&self) -> TemplateStyle {
        self.registry.style()
    }

    /// Whether a request in `mode` must state a goal
    pub fn goal_policy(&self, mode: AnalysisMode) -> GoalPolicy {
        self.registry.lookup(mode).goal_policy
    }

    /// Reject incomplete input before anything reaches the model
    pub fn validate(&self, request: &HintRequest) -> Result<()> {
        request.validate(self.goal_policy(request.mode))?;
        Ok(())
    }

    /// Produce one sanitized hint for the request
    pub fn generate_hint(&self, request: &HintRequest) -> Result<Hint> {
        self.complete(request).map(|c| c.hint)
    }

    /// Produce a hint along with usage and timing
    #[instrument(skip_all, fields(mode = %request.mode, style = %self.style()))]
    pub fn complete(&self, request: &HintRequest) -> Result<HintCompletion> {
        let start = Instant::now();
        self.validate(request)?;

        let template = self.registry.lookup(request.mode);
        let prompt = render(template, request);
        debug!(prompt_chars = prompt.len(), "prompt assembled");

        let raw = self.invoker.run(&prompt, &template.generation)?;
        let hint = clean(&raw, template);

        if hint.as_str().is_empty() {
            warn!(raw_chars = raw.text.len(), "completion sanitized to nothing");
            return Err(HintError::EmptyHint);
        }

        let execution_time = start.elapsed();
        info!(
            elapsed = ?execution_time,
            output_tokens = raw.usage.output_tokens,
            "hint generated"
        );

        Ok(HintCompletion {
            hint,
            mode: request.mode,
            usage: raw.usage,
            execution_time,
        })
    }
}
