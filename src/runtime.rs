//! Generation runtime seam.
//!
//! The engine only sees [`CompletionRuntime`]: a prompt and a sampling
//! config go in, raw text comes out. [`OpenAiRuntime`] talks to an
//! OpenAI-compatible completion server hosting the local GGUF model
//! (llama.cpp `llama-server`, Ollama).

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{CreateCompletionRequestArgs, Prompt, Stop},
    Client,
};
use std::time::Instant;
use tokio::runtime::Runtime;
use tracing::{debug, instrument};

use crate::error::{HintError, Result};
use crate::types::{GenerationConfig, RawCompletion, Usage};

/// Opaque text generation: prompt plus sampling config in, completion out
pub trait CompletionRuntime: Send + Sync {
    fn complete(&self, prompt: &str, config: &GenerationConfig) -> Result<RawCompletion>;
}

/// Completion runtime backed by an OpenAI-compatible `/completions` endpoint
pub struct OpenAiRuntime {
    client: Client<OpenAIConfig>,
    /// Only taken on drop
    runtime: Option<Runtime>,
    model: String,
}

impl OpenAiRuntime {
    /// Create a runtime for `model` served at `base_url`
    ///
    /// Local servers don't check keys, so a placeholder is sent when none is given.
    pub fn new(base_url: &str, api_key: Option<&str>, model: impl Into<String>) -> Result<Self> {
        let openai_config = OpenAIConfig::new()
            .with_api_base(base_url)
            .with_api_key(api_key.unwrap_or("local"));
        let client = Client::with_config(openai_config);
        let runtime = Runtime::new()?;
        Ok(Self {
            client,
            runtime: Some(runtime),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl CompletionRuntime for OpenAiRuntime {
    #[instrument(skip_all, fields(model = %self.model))]
    fn complete(&self, prompt: &str, config: &GenerationConfig) -> Result<RawCompletion> {
        let mut request_builder = CreateCompletionRequestArgs::default();
        request_builder
            .model(&self.model)
            .prompt(Prompt::String(prompt.to_string()))
            .max_tokens(config.max_output_tokens)
            .temperature(config.temperature)
            .top_p(config.top_p);

        if !config.stop_sequences.is_empty() {
            request_builder.stop(Stop::StringArray(config.stop_sequences.clone()));
        }

        let request = request_builder.build()?;

        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| HintError::GenerationUnavailable("runtime shut down".into()))?;
        let response = runtime
            .block_on(async { self.client.completions().create(request).await })
            .map_err(map_backend_error)?;

        let text = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .unwrap_or_default();

        let usage = response
            .usage
            .map(|u| Usage::new(u.prompt_tokens as u64, u.completion_tokens as u64))
            .unwrap_or_default();

        Ok(RawCompletion { text, usage })
    }
}

impl Drop for OpenAiRuntime {
    // The owner may be dropped on an async worker, where a blocking shutdown panics
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Unreachable servers mean the runtime is not ready; anything else is a backend fault
fn map_backend_error(err: OpenAIError) -> HintError {
    match err {
        OpenAIError::Reqwest(e) if e.is_connect() || e.is_timeout() => {
            HintError::GenerationUnavailable(e.to_string())
        }
        other => HintError::Backend(other),
    }
}

/// Runs prompts through the completion runtime exactly as configured
pub struct GenerationInvoker {
    runtime: Box<dyn CompletionRuntime>,
}

impl GenerationInvoker {
    pub fn new(runtime: impl CompletionRuntime + 'static) -> Self {
        Self {
            runtime: Box::new(runtime),
        }
    }

    /// Blocks until the runtime finishes; no retry, no timeout
    pub fn run(&self, prompt: &str, config: &GenerationConfig) -> Result<RawCompletion> {
        debug!(
            prompt_chars = prompt.len(),
            max_tokens = config.max_output_tokens,
            temperature = config.temperature,
            top_p = config.top_p,
            stop = ?config.stop_sequences,
            "invoking completion runtime"
        );
        let start = Instant::now();
        let raw = self.runtime.complete(prompt, config)?;
        debug!(
            elapsed = ?start.elapsed(),
            output_tokens = raw.usage.output_tokens,
            "completion finished"
        );
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion_body(text: &str) -> serde_json::Value {
        json!({
            "id": "cmpl-1",
            "object": "text_completion",
            "created": 1700000000,
            "model": "deepseek-coder",
            "choices": [
                { "text": text, "index": 0, "logprobs": null, "finish_reason": "stop" }
            ],
            "usage": { "prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49 }
        })
    }

    #[test]
    fn test_openai_runtime_sends_sampling_config() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());

        rt.block_on(
            Mock::given(method("POST"))
                .and(path("/v1/completions"))
                .and(body_partial_json(json!({
                    "model": "deepseek-coder",
                    "prompt": "PROMPT",
                    "max_tokens": 128,
                    "stop": ["</hint>", "```"]
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
                    " Which index does `n` refer to?</hint>",
                )))
                .expect(1)
                .mount(&server),
        );

        let runtime =
            OpenAiRuntime::new(&format!("{}/v1", server.uri()), None, "deepseek-coder").unwrap();
        let config = GenerationConfig::new(128, 0.1, 0.8)
            .with_stop("</hint>")
            .with_stop("```");

        let raw = runtime.complete("PROMPT", &config).unwrap();
        assert_eq!(raw.text, " Which index does `n` refer to?</hint>");
        assert_eq!(raw.usage, Usage::new(42, 7));

        rt.block_on(server.verify());
    }

    #[test]
    fn test_openai_runtime_unreachable_server() {
        let runtime = OpenAiRuntime::new("http://127.0.0.1:9/v1", None, "m").unwrap();
        let err = runtime
            .complete("PROMPT", &GenerationConfig::new(16, 0.2, 0.9))
            .unwrap_err();
        assert!(matches!(err, HintError::GenerationUnavailable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_openai_runtime_drops_on_async_worker() {
        let runtime = OpenAiRuntime::new("http://127.0.0.1:9/v1", None, "m").unwrap();
        assert_eq!(runtime.model(), "m");
        drop(runtime);
    }

    struct Echo;

    impl CompletionRuntime for Echo {
        fn complete(&self, prompt: &str, config: &GenerationConfig) -> Result<RawCompletion> {
            Ok(RawCompletion::new(format!("{}|{}", prompt, config.max_output_tokens)))
        }
    }

    #[test]
    fn test_invoker_passes_prompt_unchanged() {
        let invoker = GenerationInvoker::new(Echo);
        let raw = invoker
            .run("  keep my whitespace\n", &GenerationConfig::new(33, 0.0, 1.0))
            .unwrap();
        assert_eq!(raw.text, "  keep my whitespace\n|33");
    }
}
