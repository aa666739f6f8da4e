//! Text Generation Collaborator
//!
//! The engine treats prose generation as a pure, possibly-failing function
//! from a (system prompt, user prompt) pair to text. Failures are never fatal:
//! each call site pairs the outcome with a pre-baked default through
//! [`BestEffort`].

use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use tracing::warn;

/// Defines the contract for any backend that turns a prompt into prose.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Makes a single, non-streaming completion call.
    ///
    /// Implementations must not keep state between calls; callers never
    /// assume two calls with the same prompts return the same text.
    async fn generate(&self, system_prompt: String, user_prompt: String) -> Result<String>;
}

/// An implementation of `TextGenerator` for any OpenAI-compatible API.
pub struct OpenAICompatibleGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleGenerator {
    /// Creates a new generator.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL of the provider.
    /// * `model` - Model identifier used for every completion.
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAICompatibleGenerator {
    async fn generate(&self, system_prompt: String, user_prompt: String) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(0.7)
            .max_completion_tokens(400u32)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user_prompt)
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;

        let answer = response
            .choices
            .first()
            .context("No response choice from LLM")?
            .message
            .content
            .as_deref()
            .context("No content in LLM response")?
            .trim();

        if answer.is_empty() {
            anyhow::bail!("LLM returned an empty completion");
        }
        Ok(answer.to_string())
    }
}

/// The failure side of a best-effort generation: the default to use instead,
/// plus what went wrong.
#[derive(Debug)]
pub struct Fallback<T> {
    pub value: T,
    pub cause: anyhow::Error,
}

/// A generation outcome whose failure path still carries a usable value.
pub type BestEffort<T> = Result<T, Fallback<T>>;

/// Converts a plain generation result into a [`BestEffort`] outcome.
pub trait OrFallback<T> {
    fn or_fallback(self, default: impl FnOnce() -> T) -> BestEffort<T>;
}

impl<T> OrFallback<T> for Result<T> {
    fn or_fallback(self, default: impl FnOnce() -> T) -> BestEffort<T> {
        self.map_err(|cause| Fallback {
            value: default(),
            cause,
        })
    }
}

/// Collapses a best-effort outcome into its value, logging the fallback.
pub fn settle<T>(outcome: BestEffort<T>, what: &str) -> T {
    match outcome {
        Ok(value) => value,
        Err(Fallback { value, cause }) => {
            warn!(error = %format!("{cause:#}"), "Generation of {what} failed, using fallback");
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_fallback_keeps_success() {
        let outcome: BestEffort<String> =
            Ok::<_, anyhow::Error>("fresh".to_string()).or_fallback(|| "canned".to_string());
        assert_eq!(outcome.unwrap(), "fresh");
    }

    #[test]
    fn test_or_fallback_carries_default_and_cause() {
        let outcome: BestEffort<String> = Err::<String, _>(anyhow::anyhow!("rate limited"))
            .or_fallback(|| "canned".to_string());
        let fallback = outcome.unwrap_err();
        assert_eq!(fallback.value, "canned");
        assert_eq!(fallback.cause.to_string(), "rate limited");
    }

    #[test]
    fn test_settle_returns_fallback_value() {
        let outcome: BestEffort<u8> = Err(Fallback {
            value: 3,
            cause: anyhow::anyhow!("offline"),
        });
        assert_eq!(settle(outcome, "grade"), 3);
    }

    #[tokio::test]
    async fn test_mock_generator_round_trip() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|system, _| system == "sys")
            .returning(|_, user| Ok(format!("echo: {user}")));

        let text = generator
            .generate("sys".to_string(), "hello".to_string())
            .await
            .unwrap();
        assert_eq!(text, "echo: hello");
    }
}
