//! Text generation backend abstraction.
//!
//! Activities ask a [`TextGenerator`] for short coaching text. The only
//! backend shipped is [`StaticTextGenerator`], which answers from a fixed
//! table so runs stay deterministic without a model behind them.

use crate::error::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A request for generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The rendered prompt.
    pub prompt: String,
    /// System prompt, if any.
    pub system: Option<String>,
    /// Name of the template the prompt was rendered from.
    pub template: Option<String>,
}

impl GenerationRequest {
    /// Creates a new request with just a prompt.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            template: None,
        }
    }

    /// Adds a system prompt.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Records the template the prompt came from.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

/// Trait for text generation backends.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for the given request.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot produce text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Returns the model name.
    fn model(&self) -> &str;
}

/// Generator that answers from a fixed table keyed by template name.
#[derive(Debug, Default)]
pub struct StaticTextGenerator {
    responses: HashMap<String, String>,
    fallback: String,
    failure: Option<GenerationError>,
    calls: AtomicUsize,
}

impl StaticTextGenerator {
    /// Creates a generator that returns `fallback` for every request.
    #[must_use]
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            responses: HashMap::new(),
            fallback: fallback.into(),
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Creates a generator preloaded with answers for the standard prompts.
    #[must_use]
    pub fn sample() -> Self {
        Self::new("Keep going, one block at a time.")
            .with_response(
                crate::prompt::DAY_PLAN_TIPS,
                "Start with the hardest task while energy is fresh. \
                 Take a short walk between blocks. Close the day by writing tomorrow's first step.",
            )
            .with_response(
                crate::prompt::DAILY_SUMMARY,
                "You made steady progress today and stayed honest about what got in the way. \
                 Carry one win into tomorrow and keep the first block protected.",
            )
            .with_response(
                crate::prompt::MICRO_GOALS,
                "Small, specific goals keep momentum without adding pressure.",
            )
    }

    /// Creates a generator whose every call fails with `error`.
    #[must_use]
    pub fn failing(error: GenerationError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Sets the answer for a template.
    #[must_use]
    pub fn with_response(mut self, template: impl Into<String>, text: impl Into<String>) -> Self {
        self.responses.insert(template.into(), text.into());
        self
    }

    /// Returns how many times `generate` was called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for StaticTextGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.failure {
            tracing::debug!(template = ?request.template, %error, "static generator failing");
            return Err(error.clone());
        }
        if request.prompt.trim().is_empty() {
            return Err(GenerationError::InvalidRequest {
                reason: "prompt is empty".to_string(),
            });
        }

        let text = request
            .template
            .as_deref()
            .and_then(|name| self.responses.get(name))
            .unwrap_or(&self.fallback);
        Ok(text.clone())
    }

    fn model(&self) -> &str {
        "static"
    }
}
