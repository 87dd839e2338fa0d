//! Generative model interaction with exponential backoff between attempts.
//!
//! This module provides the seam between the synthesis core and whichever
//! text-completion service produces the stories.
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`GenerativeModel`]: Core trait defining async prompt completion
//! - [`GeminiModel`]: REST client for the Gemini `generateContent` endpoint
//! - [`AwfulAjModel`]: OpenAI-compatible endpoint through the `awful_aj` library
//! - [`ModelBackend`]: Static dispatch over the configured backend
//! - [`Backoff`]: Delay policy applied by the orchestrator between attempts
//!
//! # Retry Strategy
//!
//! Retries themselves are owned by the orchestrator (the attempt budget is
//! part of the synthesis semantics). [`Backoff`] only computes how long to
//! wait before the next attempt:
//! - Exponential backoff starting at the configured base delay
//! - Maximum delay capped at the configured ceiling
//! - Random jitter (0-250ms) added to prevent thundering herd

mod awful;
mod gemini;

pub use awful::AwfulAjModel;
pub use gemini::GeminiModel;

use crate::config::GenerationParams;
use rand::{Rng, rng};
use std::error::Error;
use std::time::Duration as StdDuration;

/// Trait for async prompt completion.
///
/// Implementors send a prompt to a model and return the generated text. The
/// text is *intended* to be JSON but callers must not rely on it being
/// well-formed or complete.
pub trait GenerativeModel {
    /// Identifier recorded in the document metadata.
    fn name(&self) -> &str;

    /// Send `prompt` with the given sampling parameters.
    ///
    /// # Returns
    ///
    /// The generated text, or an error if the request failed.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, Box<dyn Error>>;
}

/// The configured model backend.
#[derive(Debug)]
pub enum ModelBackend {
    Gemini(GeminiModel),
    AwfulAj(AwfulAjModel),
}

impl GenerativeModel for ModelBackend {
    fn name(&self) -> &str {
        match self {
            ModelBackend::Gemini(m) => m.name(),
            ModelBackend::AwfulAj(m) => m.name(),
        }
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, Box<dyn Error>> {
        match self {
            ModelBackend::Gemini(m) => m.generate(prompt, params).await,
            ModelBackend::AwfulAj(m) => m.generate(prompt, params).await,
        }
    }
}

/// Exponential backoff with jitter.
///
/// The delay before retry number `attempt` (1-based) follows:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
/// A zero base delay disables waiting entirely, jitter included.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// Initial delay between attempts (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl Backoff {
    pub fn new(base_delay: StdDuration, max_delay: StdDuration) -> Self {
        Self { base_delay, max_delay }
    }

    /// Delay without jitter before retry number `attempt`.
    pub fn base_delay_for(&self, attempt: usize) -> StdDuration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift);
        delay.min(self.max_delay)
    }

    /// Delay with jitter before retry number `attempt`.
    pub fn delay_for(&self, attempt: usize) -> StdDuration {
        if self.base_delay.is_zero() {
            return StdDuration::ZERO;
        }
        let jitter_ms: u64 = rng().random_range(0..=250);
        self.base_delay_for(attempt) + StdDuration::from_millis(jitter_ms)
    }

    /// Sleep for [`Backoff::delay_for`] `attempt`.
    pub async fn wait(&self, attempt: usize) {
        let delay = self.delay_for(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
