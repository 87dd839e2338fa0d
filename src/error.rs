//! Error type for the synthesis core.
//!
//! Only [`SynthesisError::ModelUnavailable`] and [`SynthesisError::NoArticles`]
//! ever escape the orchestrator. Every other variant describes a single failed
//! unit of work (one call, one parse) that is retried or downgraded.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("model call failed: {0}")]
    Model(String),

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("could not parse model output: {0}")]
    Parse(String),

    #[error("model unavailable after {attempts} attempts: {last_error}")]
    ModelUnavailable { attempts: usize, last_error: String },

    #[error("no articles collected; nothing to synthesize")]
    NoArticles,
}

impl From<serde_json::Error> for SynthesisError {
    fn from(e: serde_json::Error) -> Self {
        SynthesisError::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SynthesisError>;
