//! Model manager error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model load failed: {model}: {reason}")]
    LoadFailed { model: String, reason: String },

    #[error("model slot busy: resident model is mid-inference")]
    Busy,

    #[error("inference timed out after {budget_ms}ms on {model}")]
    Timeout { model: String, budget_ms: u64 },

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("lease holds {lease}, request names {requested}")]
    LeaseMismatch { lease: String, requested: String },

    #[error("backend error: {0}")]
    Backend(String),
}

pub type ModelResult<T> = Result<T, ModelError>;

impl ModelError {
    pub fn load_failed(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadFailed {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Recoverable conditions downgrade turn quality; the rest escalate.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Busy)
    }
}
