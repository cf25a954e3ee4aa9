//! Model identifiers, specs and inference value types

use reverie_core::config::ModelEntry;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Model identifier - cheaply cloneable
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ModelId(Arc<str>);

impl ModelId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Residency lifecycle of a model in the single accelerator slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidencyState {
    Unloaded,
    Loading,
    Resident,
    Unloading,
}

/// Static description of one model, from configuration.
#[derive(Clone, Debug)]
pub struct ModelSpec {
    pub id: ModelId,
    pub path: PathBuf,
    pub vram_bytes: u64,
    pub context_window: u32,
    pub port: u16,
    pub defaults: SamplingParams,
}

impl From<&ModelEntry> for ModelSpec {
    fn from(e: &ModelEntry) -> Self {
        Self {
            id: ModelId::new(&e.id),
            path: e.path.clone(),
            vram_bytes: e.vram_bytes,
            context_window: e.context_window,
            port: e.port,
            defaults: SamplingParams {
                temperature: e.temperature,
                top_p: e.top_p,
                top_k: e.top_k,
            },
        }
    }
}

/// Generation parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
        }
    }
}

/// Immutable inference request.
#[derive(Clone, Debug)]
pub struct InferenceRequest {
    pub model: ModelId,
    pub prompt: String,
    pub params: SamplingParams,
    pub max_tokens: u32,
    /// Wall-clock budget override; the manager default applies when `None`.
    pub deadline: Option<Duration>,
}

impl InferenceRequest {
    pub fn new(model: ModelId, prompt: impl Into<String>) -> Self {
        Self {
            model,
            prompt: prompt.into(),
            params: SamplingParams::default(),
            max_tokens: 512,
            deadline: None,
        }
    }

    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.params.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Immutable inference result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InferenceResult {
    pub text: String,
    pub latency_ms: u64,
    pub prompt_tokens: u32,
    pub generated_tokens: u32,
}
