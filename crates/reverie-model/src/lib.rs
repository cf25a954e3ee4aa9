//! Reverie model manager - sequential, VRAM-bound model lifecycle
//!
//! One large model fits in accelerator memory at a time. The manager owns
//! that single slot: `acquire` suspends until the requested model is the
//! resident one (evicting a different resident first), `infer` runs a
//! deadline-bounded generation, and dropping the lease releases the slot.

pub mod backend;
pub mod cache;
pub mod error;
pub mod llama;
pub mod manager;
pub mod metrics;
pub mod types;

pub use backend::{ModelBackend, ResidentModel};
pub use error::{ModelError, ModelResult};
pub use llama::LlamaServerBackend;
pub use manager::{ModelLease, ModelManager, ManagerOptions};
pub use metrics::{ModelMetrics, ModelMetricsSnapshot};
pub use types::{
    InferenceRequest, InferenceResult, ModelId, ModelSpec, ResidencyState, SamplingParams,
};
