//! Backend trait - the opaque inference capability
//!
//! The manager treats model internals as opaque: given a spec, a backend
//! materializes weights into accelerator memory; given a prompt and
//! parameters, a resident model produces token output with metrics.

use crate::error::ModelResult;
use crate::types::{InferenceRequest, InferenceResult, ModelSpec};
use std::sync::Arc;

#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Materialize the model described by `spec`. Called only while the
    /// manager holds the slot, after any prior resident is fully unloaded.
    async fn load(&self, spec: &ModelSpec) -> ModelResult<Arc<dyn ResidentModel>>;
}

#[async_trait::async_trait]
pub trait ResidentModel: Send + Sync {
    async fn generate(&self, request: &InferenceRequest) -> ModelResult<InferenceResult>;

    /// Release accelerator resources. Called before the manager drops its
    /// handle; implementations must be safe to call once.
    async fn shutdown(&self) {}
}
