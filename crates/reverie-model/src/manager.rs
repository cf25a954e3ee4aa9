//! Model manager - single-slot residency and deadline-bounded inference

use crate::backend::{ModelBackend, ResidentModel};
use crate::cache::ResultCache;
use crate::error::{ModelError, ModelResult};
use crate::metrics::{ModelMetrics, ModelMetricsSnapshot};
use crate::types::{InferenceRequest, InferenceResult, ModelId, ModelSpec, ResidencyState};
use reverie_core::ReverieConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct ManagerOptions {
    pub default_deadline: Duration,
    pub cache_ttl: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            default_deadline: Duration::from_secs(120),
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// The single accelerator slot. Holding the mutex means owning the slot;
/// in-flight inference holds it through its lease, so a competing acquire
/// queues instead of preempting.
#[derive(Default)]
struct Slot {
    resident: Option<ResidentEntry>,
}

struct ResidentEntry {
    id: ModelId,
    model: Arc<dyn ResidentModel>,
    vram_bytes: u64,
}

/// Non-blocking view of the slot for metadata queries.
#[derive(Clone, Debug)]
struct SlotStatus {
    model: Option<ModelId>,
    state: ResidencyState,
}

pub struct ModelManager {
    backend: Arc<dyn ModelBackend>,
    specs: HashMap<ModelId, ModelSpec>,
    slot: Arc<Mutex<Slot>>,
    status: Arc<RwLock<SlotStatus>>,
    cache: ResultCache,
    metrics: Arc<ModelMetrics>,
    options: ManagerOptions,
}

/// Exclusive access to the resident model. Dropping the lease releases the
/// slot; the model stays resident until a different one is requested.
pub struct ModelLease {
    _guard: OwnedMutexGuard<Slot>,
    id: ModelId,
    model: Arc<dyn ResidentModel>,
}

impl ModelLease {
    pub fn model_id(&self) -> &ModelId {
        &self.id
    }
}

// The guard and model handle carry no useful state to print.
impl std::fmt::Debug for ModelLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLease")
            .field("model", &self.id)
            .finish_non_exhaustive()
    }
}

impl ModelManager {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        specs: Vec<ModelSpec>,
        options: ManagerOptions,
    ) -> Self {
        let specs = specs.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self {
            backend,
            specs,
            slot: Arc::new(Mutex::new(Slot::default())),
            status: Arc::new(RwLock::new(SlotStatus {
                model: None,
                state: ResidencyState::Unloaded,
            })),
            cache: ResultCache::new(options.cache_ttl),
            metrics: Arc::new(ModelMetrics::default()),
            options,
        }
    }

    pub fn from_config(backend: Arc<dyn ModelBackend>, config: &ReverieConfig) -> Self {
        let specs = config.models.iter().map(ModelSpec::from).collect();
        let options = ManagerOptions {
            default_deadline: Duration::from_millis(config.runtime.inference_deadline_ms),
            cache_ttl: Duration::from_millis(config.runtime.cache_ttl_ms),
        };
        Self::new(backend, specs, options)
    }

    /// Which model occupies the slot, and in what lifecycle state. Never
    /// blocks on load/unload or in-flight inference.
    pub fn resident(&self) -> (Option<ModelId>, ResidencyState) {
        let status = self.status.read().expect("slot status poisoned");
        (status.model.clone(), status.state)
    }

    pub fn metrics(&self) -> ModelMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Suspend until the requested model is the resident one, evicting a
    /// different resident first. Queues behind in-flight inference.
    pub async fn acquire(&self, id: &ModelId) -> ModelResult<ModelLease> {
        let guard = self.slot.clone().lock_owned().await;
        self.ensure_resident(guard, id).await
    }

    /// Like `acquire`, but fails with `ModelError::Busy` instead of queueing
    /// when the slot is held (typically by in-flight inference).
    pub async fn try_acquire(&self, id: &ModelId) -> ModelResult<ModelLease> {
        let guard = self
            .slot
            .clone()
            .try_lock_owned()
            .map_err(|_| ModelError::Busy)?;
        self.ensure_resident(guard, id).await
    }

    /// Marks the model eligible for eviction. It stays resident until a
    /// different model is acquired.
    pub fn release(&self, lease: ModelLease) {
        debug!(model = %lease.id, "slot released");
        drop(lease);
    }

    /// Run a deadline-bounded generation on a held lease. Partial output
    /// from an expired call is discarded, never returned.
    pub async fn infer(
        &self,
        lease: &ModelLease,
        request: &InferenceRequest,
    ) -> ModelResult<InferenceResult> {
        if lease.id != request.model {
            return Err(ModelError::LeaseMismatch {
                lease: lease.id.to_string(),
                requested: request.model.to_string(),
            });
        }
        if let Some(hit) = self.cache.get(request) {
            self.metrics.record_cache_hit();
            debug!(model = %request.model, "result cache hit");
            return Ok(hit);
        }

        let deadline = request.deadline.unwrap_or(self.options.default_deadline);
        let started = Instant::now();
        match tokio::time::timeout(deadline, lease.model.generate(request)).await {
            Err(_) => {
                self.metrics.record_timeout();
                warn!(model = %request.model, budget_ms = deadline.as_millis() as u64,
                      "inference deadline expired, partial output discarded");
                Err(ModelError::Timeout {
                    model: request.model.to_string(),
                    budget_ms: deadline.as_millis() as u64,
                })
            }
            Ok(Err(e)) => Err(e),
            Ok(Ok(mut result)) => {
                result.latency_ms = started.elapsed().as_millis() as u64;
                self.metrics
                    .record_inference(result.latency_ms, result.generated_tokens);
                self.cache.insert(request, &result);
                Ok(result)
            }
        }
    }

    /// Convenience: acquire, infer, release. Checks the result cache before
    /// contending for the slot.
    pub async fn run(&self, request: &InferenceRequest) -> ModelResult<InferenceResult> {
        if let Some(hit) = self.cache.get(request) {
            self.metrics.record_cache_hit();
            debug!(model = %request.model, "result cache hit (slot untouched)");
            return Ok(hit);
        }
        let lease = self.acquire(&request.model).await?;
        let result = self.infer(&lease, request).await;
        self.release(lease);
        result
    }

    async fn ensure_resident(
        &self,
        mut guard: OwnedMutexGuard<Slot>,
        id: &ModelId,
    ) -> ModelResult<ModelLease> {
        let spec = self
            .specs
            .get(id)
            .ok_or_else(|| ModelError::UnknownModel(id.to_string()))?;

        if let Some(entry) = &guard.resident {
            if entry.id == *id {
                let model = entry.model.clone();
                return Ok(ModelLease {
                    _guard: guard,
                    id: id.clone(),
                    model,
                });
            }
            // Sequential and exclusive: the resident must be fully unloaded
            // and reclaimed before the next model loads.
            let old = guard.resident.take().expect("checked above");
            self.set_status(Some(old.id.clone()), ResidencyState::Unloading);
            info!(model = %old.id, "unloading resident model");
            old.model.shutdown().await;
            drop(old);
            self.metrics.record_unload();
            self.metrics.record_switch();
            self.set_status(None, ResidencyState::Unloaded);
        }

        self.set_status(Some(id.clone()), ResidencyState::Loading);
        info!(model = %id, vram_bytes = spec.vram_bytes, "loading model");
        let loaded = Instant::now();
        let model = match self.backend.load(spec).await {
            Ok(m) => m,
            Err(e) => {
                self.set_status(None, ResidencyState::Unloaded);
                return Err(e);
            }
        };
        self.metrics.record_load(spec.vram_bytes);
        info!(model = %id, elapsed_ms = loaded.elapsed().as_millis() as u64, "model resident");

        guard.resident = Some(ResidentEntry {
            id: id.clone(),
            model: model.clone(),
            vram_bytes: spec.vram_bytes,
        });
        self.set_status(Some(id.clone()), ResidencyState::Resident);

        Ok(ModelLease {
            _guard: guard,
            id: id.clone(),
            model,
        })
    }

    fn set_status(&self, model: Option<ModelId>, state: ResidencyState) {
        let mut status = self.status.write().expect("slot status poisoned");
        status.model = model;
        status.state = state;
    }

    /// Unload whatever is resident. Used at shutdown.
    pub async fn unload_all(&self) {
        let mut guard = self.slot.lock().await;
        if let Some(entry) = guard.resident.take() {
            self.set_status(Some(entry.id.clone()), ResidencyState::Unloading);
            info!(model = %entry.id, "unloading at shutdown");
            entry.model.shutdown().await;
            self.metrics.record_unload();
            self.set_status(None, ResidencyState::Unloaded);
        }
    }

    /// VRAM footprint of the current resident, for capacity checks.
    pub async fn resident_vram(&self) -> u64 {
        let guard = self.slot.lock().await;
        guard.resident.as_ref().map(|e| e.vram_bytes).unwrap_or(0)
    }
}
