//! Turn orchestrator - the fixed pipeline behind every conversation turn
//!
//! Attention, memory retrieval, persona dispatch, synthesis, persistence.
//! Turns within one session run strictly in order; persistence is the
//! last synchronous step, so a reply is never shown whose records could
//! still be lost. Reflection runs in the background and never blocks a
//! reply.

use dashmap::DashMap;
use reverie_core::{ReverieConfig, SessionKey, UserId};
use reverie_memory::{MemoryMetrics, MemoryStore, TurnSignal};
use reverie_mind::{AttentionSystem, Consciousness, Intent, Module, TierMap};
use reverie_model::{
    ModelBackend, ModelId, ModelManager, ModelMetricsSnapshot, ResidencyState,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pipeline stages, in execution order. Failures and cancellations name
/// the stage they surfaced in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Attention,
    Retrieval,
    Dispatch,
    Synthesis,
    Persistence,
}

impl std::fmt::Display for TurnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TurnStage::Attention => "attention",
            TurnStage::Retrieval => "retrieval",
            TurnStage::Dispatch => "dispatch",
            TurnStage::Synthesis => "synthesis",
            TurnStage::Persistence => "persistence",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("turn cancelled during {0}")]
    Cancelled(TurnStage),

    #[error("turn failed during {stage}: {reason}")]
    Failed { stage: TurnStage, reason: String },
}

impl TurnError {
    fn failed(stage: TurnStage, reason: impl Into<String>) -> Self {
        Self::Failed {
            stage,
            reason: reason.into(),
        }
    }
}

/// What a completed turn hands back to the caller.
#[derive(Clone, Debug)]
pub struct TurnResult {
    pub text: String,
    pub intent: Intent,
    pub complexity: u8,
    pub intensity: f32,
    pub modules: Vec<Module>,
    pub synthesized: bool,
    /// True when the turn lost quality somewhere (failed personas,
    /// synthesis fallback, degraded retrieval).
    pub degraded: bool,
    /// 1-based turn ordinal within the session.
    pub turn: u64,
    pub report: TurnReport,
}

/// Per-stage latency breakdown of one turn.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct TurnReport {
    pub attention_ms: u64,
    pub retrieval_ms: u64,
    pub dispatch_ms: u64,
    pub persistence_ms: u64,
    pub total_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrchestratorStatus {
    pub resident_model: Option<String>,
    pub residency: ResidencyState,
    pub sessions: usize,
    pub model: ModelMetricsSnapshot,
    pub memory: MemoryMetrics,
}

/// Per-session bookkeeping. The mutex serializes turns of one session;
/// different sessions only contend at the model slot.
#[derive(Default)]
struct SessionState {
    turn_count: u64,
}

pub struct Orchestrator {
    manager: Arc<ModelManager>,
    memory: Arc<MemoryStore>,
    attention: AttentionSystem,
    consciousness: Arc<Consciousness>,
    sessions: DashMap<SessionKey, Arc<Mutex<SessionState>>>,
    reflection_interval: u64,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn ModelBackend>, config: &ReverieConfig) -> anyhow::Result<Self> {
        let problems = config.validate();
        if !problems.is_empty() {
            anyhow::bail!("invalid configuration: {}", problems.join("; "));
        }

        let manager = Arc::new(ModelManager::from_config(backend, config));
        let memory = Arc::new(MemoryStore::open(&config.memory)?);
        let tiers = TierMap::from_config(config)?;
        let consciousness = Arc::new(Consciousness::new(manager.clone(), tiers, config));

        Ok(Self {
            manager,
            memory,
            attention: AttentionSystem::from_config(config),
            consciousness,
            sessions: DashMap::new(),
            reflection_interval: config.runtime.reflection_interval,
        })
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn manager(&self) -> &Arc<ModelManager> {
        &self.manager
    }

    /// Run one full turn. Cancellation is honored between stages; a
    /// cancelled turn persists nothing.
    pub async fn handle_turn(
        &self,
        session: &SessionKey,
        user: &UserId,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, TurnError> {
        let state = self
            .sessions
            .entry(session.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::default())))
            .clone();
        let mut state = state.lock().await;
        let started = Instant::now();
        let mut report = TurnReport::default();

        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled(TurnStage::Attention));
        }
        let affective = self.memory.current_state(user).await;
        let analysis = self.attention.analyze(input, &affective);
        report.attention_ms = started.elapsed().as_millis() as u64;

        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled(TurnStage::Retrieval));
        }
        let stage = Instant::now();
        let context = self.memory.context_for(session, user, input).await;
        report.retrieval_ms = stage.elapsed().as_millis() as u64;

        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled(TurnStage::Dispatch));
        }
        let stage = Instant::now();
        let outcome = self
            .consciousness
            .process(input, &analysis, &context)
            .await
            .map_err(|e| TurnError::failed(TurnStage::Dispatch, e.to_string()))?;
        report.dispatch_ms = stage.elapsed().as_millis() as u64;

        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled(TurnStage::Persistence));
        }
        let stage = Instant::now();
        let signal = TurnSignal::estimate(input, &outcome.text, analysis.intensity);
        let tags = vec![format!("intent:{:?}", analysis.intent).to_lowercase()];
        let (_, record_ids) = self
            .memory
            .persist_turn(session, user, input, &outcome.text, tags, &signal)
            .await
            .map_err(|e| TurnError::failed(TurnStage::Persistence, e.to_string()))?;
        report.persistence_ms = stage.elapsed().as_millis() as u64;

        state.turn_count += 1;
        let turn = state.turn_count;
        if self.reflection_interval > 0 && turn % self.reflection_interval == 0 {
            self.spawn_reflection(session.clone(), user.clone(), record_ids.to_vec());
        }

        report.total_ms = started.elapsed().as_millis() as u64;
        info!(
            session = %session,
            turn,
            intent = ?analysis.intent,
            modules = ?analysis.required_modules,
            synthesized = outcome.synthesized,
            degraded = outcome.degraded || context.degraded_retrieval,
            latency_ms = report.total_ms,
            dispatch_ms = report.dispatch_ms,
            "turn completed"
        );

        Ok(TurnResult {
            text: outcome.text,
            intent: analysis.intent,
            complexity: analysis.complexity,
            intensity: analysis.intensity,
            modules: analysis.required_modules,
            synthesized: outcome.synthesized,
            degraded: outcome.degraded || context.degraded_retrieval,
            turn,
            report,
        })
    }

    /// Background reflection pass. Queues behind the foreground turn at
    /// the model slot; its failure only costs the insight.
    fn spawn_reflection(
        &self,
        session: SessionKey,
        user: UserId,
        prompted_by: Vec<uuid::Uuid>,
    ) {
        let consciousness = self.consciousness.clone();
        let memory = self.memory.clone();
        tokio::spawn(async move {
            let context = memory.context_for(&session, &user, "").await;
            match consciousness.reflect(&context).await {
                Ok(insight) if !insight.is_empty() => {
                    if let Err(e) = memory.store_reflection(insight, prompted_by).await {
                        warn!(session = %session, "failed to store reflection: {e}");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(session = %session, "reflection pass failed: {e}"),
            }
        });
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let (model, residency) = self.manager.resident();
        OrchestratorStatus {
            resident_model: model.as_ref().map(ModelId::to_string),
            residency,
            sessions: self.sessions.len(),
            model: self.manager.metrics(),
            memory: self.memory.metrics().await,
        }
    }

    /// Unload the resident model and stop. Pending background reflections
    /// are abandoned.
    pub async fn shutdown(&self) {
        self.manager.unload_all().await;
        info!("orchestrator shut down");
    }
}
