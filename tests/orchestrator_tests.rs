//! Integration tests: the full turn pipeline over a scripted backend.
//!
//! Each test stands up a real orchestrator with temp-dir memory and an
//! in-memory model backend, then drives whole turns through it.

use reverie::{Orchestrator, TurnError};
use reverie_core::config::ModelEntry;
use reverie_core::{ReverieConfig, SessionKey, UserId};
use reverie_mind::{Intent, Module};
use reverie_model::{
    InferenceRequest, InferenceResult, ModelBackend, ModelError, ModelSpec, ResidentModel,
    ResidencyState,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ===========================================================================
// Scripted backend and fixtures
// ===========================================================================

#[derive(Default)]
struct ScriptedBackend {
    broken: Vec<String>,
    gen_delay: Option<Duration>,
}

#[async_trait::async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn load(&self, spec: &ModelSpec) -> Result<Arc<dyn ResidentModel>, ModelError> {
        if self.broken.iter().any(|b| b == spec.id.as_str()) {
            return Err(ModelError::load_failed(spec.id.as_str(), "scripted failure"));
        }
        Ok(Arc::new(ScriptedModel {
            id: spec.id.to_string(),
            gen_delay: self.gen_delay,
        }))
    }
}

struct ScriptedModel {
    id: String,
    gen_delay: Option<Duration>,
}

#[async_trait::async_trait]
impl ResidentModel for ScriptedModel {
    async fn generate(&self, _request: &InferenceRequest) -> Result<InferenceResult, ModelError> {
        if let Some(delay) = self.gen_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(InferenceResult {
            text: format!("a thoughtful reply from {}", self.id),
            latency_ms: 1,
            prompt_tokens: 12,
            generated_tokens: 8,
        })
    }
}

fn config_in(dir: &TempDir) -> ReverieConfig {
    let mut config = ReverieConfig::default();
    config.memory.data_dir = dir.path().to_path_buf();
    config.runtime.reflection_interval = 0;
    config.models.push(ModelEntry {
        id: "petite".to_string(),
        tier: "light".to_string(),
        ..Default::default()
    });
    config.models.push(ModelEntry {
        id: "grande".to_string(),
        tier: "primary".to_string(),
        ..Default::default()
    });
    config
}

fn orchestrator_with(config: &ReverieConfig) -> Orchestrator {
    Orchestrator::new(Arc::new(ScriptedBackend::default()), config).unwrap()
}

// ===========================================================================
// Whole turns
// ===========================================================================

#[tokio::test]
async fn a_turn_produces_a_reply_and_persists_the_exchange() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let orchestrator = orchestrator_with(&config);
    let session = SessionKey::new("s1");
    let user = UserId::new("u1");

    let result = orchestrator
        .handle_turn(&session, &user, "What is the capital of France?", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.intent, Intent::Question);
    assert_eq!(result.modules, vec![Module::Analytical]);
    assert_eq!(result.turn, 1);
    assert!(result.text.contains("thoughtful reply"));

    let recent = orchestrator.memory().retrieve_recent(&session, 10).await;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].text, "What is the capital of France?");
    assert_eq!(recent[1].text, result.text);
}

#[tokio::test]
async fn turn_ordinals_are_sequential_within_a_session() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let orchestrator = orchestrator_with(&config);
    let session = SessionKey::new("s1");
    let user = UserId::new("u1");

    for expected in 1..=3u64 {
        let result = orchestrator
            .handle_turn(&session, &user, "hello again", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.turn, expected);
    }

    // A different session counts from one.
    let other = orchestrator
        .handle_turn(&SessionKey::new("s2"), &user, "hi", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(other.turn, 1);
}

#[tokio::test]
async fn affective_state_advances_with_each_turn() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let orchestrator = orchestrator_with(&config);
    let session = SessionKey::new("s1");
    let user = UserId::new("u1");

    orchestrator
        .handle_turn(&session, &user, "thank you, that was wonderful!", &CancellationToken::new())
        .await
        .unwrap();

    let state = orchestrator.memory().current_state(&user).await;
    assert_eq!(state.interaction_count, 1);
    assert!(state.dims.in_bounds());
}

#[tokio::test]
async fn cancelled_turn_persists_nothing() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let orchestrator = orchestrator_with(&config);
    let session = SessionKey::new("s1");
    let user = UserId::new("u1");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = orchestrator
        .handle_turn(&session, &user, "never mind", &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, TurnError::Cancelled(_)));

    assert!(orchestrator.memory().retrieve_recent(&session, 10).await.is_empty());
    assert_eq!(orchestrator.memory().current_state(&user).await.interaction_count, 0);
}

#[tokio::test]
async fn no_loadable_model_fails_the_turn_cleanly() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let backend = ScriptedBackend {
        broken: vec!["petite".to_string(), "grande".to_string()],
        gen_delay: None,
    };
    let orchestrator = Orchestrator::new(Arc::new(backend), &config).unwrap();
    let session = SessionKey::new("s1");
    let user = UserId::new("u1");

    let err = orchestrator
        .handle_turn(&session, &user, "hello", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TurnError::Failed { .. }));
    // The failed turn left no trace in memory.
    assert!(orchestrator.memory().retrieve_recent(&session, 10).await.is_empty());
}

#[tokio::test]
async fn timed_out_inference_still_persists_a_degraded_turn() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.runtime.inference_deadline_ms = 20;
    config.runtime.cache_ttl_ms = 0;
    let backend = ScriptedBackend {
        broken: vec![],
        gen_delay: Some(Duration::from_millis(200)),
    };
    let orchestrator = Orchestrator::new(Arc::new(backend), &config).unwrap();
    let session = SessionKey::new("s1");
    let user = UserId::new("u1");

    let result = orchestrator
        .handle_turn(&session, &user, "hello there", &CancellationToken::new())
        .await
        .unwrap();
    // No persona finished, so the reply is the apology, but the turn still
    // reached persistence.
    assert!(result.degraded);
    assert!(result.text.contains("trouble gathering my thoughts"));
    let recent = orchestrator.memory().retrieve_recent(&session, 10).await;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[1].text, result.text);
}

// ===========================================================================
// Reflection cadence
// ===========================================================================

#[tokio::test]
async fn reflection_fires_on_the_configured_interval() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.runtime.reflection_interval = 2;
    let orchestrator = orchestrator_with(&config);
    let session = SessionKey::new("s1");
    let user = UserId::new("u1");

    for _ in 0..2 {
        orchestrator
            .handle_turn(&session, &user, "tell me something", &CancellationToken::new())
            .await
            .unwrap();
    }

    // The reflection pass runs in the background.
    let mut notes = Vec::new();
    for _ in 0..50 {
        notes = orchestrator.memory().recent_reflections(5).await;
        if !notes.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(notes.len(), 1);
    assert!(!notes[0].insight.is_empty());
}

#[tokio::test]
async fn reflection_disabled_at_zero_interval() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let orchestrator = orchestrator_with(&config);
    let session = SessionKey::new("s1");
    let user = UserId::new("u1");

    for _ in 0..4 {
        orchestrator
            .handle_turn(&session, &user, "tell me something", &CancellationToken::new())
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(orchestrator.memory().recent_reflections(5).await.is_empty());
}

// ===========================================================================
// Status and shutdown
// ===========================================================================

#[tokio::test]
async fn status_reports_residency_and_counters() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let orchestrator = orchestrator_with(&config);
    let session = SessionKey::new("s1");
    let user = UserId::new("u1");

    orchestrator
        .handle_turn(&session, &user, "what is the time?", &CancellationToken::new())
        .await
        .unwrap();

    let status = orchestrator.status().await;
    assert!(status.resident_model.is_some());
    assert_eq!(status.residency, ResidencyState::Resident);
    assert_eq!(status.sessions, 1);
    assert!(status.model.inferences >= 1);
    assert_eq!(status.memory.episodic_records, 2);
}

#[tokio::test]
async fn shutdown_unloads_the_resident_model() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let orchestrator = orchestrator_with(&config);

    orchestrator
        .handle_turn(&SessionKey::new("s1"), &UserId::new("u1"), "hi", &CancellationToken::new())
        .await
        .unwrap();
    orchestrator.shutdown().await;
    assert_eq!(orchestrator.manager().resident().1, ResidencyState::Unloaded);
}

#[tokio::test]
async fn invalid_configuration_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.personas.max_active_modules = 0;
    assert!(Orchestrator::new(Arc::new(ScriptedBackend::default()), &config).is_err());
}
