//! Integration tests: triage decisions end-to-end into persona dispatch.
//!
//! A scripted backend plays both model tiers so the consciousness layer's
//! dispatch, fallback and synthesis behavior can be asserted without an
//! inference server.

use reverie_core::config::ModelEntry;
use reverie_core::ReverieConfig;
use reverie_memory::{AffectiveState, MemoryStore};
use reverie_mind::{
    AttentionSystem, Consciousness, Intent, MindError, Module, TierMap,
};
use reverie_model::{
    InferenceRequest, InferenceResult, ModelBackend, ModelError, ModelManager, ModelSpec,
    ResidentModel,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

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
    async fn generate(&self, request: &InferenceRequest) -> Result<InferenceResult, ModelError> {
        if let Some(delay) = self.gen_delay {
            tokio::time::sleep(delay).await;
        }
        // Echo enough of the prompt back that tests can tell responses apart.
        let tail: String = request.prompt.chars().rev().take(40).collect::<String>()
            .chars().rev().collect();
        Ok(InferenceResult {
            text: format!("[{} t={:.1}] considering {tail}", self.id, request.params.temperature),
            latency_ms: 1,
            prompt_tokens: 10,
            generated_tokens: 10,
        })
    }
}

fn two_tier_config(dir: &TempDir) -> ReverieConfig {
    let mut config = ReverieConfig::default();
    config.memory.data_dir = dir.path().to_path_buf();
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

fn consciousness_with(
    backend: ScriptedBackend,
    config: &ReverieConfig,
) -> Consciousness {
    let manager = Arc::new(ModelManager::from_config(Arc::new(backend), config));
    let tiers = TierMap::from_config(config).unwrap();
    Consciousness::new(manager, tiers, config)
}

async fn empty_context(config: &ReverieConfig) -> reverie_memory::MemoryContext {
    let store = MemoryStore::open(&config.memory).unwrap();
    store.context_for(&"s".into(), &"u".into(), "hello").await
}

// ===========================================================================
// Attention scenarios
// ===========================================================================

#[test]
fn simple_question_routes_to_analytical_only() {
    let config = ReverieConfig::default();
    let attention = AttentionSystem::from_config(&config);
    let analysis = attention.analyze("What is the capital of France?", &AffectiveState::neutral());
    assert_eq!(analysis.intent, Intent::Question);
    assert!(analysis.complexity <= 2);
    assert!(analysis.intensity < 0.6);
    assert_eq!(analysis.required_modules, vec![Module::Analytical]);
}

#[test]
fn distress_routes_to_empathetic() {
    let config = ReverieConfig::default();
    let attention = AttentionSystem::from_config(&config);
    let analysis = attention.analyze(
        "I can't take this anymore, I feel so alone",
        &AffectiveState::neutral(),
    );
    assert_eq!(analysis.intent, Intent::EmotionalSupport);
    assert!(analysis.intensity >= 0.6);
    assert_eq!(analysis.required_modules[0], Module::Empathetic);
}

#[test]
fn decisions_engage_executive_and_analytical() {
    let config = ReverieConfig::default();
    let attention = AttentionSystem::from_config(&config);
    let analysis = attention.analyze(
        "should i take the new job offer or stay where i am",
        &AffectiveState::neutral(),
    );
    assert_eq!(analysis.intent, Intent::Decision);
    assert!(analysis.required_modules.contains(&Module::Executive));
    assert!(analysis.required_modules.contains(&Module::Analytical));
}

#[test]
fn emotional_task_activates_both_facets() {
    let config = ReverieConfig::default();
    let attention = AttentionSystem::from_config(&config);
    let analysis = attention.analyze(
        "help me write a letter to my late father, i am crying as i type \
         and it never gets easier, i cannot do this anymore",
        &AffectiveState::neutral(),
    );
    assert!(analysis.required_modules.contains(&Module::Empathetic));
    assert!(analysis.required_modules.contains(&Module::Executive));
}

#[test]
fn module_cap_is_enforced() {
    let mut config = ReverieConfig::default();
    config.personas.max_active_modules = 1;
    let attention = AttentionSystem::from_config(&config);
    let analysis = attention.analyze(
        "should i choose the first or second detailed plan? compare and analyze \
         multiple steps for me please, i am extremely worried and stressed about it!",
        &AffectiveState::neutral(),
    );
    assert_eq!(analysis.required_modules.len(), 1);
}

// ===========================================================================
// Dispatch and synthesis
// ===========================================================================

#[tokio::test]
async fn single_module_response_passes_through_verbatim() {
    let dir = TempDir::new().unwrap();
    let config = two_tier_config(&dir);
    let consciousness = consciousness_with(ScriptedBackend::default(), &config);
    let attention = AttentionSystem::from_config(&config);
    let context = empty_context(&config).await;

    let analysis = attention.analyze("what is rust?", &AffectiveState::neutral());
    assert_eq!(analysis.required_modules.len(), 1);

    let outcome = consciousness.process("what is rust?", &analysis, &context).await.unwrap();
    assert!(!outcome.synthesized);
    assert!(!outcome.degraded);
    assert_eq!(outcome.responses.len(), 1);
    assert_eq!(outcome.text, outcome.responses[0].text);
}

#[tokio::test]
async fn multiple_modules_are_synthesized_on_the_primary_tier() {
    let dir = TempDir::new().unwrap();
    let config = two_tier_config(&dir);
    let consciousness = consciousness_with(ScriptedBackend::default(), &config);
    let attention = AttentionSystem::from_config(&config);
    let context = empty_context(&config).await;

    let input = "should i move abroad for work or stay near family";
    let analysis = attention.analyze(input, &AffectiveState::neutral());
    assert!(analysis.required_modules.len() >= 2);

    let outcome = consciousness.process(input, &analysis, &context).await.unwrap();
    assert!(outcome.synthesized);
    assert_eq!(outcome.responses.len(), analysis.required_modules.len());
    // Synthesis ran on the primary model.
    assert!(outcome.text.starts_with("[grande"));
}

#[tokio::test]
async fn persona_temperatures_reach_the_model() {
    let dir = TempDir::new().unwrap();
    let config = two_tier_config(&dir);
    let consciousness = consciousness_with(ScriptedBackend::default(), &config);
    let attention = AttentionSystem::from_config(&config);
    let context = empty_context(&config).await;

    let analysis = attention.analyze("what is the speed of light?", &AffectiveState::neutral());
    let outcome = consciousness
        .process("what is the speed of light?", &analysis, &context)
        .await
        .unwrap();
    // Analytical runs cold.
    assert!(outcome.responses[0].text.contains("t=0.3"));
}

#[tokio::test]
async fn broken_light_tier_falls_back_to_primary() {
    let dir = TempDir::new().unwrap();
    let config = two_tier_config(&dir);
    let backend = ScriptedBackend {
        broken: vec!["petite".to_string()],
        gen_delay: None,
    };
    let consciousness = consciousness_with(backend, &config);
    let attention = AttentionSystem::from_config(&config);
    let context = empty_context(&config).await;

    // Empathetic is served by the light tier, which cannot load.
    let analysis = attention.analyze("i feel so sad and alone", &AffectiveState::neutral());
    assert_eq!(analysis.required_modules[0], Module::Empathetic);

    let outcome = consciousness
        .process("i feel so sad and alone", &analysis, &context)
        .await
        .unwrap();
    assert!(outcome.responses.iter().any(|r| r.text.starts_with("[grande")));
}

#[tokio::test]
async fn no_loadable_model_escalates() {
    let dir = TempDir::new().unwrap();
    let config = two_tier_config(&dir);
    let backend = ScriptedBackend {
        broken: vec!["petite".to_string(), "grande".to_string()],
        gen_delay: None,
    };
    let consciousness = consciousness_with(backend, &config);
    let attention = AttentionSystem::from_config(&config);
    let context = empty_context(&config).await;

    let analysis = attention.analyze("hello there", &AffectiveState::neutral());
    let err = consciousness
        .process("hello there", &analysis, &context)
        .await
        .unwrap_err();
    assert!(matches!(err, MindError::NoUsableModel));
}

#[tokio::test]
async fn universal_timeouts_degrade_to_an_apology() {
    let dir = TempDir::new().unwrap();
    let mut config = two_tier_config(&dir);
    config.runtime.inference_deadline_ms = 20;
    let backend = ScriptedBackend {
        broken: vec![],
        gen_delay: Some(Duration::from_millis(200)),
    };
    let consciousness = consciousness_with(backend, &config);
    let attention = AttentionSystem::from_config(&config);
    let context = empty_context(&config).await;

    let analysis = attention.analyze("hello there", &AffectiveState::neutral());
    let outcome = consciousness
        .process("hello there", &analysis, &context)
        .await
        .unwrap();
    assert!(outcome.degraded);
    assert!(outcome.responses.is_empty());
    assert!(outcome.text.contains("trouble gathering my thoughts"));
}

// ===========================================================================
// Reflection
// ===========================================================================

#[tokio::test]
async fn reflection_runs_on_the_light_tier() {
    let dir = TempDir::new().unwrap();
    let config = two_tier_config(&dir);
    let consciousness = consciousness_with(ScriptedBackend::default(), &config);
    let context = empty_context(&config).await;

    let insight = consciousness.reflect(&context).await.unwrap();
    assert!(insight.starts_with("[petite"));
    assert!(insight.contains("t=0.5"));
}
