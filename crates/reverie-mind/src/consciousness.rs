//! Consciousness system - persona dispatch and response synthesis
//!
//! Runs each selected persona against the model manager, one at a time
//! (the accelerator slot is exclusive, so parallel dispatch would only
//! queue), then merges the surviving responses into a single reply.

use crate::attention::AttentionAnalysis;
use crate::persona::{ModelTier, Module, PersonaModule, PersonaTable};
use reverie_core::{ReverieConfig, Role};
use reverie_memory::MemoryContext;
use reverie_model::{InferenceRequest, ModelError, ModelId, ModelManager};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum MindError {
    #[error("no usable model: every persona invocation failed to load a model")]
    NoUsableModel,

    #[error("no {0}-tier model configured")]
    TierUnavailable(&'static str),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Which configured model serves each tier. The light tier falls back to
/// the primary model when no dedicated light model exists.
#[derive(Clone, Debug)]
pub struct TierMap {
    pub light: ModelId,
    pub primary: ModelId,
}

impl TierMap {
    pub fn from_config(config: &ReverieConfig) -> Result<Self, MindError> {
        let primary = config
            .tier_model("primary")
            .ok_or(MindError::TierUnavailable("primary"))?;
        let light = config.tier_model("light").unwrap_or(primary);
        Ok(Self {
            light: ModelId::new(&light.id),
            primary: ModelId::new(&primary.id),
        })
    }

    pub fn model_for(&self, tier: ModelTier) -> &ModelId {
        match tier {
            ModelTier::Light => &self.light,
            ModelTier::Primary => &self.primary,
        }
    }

    /// The other tier's model, for cross-tier fallback after a load
    /// failure. `None` when both tiers map to the same model.
    fn alternate(&self, tier: ModelTier) -> Option<&ModelId> {
        let (own, other) = match tier {
            ModelTier::Light => (&self.light, &self.primary),
            ModelTier::Primary => (&self.primary, &self.light),
        };
        (own != other).then_some(other)
    }
}

/// One persona's contribution to a turn.
#[derive(Clone, Debug)]
pub struct PersonaResponse {
    pub module: Module,
    pub text: String,
    /// Confidence heuristic in 0.1..=1.0.
    pub weight: f32,
    pub model: ModelId,
    pub latency_ms: u64,
}

#[derive(Clone, Debug)]
pub struct SynthesisOutcome {
    pub text: String,
    pub responses: Vec<PersonaResponse>,
    /// True when a synthesis pass produced the text, false when a single
    /// response (or a fallback) passed through verbatim.
    pub synthesized: bool,
    /// True when the turn lost something: personas failed, or synthesis
    /// fell back to the strongest single response.
    pub degraded: bool,
}

const APOLOGY: &str = "I'm sorry - I'm having trouble gathering my thoughts \
right now. Could you say that again?";

pub struct Consciousness {
    manager: Arc<ModelManager>,
    table: PersonaTable,
    tiers: TierMap,
    precedence: Vec<Module>,
    persona_max_tokens: u32,
    synthesis_max_tokens: u32,
}

impl Consciousness {
    pub fn new(
        manager: Arc<ModelManager>,
        tiers: TierMap,
        config: &ReverieConfig,
    ) -> Self {
        Self {
            manager,
            table: PersonaTable::default(),
            tiers,
            precedence: crate::persona::parse_precedence(&config.personas.precedence),
            persona_max_tokens: config.runtime.persona_max_tokens,
            synthesis_max_tokens: config.runtime.synthesis_max_tokens,
        }
    }

    /// Dispatch the selected personas and merge their responses. Individual
    /// persona failures degrade the outcome; only a total inability to load
    /// any model escalates.
    pub async fn process(
        &self,
        input: &str,
        analysis: &AttentionAnalysis,
        memory: &MemoryContext,
    ) -> Result<SynthesisOutcome, MindError> {
        let shared = shared_context(input, memory);

        let mut responses: Vec<PersonaResponse> = Vec::new();
        let mut load_failures = 0usize;
        for module in &analysis.required_modules {
            let persona = self.table.get(*module);
            match self.invoke(persona, &shared).await {
                Ok(response) => responses.push(response),
                Err(e) => {
                    if matches!(e, ModelError::LoadFailed { .. } | ModelError::UnknownModel(_)) {
                        load_failures += 1;
                    }
                    warn!(module = %module, error = %e, "persona invocation failed");
                }
            }
        }

        if responses.is_empty() {
            if load_failures == analysis.required_modules.len() && load_failures > 0 {
                return Err(MindError::NoUsableModel);
            }
            // Some personas ran but produced nothing usable (timeouts,
            // contention). Answer honestly rather than stay silent.
            return Ok(SynthesisOutcome {
                text: APOLOGY.to_string(),
                responses,
                synthesized: false,
                degraded: true,
            });
        }

        if responses.len() == 1 {
            let text = responses[0].text.clone();
            let degraded = analysis.required_modules.len() > 1;
            return Ok(SynthesisOutcome {
                text,
                responses,
                synthesized: false,
                degraded,
            });
        }

        let degraded_dispatch = responses.len() < analysis.required_modules.len();
        self.order_by_precedence(&mut responses);
        match self.synthesize(input, &responses).await {
            Ok(text) => Ok(SynthesisOutcome {
                text,
                responses,
                synthesized: true,
                degraded: degraded_dispatch,
            }),
            Err(e) => {
                warn!(error = %e, "synthesis failed, falling back to strongest response");
                let best = strongest(&responses);
                Ok(SynthesisOutcome {
                    text: best.text.clone(),
                    responses,
                    synthesized: false,
                    degraded: true,
                })
            }
        }
    }

    /// Distill an insight from the recent transcript on the light tier.
    pub async fn reflect(&self, memory: &MemoryContext) -> Result<String, MindError> {
        let persona = self.table.get(Module::Reflective);
        let mut prompt = String::new();
        prompt.push_str(persona.system_prompt);
        prompt.push_str("\n\nRecent conversation:\n");
        push_transcript(&mut prompt, memory);
        prompt.push_str("\nInsight:");

        let request = InferenceRequest::new(self.tiers.model_for(persona.tier).clone(), prompt)
            .with_temperature(persona.temperature)
            .with_max_tokens(self.persona_max_tokens);
        let result = self.manager.run(&request).await?;
        info!(latency_ms = result.latency_ms, "reflection pass completed");
        Ok(result.text.trim().to_string())
    }

    async fn invoke(
        &self,
        persona: &PersonaModule,
        shared: &str,
    ) -> Result<PersonaResponse, ModelError> {
        let prompt = format!("{}\n\n{shared}\nResponse:", persona.system_prompt);
        let mut model = self.tiers.model_for(persona.tier).clone();
        let request = InferenceRequest::new(model.clone(), prompt.clone())
            .with_temperature(persona.temperature)
            .with_max_tokens(self.persona_max_tokens);

        let result = match self.manager.run(&request).await {
            Ok(r) => r,
            Err(ModelError::LoadFailed { model: failed, reason }) => {
                let Some(other) = self.tiers.alternate(persona.tier) else {
                    return Err(ModelError::LoadFailed { model: failed, reason });
                };
                warn!(module = %persona.module, failed = %failed, fallback = %other,
                      "persona model failed to load, retrying on the other tier");
                model = other.clone();
                let retry = InferenceRequest::new(model.clone(), prompt)
                    .with_temperature(persona.temperature)
                    .with_max_tokens(self.persona_max_tokens);
                self.manager.run(&retry).await?
            }
            Err(e) => return Err(e),
        };

        let text = result.text.trim().to_string();
        let weight = response_weight(&text);
        debug!(module = %persona.module, model = %model, weight,
               latency_ms = result.latency_ms, "persona responded");
        Ok(PersonaResponse {
            module: persona.module,
            text,
            weight,
            model,
            latency_ms: result.latency_ms,
        })
    }

    async fn synthesize(
        &self,
        input: &str,
        responses: &[PersonaResponse],
    ) -> Result<String, ModelError> {
        let mut prompt = String::from(
            "You are Reverie. Several facets of your mind drafted answers to the \
             same message. Merge them into one coherent reply in your own voice. \
             Where drafts conflict, earlier drafts take precedence. Do not mention \
             the drafts or facets.\n\n",
        );
        prompt.push_str(&format!("Message: {input}\n\n"));
        for response in responses {
            prompt.push_str(&format!(
                "Draft ({}, confidence {:.1}):\n{}\n\n",
                response.module, response.weight, response.text
            ));
        }
        prompt.push_str("Reply:");

        let request = InferenceRequest::new(self.tiers.primary.clone(), prompt)
            .with_temperature(0.6)
            .with_max_tokens(self.synthesis_max_tokens);
        let result = self.manager.run(&request).await?;
        Ok(result.text.trim().to_string())
    }

    fn order_by_precedence(&self, responses: &mut [PersonaResponse]) {
        let rank = |m: Module| {
            self.precedence
                .iter()
                .position(|p| *p == m)
                .unwrap_or(usize::MAX)
        };
        responses.sort_by_key(|r| rank(r.module));
    }
}

/// Highest weight wins; earlier position (precedence order) breaks ties.
fn strongest(responses: &[PersonaResponse]) -> &PersonaResponse {
    let mut best = &responses[0];
    for r in &responses[1..] {
        if r.weight > best.weight {
            best = r;
        }
    }
    best
}

/// Crude confidence signal from surface features of the text. Kept simple
/// on purpose: it only has to break ties among sibling drafts.
fn response_weight(text: &str) -> f32 {
    let mut weight = 0.5f32;
    let words: Vec<&str> = text.split_whitespace().collect();

    if (20..=200).contains(&words.len()) {
        weight += 0.2;
    }
    if words.len() < 5 {
        weight -= 0.3;
    }
    if text.contains("\n-") || text.contains("\n1.") || text.contains(": ") {
        weight += 0.1;
    }
    if !words.is_empty() {
        let unique: std::collections::HashSet<&str> = words.iter().copied().collect();
        if unique.len() as f32 / words.len() as f32 > 0.7 {
            weight += 0.1;
        }
    }
    weight.clamp(0.1, 1.0)
}

fn shared_context(input: &str, memory: &MemoryContext) -> String {
    let mut ctx = String::new();

    if !memory.similar.is_empty() {
        ctx.push_str("Things you remember that may be relevant:\n");
        for record in &memory.similar {
            ctx.push_str(&format!("- {}\n", record.text));
        }
        ctx.push('\n');
    }

    ctx.push_str(&format!(
        "Relationship: quality {:.2}, trust {:.2}. Current read of the user: \
         joy {:.2}, sadness {:.2}, anger {:.2}, fear {:.2}, trust {:.2}.\n\n",
        memory.relationship.quality,
        memory.relationship.trust,
        memory.affective.dims.joy,
        memory.affective.dims.sadness,
        memory.affective.dims.anger,
        memory.affective.dims.fear,
        memory.affective.dims.trust,
    ));

    if !memory.recent.is_empty() {
        ctx.push_str("Conversation so far:\n");
        push_transcript(&mut ctx, memory);
        ctx.push('\n');
    }

    ctx.push_str(&format!("User: {input}\n"));
    ctx
}

fn push_transcript(out: &mut String, memory: &MemoryContext) {
    for record in &memory.recent {
        let speaker = match record.role {
            Role::User => "User",
            Role::Agent => "Reverie",
        };
        out.push_str(&format!("{speaker}: {}\n", record.text));
    }
}
