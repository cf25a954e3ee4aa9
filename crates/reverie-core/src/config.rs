//! Reverie configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists. Treated as immutable
//! for the process lifetime once loaded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Known cognitive module names, in default synthesis precedence order.
pub const MODULE_NAMES: [&str; 5] = [
    "empathetic",
    "executive",
    "analytical",
    "creative",
    "reflective",
];

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverieConfig {
    /// Models available to the manager. Exactly one is resident at a time.
    pub models: Vec<ModelEntry>,
    /// Persona tuning and synthesis precedence.
    pub personas: PersonaSettings,
    /// Memory paths and retrieval parameters.
    pub memory: MemorySettings,
    /// Attention thresholds.
    pub attention: AttentionSettings,
    /// Runtime budgets (deadlines, cache, reflection cadence).
    pub runtime: RuntimeSettings,
}

/// One model known to the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelEntry {
    /// Stable identifier, referenced by tier mappings.
    pub id: String,
    /// Path to the weights file (GGUF).
    pub path: PathBuf,
    /// Estimated VRAM footprint in bytes, used for the high-water counter.
    pub vram_bytes: u64,
    /// Context window in tokens.
    pub context_window: u32,
    /// Port the local inference server listens on once loaded.
    pub port: u16,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    /// "light" or "primary". The light tier serves fast/simple modules,
    /// the primary tier serves complex reasoning and synthesis.
    pub tier: String,
}

impl Default for ModelEntry {
    fn default() -> Self {
        Self {
            id: String::new(),
            path: PathBuf::new(),
            vram_bytes: 0,
            context_window: 4096,
            port: 8080,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            tier: "primary".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaSettings {
    /// Synthesis conflict precedence, highest first. Configurable because
    /// the ordering is a design default, not a confirmed requirement.
    pub precedence: Vec<String>,
    /// At most this many modules activate for one turn.
    pub max_active_modules: usize,
}

impl Default for PersonaSettings {
    fn default() -> Self {
        Self {
            precedence: MODULE_NAMES.iter().map(|s| s.to_string()).collect(),
            max_active_modules: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Directory holding the episodic log, affective records and reflections.
    pub data_dir: PathBuf,
    /// How many similar records a retrieval returns.
    pub retrieval_k: usize,
    /// How many recent utterances feed each persona prompt.
    pub recent_window: usize,
    /// Embedding dimensionality for the similarity index.
    pub embedding_dim: usize,
    /// EMA blend factor for affective updates (0..1, weight of the new signal).
    pub affective_blend: f32,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            retrieval_k: 5,
            recent_window: 6,
            embedding_dim: 128,
            affective_blend: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionSettings {
    /// Complexity at or above this adds the analytical module.
    pub complexity_threshold: u8,
    /// Emotional intensity at or above this adds the empathetic module.
    pub intensity_threshold: f32,
    /// How strongly carried-over distress raises the intensity floor.
    pub carry_over: f32,
}

impl Default for AttentionSettings {
    fn default() -> Self {
        Self {
            complexity_threshold: 4,
            intensity_threshold: 0.6,
            carry_over: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Wall-clock budget for a single inference call, in milliseconds.
    pub inference_deadline_ms: u64,
    /// Result cache entries older than this are ignored.
    pub cache_ttl_ms: u64,
    /// Run the background reflection pass every N turns. 0 disables it.
    pub reflection_interval: u64,
    /// Max tokens for persona invocations.
    pub persona_max_tokens: u32,
    /// Max tokens for the synthesis invocation.
    pub synthesis_max_tokens: u32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            inference_deadline_ms: 120_000,
            cache_ttl_ms: 60_000,
            reflection_interval: 5,
            persona_max_tokens: 512,
            synthesis_max_tokens: 640,
        }
    }
}

impl Default for ReverieConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            personas: PersonaSettings::default(),
            memory: MemorySettings::default(),
            attention: AttentionSettings::default(),
            runtime: RuntimeSettings::default(),
        }
    }
}

impl ReverieConfig {
    /// Load from a TOML file, falling back to defaults when absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::config(format!("{}: {e}", path.display())))
    }

    /// Returns human-readable problems. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let mut seen = std::collections::HashSet::new();
        for m in &self.models {
            if m.id.is_empty() {
                problems.push("model with empty id".to_string());
            }
            if !seen.insert(m.id.as_str()) {
                problems.push(format!("duplicate model id: {}", m.id));
            }
            if m.tier != "light" && m.tier != "primary" {
                problems.push(format!("model {}: unknown tier {:?}", m.id, m.tier));
            }
        }
        if !self.models.iter().any(|m| m.tier == "primary") && !self.models.is_empty() {
            problems.push("no primary-tier model configured".to_string());
        }

        for name in &self.personas.precedence {
            if !MODULE_NAMES.contains(&name.as_str()) {
                problems.push(format!("precedence names unknown module: {name}"));
            }
        }
        if self.personas.max_active_modules == 0 {
            problems.push("max_active_modules must be at least 1".to_string());
        }

        if !(0.0..=1.0).contains(&self.memory.affective_blend) {
            problems.push("affective_blend must be within 0..=1".to_string());
        }
        if self.memory.embedding_dim == 0 {
            problems.push("embedding_dim must be nonzero".to_string());
        }
        if !(1..=5).contains(&self.attention.complexity_threshold) {
            problems.push("complexity_threshold must be within 1..=5".to_string());
        }

        problems
    }

    pub fn model(&self, id: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.id == id)
    }

    /// First model of the given tier, if any.
    pub fn tier_model(&self, tier: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.tier == tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = ReverieConfig::default();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn duplicate_model_ids_flagged() {
        let mut cfg = ReverieConfig::default();
        cfg.models.push(ModelEntry {
            id: "m".to_string(),
            ..Default::default()
        });
        cfg.models.push(ModelEntry {
            id: "m".to_string(),
            ..Default::default()
        });
        assert!(cfg.validate().iter().any(|p| p.contains("duplicate")));
    }

    #[test]
    fn unknown_precedence_module_flagged() {
        let mut cfg = ReverieConfig::default();
        cfg.personas.precedence.push("oracular".to_string());
        assert!(cfg
            .validate()
            .iter()
            .any(|p| p.contains("unknown module")));
    }
}
