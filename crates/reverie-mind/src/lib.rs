//! Reverie mind - input triage and multi-persona response synthesis
//!
//! The attention system decides which cognitive modules a turn needs; the
//! consciousness system runs each persona against the model manager and
//! merges their outputs into one reply.

pub mod attention;
pub mod consciousness;
pub mod persona;

pub use attention::{AttentionAnalysis, AttentionSystem, Intent};
pub use consciousness::{
    Consciousness, MindError, PersonaResponse, SynthesisOutcome, TierMap,
};
pub use persona::{parse_precedence, ModelTier, Module, PersonaModule, PersonaTable};
