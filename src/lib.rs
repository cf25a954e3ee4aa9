//! Reverie - a locally-hosted conversational agent core
//!
//! Wires the model manager, attention, consciousness and memory crates
//! into the per-turn pipeline. The binary in `main.rs` is a thin REPL
//! over [`Orchestrator`].

pub mod orchestrator;

pub use orchestrator::{
    Orchestrator, OrchestratorStatus, TurnError, TurnReport, TurnResult, TurnStage,
};
