//! Reverie memory - episodic recall and affective relationship tracking
//!
//! Pure data layer: an append-only episodic log with a similarity index,
//! one bounded affective-state record per user, and append-only reflection
//! notes. Everything survives process restarts.

pub mod affective;
pub mod embed;
pub mod episodic;
pub mod error;
pub mod reflection;
pub mod store;

pub use affective::{
    AffectVector, AffectiveState, AffectiveStore, RelationshipSummary, TurnSignal,
};
pub use embed::{cosine, Embedder, HashEmbedder};
pub use episodic::{EpisodicRecord, EpisodicStore, RetrievalFilter};
pub use error::{MemoryError, MemoryResult};
pub use reflection::{ReflectionNote, ReflectionStore};
pub use store::{MemoryContext, MemoryMetrics, MemoryStore};
