//! Memory facade - bundles episodic, affective and reflection stores
//!
//! This is the surface the orchestrator and consciousness consume: build a
//! per-turn memory context, then commit the completed turn as the last
//! synchronous step.

use crate::affective::{AffectiveState, AffectiveStore, RelationshipSummary, TurnSignal};
use crate::embed::{Embedder, HashEmbedder};
use crate::episodic::{EpisodicRecord, EpisodicStore, RetrievalFilter};
use crate::error::MemoryResult;
use crate::reflection::{ReflectionNote, ReflectionStore};
use chrono::Utc;
use reverie_core::config::MemorySettings;
use reverie_core::{Role, SessionKey, UserId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Everything a turn's persona prompts draw from.
#[derive(Clone, Debug)]
pub struct MemoryContext {
    /// Recent utterances of this session, oldest first.
    pub recent: Vec<EpisodicRecord>,
    /// Semantically similar records across sessions.
    pub similar: Vec<EpisodicRecord>,
    pub affective: AffectiveState,
    pub relationship: RelationshipSummary,
    /// True when similarity retrieval failed and recency stood in.
    pub degraded_retrieval: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct MemoryMetrics {
    pub episodic_records: usize,
    pub reflection_notes: usize,
    pub users: usize,
}

pub struct MemoryStore {
    episodic: EpisodicStore,
    affective: AffectiveStore,
    reflections: ReflectionStore,
    embedder: Arc<dyn Embedder>,
    retrieval_k: usize,
    recent_window: usize,
}

impl MemoryStore {
    pub fn open(settings: &MemorySettings) -> MemoryResult<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(settings.embedding_dim));
        Self::open_with_embedder(settings, embedder)
    }

    pub fn open_with_embedder(
        settings: &MemorySettings,
        embedder: Arc<dyn Embedder>,
    ) -> MemoryResult<Self> {
        std::fs::create_dir_all(&settings.data_dir)?;
        Ok(Self {
            episodic: EpisodicStore::open(settings.data_dir.join("episodic.jsonl"))?,
            affective: AffectiveStore::open(
                settings.data_dir.join("affective"),
                settings.affective_blend,
            )?,
            reflections: ReflectionStore::open(settings.data_dir.join("reflections.jsonl"))?,
            embedder,
            retrieval_k: settings.retrieval_k,
            recent_window: settings.recent_window,
        })
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub async fn current_state(&self, user: &UserId) -> AffectiveState {
        self.affective.current_state(user).await
    }

    pub async fn relationship_summary(&self, user: &UserId) -> RelationshipSummary {
        self.affective.relationship_summary(user).await
    }

    /// Assemble the turn's memory context. Similarity-index failures
    /// degrade to recency-only retrieval rather than aborting the turn.
    pub async fn context_for(
        &self,
        session: &SessionKey,
        user: &UserId,
        input: &str,
    ) -> MemoryContext {
        let recent = self.episodic.retrieve_recent(session, self.recent_window).await;
        let query = self.embedder.embed(input);
        let (similar, degraded_retrieval) = match self
            .episodic
            .retrieve(&query, self.retrieval_k, &RetrievalFilter::default())
            .await
        {
            Ok(hits) => (hits, false),
            Err(e) => {
                warn!("similarity retrieval failed, falling back to recency: {e}");
                (
                    self.episodic.retrieve_recent(session, self.retrieval_k).await,
                    true,
                )
            }
        };
        MemoryContext {
            recent,
            similar,
            affective: self.affective.current_state(user).await,
            relationship: self.affective.relationship_summary(user).await,
            degraded_retrieval,
        }
    }

    /// Commit one completed turn: both episodic records in a single
    /// buffered append, then the affective update. Nothing is visible to
    /// later retrievals unless the whole commit succeeded.
    pub async fn persist_turn(
        &self,
        session: &SessionKey,
        user: &UserId,
        user_text: &str,
        agent_text: &str,
        tags: Vec<String>,
        signal: &TurnSignal,
    ) -> MemoryResult<(AffectiveState, [Uuid; 2])> {
        // The episodic store clamps stamps to strictly-increasing on
        // append; batch order puts the agent record after the user's.
        let now = Utc::now();
        let user_record = EpisodicRecord::new(
            session.clone(),
            now,
            Role::User,
            user_text,
            self.embedder.embed(user_text),
            tags.clone(),
        );
        let agent_record = EpisodicRecord::new(
            session.clone(),
            now,
            Role::Agent,
            agent_text,
            self.embedder.embed(agent_text),
            tags,
        );
        let ids = [user_record.id, agent_record.id];

        self.episodic
            .append_many(vec![user_record, agent_record])
            .await?;
        let state = self.affective.update(user, signal).await?;
        debug!(session = %session, impact = signal.impact, "turn persisted");
        Ok((state, ids))
    }

    pub async fn retrieve_recent(&self, session: &SessionKey, n: usize) -> Vec<EpisodicRecord> {
        self.episodic.retrieve_recent(session, n).await
    }

    pub async fn retrieve(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: &RetrievalFilter,
    ) -> MemoryResult<Vec<EpisodicRecord>> {
        self.episodic.retrieve(query_embedding, k, filter).await
    }

    pub async fn store_reflection(
        &self,
        insight: impl Into<String>,
        prompted_by: Vec<Uuid>,
    ) -> MemoryResult<ReflectionNote> {
        let note = ReflectionNote::new(insight, prompted_by);
        self.reflections.append(note.clone()).await?;
        Ok(note)
    }

    pub async fn recent_reflections(&self, n: usize) -> Vec<ReflectionNote> {
        self.reflections.recent(n).await
    }

    pub async fn metrics(&self) -> MemoryMetrics {
        MemoryMetrics {
            episodic_records: self.episodic.len().await,
            reflection_notes: self.reflections.len().await,
            users: self.affective.user_count().await,
        }
    }
}
