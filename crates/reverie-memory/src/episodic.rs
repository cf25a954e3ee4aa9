//! Episodic store - append-only utterance log with similarity retrieval

use crate::embed::cosine;
use crate::error::{MemoryError, MemoryResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reverie_core::{Role, SessionKey};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// One immutable logged utterance. Never mutated after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EpisodicRecord {
    pub id: Uuid,
    pub session: SessionKey,
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EpisodicRecord {
    pub fn new(
        session: SessionKey,
        timestamp: DateTime<Utc>,
        role: Role,
        text: impl Into<String>,
        embedding: Vec<f32>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session,
            timestamp,
            role,
            text: text.into(),
            embedding,
            tags,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RetrievalFilter {
    pub session: Option<SessionKey>,
    pub role: Option<Role>,
    pub tags: Vec<String>,
}

impl RetrievalFilter {
    fn matches(&self, record: &EpisodicRecord) -> bool {
        if let Some(session) = &self.session {
            if record.session != *session {
                return false;
            }
        }
        if let Some(role) = self.role {
            if record.role != role {
                return false;
            }
        }
        self.tags.iter().all(|t| record.tags.contains(t))
    }
}

/// In-memory view of the log. `last_stamp` is the highest timestamp ever
/// stored; appends clamp against it so log order and timestamp order never
/// diverge, even across reopen.
struct Index {
    records: Vec<EpisodicRecord>,
    last_stamp: DateTime<Utc>,
}

/// Append-only JSONL log plus an in-memory index rebuilt on open.
pub struct EpisodicStore {
    path: PathBuf,
    index: RwLock<Index>,
}

impl EpisodicStore {
    pub fn open(path: impl Into<PathBuf>) -> MemoryResult<Self> {
        let path = path.into();
        let mut records = Vec::new();
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            for (lineno, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<EpisodicRecord>(line) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(path = %path.display(), lineno, "skipping corrupt episodic line: {e}")
                    }
                }
            }
        } else if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), count = records.len(), "episodic store opened");
        let last_stamp = records
            .iter()
            .map(|r| r.timestamp)
            .max()
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(Self {
            path,
            index: RwLock::new(Index {
                records,
                last_stamp,
            }),
        })
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.records.len()
    }

    pub async fn append(&self, record: EpisodicRecord) -> MemoryResult<()> {
        self.append_many(vec![record]).await
    }

    /// Append several records as one buffered write. Used for the per-turn
    /// user/agent pair so a turn never half-persists. Each timestamp is
    /// clamped to strictly after the previous record's, so batch order is
    /// timestamp order no matter how fast turns complete.
    pub async fn append_many(&self, mut batch: Vec<EpisodicRecord>) -> MemoryResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut index = self.index.write().await;
        for record in &mut batch {
            if record.timestamp <= index.last_stamp {
                record.timestamp = index.last_stamp + ChronoDuration::nanoseconds(1);
            }
            index.last_stamp = record.timestamp;
        }

        let mut buf = Vec::new();
        for record in &batch {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        write_append(&self.path, &buf)?;

        index.records.extend(batch);
        Ok(())
    }

    /// Similarity retrieval: ordered by score descending, ties broken by
    /// recency descending.
    pub async fn retrieve(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: &RetrievalFilter,
    ) -> MemoryResult<Vec<EpisodicRecord>> {
        if query_embedding.is_empty() {
            return Err(MemoryError::Retrieval("empty query embedding".to_string()));
        }
        let index = self.index.read().await;
        let candidates: Vec<&EpisodicRecord> =
            index.records.iter().filter(|r| filter.matches(r)).collect();

        if !candidates.is_empty()
            && candidates
                .iter()
                .all(|r| r.embedding.len() != query_embedding.len())
        {
            return Err(MemoryError::Retrieval(
                "embedding dimension mismatch against the whole index".to_string(),
            ));
        }

        let mut scored: Vec<(f32, &EpisodicRecord)> = candidates
            .into_iter()
            .map(|r| (cosine(query_embedding, &r.embedding), r))
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.timestamp.cmp(&a.1.timestamp))
        });
        Ok(scored.into_iter().take(k).map(|(_, r)| r.clone()).collect())
    }

    /// Last `n` utterances of one session, oldest first.
    pub async fn retrieve_recent(&self, session: &SessionKey, n: usize) -> Vec<EpisodicRecord> {
        let index = self.index.read().await;
        let mut hits: Vec<EpisodicRecord> = index
            .records
            .iter()
            .filter(|r| r.session == *session)
            .cloned()
            .collect();
        hits.sort_by_key(|r| r.timestamp);
        let skip = hits.len().saturating_sub(n);
        hits.split_off(skip)
    }
}

fn write_append(path: &Path, buf: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(buf)?;
    file.flush()
}
