//! Reflection notes - append-only, produced by the background pass

use crate::error::MemoryResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReflectionNote {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub insight: String,
    /// Episodic records that prompted this insight, when known.
    #[serde(default)]
    pub prompted_by: Vec<Uuid>,
}

impl ReflectionNote {
    pub fn new(insight: impl Into<String>, prompted_by: Vec<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            insight: insight.into(),
            prompted_by,
        }
    }
}

pub struct ReflectionStore {
    path: PathBuf,
    notes: RwLock<Vec<ReflectionNote>>,
}

impl ReflectionStore {
    pub fn open(path: impl Into<PathBuf>) -> MemoryResult<Self> {
        let path = path.into();
        let mut notes = Vec::new();
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            for (lineno, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ReflectionNote>(line) {
                    Ok(note) => notes.push(note),
                    Err(e) => {
                        warn!(path = %path.display(), lineno, "skipping corrupt reflection: {e}")
                    }
                }
            }
        } else if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            notes: RwLock::new(notes),
        })
    }

    pub async fn append(&self, note: ReflectionNote) -> MemoryResult<()> {
        let mut buf = serde_json::to_vec(&note)?;
        buf.push(b'\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&buf)?;
        file.flush()?;
        self.notes.write().await.push(note);
        Ok(())
    }

    pub async fn recent(&self, n: usize) -> Vec<ReflectionNote> {
        let notes = self.notes.read().await;
        let skip = notes.len().saturating_sub(n);
        notes[skip..].to_vec()
    }

    pub async fn len(&self) -> usize {
        self.notes.read().await.len()
    }
}
