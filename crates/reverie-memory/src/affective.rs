//! Affective tracker - bounded emotional vector and relationship metrics
//!
//! One record per user identity. Updates are a pure blend of prior state
//! and the turn's signal, clamped to bounds; relationship metrics are
//! recomputed from the persisted impact history, never hidden state.

use crate::error::{MemoryError, MemoryResult};
use chrono::{DateTime, Utc};
use reverie_core::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Impacts inside this band count toward the consistency metric.
pub const STABLE_IMPACT_BAND: f32 = 0.4;

/// Eight named emotional dimensions, each clamped to 0..=1.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffectVector {
    pub joy: f32,
    pub sadness: f32,
    pub anger: f32,
    pub fear: f32,
    pub surprise: f32,
    pub trust: f32,
    pub energy: f32,
    pub calm: f32,
}

impl AffectVector {
    pub fn neutral() -> Self {
        Self {
            joy: 0.3,
            sadness: 0.1,
            anger: 0.1,
            fear: 0.1,
            surprise: 0.2,
            trust: 0.4,
            energy: 0.3,
            calm: 0.5,
        }
    }

    pub fn as_array(&self) -> [f32; 8] {
        [
            self.joy,
            self.sadness,
            self.anger,
            self.fear,
            self.surprise,
            self.trust,
            self.energy,
            self.calm,
        ]
    }

    pub fn clamped(mut self) -> Self {
        for v in [
            &mut self.joy,
            &mut self.sadness,
            &mut self.anger,
            &mut self.fear,
            &mut self.surprise,
            &mut self.trust,
            &mut self.energy,
            &mut self.calm,
        ] {
            *v = v.clamp(0.0, 1.0);
        }
        self
    }

    pub fn in_bounds(&self) -> bool {
        self.as_array()
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }

    /// Strongest negative-valence reading; feeds the attention system's
    /// intensity floor.
    pub fn distress(&self) -> f32 {
        self.sadness.max(self.fear).max(self.anger)
    }
}

/// Bounded exponential-moving-average blend, then clamp. Pure function;
/// this is the only way affective dimensions ever change.
pub fn blend(prior: &AffectVector, signal: &AffectVector, alpha: f32) -> AffectVector {
    let a = alpha.clamp(0.0, 1.0);
    let mix = |p: f32, s: f32| p * (1.0 - a) + s * a;
    AffectVector {
        joy: mix(prior.joy, signal.joy),
        sadness: mix(prior.sadness, signal.sadness),
        anger: mix(prior.anger, signal.anger),
        fear: mix(prior.fear, signal.fear),
        surprise: mix(prior.surprise, signal.surprise),
        trust: mix(prior.trust, signal.trust),
        energy: mix(prior.energy, signal.energy),
        calm: mix(prior.calm, signal.calm),
    }
    .clamped()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AffectiveState {
    pub dims: AffectVector,
    pub updated_at: DateTime<Utc>,
    pub interaction_count: u64,
}

impl AffectiveState {
    pub fn neutral() -> Self {
        Self {
            dims: AffectVector::neutral(),
            updated_at: Utc::now(),
            interaction_count: 0,
        }
    }
}

/// Sentiment/impact estimate for one completed turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnSignal {
    pub dims: AffectVector,
    /// Net effect on the relationship, -1..=1.
    pub impact: f32,
}

const POSITIVE_CUES: [&str; 8] = [
    "thank", "love", "great", "perfect", "excellent", "wonderful", "amazing", "appreciate",
];
const NEGATIVE_CUES: [&str; 6] = ["hate", "terrible", "awful", "worst", "useless", "horrible"];
const DISTRESS_CUES: [&str; 10] = [
    "sad",
    "anxious",
    "scared",
    "afraid",
    "alone",
    "lonely",
    "depressed",
    "stressed",
    "overwhelmed",
    "worried",
];
const ANGER_CUES: [&str; 4] = ["angry", "furious", "annoyed", "frustrated"];

impl TurnSignal {
    /// Lexical estimate from the turn's text plus the attention system's
    /// intensity reading. Heuristic by design; a model-backed estimator can
    /// replace it without changing the update contract.
    pub fn estimate(user_text: &str, agent_text: &str, intensity: f32) -> Self {
        let lower = user_text.to_lowercase();
        let count = |cues: &[&str]| cues.iter().filter(|c| lower.contains(**c)).count() as f32;

        let positive = count(&POSITIVE_CUES);
        let negative = count(&NEGATIVE_CUES);
        let distress = count(&DISTRESS_CUES);
        let anger = count(&ANGER_CUES);

        let mut dims = AffectVector::neutral();
        dims.joy += positive * 0.2 - distress * 0.1;
        dims.trust += positive * 0.15 - negative * 0.15;
        dims.sadness += distress * 0.25;
        dims.fear += distress * 0.15;
        dims.anger += anger * 0.25 + negative * 0.1;
        dims.energy += intensity * 0.3;
        dims.calm -= intensity * 0.3;
        let dims = dims.clamped();

        // Positive/negative balance, a response-quality term, and cue hits.
        let response_quality = (agent_text.split_whitespace().count() as f32 / 50.0).min(1.0);
        let impact = ((positive - negative - distress * 0.5) * 0.3 + response_quality * 0.2)
            .clamp(-1.0, 1.0);

        Self { dims, impact }
    }
}

/// Deterministic recomputation from persisted impact history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSummary {
    /// Recency-weighted mean of historical impacts, mapped to 0..=1.
    pub quality: f32,
    /// Inverse function of impact variance.
    pub trust: f32,
    /// Fraction of turns inside the stable impact band.
    pub consistency: f32,
}

pub fn summarize(impacts: &[f32]) -> RelationshipSummary {
    if impacts.is_empty() {
        return RelationshipSummary {
            quality: 0.5,
            trust: 0.5,
            consistency: 1.0,
        };
    }
    let n = impacts.len() as f32;

    let weight_sum: f32 = (1..=impacts.len()).map(|i| i as f32).sum();
    let weighted_mean: f32 = impacts
        .iter()
        .enumerate()
        .map(|(i, x)| (i + 1) as f32 * x)
        .sum::<f32>()
        / weight_sum;
    let quality = ((weighted_mean + 1.0) / 2.0).clamp(0.0, 1.0);

    let mean = impacts.iter().sum::<f32>() / n;
    let variance = impacts.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;
    let trust = (1.0 / (1.0 + 4.0 * variance)).clamp(0.0, 1.0);

    let stable = impacts
        .iter()
        .filter(|x| x.abs() <= STABLE_IMPACT_BAND)
        .count() as f32;
    let consistency = stable / n;

    RelationshipSummary {
        quality,
        trust,
        consistency,
    }
}

/// Persisted per-user record: current state plus full impact history.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct UserAffect {
    state: AffectiveState,
    impacts: Vec<f32>,
}

pub struct AffectiveStore {
    dir: PathBuf,
    alpha: f32,
    users: RwLock<HashMap<UserId, UserAffect>>,
}

impl AffectiveStore {
    pub fn open(dir: impl Into<PathBuf>, alpha: f32) -> MemoryResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let mut users = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            let affect: UserAffect = serde_json::from_str(&raw).map_err(|e| {
                MemoryError::CorruptState(format!("{}: {e}", path.display()))
            })?;
            let user = UserId::new(
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default(),
            );
            users.insert(user, affect);
        }
        debug!(dir = %dir.display(), users = users.len(), "affective store opened");
        Ok(Self {
            dir,
            alpha,
            users: RwLock::new(users),
        })
    }

    pub async fn current_state(&self, user: &UserId) -> AffectiveState {
        self.users
            .read()
            .await
            .get(user)
            .map(|u| u.state.clone())
            .unwrap_or_else(AffectiveState::neutral)
    }

    /// Read-modify-write under the store's own lock; nothing outside this
    /// method mutates a user's affective record.
    pub async fn update(&self, user: &UserId, signal: &TurnSignal) -> MemoryResult<AffectiveState> {
        let mut users = self.users.write().await;
        let prior = users
            .get(user)
            .cloned()
            .unwrap_or_else(|| UserAffect {
                state: AffectiveState::neutral(),
                impacts: Vec::new(),
            });

        if !prior.state.dims.in_bounds() {
            return Err(MemoryError::CorruptState(format!(
                "affective dimensions out of bounds for {user}"
            )));
        }

        let next = UserAffect {
            state: AffectiveState {
                dims: blend(&prior.state.dims, &signal.dims, self.alpha),
                updated_at: Utc::now(),
                interaction_count: prior.state.interaction_count + 1,
            },
            impacts: {
                let mut impacts = prior.impacts;
                impacts.push(signal.impact.clamp(-1.0, 1.0));
                impacts
            },
        };

        self.persist(user, &next)?;
        let state = next.state.clone();
        users.insert(user.clone(), next);
        Ok(state)
    }

    pub async fn relationship_summary(&self, user: &UserId) -> RelationshipSummary {
        let users = self.users.read().await;
        summarize(
            users
                .get(user)
                .map(|u| u.impacts.as_slice())
                .unwrap_or(&[]),
        )
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    /// Temp-file + rename so a crash never leaves a torn record.
    fn persist(&self, user: &UserId, affect: &UserAffect) -> MemoryResult<()> {
        let path = self.user_path(user);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(affect)?)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            warn!(user = %user, "affective rename failed: {e}");
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn user_path(&self, user: &UserId) -> PathBuf {
        let safe: String = user
            .as_str()
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}
