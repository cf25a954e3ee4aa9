//! Result cache
//!
//! Retains recent inference *results*, not models, keyed by a normalized
//! prompt+parameters fingerprint. Avoids redundant generation when a
//! persona asks a near-identical question within a short window.

use crate::types::{InferenceRequest, InferenceResult};
use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

const SWEEP_THRESHOLD: usize = 256;

pub struct ResultCache {
    entries: DashMap<u64, CachedResult>,
    ttl: Duration,
}

struct CachedResult {
    at: Instant,
    result: InferenceResult,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, request: &InferenceRequest) -> Option<InferenceResult> {
        if self.ttl.is_zero() {
            return None;
        }
        let key = fingerprint(request);
        if let Some(entry) = self.entries.get(&key) {
            if entry.at.elapsed() <= self.ttl {
                return Some(entry.result.clone());
            }
        }
        self.entries.remove(&key);
        None
    }

    pub fn insert(&self, request: &InferenceRequest, result: &InferenceResult) {
        if self.ttl.is_zero() {
            return;
        }
        if self.entries.len() >= SWEEP_THRESHOLD {
            let ttl = self.ttl;
            self.entries.retain(|_, v| v.at.elapsed() <= ttl);
        }
        self.entries.insert(
            fingerprint(request),
            CachedResult {
                at: Instant::now(),
                result: result.clone(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whitespace-normalized, case-folded prompt plus model id and parameters.
fn fingerprint(request: &InferenceRequest) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    request.model.as_str().hash(&mut hasher);
    for word in request.prompt.split_whitespace() {
        word.to_lowercase().hash(&mut hasher);
    }
    request.params.temperature.to_bits().hash(&mut hasher);
    request.params.top_p.to_bits().hash(&mut hasher);
    request.params.top_k.hash(&mut hasher);
    request.max_tokens.hash(&mut hasher);
    hasher.finish()
}
