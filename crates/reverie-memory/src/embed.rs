//! Embedding contract for semantic retrieval
//!
//! The concrete embedding algorithm is an interface concern only. The
//! default is a deterministic hashed bag-of-tokens projection so the core
//! runs with no ML dependency; a real sentence encoder drops in behind the
//! same trait.

use std::hash::{Hash, Hasher};

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Seeded token-hashing projection. Deterministic: identical text always
/// yields an identical vector.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0, "embedding dim must be nonzero");
        Self { dim }
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        let tokens: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
            .collect();

        for token in &tokens {
            bump(&mut v, token);
        }
        // Adjacent-token pairs give a little word-order signal.
        for pair in tokens.windows(2) {
            bump(&mut v, &format!("{} {}", pair[0], pair[1]));
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

fn bump(v: &mut [f32], token: &str) {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    token.hash(&mut hasher);
    let h = hasher.finish();
    let bucket = (h % v.len() as u64) as usize;
    let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
    v[bucket] += sign;
}

/// Cosine similarity; zero when either vector is zero or dims mismatch.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_deterministic() {
        let e = HashEmbedder::new(64);
        assert_eq!(e.embed("the rain in lisbon"), e.embed("the rain in lisbon"));
    }

    #[test]
    fn similar_text_scores_higher_than_unrelated() {
        let e = HashEmbedder::new(128);
        let a = e.embed("what is the capital of france");
        let b = e.embed("tell me the capital of france");
        let c = e.embed("my cat knocked over a plant");
        assert!(cosine(&a, &b) > cosine(&a, &c));
    }

    #[test]
    fn embedding_is_unit_norm() {
        let e = HashEmbedder::new(32);
        let v = e.embed("hello world");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashEmbedder::new(16);
        assert!(e.embed("").iter().all(|x| *x == 0.0));
    }
}
