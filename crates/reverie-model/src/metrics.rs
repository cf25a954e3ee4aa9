//! Resource utilization counters, exposed read-only to observability

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ModelMetrics {
    loads: AtomicU64,
    unloads: AtomicU64,
    switches: AtomicU64,
    timeouts: AtomicU64,
    inferences: AtomicU64,
    cache_hits: AtomicU64,
    total_latency_ms: AtomicU64,
    generated_tokens: AtomicU64,
    vram_high_water: AtomicU64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ModelMetricsSnapshot {
    pub loads: u64,
    pub unloads: u64,
    pub switches: u64,
    pub timeouts: u64,
    pub inferences: u64,
    pub cache_hits: u64,
    pub total_latency_ms: u64,
    pub generated_tokens: u64,
    pub vram_high_water_bytes: u64,
    pub avg_tokens_per_sec: f64,
}

impl ModelMetrics {
    pub fn record_load(&self, vram_bytes: u64) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.vram_high_water.fetch_max(vram_bytes, Ordering::Relaxed);
    }

    pub fn record_unload(&self) {
        self.unloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_switch(&self) {
        self.switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference(&self, latency_ms: u64, generated_tokens: u32) {
        self.inferences.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.generated_tokens
            .fetch_add(generated_tokens as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ModelMetricsSnapshot {
        let total_latency_ms = self.total_latency_ms.load(Ordering::Relaxed);
        let generated_tokens = self.generated_tokens.load(Ordering::Relaxed);
        let avg_tokens_per_sec = if total_latency_ms > 0 {
            generated_tokens as f64 / (total_latency_ms as f64 / 1000.0)
        } else {
            0.0
        };
        ModelMetricsSnapshot {
            loads: self.loads.load(Ordering::Relaxed),
            unloads: self.unloads.load(Ordering::Relaxed),
            switches: self.switches.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            inferences: self.inferences.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            total_latency_ms,
            generated_tokens,
            vram_high_water_bytes: self.vram_high_water.load(Ordering::Relaxed),
            avg_tokens_per_sec,
        }
    }
}
