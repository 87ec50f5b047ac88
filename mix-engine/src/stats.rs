use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Diagnostic counters. Drops and no-ops stay silent for callers but show up here.
#[derive(Default)]
pub struct EngineStats {
    pushed_bytes: AtomicU64,
    dropped_pushes: AtomicU64,
    unrouted_pushes: AtomicU64,
    pulled_blocks: AtomicU64,
    empty_pulls: AtomicU64,
    bootstraps: AtomicU64,
    demolitions: AtomicU64,
    invalid_index: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub pushed_bytes: u64,
    pub dropped_pushes: u64,
    pub unrouted_pushes: u64,
    pub pulled_blocks: u64,
    pub empty_pulls: u64,
    pub bootstraps: u64,
    pub demolitions: u64,
    pub invalid_index: u64,
}

impl EngineStats {
    pub(crate) fn pushed(&self, bytes: usize) {
        self.pushed_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn push_dropped(&self) {
        self.dropped_pushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn push_unrouted(&self) {
        self.unrouted_pushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn pulled(&self, hit: bool) {
        if hit {
            self.pulled_blocks.fetch_add(1, Ordering::Relaxed);
        } else {
            self.empty_pulls.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn bootstrapped(&self) {
        self.bootstraps.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn demolished(&self) {
        self.demolitions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalid_index(&self) {
        self.invalid_index.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pushed_bytes: self.pushed_bytes.load(Ordering::Relaxed),
            dropped_pushes: self.dropped_pushes.load(Ordering::Relaxed),
            unrouted_pushes: self.unrouted_pushes.load(Ordering::Relaxed),
            pulled_blocks: self.pulled_blocks.load(Ordering::Relaxed),
            empty_pulls: self.empty_pulls.load(Ordering::Relaxed),
            bootstraps: self.bootstraps.load(Ordering::Relaxed),
            demolitions: self.demolitions.load(Ordering::Relaxed),
            invalid_index: self.invalid_index.load(Ordering::Relaxed),
        }
    }
}
