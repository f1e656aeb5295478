//! File outcome counters shared by the upload path and the pollers.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct FileCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    chunks: AtomicU64,
}

/// Point-in-time copy of [`FileCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileCountersSnapshot {
    pub succeeded: u64,
    pub failed: u64,
    /// Skipped because their properties were too large.
    pub skipped: u64,
    /// Chunks the source plugin finished processing.
    pub chunks: u64,
}

impl FileCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_succeeded(&self, n: u64) {
        self.succeeded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_failed(&self, n: u64) {
        self.failed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_skipped(&self, n: u64) {
        self.skipped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_chunk(&self) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FileCountersSnapshot {
        FileCountersSnapshot {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
        }
    }
}
