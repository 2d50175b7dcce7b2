//! Analyzer cache shared across calls
//!
//! Readers take the read lock only long enough to clone an `Arc`. A rebuild
//! loads and validates outside the lock, then swaps the new analyzer in. An
//! analyzer is never mutated after it is published.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::debug;

use super::analyzer::{AnalysisOptions, Analyzer};
use crate::storage::TaskSource;

struct Entry {
    revision: String,
    generation: u64,
    analyzer: Arc<Analyzer>,
}

/// Caches one analyzer per source revision
pub struct SnapshotCache {
    options: AnalysisOptions,
    current: RwLock<Option<Entry>>,
    generation: AtomicU64,
}

impl SnapshotCache {
    pub fn new(options: AnalysisOptions) -> Self {
        Self {
            options,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the analyzer for the source's current revision, rebuilding
    /// it when the revision changed. Sources without a revision are never
    /// cached.
    pub fn get(&self, source: &dyn TaskSource) -> Result<Arc<Analyzer>> {
        let revision = source.revision()?;

        if let Some(rev) = revision.as_deref() {
            if let Some(entry) = self.current.read().as_ref() {
                if entry.revision == rev {
                    debug!(generation = entry.generation, "Snapshot cache hit");
                    return Ok(Arc::clone(&entry.analyzer));
                }
            }
        }

        let analyzer = Arc::new(Analyzer::load(source, self.options.clone())?);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, ?revision, "Built new snapshot");

        if let Some(revision) = revision {
            let mut current = self.current.write();
            // A slower rebuild of an older generation must not replace a newer one
            if current.as_ref().map_or(true, |e| e.generation < generation) {
                *current = Some(Entry {
                    revision,
                    generation,
                    analyzer: Arc::clone(&analyzer),
                });
            }
        }

        Ok(analyzer)
    }

    /// Drops the cached analyzer; readers holding it keep their copy
    pub fn invalidate(&self) {
        *self.current.write() = None;
    }

    /// Number of snapshots built so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Generation of the currently cached snapshot, if any
    pub fn cached_generation(&self) -> Option<u64> {
        self.current.read().as_ref().map(|e| e.generation)
    }
}
