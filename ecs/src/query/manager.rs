use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use fixedbitset::FixedBitSet;

use crate::{query::Descriptor, storage::archetype};

/// A known archetype: its id plus its component mask, kept here so matching never needs
/// to reach back into storage.
struct Record {
    id: archetype::Id,
    mask: FixedBitSet,
}

/// A cached query: the descriptor's masks plus the snapshot of matching archetype ids.
struct Entry {
    with_mask: FixedBitSet,
    without_mask: FixedBitSet,
    matches: Arc<Vec<archetype::Id>>,
}

/// The query cache: maps each [`Descriptor`] to the list of archetypes matching it,
/// maintained incrementally as archetypes are created.
///
/// # Caching
///
/// The first request for a descriptor scans every known archetype once and caches the
/// result (a miss); later requests return the cached snapshot unchanged (a hit). When
/// storage creates a new archetype it calls [`on_archetype_created`], which appends the
/// archetype to every cached entry it matches - no cached entry is ever rescanned or
/// invalidated by creation, and cache statistics are untouched by this maintenance.
///
/// # Snapshots
///
/// `matching` returns an `Arc<Vec<_>>` snapshot. Maintenance replaces an entry's list
/// with a new `Arc` (copy-on-write) instead of mutating it, so a list returned earlier
/// is stable to iterate even while archetypes keep appearing.
///
/// # Concurrency
///
/// Safe to call from many threads while a writer concurrently creates archetypes. The
/// record list sits behind a `RwLock`, the cache in a `DashMap`, the counters in
/// atomics. The miss path holds the record read lock across its cache insert, and the
/// creation path holds the write lock across its cache maintenance; that mutual
/// exclusion is what makes creation linearizable with respect to cache fills - a new
/// archetype can never fall between a scan and the insert of the scanned result. Lock
/// order is always record lock first, then cache shard, so the two paths cannot
/// deadlock.
///
/// [`on_archetype_created`]: Manager::on_archetype_created
pub struct Manager {
    /// Every archetype the storage has created, in creation order.
    archetypes: RwLock<Vec<Record>>,

    /// Cached matches per descriptor.
    cache: DashMap<Descriptor, Entry>,

    /// Number of requests served from the cache.
    hits: AtomicU64,

    /// Number of requests that had to scan.
    misses: AtomicU64,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    /// Create a new empty manager.
    pub fn new() -> Self {
        Self {
            archetypes: RwLock::new(Vec::new()),
            cache: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get the archetypes matching a descriptor, as a stable snapshot.
    ///
    /// A cache hit returns the stored snapshot (the same `Arc`); a miss scans all known
    /// archetypes, caches the result and returns it. The returned list always reflects
    /// every archetype created before this call that matches the descriptor.
    pub fn matching(&self, descriptor: &Descriptor) -> Arc<Vec<archetype::Id>> {
        if let Some(entry) = self.cache.get(descriptor) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return entry.matches.clone();
        }

        // Miss: scan under the record read lock and insert the entry while still
        // holding it, so a concurrent creation cannot slip between scan and insert.
        let records = self.archetypes.read().unwrap();

        let with_mask = descriptor.with().mask();
        let without_mask = descriptor.without().mask();
        let ids: Vec<_> = records
            .iter()
            .filter(|record| Self::mask_matches(&with_mask, &without_mask, &record.mask))
            .map(|record| record.id)
            .collect();

        let matches = Arc::new(ids);
        self.cache.insert(
            descriptor.clone(),
            Entry {
                with_mask,
                without_mask,
                matches: matches.clone(),
            },
        );
        self.misses.fetch_add(1, Ordering::Relaxed);
        matches
    }

    /// Record a newly created archetype and push it into every cached entry whose
    /// descriptor it matches.
    ///
    /// Holds the record write lock across the cache maintenance; see the type docs for
    /// why. Hit/miss counters are not touched.
    pub(crate) fn on_archetype_created(&self, id: archetype::Id, mask: FixedBitSet) {
        let mut records = self.archetypes.write().unwrap();

        for mut entry in self.cache.iter_mut() {
            if Self::mask_matches(&entry.with_mask, &entry.without_mask, &mask) {
                // Copy-on-write: snapshots handed out earlier stay untouched.
                let mut ids = Vec::with_capacity(entry.matches.len() + 1);
                ids.extend_from_slice(&entry.matches);
                ids.push(id);
                entry.matches = Arc::new(ids);
            }
        }

        records.push(Record { id, mask });
    }

    /// Subset/disjointness test of a descriptor's masks against an archetype mask.
    #[inline]
    fn mask_matches(with: &FixedBitSet, without: &FixedBitSet, mask: &FixedBitSet) -> bool {
        with.is_subset(mask) && without.is_disjoint(mask)
    }

    /// Drop every cached entry. Statistics persist until
    /// [`reset_statistics`](Self::reset_statistics) is called separately.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    /// Zero the hit/miss counters without touching cached entries.
    pub fn reset_statistics(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Forget every cached entry and every known archetype. Used when the storage is
    /// cleared; counters persist like with [`invalidate`](Self::invalidate).
    pub(crate) fn reset(&self) {
        // Same lock order as creation: records first, then cache.
        let mut records = self.archetypes.write().unwrap();
        self.cache.clear();
        records.clear();
    }

    /// Number of requests served from the cache.
    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of requests that had to scan.
    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// The cache hit rate as a percentage; `0.0` before any request.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64 * 100.0
    }

    /// Number of descriptors currently cached.
    #[inline]
    pub fn cached_queries(&self) -> usize {
        self.cache.len()
    }

    /// Number of archetypes known to the manager.
    #[inline]
    pub fn known_archetypes(&self) -> usize {
        self.archetypes.read().unwrap().len()
    }
}
