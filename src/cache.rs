use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::cluster::WeightedLabTarget;
use crate::filament::Filament;
use crate::optimizer::{OptimizerOptions, ResolvedAlgorithm};
use crate::zones::ZoneSettings;

/// Canonical identity of a seeded optimizer request.
///
/// Everything is compared bit-for-bit, so only truly identical requests share
/// an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    filaments: Vec<(u32, u64)>,
    targets: Vec<[u64; 4]>,
    layers: [u64; 3],
    algorithm: ResolvedAlgorithm,
    seed: u32,
    tunables: Vec<u64>,
}

impl CacheKey {
    /// `filaments` must already be in canonical (signature-sorted) order.
    pub(crate) fn new(
        filaments: &[Filament],
        targets: &[WeightedLabTarget],
        settings: &ZoneSettings,
        algorithm: ResolvedAlgorithm,
        seed: u32,
        options: &OptimizerOptions,
    ) -> Self {
        Self {
            filaments: filaments.iter().map(Filament::signature).collect(),
            targets: targets
                .iter()
                .map(|t| [t.l.to_bits(), t.a.to_bits(), t.b.to_bits(), t.weight.to_bits()])
                .collect(),
            layers: [
                settings.layer_height.to_bits(),
                settings.first_layer_height.to_bits(),
                settings.base_thickness.to_bits(),
            ],
            algorithm,
            seed,
            tunables: options.fingerprint(),
        }
    }
}

/// A stored search result, as indices into the canonical filament list.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CachedSearch {
    pub(crate) order: Vec<usize>,
    pub(crate) score: f64,
    pub(crate) iterations: u64,
    pub(crate) converged: bool,
}

/// Bounded memo of optimizer results; evicts the oldest insertion first.
#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    entries: HashMap<CacheKey, CachedSearch>,
    insertion_order: VecDeque<CacheKey>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl ResultCache {
    pub const DEFAULT_CAPACITY: usize = 100;

    /// A zero capacity cache stores nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            insertion_order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    pub(crate) fn get(&self, key: &CacheKey) -> Option<&CachedSearch> {
        self.entries.get(key)
    }

    pub(crate) fn insert(&mut self, key: CacheKey, value: CachedSearch) {
        if self.capacity == 0 {
            return;
        }
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = value;
            return;
        }

        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.insertion_order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            debug!(remaining = self.entries.len(), "optimizer cache evicted oldest entry");
        }

        self.insertion_order.push_back(key.clone());
        self.entries.insert(key, value);
    }
}
