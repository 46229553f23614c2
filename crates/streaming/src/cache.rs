use std::collections::BTreeMap;
use std::sync::Arc;

use formats::ModelScene;
use tracing::debug;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryBudget {
    pub max_bytes: usize,
}

impl MemoryBudget {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("model too large for cache: requested={requested} max={max}")]
    BudgetExceeded { requested: usize, max: usize },
    #[error("no evictable entries (all pinned?)")]
    NoEvictableEntries,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    scene: Arc<ModelScene>,
    bytes: usize,
    last_used_tick: u64,
    pin_count: u32,
}

/// Parsed models keyed by resolved URL, bounded by a byte budget.
///
/// - The least recently used unpinned model goes first; equal ages evict
///   in URL order.
/// - The model on screen stays pinned until 3D mode exits.
/// - Only successful loads are stored, so a retry after a failure always
///   goes back to the network.
#[derive(Debug)]
pub struct AssetCache {
    budget: MemoryBudget,
    used_bytes: usize,
    tick: u64,
    entries: BTreeMap<String, CacheEntry>,
}

impl AssetCache {
    pub fn new(budget: MemoryBudget) -> Self {
        Self {
            budget,
            used_bytes: 0,
            tick: 0,
            entries: BTreeMap::new(),
        }
    }

    pub fn budget(&self) -> MemoryBudget {
        self.budget
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    /// Looks up and marks as recently used.
    pub fn get(&mut self, url: &str) -> Option<Arc<ModelScene>> {
        self.tick += 1;
        let entry = self.entries.get_mut(url)?;
        entry.last_used_tick = self.tick;
        Some(Arc::clone(&entry.scene))
    }

    /// Stores a parsed model and returns the URLs evicted to make room.
    pub fn insert(
        &mut self,
        url: impl Into<String>,
        scene: Arc<ModelScene>,
    ) -> Result<Vec<String>, CacheError> {
        let url = url.into();
        let bytes = scene.byte_size();
        if bytes > self.budget.max_bytes {
            return Err(CacheError::BudgetExceeded {
                requested: bytes,
                max: self.budget.max_bytes,
            });
        }
        self.tick += 1;
        let pin_count = self.entries.get(&url).map_or(0, |e| e.pin_count);
        if let Some(old) = self.entries.remove(&url) {
            self.used_bytes = self.used_bytes.saturating_sub(old.bytes);
        }
        self.entries.insert(
            url.clone(),
            CacheEntry {
                scene,
                bytes,
                last_used_tick: self.tick,
                pin_count,
            },
        );
        self.used_bytes += bytes;
        self.evict_as_needed(&url)
    }

    pub fn pin(&mut self, url: &str) -> bool {
        let Some(entry) = self.entries.get_mut(url) else {
            return false;
        };
        entry.pin_count = entry.pin_count.saturating_add(1);
        true
    }

    pub fn unpin(&mut self, url: &str) -> bool {
        let Some(entry) = self.entries.get_mut(url) else {
            return false;
        };
        entry.pin_count = entry.pin_count.saturating_sub(1);
        true
    }

    pub fn remove(&mut self, url: &str) -> bool {
        let Some(entry) = self.entries.remove(url) else {
            return false;
        };
        self.used_bytes = self.used_bytes.saturating_sub(entry.bytes);
        true
    }

    fn evict_as_needed(&mut self, protected: &str) -> Result<Vec<String>, CacheError> {
        let mut evicted = Vec::new();
        while self.used_bytes > self.budget.max_bytes {
            let pick = |exclude: Option<&str>| {
                self.entries
                    .iter()
                    .filter(|(k, e)| e.pin_count == 0 && exclude != Some(k.as_str()))
                    .min_by(|(ka, ea), (kb, eb)| {
                        ea.last_used_tick
                            .cmp(&eb.last_used_tick)
                            .then_with(|| ka.cmp(kb))
                    })
                    .map(|(k, _)| k.clone())
            };
            // Keep the entry just inserted unless nothing else can go.
            let Some(url) = pick(Some(protected)).or_else(|| pick(None)) else {
                return Err(CacheError::NoEvictableEntries);
            };
            self.remove(&url);
            debug!(url = %url, "model evicted from cache");
            evicted.push(url);
        }
        Ok(evicted)
    }
}
