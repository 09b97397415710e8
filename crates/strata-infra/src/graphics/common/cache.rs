// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sharing of native pipelines between identical techniques.

use super::backend::PipelineKey;
use rustc_hash::FxHashMap;
use strata_core::renderer::TechniqueId;

#[derive(Debug)]
struct CacheEntry {
    refs: usize,
    last_use: u64,
}

/// Reference-counted native pipelines keyed by [`PipelineKey`].
///
/// Every technique holds one reference to the pipeline of its key. The pipeline is
/// retired when the last technique is destroyed, after the last submission that used
/// it through any of them.
#[derive(Debug, Default)]
pub struct TechniqueCache {
    entries: FxHashMap<PipelineKey, CacheEntry>,
    techniques: FxHashMap<TechniqueId, PipelineKey>,
    hits: u64,
}

impl TechniqueCache {
    /// Registers `technique` under `key`. Returns `true` if the pipeline already exists.
    pub fn acquire(&mut self, key: PipelineKey, technique: TechniqueId) -> bool {
        self.techniques.insert(technique, key);
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.refs += 1;
                self.hits += 1;
                true
            }
            None => {
                self.entries.insert(key, CacheEntry { refs: 1, last_use: 0 });
                false
            }
        }
    }

    /// Drops the reference of `technique`.
    /// ## Returns
    /// The key and last use of the pipeline when no technique references it anymore.
    pub fn release(&mut self, technique: TechniqueId) -> Option<(PipelineKey, u64)> {
        let key = self.techniques.remove(&technique)?;
        let entry = self.entries.get_mut(&key)?;
        entry.refs -= 1;
        if entry.refs > 0 {
            return None;
        }
        let last_use = entry.last_use;
        self.entries.remove(&key);
        Some((key, last_use))
    }

    /// Records that the pipeline of `technique` is used by submission `value`.
    pub fn touch(&mut self, technique: TechniqueId, value: u64) {
        if let Some(entry) = self
            .techniques
            .get(&technique)
            .and_then(|key| self.entries.get_mut(key))
        {
            entry.last_use = entry.last_use.max(value);
        }
    }

    /// Every cached key, then forgets them all.
    pub fn clear(&mut self) -> Vec<PipelineKey> {
        self.techniques.clear();
        self.entries.drain().map(|(key, _)| key).collect()
    }

    /// Number of distinct native pipelines.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no pipeline is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of technique creations served by an existing pipeline.
    pub fn hits(&self) -> u64 {
        self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::renderer::{DeviceId, LayoutId};

    const DEVICE: DeviceId = DeviceId(3);

    fn key(fingerprint: u64) -> PipelineKey {
        PipelineKey {
            fingerprint,
            layout: LayoutId::new(DEVICE, 0),
        }
    }

    #[test]
    fn shared_pipeline_retires_with_last_technique() {
        // --- ARRANGE ---
        let mut cache = TechniqueCache::default();
        let a = TechniqueId::new(DEVICE, 0);
        let b = TechniqueId::new(DEVICE, 1);
        assert!(!cache.acquire(key(7), a));
        assert!(cache.acquire(key(7), b));

        // --- ACT ---
        cache.touch(a, 5);
        cache.touch(b, 2);
        let after_a = cache.release(a);
        let after_b = cache.release(b);

        // --- ASSERT ---
        assert_eq!(after_a, None);
        assert_eq!(after_b, Some((key(7), 5)));
        assert!(cache.is_empty());
        assert_eq!(cache.hits(), 1);
    }
}
