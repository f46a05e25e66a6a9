// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Synchronous, single-threaded path cache.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use pan_proto::{address::DomainId, path::Path};
use tracing::debug;

use super::{CacheEntry, CacheKey};

/// A keyed store of resolved paths for single-threaded use.
///
/// On a miss, [`PathCache::lookup`] invokes the caller-supplied resolver
/// synchronously; the resolver is expected to populate the cache through
/// [`PathCache::store`] before returning.
///
/// Refresh is an explicit policy: `lookup` never re-resolves a fresh entry,
/// [`PathCache::lookup_fresh`] always does.
#[derive(Debug, Default)]
pub struct PathCache {
    entries: HashMap<CacheKey, CacheEntry>,
}

impl PathCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the paths for `(src, dst)`, resolving on a miss.
    ///
    /// A fresh cached entry is returned without invoking `resolve`.
    /// Otherwise `resolve` runs synchronously; afterwards the entry is
    /// re-read and returned. A resolver that stores nothing yields an empty
    /// list, which callers must treat as "no usable path" rather than an
    /// error. Resolver failures propagate transparently.
    pub fn lookup<E, F>(
        &mut self,
        src: DomainId,
        dst: DomainId,
        resolve: F,
    ) -> Result<Vec<Arc<Path>>, E>
    where
        F: FnOnce(&mut PathCache, DomainId, DomainId) -> Result<(), E>,
    {
        if let Some(paths) = self.cached(src, dst) {
            return Ok(paths);
        }
        self.lookup_fresh(src, dst, resolve)
    }

    /// Resolves `(src, dst)` unconditionally, replacing any cached entry.
    pub fn lookup_fresh<E, F>(
        &mut self,
        src: DomainId,
        dst: DomainId,
        resolve: F,
    ) -> Result<Vec<Arc<Path>>, E>
    where
        F: FnOnce(&mut PathCache, DomainId, DomainId) -> Result<(), E>,
    {
        resolve(self, src, dst)?;

        Ok(self.cached(src, dst).unwrap_or_else(|| {
            debug!(%src, %dst, "resolver stored no entry");
            Vec::new()
        }))
    }

    /// Returns the cached paths for `(src, dst)` if a fresh entry exists.
    pub fn cached(&self, src: DomainId, dst: DomainId) -> Option<Vec<Arc<Path>>> {
        let entry = self.entries.get(&(src, dst))?;
        if !entry.is_fresh(Utc::now()) {
            return None;
        }
        Some(entry.paths.as_ref().clone())
    }

    /// Overwrites the entry for `(src, dst)` unconditionally.
    ///
    /// Used both for fresh population from a resolver and for forced
    /// refresh.
    pub fn store(&mut self, src: DomainId, dst: DomainId, paths: Vec<Path>) {
        self.entries
            .insert((src, dst), CacheEntry::new(paths, Utc::now()));
    }

    /// Evicts the entry for `(src, dst)` so the next lookup re-resolves.
    pub fn invalidate(&mut self, src: DomainId, dst: DomainId) {
        self.entries.remove(&(src, dst));
    }

    /// Cache-wide reset.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
