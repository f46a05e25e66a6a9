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

//! # Path caches
//!
//! A path cache resolves candidate paths for a `(source, destination)`
//! domain pair through a resolver and keeps the result until it is
//! invalidated, refreshed, or expires.
//!
//! Two variants are provided:
//!
//! - [`sync::PathCache`] for single-threaded, blocking applications. The
//!   resolver is a synchronous callback invoked on a miss.
//!
//! - [`shared::SharedPathCache`] for concurrent callers. Resolution runs on
//!   a background task owned by the cache; concurrent lookups for the same
//!   key share a single in-flight resolution (single-flight), and callers
//!   either await the shared completion or poll it.
//!
//! Cached paths are immutable and shared as `Arc<Path>`; entries are only
//! replaced wholesale through `store`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pan_proto::{address::DomainId, path::Path};
use thiserror::Error;

use crate::types::ResFut;

pub mod shared;
pub mod sync;

/// Cache key: the source and destination domains of a resolution.
pub type CacheKey = (DomainId, DomainId);

/// Opaque resolver failure.
pub type ResolveError = Box<dyn std::error::Error + Send + Sync>;

/// Resolves raw path candidates between two routing domains.
///
/// Implementations typically wrap the daemon client; see
/// [`crate::daemon::DaemonPathResolver`].
pub trait PathResolver: Send + Sync + 'static {
    /// Resolve the candidate paths from `src` to `dst`.
    ///
    /// An empty result is not an error; it means the destination is known
    /// but currently unreachable.
    fn resolve_paths(&self, src: DomainId, dst: DomainId)
    -> impl ResFut<'_, Vec<Path>, ResolveError>;
}

/// Errors observed by callers waiting for a shared cache resolution.
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    /// The resolver failed.
    #[error("path resolution failed: {0}")]
    ResolveFailed(String),
    /// The resolution was abandoned without populating the cache.
    #[error("path resolution abandoned")]
    Abandoned,
}

/// A populated cache entry: the resolved candidate list plus its freshness
/// marker. Validity is cache-scoped and never persisted.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub(crate) paths: Arc<Vec<Arc<Path>>>,
    #[allow(dead_code)]
    pub(crate) resolved_at: DateTime<Utc>,
}

impl CacheEntry {
    pub(crate) fn new(paths: Vec<Path>, now: DateTime<Utc>) -> Self {
        Self {
            paths: Arc::new(paths.into_iter().map(Arc::new).collect()),
            resolved_at: now,
        }
    }

    /// An entry is fresh while it is resolved-empty or still holds at least
    /// one unexpired path. A stale entry behaves like a miss.
    pub(crate) fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.paths.is_empty()
            || self
                .paths
                .iter()
                .any(|p| !p.is_expired(now).unwrap_or(false))
    }
}
