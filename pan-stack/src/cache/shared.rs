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

//! Concurrent path cache with single-flight resolution.
//!
//! A [SharedPathCache] serves concurrent callers. On a cache hit, lookups
//! return immediately with no contention beyond a read. On a miss, exactly
//! one leader flight per key is started: the resolver runs on a background
//! task owned by the cache, and every concurrent caller for the same key
//! observes the same [PendingResolution] token instead of triggering a
//! duplicate resolution.
//!
//! Population goes through [SharedPathCache::store], which linearizes
//! last-write-wins per key, completes the pending flight, and unblocks all
//! waiters. Invalidation may race an in-flight resolution; it only ever
//! removes entries, so it cannot resurrect a half-populated one.

use std::{
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use chrono::{DateTime, Utc};
use derive_more::Deref;
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use pan_proto::{
    address::{ByDomain, DomainId},
    path::{Path, PathFingerprint},
};
use scc::{Guard, HashIndex, hash_index::Entry};
use tokio::sync::oneshot;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use super::{CacheEntry, CacheKey, LookupError, PathResolver};
use crate::transport::{PathFailureNotice, PathFailureObserver};

/// Result of a non-blocking lookup.
pub enum LookupOutcome {
    /// The cache held a fresh entry; possibly empty ("no usable path").
    Resolved(Arc<Vec<Arc<Path>>>),
    /// A resolution is in flight. Await or poll the token, then re-read via
    /// [SharedPathCache::lookup_cached].
    Pending(PendingResolution),
}

/// A shared token for an in-flight resolution.
///
/// All concurrent callers for a key hold clones of the same token. It
/// completes when the leader's resolution stores an entry or is abandoned;
/// completion says nothing about the outcome, callers re-read the cache.
#[derive(Clone)]
pub struct PendingResolution {
    done: Shared<BoxFuture<'static, Result<(), LookupError>>>,
}

impl PendingResolution {
    /// Waits for the in-flight resolution to finish.
    pub async fn wait(self) -> Result<(), LookupError> {
        self.done.await
    }
}

impl std::future::Future for PendingResolution {
    type Output = Result<(), LookupError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.done).poll(cx)
    }
}

/// The per-key pending marker.
///
/// Holds the completion channel and the leader task handle; dropping the
/// last clone aborts a still-running leader, so the resolver task cannot
/// outlive the request it serves.
#[derive(Clone)]
struct Flight {
    done: Shared<BoxFuture<'static, Result<(), LookupError>>>,
    tx: Arc<Mutex<Option<oneshot::Sender<Result<(), LookupError>>>>>,
    task: Arc<Mutex<Option<AbortOnDropHandle<()>>>>,
}

impl Flight {
    fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        let done = rx
            .map(|received| match received {
                Ok(result) => result,
                Err(_) => Err(LookupError::Abandoned),
            })
            .boxed()
            .shared();
        Self {
            done,
            tx: Arc::new(Mutex::new(Some(tx))),
            task: Arc::new(Mutex::new(None)),
        }
    }

    fn pending(&self) -> PendingResolution {
        PendingResolution {
            done: self.done.clone(),
        }
    }

    /// Fires the completion channel once; later calls are no-ops.
    fn complete(&self, result: Result<(), LookupError>) {
        if let Some(tx) = self.tx.lock().expect("flight lock poisoned").take() {
            let _ = tx.send(result);
        }
    }

    fn attach_task(&self, handle: AbortOnDropHandle<()>) {
        *self.task.lock().expect("flight lock poisoned") = Some(handle);
    }
}

struct SharedPathCacheInner<R: PathResolver> {
    resolver: R,
    /// Cache of path lists indexed by (src, dst).
    entries: HashIndex<CacheKey, CacheEntry>,
    /// In-flight resolutions indexed by (src, dst).
    inflight: HashIndex<CacheKey, Flight>,
}

/// Shared state between the cache handle and leader tasks.
#[derive(Deref)]
#[deref(forward)]
struct SharedPathCacheState<R: PathResolver>(Arc<SharedPathCacheInner<R>>);

impl<R: PathResolver> Clone for SharedPathCacheState<R> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Concurrent path cache with single-flight deduplication.
///
/// The resolver is injected at construction as an explicit capability; the
/// cache never exposes it and leader tasks mutate the cache only through
/// [SharedPathCache::store] and abandonment.
pub struct SharedPathCache<R: PathResolver> {
    state: SharedPathCacheState<R>,
}

impl<R: PathResolver> SharedPathCache<R> {
    /// Creates a cache resolving misses through `resolver`.
    pub fn new(resolver: R) -> Self {
        Self {
            state: SharedPathCacheState(Arc::new(SharedPathCacheInner {
                resolver,
                entries: HashIndex::new(),
                inflight: HashIndex::new(),
            })),
        }
    }

    /// Returns the cached paths for `(src, dst)` if a fresh entry exists.
    ///
    /// `None` means the key was never resolved or the resolution was
    /// abandoned; `Some` with an empty list means "resolved, no usable
    /// path". The two are distinct conditions.
    pub fn lookup_cached(
        &self,
        src: DomainId,
        dst: DomainId,
        now: DateTime<Utc>,
    ) -> Option<Arc<Vec<Arc<Path>>>> {
        self.state.lookup_cached(src, dst, now)
    }

    /// Non-blocking lookup.
    ///
    /// On a hit this is a read with no resolver involvement. On a miss,
    /// exactly one caller's invocation starts the leader flight; everyone
    /// gets a [PendingResolution] clone for the same flight.
    pub fn try_lookup(&self, src: DomainId, dst: DomainId, now: DateTime<Utc>) -> LookupOutcome {
        match self.state.lookup_cached(src, dst, now) {
            Some(paths) => LookupOutcome::Resolved(paths),
            None => LookupOutcome::Pending(self.state.ensure_flight(src, dst).pending()),
        }
    }

    /// Looks up `(src, dst)`, awaiting an in-flight or newly started
    /// resolution on a miss.
    pub async fn lookup(
        &self,
        src: DomainId,
        dst: DomainId,
        now: DateTime<Utc>,
    ) -> Result<Arc<Vec<Arc<Path>>>, LookupError> {
        if let Some(paths) = self.state.lookup_cached(src, dst, now) {
            return Ok(paths);
        }

        self.state.ensure_flight(src, dst).pending().wait().await?;
        self.state
            .lookup_cached(src, dst, Utc::now())
            .ok_or(LookupError::Abandoned)
    }

    /// Overwrites the entry for `(src, dst)` unconditionally and completes
    /// any pending flight for the key, unblocking its waiters.
    pub fn store(&self, src: DomainId, dst: DomainId, paths: Vec<Path>) {
        self.state.store(src, dst, paths);
    }

    /// Evicts the entry for `(src, dst)` so the next lookup re-resolves.
    ///
    /// Safe to race with an in-flight resolution: a store completing
    /// afterwards wins the last write, and an invalidation after a completed
    /// store simply re-arms the miss path.
    pub fn invalidate(&self, src: DomainId, dst: DomainId) {
        self.state.invalidate(src, dst);
    }

    /// Removes the path with the given fingerprint from the entry; the
    /// entry itself is evicted once no paths remain.
    pub fn invalidate_path(&self, domains: ByDomain<DomainId>, fingerprint: PathFingerprint) {
        self.state.invalidate_path(domains, fingerprint);
    }

    /// Cache-wide reset.
    pub fn clear(&self) {
        self.state.entries.clear_sync();
    }

    /// Returns the invalidation capability handed to the transport layer.
    ///
    /// The transport calls it on out-of-band path-failure signals; the
    /// signal is absorbed as cache invalidation, transparent to in-flight
    /// sessions.
    pub fn failure_observer(&self) -> Arc<dyn PathFailureObserver>
    where
        R: 'static,
    {
        Arc::new(CacheInvalidator(self.state.clone()))
    }
}

impl<R: PathResolver> SharedPathCacheState<R> {
    fn lookup_cached(
        &self,
        src: DomainId,
        dst: DomainId,
        now: DateTime<Utc>,
    ) -> Option<Arc<Vec<Arc<Path>>>> {
        let guard = Guard::new();
        match self.entries.peek(&(src, dst), &guard) {
            Some(entry) if entry.is_fresh(now) => Some(Arc::clone(&entry.paths)),
            _ => None,
        }
    }

    /// Returns the flight for the key, electing this call as leader and
    /// spawning the resolver task if none is in flight.
    fn ensure_flight(&self, src: DomainId, dst: DomainId) -> Flight {
        let (flight, is_leader) = match self.inflight.entry_sync((src, dst)) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => (entry.insert_entry(Flight::new()).get().clone(), true),
        };

        if is_leader {
            let state = self.clone();
            let handle = AbortOnDropHandle::new(tokio::spawn(async move {
                state.resolve_leader(src, dst).await;
            }));
            flight.attach_task(handle);
        }

        flight
    }

    /// Leader body: resolve, then populate through `store` or abandon.
    async fn resolve_leader(&self, src: DomainId, dst: DomainId) {
        match self.resolver.resolve_paths(src, dst).await {
            Ok(paths) => {
                info!(%src, %dst, n_paths = paths.len(), "resolved paths");
                self.store(src, dst, paths);
            }
            Err(e) => {
                warn!(%src, %dst, error = %e, "path resolution failed");
                self.abandon(src, dst, LookupError::ResolveFailed(e.to_string()));
            }
        }
    }

    fn store(&self, src: DomainId, dst: DomainId, paths: Vec<Path>) {
        let entry = CacheEntry::new(paths, Utc::now());
        match self.entries.entry_sync((src, dst)) {
            Entry::Occupied(mut occupied) => {
                occupied.update(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert_entry(entry);
            }
        }
        self.finish_flight(src, dst, Ok(()));
    }

    fn abandon(&self, src: DomainId, dst: DomainId, error: LookupError) {
        self.finish_flight(src, dst, Err(error));
    }

    /// Completes the pending flight before removing it, so no waiter can
    /// observe the key without either an entry or a completion signal.
    fn finish_flight(&self, src: DomainId, dst: DomainId, result: Result<(), LookupError>) {
        let flight = {
            let guard = Guard::new();
            self.inflight.peek(&(src, dst), &guard).cloned()
        };
        if let Some(flight) = flight {
            flight.complete(result);
            self.inflight.remove_sync(&(src, dst));
        }
    }

    fn invalidate(&self, src: DomainId, dst: DomainId) {
        if self.entries.remove_sync(&(src, dst)) {
            debug!(%src, %dst, "invalidated cached paths");
        }
    }

    fn invalidate_path(&self, domains: ByDomain<DomainId>, fingerprint: PathFingerprint) {
        let key = (domains.source, domains.destination);
        let remaining: Option<Vec<Arc<Path>>> = {
            let guard = Guard::new();
            self.entries.peek(&key, &guard).map(|entry| {
                entry
                    .paths
                    .iter()
                    .filter(|p| p.fingerprint() != fingerprint)
                    .cloned()
                    .collect()
            })
        };

        match remaining {
            None => {}
            Some(remaining) if remaining.is_empty() => {
                debug!(src = %key.0, dst = %key.1, %fingerprint, "last usable path broken, evicting entry");
                self.entries.remove_sync(&key);
            }
            Some(remaining) => {
                let entry = CacheEntry {
                    paths: Arc::new(remaining),
                    resolved_at: Utc::now(),
                };
                if let Entry::Occupied(mut occupied) = self.entries.entry_sync(key) {
                    debug!(src = %key.0, dst = %key.1, %fingerprint, "dropped broken path from entry");
                    occupied.update(entry);
                }
            }
        }
    }
}

/// The invalidation capability exposed to the transport layer.
struct CacheInvalidator<R: PathResolver>(SharedPathCacheState<R>);

impl<R: PathResolver> PathFailureObserver for CacheInvalidator<R> {
    fn path_broken(&self, notice: PathFailureNotice) {
        debug!(
            src = %notice.domains.source,
            dst = %notice.domains.destination,
            fingerprint = %notice.fingerprint,
            "path failure signal"
        );
        self.0.invalidate_path(notice.domains, notice.fingerprint);
    }
}
