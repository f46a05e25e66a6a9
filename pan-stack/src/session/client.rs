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

//! The echo client session.

use std::{io, sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::Utc;
use pan_proto::{address::Endpoint, path::Path};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    cache::{LookupError, PathResolver, shared::SharedPathCache},
    session::{EchoReport, SessionPhase, select},
    transport::{EchoTransport, TransportRecvError, TransportSendError},
};

/// Configuration of a client session.
#[derive(Debug, Clone)]
pub struct EchoClientConfig {
    /// The endpoint to echo against.
    pub remote: Endpoint,
    /// The payload of each echo request.
    pub payload: Bytes,
    /// The number of echo rounds.
    pub count: usize,
    /// How long to wait for each reply before counting a miss.
    pub receive_timeout: Duration,
    /// Overall bound on the session; when it elapses, the exchange stops
    /// where it stands.
    pub deadline: Duration,
    /// How to pick a path among the candidates.
    pub selection: select::SelectionMode,
}

/// Errors ending a client session.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Resolution succeeded but yielded no usable path.
    #[error("no path to {0}")]
    NoPathToDestination(Endpoint),
    /// Path resolution failed or was abandoned.
    #[error(transparent)]
    Resolution(#[from] LookupError),
    /// Not a single reply arrived before the deadline.
    #[error("no response from {0}")]
    NoResponse(Endpoint),
    /// An echo request could not be sent.
    #[error(transparent)]
    Send(#[from] TransportSendError),
    /// The transport failed while waiting for a reply.
    #[error(transparent)]
    Recv(#[from] TransportRecvError),
    /// Interactive path selection failed.
    #[error("path selection failed")]
    Selection(#[from] io::Error),
}

/// Resolves, selects a path, and exchanges echo rounds with a remote
/// [`crate::session::server::EchoServer`].
pub struct EchoClient<T: EchoTransport> {
    transport: Arc<T>,
    config: EchoClientConfig,
}

impl<T: EchoTransport> EchoClient<T> {
    /// Creates a client exchanging over `transport`.
    pub fn new(transport: Arc<T>, config: EchoClientConfig) -> Self {
        Self { transport, config }
    }

    /// Runs the full session: resolve through `cache`, select, exchange.
    ///
    /// Reply misses within the per-round timeout are absorbed; the session
    /// fails with [`ClientError::NoResponse`] only if no reply at all
    /// arrives before the deadline.
    pub async fn run<R: PathResolver>(
        &self,
        cache: &SharedPathCache<R>,
    ) -> Result<EchoReport, ClientError> {
        let local = self.transport.local_endpoint();
        let remote = self.config.remote;

        // Within the local domain no resolution is needed; the empty local
        // path reaches the destination directly.
        let path = if remote.domain == local.domain {
            Arc::new(Path::local(local.domain))
        } else {
            let paths = self.resolve(cache).await?;
            self.select(paths).await?
        };

        info!(phase = %SessionPhase::Exchanging, %remote, %path, "exchanging");
        let report = self.exchange(&path).await?;

        info!(
            phase = %SessionPhase::Closing,
            sent = report.sent,
            received = report.received,
            "session done"
        );
        let result = if report.received == 0 {
            Err(ClientError::NoResponse(remote))
        } else {
            Ok(report)
        };
        info!(phase = %SessionPhase::Closed, "session closed");
        result
    }

    /// Resolution phase: consult the cache, awaiting an in-flight or newly
    /// started resolution on a miss.
    async fn resolve<R: PathResolver>(
        &self,
        cache: &SharedPathCache<R>,
    ) -> Result<Arc<Vec<Arc<Path>>>, ClientError> {
        use crate::cache::shared::LookupOutcome;

        let local = self.transport.local_endpoint();
        let remote = self.config.remote;
        info!(phase = %SessionPhase::Resolving, src = %local.domain, dst = %remote.domain, "resolving paths");

        let paths = match cache.try_lookup(local.domain, remote.domain, Utc::now()) {
            LookupOutcome::Resolved(paths) => paths,
            LookupOutcome::Pending(pending) => {
                pending.wait().await?;
                cache
                    .lookup_cached(local.domain, remote.domain, Utc::now())
                    .ok_or(LookupError::Abandoned)?
            }
        };

        if paths.is_empty() {
            return Err(ClientError::NoPathToDestination(remote));
        }
        Ok(paths)
    }

    /// Selection phase.
    async fn select(&self, paths: Arc<Vec<Arc<Path>>>) -> Result<Arc<Path>, ClientError> {
        info!(phase = %SessionPhase::Selecting, n_paths = paths.len(), "selecting a path");

        let chosen = match self.config.selection {
            select::SelectionMode::Random => select::choose_random(&paths),
            select::SelectionMode::Interactive => {
                let paths = Arc::clone(&paths);
                tokio::task::spawn_blocking(move || {
                    let stdin = io::stdin();
                    select::choose_interactive(&paths, stdin.lock(), io::stdout())
                })
                .await
                .map_err(|e| ClientError::Selection(io::Error::other(e)))??
            }
        };

        // Candidates were checked non-empty during resolution.
        chosen.ok_or(ClientError::NoPathToDestination(self.config.remote))
    }

    /// Exchange phase: `count` rounds of send-then-await-reply, bounded by
    /// the overall deadline.
    async fn exchange(&self, path: &Path) -> Result<EchoReport, ClientError> {
        let deadline = tokio::time::sleep(self.config.deadline);
        tokio::pin!(deadline);

        let mut report = EchoReport::default();
        for round in 0..self.config.count {
            let sent = tokio::select! {
                _ = &mut deadline => {
                    warn!(round, "session deadline reached");
                    return Ok(report);
                }
                sent = self
                    .transport
                    .send_to_via(&self.config.payload, self.config.remote, path) => sent?,
            };
            report.sent += 1;
            debug!(round, n_bytes = sent, "echo request sent");

            let reply = tokio::select! {
                _ = &mut deadline => {
                    warn!(round, "session deadline reached");
                    return Ok(report);
                }
                reply = tokio::time::timeout(
                    self.config.receive_timeout,
                    self.transport.recv_from_via(),
                ) => reply,
            };

            match reply {
                Ok(Ok(datagram)) => {
                    if datagram.source != self.config.remote {
                        debug!(source = %datagram.source, "reply from unexpected source");
                    }
                    report.received += 1;
                    report.reply_sizes.push(datagram.payload.len());
                    debug!(round, n_bytes = datagram.payload.len(), "echo reply received");
                }
                Ok(Err(e)) if e.is_transient() => {
                    debug!(round, error = %e, "transient receive error, counting a miss");
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    debug!(round, "no reply within the receive timeout");
                }
            }
        }

        Ok(report)
    }
}
