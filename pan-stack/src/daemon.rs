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

//! The daemon interface.
//!
//! The daemon is the external collaborator that knows the local routing
//! domain, the port range endhosts may use, and how to resolve raw path
//! candidates. [`DaemonClient`] is the narrow trait the rest of the crate
//! programs against; [`DaemonPathResolver`] adapts it to the cache's
//! [`PathResolver`] interface.

use std::{net, sync::Arc};

use async_trait::async_trait;
use pan_proto::{
    address::{DomainId, Endpoint},
    path::Path,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    cache::{PathResolver, ResolveError},
    transport::{EchoTransport, TransportBindError},
    types::ResFut,
};

/// The port range to assume when the daemon does not report one.
pub const FULL_PORT_RANGE: (u16, u16) = (0, u16::MAX);

/// Options for a path resolution request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathRequestFlags {
    /// Bypass any daemon-side cache and resolve from scratch.
    pub refresh: bool,
    /// Request full metadata (expiry, MTU, interfaces) for each path.
    pub full_metadata: bool,
}

/// Errors talking to the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The daemon is not reachable.
    #[error("daemon unreachable: {0}")]
    Unreachable(String),
    /// The daemon answered with an error.
    #[error("daemon request failed: {0}")]
    Request(String),
    /// The daemon's answer could not be interpreted.
    #[error("malformed daemon response: {0}")]
    MalformedResponse(String),
}

/// A client of the path daemon.
#[async_trait]
pub trait DaemonClient: Send + Sync {
    /// Returns the routing domain this endhost lives in.
    async fn local_domain(&self) -> Result<DomainId, DaemonError>;

    /// Returns the inclusive port range endhosts may bind.
    async fn port_range(&self) -> Result<(u16, u16), DaemonError>;

    /// Resolves the candidate paths from `src` to `dst`.
    ///
    /// An empty result means the destination is known but currently
    /// unreachable; it is not an error.
    async fn resolve_paths(
        &self,
        src: DomainId,
        dst: DomainId,
        flags: PathRequestFlags,
    ) -> Result<Vec<Path>, DaemonError>;
}

/// The local identity reported by the daemon at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalInfo {
    /// The local routing domain.
    pub domain: DomainId,
    /// The inclusive port range endhosts may bind.
    pub port_range: (u16, u16),
}

/// Fetches the local domain and port range in one round.
///
/// The local domain is required and its failure propagates. A failing port
/// range query degrades to [`FULL_PORT_RANGE`] with a warning; it only
/// restricts which local ports are preferred and must not block startup.
pub async fn local_info(client: &dyn DaemonClient) -> Result<LocalInfo, DaemonError> {
    let (domain, port_range) =
        futures::future::join(client.local_domain(), client.port_range()).await;

    let port_range = port_range.unwrap_or_else(|e| {
        warn!(error = %e, "port range query failed, assuming the full range");
        FULL_PORT_RANGE
    });

    Ok(LocalInfo {
        domain: domain?,
        port_range,
    })
}

/// Errors preparing a transport for use.
#[derive(Debug, Error)]
pub enum BindError {
    /// The daemon startup query failed.
    #[error(transparent)]
    Daemon(#[from] DaemonError),
    /// The transport could not bind its underlay socket.
    #[error(transparent)]
    Transport(#[from] TransportBindError),
}

/// Queries the daemon and binds `transport` within the allowed port range.
///
/// `local_host` is the underlay address to bind; a port of 0 lets the
/// transport pick one within the daemon's range. Bind failure is fatal.
pub async fn bind_transport<T: EchoTransport>(
    transport: &T,
    client: &dyn DaemonClient,
    local_host: net::SocketAddr,
) -> Result<LocalInfo, BindError> {
    let info = local_info(client).await?;
    let local = Endpoint::new(info.domain, local_host);
    transport.bind(local, info.port_range).await?;
    info!(%local, port_range_low = info.port_range.0, port_range_high = info.port_range.1, "transport bound");
    Ok(info)
}

/// Adapts a [`DaemonClient`] to the cache's [`PathResolver`] interface.
pub struct DaemonPathResolver {
    client: Arc<dyn DaemonClient>,
    flags: PathRequestFlags,
}

impl DaemonPathResolver {
    /// Creates a resolver issuing requests with the given flags.
    pub fn new(client: Arc<dyn DaemonClient>, flags: PathRequestFlags) -> Self {
        Self { client, flags }
    }
}

impl PathResolver for DaemonPathResolver {
    fn resolve_paths(
        &self,
        src: DomainId,
        dst: DomainId,
    ) -> impl ResFut<'_, Vec<Path>, ResolveError> {
        async move {
            self.client
                .resolve_paths(src, dst, self.flags)
                .await
                .map_err(|e| Box::new(e) as ResolveError)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Mutex};

    use futures::{FutureExt, future::BoxFuture};
    use pan_proto::path::Path;

    use super::*;
    use crate::transport::{
        Datagram, PathFailureObserver, TransportRecvError, TransportSendError,
    };

    struct FakeDaemon {
        domain: Result<DomainId, String>,
        port_range: Result<(u16, u16), String>,
    }

    #[async_trait]
    impl DaemonClient for FakeDaemon {
        async fn local_domain(&self) -> Result<DomainId, DaemonError> {
            self.domain.clone().map_err(DaemonError::Unreachable)
        }

        async fn port_range(&self) -> Result<(u16, u16), DaemonError> {
            self.port_range.clone().map_err(DaemonError::Request)
        }

        async fn resolve_paths(
            &self,
            _src: DomainId,
            _dst: DomainId,
            _flags: PathRequestFlags,
        ) -> Result<Vec<Path>, DaemonError> {
            Ok(vec![])
        }
    }

    #[test_log::test(tokio::test)]
    async fn local_info_reports_domain_and_ports() {
        let daemon = FakeDaemon {
            domain: Ok(DomainId(110)),
            port_range: Ok((31000, 32767)),
        };
        let info = local_info(&daemon).await.unwrap();
        assert_eq!(info.domain, DomainId(110));
        assert_eq!(info.port_range, (31000, 32767));
    }

    #[test_log::test(tokio::test)]
    async fn port_range_failure_degrades_to_full_range() {
        let daemon = FakeDaemon {
            domain: Ok(DomainId(110)),
            port_range: Err("not supported".into()),
        };
        let info = local_info(&daemon).await.unwrap();
        assert_eq!(info.port_range, FULL_PORT_RANGE);
    }

    #[test_log::test(tokio::test)]
    async fn local_domain_failure_propagates() {
        let daemon = FakeDaemon {
            domain: Err("daemon down".into()),
            port_range: Ok((31000, 32767)),
        };
        assert!(matches!(
            local_info(&daemon).await,
            Err(DaemonError::Unreachable(_))
        ));
    }

    #[derive(Default)]
    struct RecordingTransport {
        bound: Mutex<Option<(Endpoint, (u16, u16))>>,
        fail_bind: bool,
    }

    impl EchoTransport for RecordingTransport {
        fn bind(
            &self,
            local: Endpoint,
            port_range: (u16, u16),
        ) -> BoxFuture<'_, Result<(), TransportBindError>> {
            if self.fail_bind {
                return futures::future::err(TransportBindError::PortRangeExhausted {
                    low: port_range.0,
                    high: port_range.1,
                })
                .boxed();
            }
            *self.bound.lock().unwrap() = Some((local, port_range));
            futures::future::ok(()).boxed()
        }

        fn local_endpoint(&self) -> Endpoint {
            self.bound.lock().unwrap().expect("transport not bound").0
        }

        fn send_to_via<'a>(
            &'a self,
            _payload: &'a [u8],
            _destination: Endpoint,
            _path: &'a Path,
        ) -> BoxFuture<'a, Result<usize, TransportSendError>> {
            futures::future::err(TransportSendError::Io(io::ErrorKind::Unsupported.into()))
                .boxed()
        }

        fn recv_from_via(&self) -> BoxFuture<'_, Result<Datagram, TransportRecvError>> {
            futures::future::err(TransportRecvError::Io(io::ErrorKind::Unsupported.into()))
                .boxed()
        }

        fn register_path_failure_observer(&self, _observer: Arc<dyn PathFailureObserver>) {}
    }

    #[test_log::test(tokio::test)]
    async fn bind_transport_routes_the_daemon_port_range() {
        let daemon = FakeDaemon {
            domain: Ok(DomainId(110)),
            port_range: Ok((31000, 32767)),
        };
        let transport = RecordingTransport::default();

        let info = bind_transport(&transport, &daemon, "10.0.0.9:0".parse().unwrap())
            .await
            .unwrap();

        let (local, range) = transport.bound.lock().unwrap().expect("bind not called");
        assert_eq!(local.domain, DomainId(110));
        assert_eq!(local.host, "10.0.0.9:0".parse().unwrap());
        assert_eq!(range, (31000, 32767));
        assert_eq!(info.port_range, (31000, 32767));
    }

    #[test_log::test(tokio::test)]
    async fn bind_failure_is_fatal() {
        let daemon = FakeDaemon {
            domain: Ok(DomainId(110)),
            port_range: Ok((31000, 32767)),
        };
        let transport = RecordingTransport {
            fail_bind: true,
            ..Default::default()
        };

        let result = bind_transport(&transport, &daemon, "10.0.0.9:0".parse().unwrap()).await;

        assert!(matches!(
            result,
            Err(BindError::Transport(
                TransportBindError::PortRangeExhausted { low: 31000, high: 32767 }
            ))
        ));
    }
}
