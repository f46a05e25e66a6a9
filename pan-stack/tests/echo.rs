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

//! End-to-end echo sessions over an in-memory transport pair.

use std::{io, sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::Utc;
use futures::{FutureExt, future::BoxFuture};
use pan_proto::{
    address::{ByDomain, DomainId, Endpoint},
    path::Path,
};
use pan_stack::{
    cache::{PathResolver, ResolveError, shared::SharedPathCache},
    session::{
        client::{ClientError, EchoClient, EchoClientConfig},
        select::SelectionMode,
        server::EchoServer,
    },
    transport::{
        Datagram, EchoTransport, PathFailureNotice, PathFailureObserver, TransportBindError,
        TransportRecvError, TransportSendError,
    },
    types::ResFut,
};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// One side of an in-memory datagram link.
struct ChannelTransport {
    local: Endpoint,
    outgoing: mpsc::UnboundedSender<Datagram>,
    incoming: Mutex<mpsc::UnboundedReceiver<Datagram>>,
    observer: std::sync::Mutex<Option<Arc<dyn PathFailureObserver>>>,
}

impl ChannelTransport {
    /// Creates a connected pair of transports.
    fn pair(a: Endpoint, b: Endpoint) -> (Arc<Self>, Arc<Self>) {
        let (a_to_b, from_a) = mpsc::unbounded_channel();
        let (b_to_a, from_b) = mpsc::unbounded_channel();
        let left = Arc::new(Self {
            local: a,
            outgoing: a_to_b,
            incoming: Mutex::new(from_b),
            observer: std::sync::Mutex::new(None),
        });
        let right = Arc::new(Self {
            local: b,
            outgoing: b_to_a,
            incoming: Mutex::new(from_a),
            observer: std::sync::Mutex::new(None),
        });
        (left, right)
    }

    /// Delivers an out-of-band failure signal to the registered observer.
    fn signal_path_failure(&self, notice: PathFailureNotice) {
        if let Some(observer) = self.observer.lock().unwrap().as_ref() {
            observer.path_broken(notice);
        }
    }
}

impl EchoTransport for ChannelTransport {
    fn bind(
        &self,
        _local: Endpoint,
        _port_range: (u16, u16),
    ) -> BoxFuture<'_, Result<(), TransportBindError>> {
        futures::future::ok(()).boxed()
    }

    fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    fn send_to_via<'a>(
        &'a self,
        payload: &'a [u8],
        _destination: Endpoint,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<usize, TransportSendError>> {
        async move {
            let datagram = Datagram {
                payload: Bytes::copy_from_slice(payload),
                source: self.local,
                path: path.clone(),
                via: self.local.host,
            };
            self.outgoing
                .send(datagram)
                .map_err(|_| TransportSendError::Io(io::ErrorKind::BrokenPipe.into()))?;
            Ok(payload.len())
        }
        .boxed()
    }

    fn recv_from_via(&self) -> BoxFuture<'_, Result<Datagram, TransportRecvError>> {
        async move {
            self.incoming
                .lock()
                .await
                .recv()
                .await
                .ok_or_else(|| TransportRecvError::Io(io::ErrorKind::UnexpectedEof.into()))
        }
        .boxed()
    }

    fn register_path_failure_observer(&self, observer: Arc<dyn PathFailureObserver>) {
        *self.observer.lock().unwrap() = Some(observer);
    }
}

/// A resolver answering every request with a fixed candidate list.
struct StaticResolver(Vec<Path>);

impl PathResolver for StaticResolver {
    fn resolve_paths(
        &self,
        _src: DomainId,
        _dst: DomainId,
    ) -> impl ResFut<'_, Vec<Path>, ResolveError> {
        async move { Ok(self.0.clone()) }
    }
}

fn endpoint(domain: u64, addr: &str) -> Endpoint {
    Endpoint::new(DomainId(domain), addr.parse().unwrap())
}

fn forward_path(src: u64, dst: u64, next_hop: &str) -> Path {
    Path::new(
        Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
        ByDomain {
            source: DomainId(src),
            destination: DomainId(dst),
        },
        Some(next_hop.parse().unwrap()),
    )
}

fn config(remote: Endpoint, count: usize) -> EchoClientConfig {
    EchoClientConfig {
        remote,
        payload: Bytes::from_static(b"Hello!"),
        count,
        receive_timeout: Duration::from_millis(50),
        deadline: Duration::from_secs(5),
        selection: SelectionMode::Random,
    }
}

#[test_log::test(tokio::test)]
async fn three_echo_rounds_roundtrip() {
    let client_ep = endpoint(110, "10.0.0.9:40000");
    let server_ep = endpoint(111, "10.0.0.1:7");
    let (client_tp, server_tp) = ChannelTransport::pair(client_ep, server_ep);

    let cancellation = CancellationToken::new();
    let server = EchoServer::new(Arc::clone(&server_tp));
    let server_cancel = cancellation.clone();
    let server_task = tokio::spawn(async move { server.run(server_cancel).await });

    let cache = SharedPathCache::new(StaticResolver(vec![forward_path(
        110,
        111,
        "10.0.0.1:7",
    )]));
    let client = EchoClient::new(Arc::clone(&client_tp), config(server_ep, 3));
    let report = client.run(&cache).await.unwrap();

    assert_eq!(report.sent, 3);
    assert_eq!(report.received, 3);
    assert_eq!(report.reply_sizes, vec![6, 6, 6]);

    cancellation.cancel();
    let stats = server_task.await.unwrap().unwrap();
    assert_eq!(stats.echoed, 3);
    assert_eq!(stats.dropped_irreversible, 0);
}

#[test_log::test(tokio::test)]
async fn empty_resolution_is_no_path_to_destination() {
    let client_ep = endpoint(110, "10.0.0.9:40000");
    let server_ep = endpoint(111, "10.0.0.1:7");
    let (client_tp, _server_tp) = ChannelTransport::pair(client_ep, server_ep);

    let cache = SharedPathCache::new(StaticResolver(vec![]));
    let client = EchoClient::new(client_tp, config(server_ep, 1));
    let result = client.run(&cache).await;

    assert!(matches!(result, Err(ClientError::NoPathToDestination(_))));
}

#[test_log::test(tokio::test)]
async fn silent_server_is_no_response() {
    let client_ep = endpoint(110, "10.0.0.9:40000");
    let server_ep = endpoint(111, "10.0.0.1:7");
    // The peer transport stays alive but nobody serves it.
    let (client_tp, _server_tp) = ChannelTransport::pair(client_ep, server_ep);

    let cache = SharedPathCache::new(StaticResolver(vec![forward_path(
        110,
        111,
        "10.0.0.1:7",
    )]));
    let mut config = config(server_ep, 2);
    config.receive_timeout = Duration::from_millis(10);
    config.deadline = Duration::from_millis(500);
    let client = EchoClient::new(client_tp, config);
    let result = client.run(&cache).await;

    assert!(matches!(result, Err(ClientError::NoResponse(_))));
}

#[test_log::test(tokio::test)]
async fn irreversible_paths_are_dropped_server_side() {
    let client_ep = endpoint(110, "10.0.0.9:40000");
    let server_ep = endpoint(111, "10.0.0.1:7");
    let (client_tp, server_tp) = ChannelTransport::pair(client_ep, server_ep);

    let cancellation = CancellationToken::new();
    let server = EchoServer::new(Arc::clone(&server_tp));
    let server_cancel = cancellation.clone();
    let server_task = tokio::spawn(async move { server.run(server_cancel).await });

    let cache = SharedPathCache::new(StaticResolver(vec![
        forward_path(110, 111, "10.0.0.1:7").irreversible(),
    ]));
    let mut config = config(server_ep, 2);
    config.receive_timeout = Duration::from_millis(10);
    config.deadline = Duration::from_millis(500);
    let client = EchoClient::new(client_tp, config);
    let result = client.run(&cache).await;
    assert!(matches!(result, Err(ClientError::NoResponse(_))));

    cancellation.cancel();
    let stats = server_task.await.unwrap().unwrap();
    assert_eq!(stats.echoed, 0);
    assert_eq!(stats.dropped_irreversible, 2);
}

#[test_log::test(tokio::test)]
async fn transport_failure_signal_invalidates_the_cache() {
    let client_ep = endpoint(110, "10.0.0.9:40000");
    let server_ep = endpoint(111, "10.0.0.1:7");
    let (client_tp, _server_tp) = ChannelTransport::pair(client_ep, server_ep);

    let broken = forward_path(110, 111, "10.0.0.1:7");
    let cache = SharedPathCache::new(StaticResolver(vec![broken.clone()]));
    cache.store(DomainId(110), DomainId(111), vec![broken.clone()]);
    client_tp.register_path_failure_observer(cache.failure_observer());

    assert!(
        cache
            .lookup_cached(DomainId(110), DomainId(111), Utc::now())
            .is_some()
    );

    client_tp.signal_path_failure(PathFailureNotice {
        domains: broken.domains,
        fingerprint: broken.fingerprint(),
    });

    // The only path was broken, so the entry is gone and the next lookup
    // re-resolves.
    assert!(
        cache
            .lookup_cached(DomainId(110), DomainId(111), Utc::now())
            .is_none()
    );
}

#[test_log::test(tokio::test)]
async fn local_domain_exchange_needs_no_resolution() {
    let client_ep = endpoint(110, "10.0.0.9:40000");
    let server_ep = endpoint(110, "10.0.0.1:7");
    let (client_tp, server_tp) = ChannelTransport::pair(client_ep, server_ep);

    let cancellation = CancellationToken::new();
    let server = EchoServer::new(Arc::clone(&server_tp));
    let server_cancel = cancellation.clone();
    let server_task = tokio::spawn(async move { server.run(server_cancel).await });

    // A resolver that would fail: it must never be consulted.
    struct PanickingResolver;
    impl PathResolver for PanickingResolver {
        fn resolve_paths(
            &self,
            _src: DomainId,
            _dst: DomainId,
        ) -> impl ResFut<'_, Vec<Path>, ResolveError> {
            async move { panic!("local exchange must not resolve") }
        }
    }

    let cache = SharedPathCache::new(PanickingResolver);
    let client = EchoClient::new(client_tp, config(server_ep, 1));
    let report = client.run(&cache).await.unwrap();
    assert_eq!(report.received, 1);

    cancellation.cancel();
    server_task.await.unwrap().unwrap();
}

#[test_log::test(tokio::test)]
async fn recv_from_discards_the_arrival_path() {
    let client_ep = endpoint(110, "10.0.0.9:40000");
    let server_ep = endpoint(111, "10.0.0.1:7");
    let (client_tp, server_tp) = ChannelTransport::pair(client_ep, server_ep);

    let path = forward_path(110, 111, "10.0.0.1:7");
    client_tp
        .send_to_via(b"Hello!", server_ep, &path)
        .await
        .unwrap();

    let (payload, source) = server_tp.recv_from().await.unwrap();
    assert_eq!(payload.as_ref(), b"Hello!");
    assert_eq!(source, client_ep);
}
