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

//! Blocking echo sessions for single-threaded applications.
//!
//! Both roles poll a [`PollingTransport`] with receive timeouts and check a
//! shared cancellation flag between attempts. Paths come from the
//! synchronous [`crate::cache::sync::PathCache`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use pan_proto::path::{Path, Reversal};
use tracing::{debug, info, warn};

use crate::{
    session::{EchoReport, ServerStats, client::EchoClientConfig, select},
    transport::{PollingTransport, TransportRecvError},
};

use super::client::ClientError;

/// Runs the echo loop on `transport` until `cancel` is set or a fatal
/// receive error occurs.
///
/// The loop polls with the transport's receive timeout; set it short enough
/// that cancellation is observed promptly.
pub fn serve<T: PollingTransport>(
    transport: &mut T,
    cancel: &AtomicBool,
) -> Result<ServerStats, TransportRecvError> {
    let local = transport.local_endpoint();
    info!(%local, "echo server listening");

    let mut stats = ServerStats::default();
    while !cancel.load(Ordering::Relaxed) {
        let datagram = match transport.recv_from_via() {
            Ok(datagram) => datagram,
            Err(e) if e.is_transient() => continue,
            Err(e) => {
                warn!(error = %e, "echo server receive failed");
                return Err(e);
            }
        };

        let reply_path = match datagram.path.to_reversed() {
            Reversal::Reply(path) => path.with_underlay_next_hop(datagram.via),
            Reversal::Irreversible => {
                debug!(source = %datagram.source, "dropping datagram with irreversible path");
                stats.dropped_irreversible += 1;
                continue;
            }
        };

        match transport.send_to_via(&datagram.payload, datagram.source, &reply_path) {
            Ok(_) => stats.echoed += 1,
            Err(e) => {
                warn!(source = %datagram.source, error = %e, "echo reply failed");
                stats.send_failures += 1;
            }
        }
    }

    info!(echoed = stats.echoed, "echo server stopping");
    Ok(stats)
}

/// Runs a blocking client session over the given path.
///
/// Each round sends the payload and polls for the reply until the receive
/// timeout elapses; misses are absorbed. The exchange stops where it stands
/// when the deadline passes or `cancel` is set, and fails with
/// [`ClientError::NoResponse`] only if no reply at all arrived.
pub fn exchange<T: PollingTransport>(
    transport: &mut T,
    config: &EchoClientConfig,
    path: &Path,
    cancel: &AtomicBool,
) -> Result<EchoReport, ClientError> {
    transport
        .set_receive_timeout(config.receive_timeout)
        .map_err(TransportRecvError::Io)?;
    let deadline = Instant::now() + config.deadline;

    let mut report = EchoReport::default();
    for round in 0..config.count {
        if cancel.load(Ordering::Relaxed) || Instant::now() >= deadline {
            warn!(round, "session stopped before completing all rounds");
            break;
        }

        transport.send_to_via(&config.payload, config.remote, path)?;
        report.sent += 1;

        match transport.recv_from_via() {
            Ok(datagram) => {
                report.received += 1;
                report.reply_sizes.push(datagram.payload.len());
                debug!(round, n_bytes = datagram.payload.len(), "echo reply received");
            }
            Err(e) if e.is_transient() => {
                debug!(round, error = %e, "no reply within the receive timeout");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if report.received == 0 {
        return Err(ClientError::NoResponse(config.remote));
    }
    Ok(report)
}

/// Resolves and selects a path for `config.remote` using the synchronous
/// cache, then runs the exchange.
pub fn run_client<T, E, F>(
    transport: &mut T,
    config: &EchoClientConfig,
    cache: &mut crate::cache::sync::PathCache,
    resolve: F,
    cancel: &AtomicBool,
) -> Result<EchoReport, ClientError>
where
    T: PollingTransport,
    E: Into<ClientError>,
    F: FnOnce(
        &mut crate::cache::sync::PathCache,
        pan_proto::address::DomainId,
        pan_proto::address::DomainId,
    ) -> Result<(), E>,
{
    let local = transport.local_endpoint();
    let remote = config.remote;

    let path = if remote.domain == local.domain {
        Arc::new(Path::local(local.domain))
    } else {
        let paths = cache
            .lookup(local.domain, remote.domain, resolve)
            .map_err(Into::into)?;
        select::choose_random(&paths).ok_or(ClientError::NoPathToDestination(remote))?
    };

    exchange(transport, config, &path, cancel)
}
