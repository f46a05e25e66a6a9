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

//! The echo server loop.

use std::sync::Arc;

use pan_proto::path::Reversal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    session::ServerStats,
    transport::{EchoTransport, TransportRecvError},
};

/// Echoes every received datagram back over the reversed arrival path.
///
/// Datagrams whose arrival path is irreversible are dropped; no reply can
/// be constructed for them and guessing one would misroute the echo. Send
/// failures are absorbed so one unreachable client cannot stop service for
/// the others. Receive failures end the loop unless they are transient
/// (timeouts, malformed datagrams).
pub struct EchoServer<T: EchoTransport> {
    transport: Arc<T>,
}

impl<T: EchoTransport> EchoServer<T> {
    /// Creates a server echoing over `transport`.
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Runs the echo loop until cancellation or a fatal receive error.
    ///
    /// On cancellation the counters collected so far are returned.
    pub async fn run(&self, cancellation: CancellationToken) -> Result<ServerStats, TransportRecvError> {
        let local = self.transport.local_endpoint();
        info!(%local, "echo server listening");

        let mut stats = ServerStats::default();
        loop {
            let datagram = tokio::select! {
                _ = cancellation.cancelled() => {
                    info!(echoed = stats.echoed, "echo server stopping");
                    return Ok(stats);
                }
                received = self.transport.recv_from_via() => match received {
                    Ok(datagram) => datagram,
                    Err(e) if e.is_transient() => {
                        debug!(error = %e, "transient receive error");
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "echo server receive failed");
                        return Err(e);
                    }
                },
            };

            let reply_path = match datagram.path.to_reversed() {
                Reversal::Reply(path) => path.with_underlay_next_hop(datagram.via),
                Reversal::Irreversible => {
                    debug!(source = %datagram.source, "dropping datagram with irreversible path");
                    stats.dropped_irreversible += 1;
                    continue;
                }
            };

            match self
                .transport
                .send_to_via(&datagram.payload, datagram.source, &reply_path)
                .await
            {
                Ok(_) => {
                    debug!(source = %datagram.source, n_bytes = datagram.payload.len(), "echoed");
                    stats.echoed += 1;
                }
                Err(e) => {
                    warn!(source = %datagram.source, error = %e, "echo reply failed");
                    stats.send_failures += 1;
                }
            }
        }
    }
}
