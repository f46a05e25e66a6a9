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

//! The datagram transport interface.
//!
//! The transport moves opaque payloads over explicitly chosen paths and
//! reports the arrival path of received datagrams. Two variants exist:
//! [`EchoTransport`] for async callers and [`PollingTransport`] for
//! blocking applications that drive the exchange with receive timeouts.
//!
//! The transport also surfaces out-of-band path failure signals. It does
//! not interpret them; it hands each signal to the registered
//! [`PathFailureObserver`], which the cache layer implements as path
//! invalidation.

use std::{io, net, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};
use pan_proto::{
    address::{ByDomain, DomainId, Endpoint},
    path::{Path, PathFingerprint},
};
use thiserror::Error;

/// An out-of-band signal that a path no longer forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathFailureNotice {
    /// The domains the broken path connects, in its forward direction.
    pub domains: ByDomain<DomainId>,
    /// Identifies the broken path's forwarding description.
    pub fingerprint: PathFingerprint,
}

/// Receives out-of-band path failure signals from the transport.
///
/// Implementations must be cheap and non-blocking; the transport may invoke
/// them from its receive loop.
pub trait PathFailureObserver: Send + Sync {
    /// Called once per failure signal.
    fn path_broken(&self, notice: PathFailureNotice);
}

/// A datagram received by the transport.
#[derive(Debug, Clone)]
pub struct Datagram {
    /// The payload, owned so it outlives the transport's receive buffer.
    pub payload: Bytes,
    /// The sender's address.
    pub source: Endpoint,
    /// The path the datagram arrived on, as observed at the receiver.
    pub path: Path,
    /// The underlay address the datagram arrived from, used as the next hop
    /// of a reply.
    pub via: net::SocketAddr,
}

/// Errors when binding the transport's underlay socket.
#[derive(Debug, Error)]
pub enum TransportBindError {
    /// No port within the allowed range could be bound.
    #[error("no free port in range {low}-{high}")]
    PortRangeExhausted {
        /// The lowest port that was attempted.
        low: u16,
        /// The highest port that was attempted.
        high: u16,
    },
    /// The underlay socket failed.
    #[error("underlay bind failed")]
    Io(#[from] io::Error),
}

/// Errors when sending a datagram.
#[derive(Debug, Error)]
pub enum TransportSendError {
    /// The payload exceeds what the transport can frame.
    #[error("payload of {0} bytes exceeds the maximum datagram size")]
    PayloadTooLarge(usize),
    /// The path carries no underlay next hop to send to.
    #[error("path carries no underlay next hop")]
    NoNextHop,
    /// The underlay socket failed.
    #[error("underlay send failed")]
    Io(#[from] io::Error),
}

/// Errors when receiving a datagram.
#[derive(Debug, Error)]
pub enum TransportRecvError {
    /// A datagram arrived but could not be parsed; it was dropped.
    #[error("malformed datagram from {0}")]
    Malformed(net::SocketAddr),
    /// The underlay socket failed.
    #[error("underlay receive failed")]
    Io(#[from] io::Error),
}

impl TransportRecvError {
    /// Returns true for conditions a receive loop absorbs and retries:
    /// malformed datagrams and timeout-like I/O errors.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportRecvError::Malformed(_) => true,
            TransportRecvError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
            ),
        }
    }
}

/// An async datagram transport with explicit path control.
pub trait EchoTransport: Send + Sync {
    /// Binds the underlay socket for `local`.
    ///
    /// If `local` carries port 0, the transport picks a free port within
    /// the inclusive `port_range`; binding fails once the range is
    /// exhausted. Bind failure is fatal, the transport is unusable.
    fn bind(
        &self,
        local: Endpoint,
        port_range: (u16, u16),
    ) -> BoxFuture<'_, Result<(), TransportBindError>>;

    /// The local address datagrams are sent from.
    fn local_endpoint(&self) -> Endpoint;

    /// Sends `payload` to `destination` over `path`.
    ///
    /// Returns the number of payload bytes sent.
    fn send_to_via<'a>(
        &'a self,
        payload: &'a [u8],
        destination: Endpoint,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<usize, TransportSendError>>;

    /// Receives the next datagram together with its arrival path.
    fn recv_from_via(&self) -> BoxFuture<'_, Result<Datagram, TransportRecvError>>;

    /// Receives the next datagram, discarding its arrival path.
    fn recv_from(&self) -> BoxFuture<'_, Result<(Bytes, Endpoint), TransportRecvError>> {
        async move {
            let datagram = self.recv_from_via().await?;
            Ok((datagram.payload, datagram.source))
        }
        .boxed()
    }

    /// Registers the observer for out-of-band path failure signals.
    ///
    /// At most one observer is active; a later registration replaces the
    /// earlier one.
    fn register_path_failure_observer(&self, observer: Arc<dyn PathFailureObserver>);
}

/// A blocking datagram transport driven by receive timeouts.
///
/// Receive calls return [`io::ErrorKind::WouldBlock`] or
/// [`io::ErrorKind::TimedOut`] when the timeout elapses; callers poll their
/// cancellation flag between attempts.
pub trait PollingTransport {
    /// Binds the underlay socket for `local`; see [`EchoTransport::bind`].
    fn bind(
        &mut self,
        local: Endpoint,
        port_range: (u16, u16),
    ) -> Result<(), TransportBindError>;

    /// The local address datagrams are sent from.
    fn local_endpoint(&self) -> Endpoint;

    /// Bounds how long a receive call blocks.
    fn set_receive_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Sends `payload` to `destination` over `path`, blocking until the
    /// datagram is handed to the underlay.
    fn send_to_via(
        &mut self,
        payload: &[u8],
        destination: Endpoint,
        path: &Path,
    ) -> Result<usize, TransportSendError>;

    /// Receives the next datagram, blocking up to the receive timeout.
    fn recv_from_via(&mut self) -> Result<Datagram, TransportRecvError>;

    /// Receives the next datagram, discarding its arrival path.
    fn recv_from(&mut self) -> Result<(Bytes, Endpoint), TransportRecvError> {
        let datagram = self.recv_from_via()?;
        Ok((datagram.payload, datagram.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_like_errors_are_transient() {
        for kind in [
            io::ErrorKind::WouldBlock,
            io::ErrorKind::TimedOut,
            io::ErrorKind::Interrupted,
        ] {
            assert!(TransportRecvError::Io(kind.into()).is_transient());
        }
        assert!(
            TransportRecvError::Malformed("10.0.0.1:31000".parse().unwrap()).is_transient()
        );
    }

    #[test]
    fn hard_io_errors_are_fatal() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::NotConnected,
            io::ErrorKind::BrokenPipe,
        ] {
            assert!(!TransportRecvError::Io(kind.into()).is_transient());
        }
    }
}
