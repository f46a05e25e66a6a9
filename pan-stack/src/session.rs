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

//! # Echo sessions
//!
//! An echo session exchanges datagrams over explicitly chosen paths:
//!
//! - [`server::EchoServer`] loops on the transport, reverses the arrival
//!   path of each datagram and echoes the payload back, dropping datagrams
//!   whose path cannot be reversed.
//!
//! - [`client::EchoClient`] resolves candidate paths through the shared
//!   cache, selects one ([`select::SelectionMode`]), and exchanges a fixed
//!   number of echo rounds under per-receive timeouts and an overall
//!   deadline.
//!
//! - [`blocking`] provides both roles for single-threaded applications over
//!   a [`crate::transport::PollingTransport`].

pub mod blocking;
pub mod client;
pub mod select;
pub mod server;

/// The phase a client session is in, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for path resolution.
    Resolving,
    /// Candidate paths known, choosing one.
    Selecting,
    /// Sending and receiving echo rounds.
    Exchanging,
    /// Finishing up, reporting results.
    Closing,
    /// The session ended; no further transitions.
    Closed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionPhase::Resolving => "resolving",
            SessionPhase::Selecting => "selecting",
            SessionPhase::Exchanging => "exchanging",
            SessionPhase::Closing => "closing",
            SessionPhase::Closed => "closed",
        };
        write!(f, "{s}")
    }
}


/// The outcome of a client session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EchoReport {
    /// Echo requests sent.
    pub sent: usize,
    /// Replies received.
    pub received: usize,
    /// The payload sizes of the replies, in arrival order.
    pub reply_sizes: Vec<usize>,
}

/// Counters kept by a running echo server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Datagrams echoed back.
    pub echoed: u64,
    /// Datagrams dropped because their path was irreversible.
    pub dropped_irreversible: u64,
    /// Replies that failed to send; the loop continued.
    pub send_failures: u64,
}
