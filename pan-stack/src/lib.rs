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

//! # Path caches and path-aware echo sessions.
//!
//! This crate provides the active parts of a path-aware datagram endhost:
//!
//! - [`cache`] resolves and caches candidate paths between pairs of routing
//!   domains. [`cache::sync::PathCache`] is the single-threaded variant for
//!   blocking applications; [`cache::shared::SharedPathCache`] is safe for
//!   concurrent callers and deduplicates in-flight resolutions per key
//!   (single-flight).
//!
//! - [`session`] implements the echo exchange on top of a resolved path:
//!   [`session::server::EchoServer`] reverses arrival paths and echoes
//!   payloads back, [`session::client::EchoClient`] resolves, selects, and
//!   exchanges with per-receive timeouts under an overall deadline.
//!
//! - [`daemon`] and [`transport`] define the narrow interfaces to the two
//!   external collaborators: the daemon that knows the local identity, the
//!   usable port range, and raw path candidates; and the datagram transport
//!   that moves payloads and reports arrival paths and out-of-band path
//!   failures.

pub mod cache;
pub mod daemon;
pub mod session;
pub mod transport;
pub mod types;
