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

//! Path types.
//!
//! # Organisation
//!
//! - [`Path`] is the primary path type used with path-aware sockets and
//!   applications. It encapsulates an opaque forwarding description along
//!   with the underlay next hop, the source and destination domains, and
//!   optional display [`Metadata`].
//!
//! - [`Reversal`] is the result of the only transform a path supports:
//!   flipping it into the return direction. A path that cannot be reversed
//!   yields [`Reversal::Irreversible`], which means "do not auto-reply" and
//!   is not an error.
//!
//! - [`PathFingerprint`] identifies a path's forwarding description for
//!   out-of-band failure signals and cache invalidation.

use std::{
    hash::{DefaultHasher, Hash, Hasher},
    net,
};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::address::{ByDomain, DomainId};

/// A forwarding description between two routing domains.
///
/// `Path`s are immutable once resolved and cheap to clone; the forwarding
/// description is backed by [`Bytes`] so the data is shared across clones.
/// Concurrent readers share paths freely, typically behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// The opaque, ordered forwarding description placed into datagrams.
    pub raw: Bytes,
    /// The underlay address (IP + port) of the next hop, i.e. the first
    /// forwarding element. None for domain-local paths.
    pub underlay_next_hop: Option<net::SocketAddr>,
    /// The domains where the path starts and ends.
    pub domains: ByDomain<DomainId>,
    /// Whether the forwarding description can be flipped into the return
    /// direction without re-resolution.
    pub reversible: bool,
    /// Path metadata for display purposes; not required for forwarding.
    pub metadata: Option<Metadata>,
}

impl Path {
    /// Creates a new reversible `Path` with the provided forwarding
    /// description, its endpoint domains, and the next hop in the network
    /// underlay, but with no metadata.
    pub fn new(
        raw: Bytes,
        domains: ByDomain<DomainId>,
        underlay_next_hop: Option<net::SocketAddr>,
    ) -> Self {
        Self {
            raw,
            underlay_next_hop,
            domains,
            reversible: true,
            metadata: None,
        }
    }

    /// Returns a path for sending datagrams within the given domain.
    ///
    /// # Panics
    ///
    /// Panics if the domain is the wildcard domain.
    pub fn local(domain: DomainId) -> Self {
        assert!(!domain.is_wildcard(), "no local path for wildcard domain");

        Self {
            raw: Bytes::new(),
            underlay_next_hop: None,
            domains: ByDomain::with_cloned(domain),
            reversible: true,
            metadata: None,
        }
    }

    /// Marks the path as not reversible.
    pub fn irreversible(mut self) -> Self {
        self.reversible = false;
        self
    }

    /// Attaches metadata to the path.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Replaces the underlay next hop, e.g. with the underlay source of a
    /// received datagram when building a reply path.
    pub fn with_underlay_next_hop(mut self, next_hop: net::SocketAddr) -> Self {
        self.underlay_next_hop = Some(next_hop);
        self
    }

    /// Returns the source domain of this path.
    pub const fn source(&self) -> DomainId {
        self.domains.source
    }

    /// Returns the destination domain of this path.
    pub const fn destination(&self) -> DomainId {
        self.domains.destination
    }

    /// Returns true iff the forwarding description is empty, i.e. the path
    /// stays within a single domain.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns true if the path contains an expiry time and it is at or
    /// before now, false if it is after now, and None if the path does not
    /// carry an expiry time.
    pub fn is_expired(&self, now: DateTime<Utc>) -> Option<bool> {
        self.metadata
            .as_ref()
            .and_then(|m| m.expiration)
            .map(|t| t <= now)
    }

    /// Returns the number of interfaces traversed by the path, if available.
    pub fn interface_count(&self) -> Option<usize> {
        self.metadata
            .as_ref()
            .and_then(|m| m.interfaces.as_ref().map(|intfs| intfs.len()))
    }

    /// Returns a fingerprint of the forwarding description.
    pub fn fingerprint(&self) -> PathFingerprint {
        let mut hasher = DefaultHasher::new();
        self.raw.hash(&mut hasher);
        self.domains.hash(&mut hasher);
        PathFingerprint(hasher.finish())
    }

    /// Flips the path into the return direction.
    ///
    /// The forwarding description is traversed in the opposite order and the
    /// endpoint domains are swapped. The reply path carries no underlay next
    /// hop; callers set it from the underlay source of the datagram being
    /// answered via [`Path::with_underlay_next_hop`].
    pub fn to_reversed(&self) -> Reversal {
        if !self.reversible {
            return Reversal::Irreversible;
        }

        let mut raw: Vec<u8> = self.raw.to_vec();
        raw.reverse();

        Reversal::Reply(Path {
            raw: Bytes::from(raw),
            underlay_next_hop: None,
            domains: self.domains.into_reversed(),
            reversible: true,
            metadata: None,
        })
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "src:{}, dst:{}, next hop: {}, path: ",
            self.domains.source,
            self.domains.destination,
            self.underlay_next_hop
                .map_or_else(|| "none".to_string(), |a| a.to_string()),
        )?;

        match self.metadata.as_ref() {
            Some(meta) => meta.format_interfaces(f)?,
            None => write!(f, "<no metadata>")?,
        };

        Ok(())
    }
}

/// The result of flipping a path into the return direction.
///
/// `Irreversible` is a distinguishable outcome rather than an error: it
/// signals that no return path is known and the caller must not auto-reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reversal {
    /// A path usable for the return direction.
    Reply(Path),
    /// The path cannot describe the return direction.
    Irreversible,
}

impl Reversal {
    /// Returns the reply path, if the path was reversible.
    pub fn reply(self) -> Option<Path> {
        match self {
            Reversal::Reply(path) => Some(path),
            Reversal::Irreversible => None,
        }
    }
}

/// A compact identifier of a path's forwarding description.
///
/// Fingerprints let out-of-band failure signals refer to a specific path
/// without carrying the full description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathFingerprint(pub u64);

impl std::fmt::Display for PathFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Metadata about a path, for display and freshness checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// The point in time when the path expires.
    pub expiration: Option<DateTime<Utc>>,
    /// The maximum transmission unit along the path.
    pub mtu: Option<u16>,
    /// The interfaces the path traverses, in order.
    pub interfaces: Option<Vec<PathInterface>>,
}

impl Metadata {
    pub(crate) fn format_interfaces(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.interfaces.as_ref() {
            Some(interfaces) => {
                let mut first = true;
                for interface in interfaces {
                    if !first {
                        write!(f, " > ")?;
                    }
                    write!(f, "{}", interface)?;
                    first = false;
                }
                Ok(())
            }
            None => write!(f, "<no interfaces>"),
        }
    }
}

/// An interface of a domain traversed by a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathInterface {
    /// The domain the interface belongs to.
    pub domain: DomainId,
    /// The interface identifier within the domain.
    pub id: u16,
}

impl std::fmt::Display for PathInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.domain, self.id)
    }
}
