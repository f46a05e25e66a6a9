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

//! Addresses for routing domains and endhosts.
//!
//! - A [`DomainId`] opaquely identifies a routing domain, the source or
//!   destination of a path.
//! - An [`Endpoint`] is a [`DomainId`] combined with an underlay socket
//!   address, and is used for application addressing.

use std::{net, str::FromStr};

use thiserror::Error;

/// An opaque identifier of a routing domain.
///
/// Domain identifiers are equality-comparable and hashable but otherwise
/// carry no structure that applications should rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DomainId(pub u64);

impl DomainId {
    /// The wildcard domain, matching any domain.
    pub const WILDCARD: Self = Self(0);

    /// Returns true if this is the wildcard domain.
    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }
}

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DomainId {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(DomainId)
            .map_err(|_| AddressParseError::InvalidDomain(s.to_string()))
    }
}

impl From<u64> for DomainId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A value that occurs once per path direction.
///
/// Used for the source and destination domains of a path and for addressing
/// information that differs between the forward and return direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByDomain<T> {
    /// The value at the source.
    pub source: T,
    /// The value at the destination.
    pub destination: T,
}

impl<T> ByDomain<T> {
    /// Swaps source and destination.
    pub fn into_reversed(self) -> Self {
        Self {
            source: self.destination,
            destination: self.source,
        }
    }
}

impl<T: Clone> ByDomain<T> {
    /// Creates a new instance with the value cloned into both directions.
    pub fn with_cloned(value: T) -> Self {
        Self {
            source: value.clone(),
            destination: value,
        }
    }
}

/// An endhost address: a routing domain plus an underlay socket address.
///
/// The textual representation is `<domain>,<host>:<port>`, e.g.
/// `110,192.0.2.1:8080`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// The routing domain the host lives in.
    pub domain: DomainId,
    /// The underlay address of the host.
    pub host: net::SocketAddr,
}

impl Endpoint {
    /// Creates a new endpoint.
    pub fn new(domain: DomainId, host: net::SocketAddr) -> Self {
        Self { domain, host }
    }

    /// Returns the port of the underlay address.
    pub fn port(&self) -> u16 {
        self.host.port()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.domain, self.host)
    }
}

impl FromStr for Endpoint {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, host) = s
            .split_once(',')
            .ok_or_else(|| AddressParseError::InvalidEndpoint(s.to_string()))?;
        Ok(Self {
            domain: domain.trim().parse()?,
            host: host
                .trim()
                .parse()
                .map_err(|_| AddressParseError::InvalidEndpoint(s.to_string()))?,
        })
    }
}

/// Errors when parsing addresses from their textual representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    /// The domain identifier could not be parsed.
    #[error("invalid domain identifier: {0}")]
    InvalidDomain(String),
    /// The endpoint could not be parsed.
    #[error("invalid endpoint, expected `<domain>,<host>:<port>`: {0}")]
    InvalidEndpoint(String),
}
