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

//! Data types for path-aware datagram networking.
//!
//! # Organisation
//!
//! - [`address`] contains the opaque routing-domain identifier
//!   ([`DomainId`][address::DomainId]) and the application addressing tuple
//!   ([`Endpoint`][address::Endpoint]).
//!
//! - [`path`] contains the [`Path`][path::Path] forwarding description along
//!   with its display metadata, reversal transform, and fingerprinting.

pub mod address;
pub mod path;
