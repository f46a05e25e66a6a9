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

//! Common type aliases.

use std::future::Future;

/// A future resolving to a `Result`, usable as the return type of async
/// trait methods that stay generic over the concrete future.
pub trait ResFut<'a, T, E>: Future<Output = Result<T, E>> + Send + 'a {}

impl<'a, T, E, F> ResFut<'a, T, E> for F where F: Future<Output = Result<T, E>> + Send + 'a {}
