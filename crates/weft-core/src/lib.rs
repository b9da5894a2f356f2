// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Weft Core
//!
//! The scheduling core of the Weft runtime: a thread pool with
//! dependency-aware task graphs, counting barriers, write-once futures and
//! fence watchers for externally completed work.

#![warn(missing_docs)]

pub mod barrier;
pub mod config;
pub mod error;
pub mod fence;
pub mod future;
pub mod pool;
pub mod task;
pub mod telemetry;

pub use barrier::{AsBarrier, BarrierLock, TaskBarrier};
pub use config::PoolConfig;
pub use error::{TaskError, TaskResult};
pub use future::{Future, Promise, UniqueFuture, UniquePromise};
pub use pool::{TaskQueue, ThreadPool};
pub use task::{TaskDesc, TaskId, TaskKind, TaskParams, ThreadRole};
