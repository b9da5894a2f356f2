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

//! # Weft Systems
//!
//! The frame-level layer of the Weft runtime. Subsystems implement
//! [`System`] and are owned by a [`SystemCollection`], which shares named
//! task groups, barriers, interfaces and resource caches between them and
//! drives every frame through the [`FrameProcessor`]'s inject, update and
//! render groups.

#![warn(missing_docs)]

mod collection;
mod error;
mod group;
mod processor;
mod service_registry;
mod system;
mod time;

pub use collection::{SystemCollection, SystemContext};
pub use error::SystemError;
pub use group::{ParameterizedTask, ParameterizedTaskGroup};
pub use processor::{FrameProcessor, InjectProc, RenderParams, TypeInjector, UpdateParams};
pub use service_registry::ServiceRegistry;
pub use system::{AsAny, System};
pub use time::{FrameClock, FrameTime};
