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

//! The lifecycle contract of subsystems owned by a [`SystemCollection`](crate::SystemCollection).

use crate::collection::SystemContext;
use crate::error::SystemError;
use std::any::{type_name, Any};
use std::sync::Arc;
use weft_core::{TaskBarrier, TaskQueue};

/// Access to a value as [`Any`], implemented for every `'static` type.
pub trait AsAny: Any {
    /// Returns `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// Returns `self` as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A subsystem driven by the frame loop of a collection of frames `F`.
///
/// The collection calls the hooks in this order: `on_added_to` once, when the
/// system is added; `startup` once, when the collection starts; `new_frame`
/// whenever a frame is set; `shutdown` once, in reverse order of addition.
pub trait System<F>: AsAny + Send + Sync {
    /// A name for logs and errors. Defaults to the type name.
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Registers groups, injectors, interfaces and caches.
    fn on_added_to(&mut self, _context: &mut SystemContext<F>) {}

    /// Starts the system.
    ///
    /// Returns a barrier that signals once the system is ready, or `None` if
    /// it is ready already. The collection waits for every readiness barrier
    /// before `startup` returns.
    fn startup(
        &mut self,
        context: &mut SystemContext<F>,
        queue: &TaskQueue,
    ) -> Result<Option<TaskBarrier>, SystemError>;

    /// Returns `true` once the system finished starting.
    fn is_initialized(&self) -> bool;

    /// Called when a new frame becomes active, before its injection runs.
    fn new_frame(&mut self, _frame: &Arc<F>) {}

    /// Releases the system's resources.
    fn shutdown(&mut self) {}
}
