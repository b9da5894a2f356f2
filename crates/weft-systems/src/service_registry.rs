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

//! A type-keyed registry of shared services and interfaces.
//!
//! Systems publish capabilities here (a resource provider, a graphics
//! context, a scene query) and other systems look them up by type, without
//! the collection knowing about any concrete subsystem.

use ahash::AHashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// A registry keyed by [`TypeId`].
///
/// Plain values are stored with [`insert`](ServiceRegistry::insert).
/// Trait objects are stored as `Arc<dyn Trait>` with
/// [`insert_shared`](ServiceRegistry::insert_shared), which also lets callers
/// keep their own reference.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use weft_systems::ServiceRegistry;
///
/// trait Clock: Send + Sync {
///     fn now(&self) -> u64;
/// }
/// struct Fixed(u64);
/// impl Clock for Fixed {
///     fn now(&self) -> u64 {
///         self.0
///     }
/// }
///
/// let mut registry = ServiceRegistry::new();
/// registry.insert_shared::<dyn Clock>(Arc::new(Fixed(7)));
///
/// let clock = registry.get_shared::<dyn Clock>().unwrap();
/// assert_eq!(clock.now(), 7);
/// ```
#[derive(Default)]
pub struct ServiceRegistry {
    services: AHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    /// Creates an empty service registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            services: AHashMap::new(),
        }
    }

    /// Inserts a service into the registry, keyed by `T`'s [`TypeId`].
    ///
    /// If a service of the same type was already registered, it is replaced.
    pub fn insert<T: Send + Sync + 'static>(&mut self, service: T) {
        self.services.insert(TypeId::of::<T>(), Box::new(service));
    }

    /// Inserts a shared service, possibly unsized, keyed by `Arc<T>`.
    pub fn insert_shared<T: ?Sized + Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.insert::<Arc<T>>(service);
    }

    /// Retrieves a shared reference to a previously registered service.
    ///
    /// Returns `None` if no service of type `T` has been registered.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Retrieves a service stored with [`insert_shared`](Self::insert_shared).
    #[must_use]
    pub fn get_shared<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get::<Arc<T>>().cloned()
    }

    /// Removes a service, returning it if it was registered.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.services
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Returns `true` if a service of type `T` is registered.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` if no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.len())
            .finish()
    }
}
