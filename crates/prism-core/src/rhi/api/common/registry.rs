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

//! A context-scoped registry of named objects.
//!
//! The [`ObjectRegistry`] lets independent parts of an application share
//! programs, samplers or any other object created by a context through a name,
//! without threading the object through every call.

use crate::rhi::error::ValidationError;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A name-keyed registry of shared objects.
///
/// Objects are stored as `Arc<dyn Any + Send + Sync>` and retrieved by their
/// concrete type via [`get`](ObjectRegistry::get). Unlike a type map, several
/// objects of the same type can coexist under different names, but a name can
/// only be taken once.
#[derive(Default)]
pub struct ObjectRegistry {
    objects: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl ObjectRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `object` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NameConflict`] if the name is already taken.
    pub fn add<T: Send + Sync + 'static>(
        &self,
        name: &str,
        object: Arc<T>,
    ) -> Result<(), ValidationError> {
        let mut objects = self.objects.write();
        if objects.contains_key(name) {
            return Err(ValidationError::NameConflict {
                name: name.to_string(),
            });
        }
        log::trace!("Registered object '{name}'");
        objects.insert(name.to_string(), object);
        Ok(())
    }

    /// Retrieves the object registered under `name`.
    ///
    /// Returns `None` if the name is free or the object is not a `T`.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let object = self.objects.read().get(name).cloned()?;
        object.downcast::<T>().ok()
    }

    /// Removes the object registered under `name`, returning whether one was.
    pub fn remove(&self, name: &str) -> bool {
        self.objects.write().remove(name).is_some()
    }

    /// Returns `true` if an object is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.objects.read().contains_key(name)
    }

    /// Returns the number of registered objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns `true` if no objects are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Drops every registered object.
    pub fn clear(&self) {
        self.objects.write().clear();
    }
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let objects = self.objects.read();
        let mut names: Vec<&String> = objects.keys().collect();
        names.sort();
        f.debug_struct("ObjectRegistry")
            .field("names", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSampler {
        anisotropy: u32,
    }

    struct FakeProgram {}

    #[test]
    fn test_add_and_get() {
        let registry = ObjectRegistry::new();
        registry
            .add("linear", Arc::new(FakeSampler { anisotropy: 4 }))
            .unwrap();

        let retrieved = registry.get::<FakeSampler>("linear").unwrap();
        assert_eq!(retrieved.anisotropy, 4);
    }

    #[test]
    fn test_get_wrong_type_returns_none() {
        let registry = ObjectRegistry::new();
        registry.add("shading", Arc::new(FakeProgram {})).unwrap();
        assert!(registry.get::<FakeSampler>("shading").is_none());
        assert!(registry.get::<FakeProgram>("missing").is_none());
    }

    #[test]
    fn test_name_conflict_keeps_first_object() {
        let registry = ObjectRegistry::new();
        registry
            .add("linear", Arc::new(FakeSampler { anisotropy: 1 }))
            .unwrap();
        let result = registry.add("linear", Arc::new(FakeSampler { anisotropy: 16 }));

        assert_eq!(
            result,
            Err(ValidationError::NameConflict {
                name: "linear".to_string()
            })
        );
        assert_eq!(registry.get::<FakeSampler>("linear").unwrap().anisotropy, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_frees_name() {
        let registry = ObjectRegistry::new();
        registry.add("program", Arc::new(FakeProgram {})).unwrap();
        assert!(registry.remove("program"));
        assert!(!registry.contains("program"));
        assert!(registry.is_empty());
        assert!(registry.add("program", Arc::new(FakeProgram {})).is_ok());
    }
}
