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

//! Opaque byte sources used to load shader binaries and other data.

use crate::rhi::error::{RhiResult, ValidationError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An immutable, cheaply cloneable block of bytes returned by a [`Provider`].
pub type Chunk = Arc<[u8]>;

/// A source of named binary data.
///
/// Paths use forward slashes and are interpreted by the provider. The core
/// never writes through a provider.
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Returns `true` if data exists at `path`.
    fn has_data(&self, path: &str) -> bool;

    /// Loads the data stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DataNotFound`] if nothing is stored at
    /// `path`, or a backend platform error if reading failed.
    fn get_data(&self, path: &str) -> RhiResult<Chunk>;

    /// Lists the paths of the files stored directly in `directory`.
    fn get_files(&self, directory: &str) -> RhiResult<Vec<String>>;
}

/// An in-memory [`Provider`], typically used for embedded shaders and tests.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    files: RwLock<BTreeMap<String, Chunk>>,
}

impl MemoryProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` at `path`, replacing what was there.
    pub fn insert(&self, path: impl Into<String>, data: impl Into<Chunk>) {
        self.files.write().insert(normalize(&path.into()), data.into());
    }
}

impl Provider for MemoryProvider {
    fn has_data(&self, path: &str) -> bool {
        self.files.read().contains_key(&normalize(path))
    }

    fn get_data(&self, path: &str) -> RhiResult<Chunk> {
        self.files
            .read()
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| {
                ValidationError::DataNotFound {
                    path: path.to_string(),
                }
                .into()
            })
    }

    fn get_files(&self, directory: &str) -> RhiResult<Vec<String>> {
        let directory = normalize(directory);
        let prefix = if directory.is_empty() {
            String::new()
        } else {
            format!("{directory}/")
        };
        Ok(self
            .files
            .read()
            .keys()
            .filter(|path| {
                path.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .cloned()
            .collect())
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_provider_lookup() {
        let provider = MemoryProvider::new();
        provider.insert("shaders/quad.vs", vec![1u8, 2, 3]);

        assert!(provider.has_data("shaders/quad.vs"));
        assert!(provider.has_data("/shaders\\quad.vs"));
        assert_eq!(&*provider.get_data("shaders/quad.vs").unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_missing_data_is_reported() {
        let provider = MemoryProvider::new();
        let error = provider.get_data("missing.bin").unwrap_err();
        assert_eq!(
            error.as_validation(),
            Some(&ValidationError::DataNotFound {
                path: "missing.bin".to_string()
            })
        );
    }

    #[test]
    fn test_get_files_lists_direct_children_only() {
        let provider = MemoryProvider::new();
        provider.insert("shaders/quad.vs", vec![0u8]);
        provider.insert("shaders/quad.ps", vec![0u8]);
        provider.insert("shaders/post/blur.cs", vec![0u8]);
        provider.insert("textures/albedo.bin", vec![0u8]);

        let files = provider.get_files("shaders").unwrap();
        assert_eq!(files, vec!["shaders/quad.ps", "shaders/quad.vs"]);
    }
}
