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

//! A [`Provider`] reading files below a root directory.

use anyhow::Context as _;
use prism_core::{BackendError, Chunk, Provider, RhiResult, ValidationError};
use std::fs;
use std::path::{Path, PathBuf};

/// Serves files below a root directory. Paths use forward slashes and are
/// relative to the root.
#[derive(Debug, Clone)]
pub struct FileProvider {
    root: PathBuf,
}

impl FileProvider {
    /// Creates a provider rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split(['/', '\\'])
            .filter(|part| !part.is_empty() && *part != ".")
            .fold(self.root.clone(), |full, part| full.join(part))
    }

    fn read(&self, path: &str) -> anyhow::Result<Chunk> {
        let full = self.resolve(path);
        let bytes = fs::read(&full).with_context(|| format!("failed to read {}", full.display()))?;
        Ok(Chunk::from(bytes))
    }

    fn list(&self, directory: &str) -> anyhow::Result<Vec<String>> {
        let full = self.resolve(directory);
        let prefix = directory.trim_matches(['/', '\\']).replace('\\', "/");
        let mut files = Vec::new();
        for entry in fs::read_dir(&full).with_context(|| format!("failed to list {}", full.display()))? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            files.push(if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            });
        }
        files.sort();
        Ok(files)
    }
}

impl Provider for FileProvider {
    fn has_data(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn get_data(&self, path: &str) -> RhiResult<Chunk> {
        if !self.has_data(path) {
            return Err(ValidationError::DataNotFound {
                path: path.to_string(),
            }
            .into());
        }
        self.read(path)
            .map_err(|error| BackendError::Platform(format!("{error:#}")).into())
    }

    fn get_files(&self, directory: &str) -> RhiResult<Vec<String>> {
        self.list(directory)
            .map_err(|error| BackendError::Platform(format!("{error:#}")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_files_below_root() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("shaders")).unwrap();
        fs::write(root.path().join("shaders/quad.vs"), [1u8, 2, 3]).unwrap();
        fs::write(root.path().join("shaders/quad.ps"), [4u8]).unwrap();
        fs::create_dir(root.path().join("shaders/post")).unwrap();

        let provider = FileProvider::new(root.path());
        assert!(provider.has_data("shaders/quad.vs"));
        assert!(provider.has_data("/shaders\\quad.vs"));
        assert_eq!(&*provider.get_data("shaders/quad.vs").unwrap(), &[1, 2, 3]);
        assert_eq!(
            provider.get_files("shaders").unwrap(),
            vec!["shaders/quad.ps", "shaders/quad.vs"]
        );
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let provider = FileProvider::new(root.path());
        let error = provider.get_data("missing.bin").unwrap_err();
        assert!(matches!(
            error.as_validation(),
            Some(ValidationError::DataNotFound { .. })
        ));
    }

    #[test]
    fn test_listing_missing_directory_is_a_platform_error() {
        let root = tempfile::tempdir().unwrap();
        let provider = FileProvider::new(root.path());
        assert!(matches!(
            provider.get_files("nowhere"),
            Err(prism_core::RhiError::Backend(BackendError::Platform(_)))
        ));
    }
}
