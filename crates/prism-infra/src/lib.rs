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

//! # Prism Infra
//!
//! Concrete backends of the Prism render hardware interface.
//!
//! The backend used by an application is selected at compile time through
//! [`NativeBackend`]. The `null` backend executes command streams on CPU
//! worker threads: it copies buffer bytes, checks descriptor lookups and
//! signals timeline fences, which makes it suitable for headless tools and tests.

#![warn(missing_docs)]

#[cfg(feature = "null")]
pub mod null;
mod provider;

pub use self::provider::FileProvider;

/// The backend selected for this build.
#[cfg(feature = "null")]
pub type NativeBackend = null::NullBackend;

/// Initializes `env_logger`, honoring `RUST_LOG` and defaulting to `info`.
///
/// Calling it more than once is harmless.
pub fn init_logging() {
    use env_logger::{Builder, Env};

    if let Err(error) = Builder::from_env(Env::default().default_filter_or("info")).try_init() {
        log::debug!("Logger already initialized: {error}");
    }
}
