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

//! Foundational types shared by every part of the interface: adapter
//! information, settings, the object registry, data providers and the
//! parallel executor.

mod adapter;
mod executor;
mod provider;
mod registry;
mod settings;

pub use self::adapter::*;
pub use self::executor::*;
pub use self::provider::*;
pub use self::registry::*;
pub use self::settings::*;

/// The largest number of frames a context may keep in flight.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 6;

/// Frames in flight used when settings do not say otherwise.
pub const DEFAULT_FRAMES_COUNT: u32 = 3;
